use std::ffi::OsStr;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::{c_int, EINVAL, EIO, ENOENT, EPERM};
use log::{debug, error, info, warn};

use crate::consts::{InodePointer, ROOT_INODE};
use crate::driver::DeviceDriver;
use crate::ops::meta::{InodeType, Metadata};
use crate::ops::FlatFS;
use crate::util::error::{Error, ErrorNum, Result};
use crate::util::mode::ModeBits;

const TTL: Duration = Duration::from_secs(1);
pub const ROOT_INO: u64 = ROOT_INODE + 1;

/// Kernel-facing side of the filesystem. FUSE reserves inode 0, so every
/// inode number is shifted up by one on the way out.
pub struct FuseDriver<A: DeviceDriver> {
    fs: FlatFS<A>,
    mounted_at: SystemTime,
}

impl<A: DeviceDriver> FuseDriver<A> {
    pub fn new(fs: FlatFS<A>) -> FuseDriver<A> {
        FuseDriver { fs, mounted_at: SystemTime::now() }
    }

    fn inode_to_fileattr(&self, meta: &Metadata) -> FileAttr {
        FileAttr {
            ino: to_ino(meta.inode),
            size: meta.size,
            blocks: meta.blocks * (self.fs.get_block_size() as u64 / 512),
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind: file_type(meta.inode_type),
            perm: meta.permissions,
            nlink: meta.nlinks,
            uid: meta.user_id,
            gid: meta.group_id,
            rdev: 0,
            flags: 0,
            blksize: self.fs.get_block_size() as u32,
        }
    }

    fn attr(&self, inum: InodePointer) -> Result<FileAttr> {
        self.fs.stat(inum).map(|meta| self.inode_to_fileattr(&meta))
    }

    fn created(&mut self, parent: u64, name: &OsStr, mode: ModeBits) -> std::result::Result<FileAttr, ErrorNum> {
        if parent != ROOT_INO {
            return Err(EPERM);
        }
        let name = entry_name(name)?;
        let inum = self.fs.create(name, mode).map_err(|e| e.error_num())?;
        self.attr(inum).map_err(|e| e.error_num())
    }
}

impl<A: DeviceDriver> Filesystem for FuseDriver<A> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> std::result::Result<(), c_int> {
        let statfs = self.fs.statfs();
        info!("mounted: {} of {} blocks free", statfs.free_blocks, statfs.blocks);
        Ok(())
    }

    fn destroy(&mut self) {
        match self.fs.flush() {
            Ok(()) => info!("unmounted, image flushed"),
            Err(e) => error!("flushing image on unmount failed: {}", e),
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != ROOT_INO {
            reply.error(ENOENT);
            return;
        }
        let name = match entry_name(name) {
            Ok(name) => name,
            Err(e) => return reply.error(e),
        };
        match self.fs.resolve(name).and_then(|inum| self.attr(inum)) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e.error_num()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match to_inum(ino).and_then(|inum| self.attr(inum)) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.error_num()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let result = to_inum(ino).and_then(|inum| {
            if let Some(size) = size {
                self.fs.truncate_inode(inum, size)?;
            }
            if let Some(mode) = mode {
                self.fs.chmod_inode(inum, mode)?;
            }
            self.attr(inum)
        });
        match result {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e.error_num()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let kind = mode & libc::S_IFMT as u32;
        if kind != 0 && kind != libc::S_IFREG as u32 {
            warn!("mknod {:?}: unsupported file type {:o}", name, kind);
            reply.error(EPERM);
            return;
        }
        match self.created(parent, name, libc::S_IFREG as u32 | (mode & !umask)) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, umask: u32, reply: ReplyEntry) {
        match self.created(parent, name, libc::S_IFDIR as u32 | (mode & !umask)) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        match self.created(parent, name, libc::S_IFREG as u32 | (mode & !umask)) {
            Ok(attr) => reply.created(&TTL, &attr, 0, 0, 0),
            Err(e) => reply.error(e),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        if parent != ROOT_INO {
            reply.error(ENOENT);
            return;
        }
        match entry_name(name) {
            Ok(name) => match self.fs.unlink(name) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.error_num()),
            },
            Err(e) => reply.error(e),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        if parent != ROOT_INO {
            reply.error(ENOENT);
            return;
        }
        match entry_name(name) {
            Ok(name) => match self.fs.rmdir(name) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.error_num()),
            },
            Err(e) => reply.error(e),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        if parent != ROOT_INO {
            reply.error(ENOENT);
            return;
        }
        if newparent != ROOT_INO {
            reply.error(EPERM);
            return;
        }
        let (from, to) = match (entry_name(name), entry_name(newname)) {
            (Ok(from), Ok(to)) => (from, to),
            (Err(e), _) | (_, Err(e)) => return reply.error(e),
        };
        match self.fs.rename(from, to) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.error_num()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match to_inum(ino).and_then(|inum| self.fs.stat(inum)) {
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(e.error_num()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            reply.error(EINVAL);
            return;
        }
        match to_inum(ino).and_then(|inum| self.fs.read_at(inum, offset as u64, size as usize)) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.error_num()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if offset < 0 {
            reply.error(EINVAL);
            return;
        }
        match to_inum(ino).and_then(|inum| self.fs.write_at(inum, offset as u64, data)) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e.error_num()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        debug!("fsync ino {}", ino);
        match self.fs.flush() {
            Ok(()) => reply.ok(),
            Err(e) => {
                error!("fsync failed: {}", e);
                reply.error(EIO);
            }
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let entries = match to_inum(ino).and_then(|inum| self.fs.list_inode(inum)) {
            Ok(entries) => entries,
            Err(e) => return reply.error(e.error_num()),
        };

        let mut listing = vec![(ino, FileType::Directory, ".".to_string()), (ROOT_INO, FileType::Directory, "..".to_string())];
        for entry in entries {
            let kind = match self.fs.stat(entry.id) {
                Ok(meta) => file_type(meta.inode_type),
                Err(_) => FileType::RegularFile,
            };
            listing.push((to_ino(entry.id), kind, entry.name));
        }

        for (index, (ino, kind, name)) in listing.into_iter().enumerate().skip(offset.max(0) as usize) {
            if reply.add(ino, index as i64 + 1, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let statfs = self.fs.statfs();
        reply.statfs(
            statfs.blocks,
            statfs.free_blocks,
            statfs.free_blocks,
            statfs.files,
            statfs.free_files,
            statfs.block_size,
            statfs.name_length,
            statfs.block_size,
        );
    }
}

fn file_type(inode_type: InodeType) -> FileType {
    match inode_type {
        InodeType::File => FileType::RegularFile,
        InodeType::Directory => FileType::Directory,
    }
}

fn to_ino(inum: InodePointer) -> u64 {
    inum + 1
}

fn to_inum(ino: u64) -> Result<InodePointer> {
    ino.checked_sub(1).ok_or(Error::InvalidHandle)
}

fn entry_name(name: &OsStr) -> std::result::Result<&str, ErrorNum> {
    name.to_str().ok_or(EINVAL)
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    use fuser::FileType;

    use super::{entry_name, to_inum, to_ino, FuseDriver, ROOT_INO};
    use crate::consts::{DEFAULT_SECTOR_SIZE, IMAGE_SIZE, ROOT_INODE};
    use crate::driver::memory_drive::MemoryDrive;
    use crate::ops::FlatFS;
    use crate::util::error::Error;

    fn driver() -> FuseDriver<MemoryDrive> {
        let fs = FlatFS::new(MemoryDrive::new(IMAGE_SIZE, DEFAULT_SECTOR_SIZE)).unwrap().with_owner(1000, 100);
        FuseDriver::new(fs)
    }

    #[test]
    fn inode_numbers() {
        assert_eq!(to_ino(ROOT_INODE), ROOT_INO);
        assert_eq!(to_inum(ROOT_INO), Ok(ROOT_INODE));
        assert_eq!(to_inum(0), Err(Error::InvalidHandle));
    }

    #[test]
    fn names_must_be_utf8() {
        assert_eq!(entry_name(OsStr::new("a.txt")), Ok("a.txt"));
        assert_eq!(entry_name(OsStr::from_bytes(&[0x66, 0xff])), Err(libc::EINVAL));
    }

    #[test]
    fn file_attributes() {
        let mut driver = driver();
        let attr = driver.created(ROOT_INO, OsStr::new("notes"), 0o100640).unwrap();
        assert_eq!(attr.ino, 2);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o640);
        assert_eq!((attr.uid, attr.gid, attr.nlink), (1000, 100, 1));
        assert_eq!(attr.blksize, 4096);

        driver.fs.write_at(1, 0, &[1; 5000]).unwrap();
        let attr = driver.attr(1).unwrap();
        assert_eq!(attr.size, 5000);
        assert_eq!(attr.blocks, 16);

        let root = driver.attr(ROOT_INODE).unwrap();
        assert_eq!(root.kind, FileType::Directory);
        assert_eq!(root.perm, 0o755);
    }

    #[test]
    fn create_outside_root() {
        let mut driver = driver();
        assert_eq!(driver.created(ROOT_INO + 5, OsStr::new("x"), 0o100644).err(), Some(libc::EPERM));
        assert_eq!(driver.created(ROOT_INO, OsStr::new("x"), 0o100644).map(|attr| attr.ino), Ok(2));
        assert_eq!(driver.created(ROOT_INO, OsStr::new("x"), 0o100644).err(), Some(libc::EEXIST));
    }
}
