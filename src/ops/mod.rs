use std::io;

use log::{debug, error};

use crate::consts::{InodePointer, BLOCK_COUNT, BLOCK_SIZE, FILE_NAME_FIELD, FILE_NAME_LENGTH, ROOT_INODE};
use crate::driver::DeviceDriver;
use crate::ops::directory::{Directory, EntryList};
use crate::ops::file::File;
use crate::ops::meta::{GroupId, Metadata, StatFs, UserId};
use crate::structure::Structure;
use crate::util::error::{Error, Result};
use crate::util::mode::{ModeBits, ModeBitsHelper, IS_DIR_MASK, IS_FILE_MASK};

pub mod directory;
pub mod file;
pub mod meta;

/// The operation handlers. Every path lives directly under the root: the
/// leading `/` is dropped and the rest is looked up as a single name, so
/// `/a/b` means the entry literally called `a/b`.
pub struct FlatFS<A: DeviceDriver> {
    structure: Structure<A>,
    root: Directory,
    user_id: UserId,
    group_id: GroupId,
    flush_interval: u32,
    pending: u32,
}

impl<A: DeviceDriver> FlatFS<A> {
    pub fn new(device: A) -> io::Result<FlatFS<A>> {
        let structure = Structure::open(device)?;
        // SAFETY: getuid/getgid cannot fail and touch no memory
        let (user_id, group_id) = unsafe { (libc::getuid(), libc::getgid()) };
        Ok(FlatFS {
            structure,
            root: Directory::from_inode(ROOT_INODE),
            user_id,
            group_id,
            flush_interval: 0,
            pending: 0,
        })
    }

    pub fn with_owner(mut self, user_id: UserId, group_id: GroupId) -> FlatFS<A> {
        self.user_id = user_id;
        self.group_id = group_id;
        self
    }

    /// Flush the image after every `interval` mutating operations; 0 leaves
    /// flushing to `flush`/`close`.
    pub fn with_flush_interval(mut self, interval: u32) -> FlatFS<A> {
        self.flush_interval = interval;
        self
    }

    pub fn get_block_size(&self) -> usize {
        self.structure.get_block_size()
    }

    pub fn resolve(&self, path: &str) -> Result<InodePointer> {
        let name = Self::name_of(path);
        if name.is_empty() {
            return Ok(ROOT_INODE);
        }
        self.root.lookup(&self.structure, name)
    }

    pub fn stat(&self, inum: InodePointer) -> Result<Metadata> {
        let inode = self.structure.read_inode(inum)?;
        if inode.is_free() {
            return Err(Error::NotFound);
        }
        Ok(Metadata::from_inode(inum, &inode, self.user_id, self.group_id))
    }

    pub fn getattr(&self, path: &str) -> Result<Metadata> {
        self.stat(self.resolve(path)?)
    }

    pub fn read(&self, path: &str, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.read_at(self.resolve(path)?, offset, length)
    }

    pub fn read_at(&self, inum: InodePointer, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.stat(inum)?;
        File::from_inode(inum).read(&self.structure, offset, length)
    }

    pub fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        let inum = self.resolve(path)?;
        self.write_at(inum, offset, data)
    }

    pub fn write_at(&mut self, inum: InodePointer, offset: u64, data: &[u8]) -> Result<usize> {
        self.stat(inum)?;
        debug!("write inode {}: {} bytes at {}", inum, data.len(), offset);
        self.mutate(|fs| File::from_inode(inum).write(&mut fs.structure, offset, data))
    }

    pub fn truncate(&mut self, path: &str, size: u64) -> Result<()> {
        let inum = self.resolve(path)?;
        self.truncate_inode(inum, size)
    }

    pub fn truncate_inode(&mut self, inum: InodePointer, size: u64) -> Result<()> {
        self.stat(inum)?;
        debug!("truncate inode {} to {}", inum, size);
        self.mutate(|fs| File::from_inode(inum).truncate(&mut fs.structure, size))
    }

    pub fn chmod(&mut self, path: &str, permissions: ModeBits) -> Result<()> {
        let inum = self.resolve(path)?;
        self.chmod_inode(inum, permissions)
    }

    pub fn chmod_inode(&mut self, inum: InodePointer, permissions: ModeBits) -> Result<()> {
        self.stat(inum)?;
        self.mutate(|fs| {
            let mut inode = fs.structure.read_inode(inum)?;
            inode.mode = inode.mode.with_permissions(permissions);
            fs.structure.write_inode(inum, inode)
        })
    }

    pub fn readdir(&self, path: &str) -> Result<EntryList> {
        self.list_inode(self.resolve(path)?)
    }

    pub fn list_inode(&self, inum: InodePointer) -> Result<EntryList> {
        self.stat(inum)?;
        Directory::from_inode(inum).list(&self.structure)
    }

    pub fn mknod(&mut self, path: &str, permissions: ModeBits) -> Result<InodePointer> {
        self.create(path, IS_FILE_MASK | permissions)
    }

    pub fn mkdir(&mut self, path: &str, permissions: ModeBits) -> Result<InodePointer> {
        self.create(path, IS_DIR_MASK | permissions)
    }

    /// Creates a file, or a directory when `mode` carries the directory type
    /// bits. Nothing stays allocated when linking the new inode fails.
    pub fn create(&mut self, path: &str, mode: ModeBits) -> Result<InodePointer> {
        match self.resolve(path) {
            Ok(_) => return Err(Error::AlreadyExists),
            Err(Error::NotFound) => {}
            Err(e) => return Err(e),
        }

        let name = Self::name_of(path);
        let mode = if mode.is_directory() { mode } else { IS_FILE_MASK | mode.get_permissions() as ModeBits };
        debug!("create {:?} mode {:o}", name, mode);

        self.mutate(|fs| {
            let inum = fs.structure.create_inode(mode)?;

            if mode.is_directory() {
                let mut inode = fs.structure.read_inode(inum)?;
                match fs.structure.allocate_block() {
                    Ok(block) => inode.set_pointer(0, block),
                    Err(e) => {
                        fs.structure.free_inode(inum)?;
                        return Err(e);
                    }
                }
                fs.structure.write_inode(inum, inode)?;
            }

            if let Err(e) = fs.root.insert(&mut fs.structure, name, inum) {
                fs.structure.free_inode(inum)?;
                return Err(e);
            }
            Ok(inum)
        })
    }

    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let name = Self::name_of(path);
        let inum = self.root.lookup(&self.structure, name)?;
        debug!("unlink {:?} (inode {})", name, inum);

        self.mutate(|fs| {
            fs.root.delete(&mut fs.structure, name)?;
            fs.release_link(inum)
        })
    }

    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let inum = self.root.lookup(&self.structure, Self::name_of(path))?;
        if !self.structure.read_inode(inum)?.is_directory() {
            return Err(Error::NotDirectory);
        }
        self.unlink(path)
    }

    /// Moves `from` to `to`. An existing `to` is unlinked first, the same way
    /// `unlink` would do it, so its inode and blocks are released rather than
    /// left allocated and unreachable.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let from_name = Self::name_of(from);
        let to_name = Self::name_of(to);
        let inum = self.root.lookup(&self.structure, from_name)?;

        if to_name.len() >= FILE_NAME_FIELD {
            return Err(Error::NameTooLong);
        }
        if to_name.is_empty() {
            return Err(Error::AlreadyExists);
        }
        if to_name.contains('\0') {
            return Err(Error::InvalidName);
        }
        if from_name == to_name {
            return Ok(());
        }
        debug!("rename {:?} -> {:?} (inode {})", from_name, to_name, inum);

        self.mutate(|fs| {
            match fs.root.lookup(&fs.structure, to_name) {
                Ok(replaced) => {
                    fs.root.delete(&mut fs.structure, to_name)?;
                    fs.release_link(replaced)?;
                }
                Err(Error::NotFound) => {}
                Err(e) => return Err(e),
            }

            fs.root.delete(&mut fs.structure, from_name)?;
            fs.root.insert(&mut fs.structure, to_name, inum)
        })
    }

    pub fn statfs(&self) -> StatFs {
        StatFs {
            blocks: BLOCK_COUNT as u64,
            free_blocks: self.structure.free_block_count(),
            files: self.structure.get_inode_count(),
            free_files: self.structure.free_inode_count(),
            block_size: BLOCK_SIZE as u32,
            name_length: FILE_NAME_LENGTH as u32,
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.pending = 0;
        self.structure.flush()
    }

    pub fn close(self) -> io::Result<A> {
        self.structure.close()
    }

    fn release_link(&mut self, inum: InodePointer) -> Result<()> {
        let mut inode = self.structure.read_inode(inum)?;
        inode.refs = inode.refs.saturating_sub(1);
        if inode.refs == 0 {
            self.structure.free_inode(inum)
        } else {
            self.structure.write_inode(inum, inode)
        }
    }

    fn mutate<T>(&mut self, operation: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = operation(self);
        if self.flush_interval > 0 {
            self.pending += 1;
            if self.pending >= self.flush_interval {
                if let Err(e) = self.flush() {
                    error!("flushing image failed: {}", e);
                }
            }
        }
        result
    }

    #[inline]
    fn name_of(path: &str) -> &str {
        path.strip_prefix('/').unwrap_or(path)
    }
}
