use std::io;

use log::info;

use crate::consts::{BlockPointer, InodePointer, BLOCK_COUNT, BLOCK_SIZE, MAX_INODES, ROOT_INODE};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::blockmap::BlockMap;
use crate::structure::inode::Inode;
use crate::structure::inode_table::InodeTable;
use crate::util::error::Result;
use crate::util::mode::{ModeBits, IS_DIR_MASK};

pub mod blockmap;
pub mod inode;
pub mod inode_table;

const ROOT_MODE: ModeBits = IS_DIR_MASK | 0o755;

/// The filesystem context: the image plus the allocators living inside it.
pub struct Structure<A: DeviceDriver> {
    pub(crate) io: IO<A>,
    pub(crate) block_map: BlockMap,
    pub(crate) inode_table: InodeTable,
}

impl<A: DeviceDriver> Structure<A> {
    /// Loads the image, formatting it first when block 0 carries no bitmap,
    /// and makes sure the root directory exists.
    pub fn open(device: A) -> io::Result<Structure<A>> {
        let mut io = IO::new(device)?;
        let block_map = BlockMap::new();

        if !block_map.is_formatted(&io) {
            info!("formatting empty image ({} blocks of {} bytes)", BLOCK_COUNT, BLOCK_SIZE);
            block_map.format(&mut io);
        }

        let inode_table = InodeTable::read(&io);
        let mut structure = Structure { io, block_map, inode_table };
        structure.init_root().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(structure)
    }

    fn init_root(&mut self) -> Result<()> {
        if !self.read_inode(ROOT_INODE)?.is_free() {
            return Ok(());
        }

        info!("creating root directory");
        let mut root = Inode { refs: 1, mode: ROOT_MODE, ..Inode::empty() };
        root.set_pointer(0, self.block_map.allocate(&mut self.io)?);
        self.write_inode(ROOT_INODE, root)
    }

    pub fn get_block_size(&self) -> usize {
        BLOCK_SIZE
    }

    pub fn read_inode(&self, inum: InodePointer) -> Result<Inode> {
        self.inode_table.get(inum)
    }

    pub fn write_inode(&mut self, inum: InodePointer, inode: Inode) -> Result<()> {
        self.inode_table.write_inode(&mut self.io, inum, inode)
    }

    pub fn create_inode(&mut self, mode: ModeBits) -> Result<InodePointer> {
        let inum = self.inode_table.allocate(&mut self.io)?;
        let inode = Inode { mode, ..self.read_inode(inum)? };
        self.write_inode(inum, inode)?;
        Ok(inum)
    }

    pub fn free_inode(&mut self, inum: InodePointer) -> Result<()> {
        self.inode_table.free(&mut self.io, &self.block_map, inum)
    }

    /// Grows the inode and records whatever blocks were obtained, even when
    /// the growth itself fails half way.
    pub fn grow_inode(&mut self, inum: InodePointer, new_size: u64) -> Result<()> {
        let mut inode = self.read_inode(inum)?;
        let result = inode.grow(&mut self.io, &self.block_map, new_size);
        self.write_inode(inum, inode)?;
        result
    }

    pub fn shrink_inode(&mut self, inum: InodePointer, new_size: u64) -> Result<()> {
        let mut inode = self.read_inode(inum)?;
        inode.shrink(&mut self.io, &self.block_map, new_size);
        self.write_inode(inum, inode)
    }

    pub fn allocate_block(&mut self) -> Result<BlockPointer> {
        self.block_map.allocate(&mut self.io)
    }

    pub fn free_block_count(&self) -> u64 {
        self.block_map.free_count(&self.io)
    }

    pub fn free_inode_count(&self) -> u64 {
        self.inode_table.free_count()
    }

    pub fn get_inode_count(&self) -> u64 {
        MAX_INODES as u64
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.io.flush()
    }

    pub fn close(self) -> io::Result<A> {
        self.io.close()
    }
}

#[cfg(test)]
mod tests {
    use crate::consts::{BLOCK_COUNT, BLOCK_SIZE, IMAGE_SIZE, ROOT_INODE};
    use crate::driver::memory_drive::MemoryDrive;
    use crate::driver::DeviceDriver;
    use crate::util::error::Error;
    use crate::util::mode::ModeBitsHelper;

    #[test]
    fn open_formats_and_creates_root() {
        let structure = super::Structure::open(MemoryDrive::new(IMAGE_SIZE, 512)).unwrap();
        let root = structure.read_inode(ROOT_INODE).unwrap();
        assert_eq!(root.refs, 1);
        assert!(root.mode.is_directory());
        assert_eq!(root.size, 0);
        assert_eq!(root.map_block(0), Some(1));
        assert!(structure.block_map.is_used(&structure.io, 0));
        assert_eq!(structure.free_block_count(), BLOCK_COUNT as u64 - 2);
    }

    #[test]
    fn reopen_keeps_root() {
        let structure = super::Structure::open(MemoryDrive::new(IMAGE_SIZE, 512)).unwrap();
        let device = structure.close().unwrap();
        let structure = super::Structure::open(device).unwrap();
        assert_eq!(structure.read_inode(ROOT_INODE).unwrap().map_block(0), Some(1));
        assert_eq!(structure.free_block_count(), BLOCK_COUNT as u64 - 2);
    }

    #[test]
    fn open_image_without_inode_records() {
        // bitmap present, inode region empty
        let mut device = MemoryDrive::new(IMAGE_SIZE, BLOCK_SIZE);
        let mut block0 = vec![0u8; BLOCK_SIZE];
        block0[0] = 0b11;
        device.write_sector(0, &block0).unwrap();

        let structure = super::Structure::open(device).unwrap();
        assert_eq!(structure.read_inode(ROOT_INODE).unwrap().map_block(0), Some(2));
    }

    #[test]
    fn grow_inode_records_partial_allocation() {
        let mut structure = super::Structure::open(MemoryDrive::new(IMAGE_SIZE, 512)).unwrap();
        let inum = structure.create_inode(0o100644).unwrap();
        while structure.free_block_count() > 1 {
            structure.allocate_block().unwrap();
        }

        assert_eq!(structure.grow_inode(inum, 2 * BLOCK_SIZE as u64), Err(Error::NoSpace));
        let inode = structure.read_inode(inum).unwrap();
        assert_eq!(inode.used_pointers(), 1);
        assert_eq!(inode.size, 0);
        assert_eq!(inode.mode, 0o100644);
    }
}
