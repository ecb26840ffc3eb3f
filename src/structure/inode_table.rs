use log::trace;

use crate::consts::{InodePointer, INODE_TABLE_OFFSET, MAX_INODES};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::blockmap::BlockMap;
use crate::structure::inode::Inode;
use crate::util::error::{Error, Result};
use crate::util::serializable::{ByteSerializable, KnownSize};

const TABLE_BLOCK: u64 = 0;

/// Fixed-size inode table. Records live in block 0 right after the two bitmaps
/// and are kept in memory as well; every write goes through to the image.
pub struct InodeTable {
    inodes: Vec<Inode>,
}

impl InodeTable {
    pub fn read<A: DeviceDriver>(io: &IO<A>) -> InodeTable {
        let block = io.block(TABLE_BLOCK);
        let inodes = (0..MAX_INODES as InodePointer)
            .map(|inum| {
                let offset = Self::record_offset(inum);
                Inode::from_bytes(&block[offset..offset + Inode::size_on_disk()])
            })
            .collect();
        InodeTable { inodes }
    }

    pub fn get(&self, inum: InodePointer) -> Result<Inode> {
        self.inodes.get(inum as usize).copied().ok_or(Error::InvalidHandle)
    }

    pub fn write_inode<A: DeviceDriver>(&mut self, io: &mut IO<A>, inum: InodePointer, inode: Inode) -> Result<()> {
        let slot = self.inodes.get_mut(inum as usize).ok_or(Error::InvalidHandle)?;
        *slot = inode;

        let offset = Self::record_offset(inum);
        io.block_mut(TABLE_BLOCK)[offset..offset + Inode::size_on_disk()].copy_from_slice(&inode.to_bytes());
        Ok(())
    }

    pub fn allocate<A: DeviceDriver>(&mut self, io: &mut IO<A>) -> Result<InodePointer> {
        let inum = self.inodes.iter().position(Inode::is_free).ok_or(Error::NoSpace)? as InodePointer;
        self.write_inode(io, inum, Inode { refs: 1, ..Inode::empty() })?;
        trace!("alloc_inode() -> {}", inum);
        Ok(inum)
    }

    pub fn free<A: DeviceDriver>(&mut self, io: &mut IO<A>, block_map: &BlockMap, inum: InodePointer) -> Result<()> {
        let mut inode = self.get(inum)?;
        inode.release_blocks(io, block_map);
        trace!("free_inode({})", inum);
        self.write_inode(io, inum, Inode::empty())
    }

    pub fn free_count(&self) -> u64 {
        self.inodes.iter().filter(|inode| inode.is_free()).count() as u64
    }

    #[cfg(test)]
    pub(crate) fn live(&self) -> impl Iterator<Item = (InodePointer, &Inode)> {
        self.inodes
            .iter()
            .enumerate()
            .filter(|(_, inode)| !inode.is_free())
            .map(|(inum, inode)| (inum as InodePointer, inode))
    }

    #[inline]
    fn record_offset(inum: InodePointer) -> usize {
        INODE_TABLE_OFFSET + inum as usize * Inode::size_on_disk()
    }
}

#[cfg(test)]
mod tests {
    use crate::consts::{BLOCK_SIZE, IMAGE_SIZE, INODE_TABLE_OFFSET, MAX_INODES};
    use crate::driver::memory_drive::MemoryDrive;
    use crate::io::IO;
    use crate::structure::blockmap::BlockMap;
    use crate::structure::inode::Inode;
    use crate::util::error::Error;
    use crate::util::serializable::KnownSize;

    fn formatted() -> (BlockMap, IO<MemoryDrive>) {
        let mut io = IO::new(MemoryDrive::new(IMAGE_SIZE, 512)).unwrap();
        let block_map = BlockMap::new();
        block_map.format(&mut io);
        (block_map, io)
    }

    #[test]
    fn table_fits_metadata_block() {
        assert!(INODE_TABLE_OFFSET + MAX_INODES * Inode::size_on_disk() <= BLOCK_SIZE);
    }

    #[test]
    fn get_out_of_range() {
        let (_, io) = formatted();
        let table = super::InodeTable::read(&io);
        assert_eq!(table.get(MAX_INODES as u64), Err(Error::InvalidHandle));
        assert!(table.get(0).unwrap().is_free());
    }

    #[test]
    fn allocate_first_free() {
        let (_, mut io) = formatted();
        let mut table = super::InodeTable::read(&io);
        assert_eq!(table.allocate(&mut io), Ok(0));
        assert_eq!(table.allocate(&mut io), Ok(1));
        let inode = table.get(1).unwrap();
        assert_eq!(inode.refs, 1);
        assert_eq!(inode.mode, 0);
        assert_eq!(inode.used_pointers(), 0);
    }

    #[test]
    fn allocate_until_full() {
        let (_, mut io) = formatted();
        let mut table = super::InodeTable::read(&io);
        for _ in 0..MAX_INODES {
            table.allocate(&mut io).unwrap();
        }
        assert_eq!(table.allocate(&mut io), Err(Error::NoSpace));
        assert_eq!(table.free_count(), 0);
    }

    #[test]
    fn free_releases_blocks() {
        let (block_map, mut io) = formatted();
        let mut table = super::InodeTable::read(&io);
        let inum = table.allocate(&mut io).unwrap();
        let mut inode = table.get(inum).unwrap();
        inode.mode = 0o100644;
        inode.grow(&mut io, &block_map, 3 * BLOCK_SIZE as u64).unwrap();
        table.write_inode(&mut io, inum, inode).unwrap();

        table.free(&mut io, &block_map, inum).unwrap();
        assert_eq!(table.get(inum).unwrap(), Inode::empty());
        for block in 1..4 {
            assert!(block_map.is_free(&io, block));
        }
        assert_eq!(table.allocate(&mut io), Ok(inum));
    }

    #[test]
    fn read_write_inode() {
        let (block_map, mut io) = formatted();
        let mut table = super::InodeTable::read(&io);
        let inum = table.allocate(&mut io).unwrap();
        let mut inode = table.get(inum).unwrap();
        inode.mode = 0o40755;
        inode.grow(&mut io, &block_map, 64).unwrap();
        table.write_inode(&mut io, inum, inode).unwrap();

        let reread = super::InodeTable::read(&io);
        assert_eq!(reread.get(inum).unwrap(), inode);
        assert_eq!(reread.live().count(), 1);
        // the reserved inode bitmap region is left alone
        assert_eq!(&io.block(0)[32..64], &[0u8; 32]);
    }
}
