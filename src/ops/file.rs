use log::{trace, warn};

use crate::consts::{InodePointer, BLOCK_SIZE, MAX_FILE_SIZE};
use crate::driver::DeviceDriver;
use crate::structure::Structure;
use crate::util::error::{Error, Result};

/// Byte-range access to a regular file through its direct blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct File {
    pub inode: InodePointer,
}

impl File {
    pub fn from_inode(inode: InodePointer) -> File {
        File { inode }
    }

    /// Reads up to `length` bytes at `offset`. Stops early, without error, at
    /// the first unmapped block.
    pub fn read<A: DeviceDriver>(&self, structure: &Structure<A>, offset: u64, length: usize) -> Result<Vec<u8>> {
        let inode = structure.read_inode(self.inode)?;
        if inode.is_directory() {
            return Err(Error::IsDirectory);
        }
        if offset >= inode.size {
            return Ok(Vec::new());
        }

        let mut remaining = (length as u64).min(inode.size - offset) as usize;
        let mut position = offset;
        let mut data = Vec::with_capacity(remaining);

        while remaining > 0 {
            let block_index = (position / BLOCK_SIZE as u64) as usize;
            let block_offset = (position % BLOCK_SIZE as u64) as usize;
            let block = match inode.map_block(block_index) {
                Some(block) => block,
                None => break,
            };

            let chunk = remaining.min(BLOCK_SIZE - block_offset);
            data.extend_from_slice(&structure.io.block(block)[block_offset..block_offset + chunk]);
            position += chunk as u64;
            remaining -= chunk;
        }

        Ok(data)
    }

    /// Writes `data` at `offset`, growing the file first when needed. Returns
    /// the number of bytes written, which is short when a block could not be
    /// allocated part way through.
    pub fn write<A: DeviceDriver>(&self, structure: &mut Structure<A>, offset: u64, data: &[u8]) -> Result<usize> {
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MAX_FILE_SIZE)
            .ok_or(Error::FileTooLarge)?;
        if structure.read_inode(self.inode)?.is_directory() {
            return Err(Error::IsDirectory);
        }
        if data.is_empty() {
            return Ok(0);
        }

        if end > structure.read_inode(self.inode)?.size {
            structure.grow_inode(self.inode, end)?;
        }

        let mut inode = structure.read_inode(self.inode)?;
        let mut written = 0;
        while written < data.len() {
            let position = offset + written as u64;
            let block_index = (position / BLOCK_SIZE as u64) as usize;
            let block_offset = (position % BLOCK_SIZE as u64) as usize;
            let block = match inode.map_block(block_index) {
                Some(block) => block,
                None => match structure.allocate_block() {
                    Ok(block) => {
                        inode.set_pointer(block_index, block);
                        block
                    }
                    Err(e) => {
                        warn!("inode {}: short write at {} ({})", self.inode, position, e);
                        break;
                    }
                },
            };

            let chunk = (data.len() - written).min(BLOCK_SIZE - block_offset);
            structure.io.block_mut(block)[block_offset..block_offset + chunk]
                .copy_from_slice(&data[written..written + chunk]);
            written += chunk;
        }

        inode.size = inode.size.max(offset + written as u64);
        structure.write_inode(self.inode, inode)?;
        trace!("inode {}: wrote {} bytes at {}", self.inode, written, offset);
        Ok(written)
    }

    pub fn truncate<A: DeviceDriver>(&self, structure: &mut Structure<A>, size: u64) -> Result<()> {
        let inode = structure.read_inode(self.inode)?;
        if inode.is_directory() {
            return Err(Error::IsDirectory);
        }
        if size > MAX_FILE_SIZE {
            return Err(Error::FileTooLarge);
        }

        if size > inode.size {
            structure.grow_inode(self.inode, size)
        } else {
            structure.shrink_inode(self.inode, size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::File;
    use crate::consts::{BLOCK_SIZE, IMAGE_SIZE, MAX_FILE_SIZE, ROOT_INODE};
    use crate::driver::memory_drive::MemoryDrive;
    use crate::structure::Structure;
    use crate::util::error::Error;

    fn structure_with_file() -> (Structure<MemoryDrive>, File) {
        let mut structure = Structure::open(MemoryDrive::new(IMAGE_SIZE, 512)).unwrap();
        let inum = structure.create_inode(0o100644).unwrap();
        (structure, File::from_inode(inum))
    }

    fn pattern(length: usize) -> Vec<u8> {
        (0..length).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn read_write_data() {
        let (mut structure, file) = structure_with_file();
        let data = pattern(5000);
        assert_eq!(file.write(&mut structure, 0, &data), Ok(5000));

        let inode = structure.read_inode(file.inode).unwrap();
        assert_eq!(inode.size, 5000);
        assert_eq!(inode.used_pointers(), 2);
        assert_eq!(file.read(&structure, 0, 5000).unwrap(), data);
    }

    #[test]
    fn write_across_block_boundary() {
        let (mut structure, file) = structure_with_file();
        let data = pattern(300);
        let offset = BLOCK_SIZE as u64 - 100;
        assert_eq!(file.write(&mut structure, offset, &data), Ok(300));
        assert_eq!(file.read(&structure, offset, 300).unwrap(), data);
        // the gap before the offset reads back as zeroes
        assert_eq!(file.read(&structure, 0, 10).unwrap(), vec![0; 10]);
    }

    #[test]
    fn overwrite_keeps_size() {
        let (mut structure, file) = structure_with_file();
        file.write(&mut structure, 0, &pattern(1000)).unwrap();
        file.write(&mut structure, 10, b"hello").unwrap();
        assert_eq!(structure.read_inode(file.inode).unwrap().size, 1000);
        assert_eq!(file.read(&structure, 8, 9).unwrap(), vec![8, 9, b'h', b'e', b'l', b'l', b'o', 15, 16]);
    }

    #[test]
    fn read_is_clamped() {
        let (mut structure, file) = structure_with_file();
        file.write(&mut structure, 0, &pattern(100)).unwrap();
        assert_eq!(file.read(&structure, 90, 50).unwrap(), pattern(100)[90..].to_vec());
        assert_eq!(file.read(&structure, 100, 10).unwrap(), Vec::<u8>::new());
        assert_eq!(file.read(&structure, 5000, 10).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn read_stops_at_unmapped_block() {
        let (mut structure, file) = structure_with_file();
        let mut inode = structure.read_inode(file.inode).unwrap();
        let block = structure.allocate_block().unwrap();
        structure.io.block_mut(block).fill(7);
        inode.set_pointer(0, block);
        inode.size = 2 * BLOCK_SIZE as u64;
        structure.write_inode(file.inode, inode).unwrap();

        assert_eq!(file.read(&structure, 0, 2 * BLOCK_SIZE).unwrap(), vec![7; BLOCK_SIZE]);
    }

    #[test]
    fn write_too_large() {
        let (mut structure, file) = structure_with_file();
        assert_eq!(file.write(&mut structure, MAX_FILE_SIZE - 1, &[1, 2]), Err(Error::FileTooLarge));
        assert_eq!(file.write(&mut structure, MAX_FILE_SIZE - 1, &[1]), Ok(1));
        assert_eq!(structure.read_inode(file.inode).unwrap().used_pointers(), 4);
    }

    #[test]
    fn write_without_space() {
        let (mut structure, file) = structure_with_file();
        while structure.free_block_count() > 1 {
            structure.allocate_block().unwrap();
        }
        assert_eq!(file.write(&mut structure, 0, &pattern(2 * BLOCK_SIZE)), Err(Error::NoSpace));
        let inode = structure.read_inode(file.inode).unwrap();
        assert_eq!(inode.used_pointers(), 1);
        assert_eq!(inode.size, 0);
    }

    #[test]
    fn truncate() {
        let (mut structure, file) = structure_with_file();
        file.write(&mut structure, 0, &pattern(3 * BLOCK_SIZE)).unwrap();
        file.truncate(&mut structure, 10).unwrap();
        let inode = structure.read_inode(file.inode).unwrap();
        assert_eq!((inode.size, inode.used_pointers()), (10, 1));

        file.truncate(&mut structure, 20).unwrap();
        assert_eq!(file.read(&structure, 0, 20).unwrap()[10..], [0; 10]);
        assert_eq!(file.truncate(&mut structure, MAX_FILE_SIZE + 1), Err(Error::FileTooLarge));
    }

    #[test]
    fn directories_are_not_files() {
        let (mut structure, _) = structure_with_file();
        let root = File::from_inode(ROOT_INODE);
        assert_eq!(root.read(&structure, 0, 1), Err(Error::IsDirectory));
        assert_eq!(root.write(&mut structure, 0, b"x"), Err(Error::IsDirectory));
        assert_eq!(root.truncate(&mut structure, 0), Err(Error::IsDirectory));
    }

    #[test]
    fn write_offset_overflow() {
        let (mut structure, file) = structure_with_file();
        assert_eq!(file.write(&mut structure, u64::MAX, b"x"), Err(Error::FileTooLarge));
        assert_eq!(file.write(&mut structure, u64::MAX - 1, &[1, 2, 3]), Err(Error::FileTooLarge));
        assert_eq!(structure.read_inode(file.inode).unwrap().size, 0);
    }

    #[test]
    fn short_write_on_unmapped_block() {
        let (mut structure, file) = structure_with_file();
        // size already covers two blocks, neither is mapped
        let mut inode = structure.read_inode(file.inode).unwrap();
        inode.size = 2 * BLOCK_SIZE as u64;
        structure.write_inode(file.inode, inode).unwrap();
        while structure.free_block_count() > 1 {
            structure.allocate_block().unwrap();
        }

        assert_eq!(file.write(&mut structure, 0, &[1; 2 * BLOCK_SIZE]), Ok(BLOCK_SIZE));
        let inode = structure.read_inode(file.inode).unwrap();
        assert_eq!(inode.size, 2 * BLOCK_SIZE as u64);
        assert_eq!(inode.used_pointers(), 1);
        assert_eq!(structure.io.block(inode.map_block(0).unwrap()), vec![1; BLOCK_SIZE].as_slice());
        assert_eq!(file.read(&structure, 0, 2 * BLOCK_SIZE).unwrap(), vec![1; BLOCK_SIZE]);
    }
}
