use log::trace;

use crate::consts::{BlockPointer, InodePointer, BLOCK_SIZE, FILE_NAME_FIELD};
use crate::driver::DeviceDriver;
use crate::structure::Structure;
use crate::util::error::{Error, Result};
use crate::util::serializable::{le_i32, ByteSerializable, KnownSize};

const ENTRY_RESERVED: usize = 12;
pub const ENTRY_SIZE: usize = FILE_NAME_FIELD + 4 + ENTRY_RESERVED;
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / ENTRY_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub id: InodePointer,
}

pub type EntryList = Vec<Entry>;

impl KnownSize for Entry {
    fn size_on_disk() -> usize {
        ENTRY_SIZE
    }
}

impl ByteSerializable for Entry {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; ENTRY_SIZE];
        let name = self.name.as_bytes();
        let length = name.len().min(FILE_NAME_FIELD - 1);
        bytes[..length].copy_from_slice(&name[..length]);
        bytes[FILE_NAME_FIELD..FILE_NAME_FIELD + 4].copy_from_slice(&(self.id as i32).to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let name = String::from_utf8_lossy(entry_name(bytes)).into_owned();
        let id = le_i32(bytes, FILE_NAME_FIELD);
        Entry { name, id: id as InodePointer }
    }
}

#[inline]
fn entry_name(record: &[u8]) -> &[u8] {
    let field = &record[..FILE_NAME_FIELD];
    match field.iter().position(|byte| *byte == 0) {
        Some(end) => &field[..end],
        None => field,
    }
}

/// A flat directory: every entry sits in the first data block of the
/// directory inode, so one directory holds at most `ENTRIES_PER_BLOCK` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directory {
    pub inode: InodePointer,
}

impl Directory {
    pub fn from_inode(inode: InodePointer) -> Directory {
        Directory { inode }
    }

    pub fn lookup<A: DeviceDriver>(&self, structure: &Structure<A>, name: &str) -> Result<InodePointer> {
        let (block, count) = match self.entries_block(structure)? {
            Some(found) => found,
            None => return Err(Error::NotFound),
        };
        let data = structure.io.block(block);
        Self::position(data, count, name)
            .map(|index| Entry::from_bytes(&data[index * ENTRY_SIZE..(index + 1) * ENTRY_SIZE]).id)
            .ok_or(Error::NotFound)
    }

    pub fn insert<A: DeviceDriver>(&self, structure: &mut Structure<A>, name: &str, id: InodePointer) -> Result<()> {
        if name.len() >= FILE_NAME_FIELD {
            return Err(Error::NameTooLong);
        }
        // the on-disk name ends at the first NUL
        if name.contains('\0') {
            return Err(Error::InvalidName);
        }

        let mut inode = structure.read_inode(self.inode)?;
        if !inode.is_directory() {
            return Err(Error::NotDirectory);
        }
        let block = match inode.map_block(0) {
            Some(block) => block,
            None => {
                let block = structure.allocate_block()?;
                inode.set_pointer(0, block);
                inode.size = 0;
                structure.write_inode(self.inode, inode)?;
                block
            }
        };

        let count = inode.size as usize / ENTRY_SIZE;
        if Self::position(structure.io.block(block), count, name).is_some() {
            return Err(Error::AlreadyExists);
        }
        if (count + 1) * ENTRY_SIZE > BLOCK_SIZE {
            return Err(Error::NoSpace);
        }

        let offset = count * ENTRY_SIZE;
        let entry = Entry { name: name.to_string(), id };
        structure.io.block_mut(block)[offset..offset + ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
        inode.size += ENTRY_SIZE as u64;
        trace!("directory {}: put {} -> {}", self.inode, name, id);
        structure.write_inode(self.inode, inode)
    }

    /// Removes `name` and closes the gap, keeping the remaining entries in order.
    pub fn delete<A: DeviceDriver>(&self, structure: &mut Structure<A>, name: &str) -> Result<()> {
        let (block, count) = match self.entries_block(structure)? {
            Some(found) => found,
            None => return Err(Error::NotFound),
        };
        let index = Self::position(structure.io.block(block), count, name).ok_or(Error::NotFound)?;

        let data = structure.io.block_mut(block);
        data.copy_within((index + 1) * ENTRY_SIZE..count * ENTRY_SIZE, index * ENTRY_SIZE);
        data[(count - 1) * ENTRY_SIZE..count * ENTRY_SIZE].fill(0);

        let mut inode = structure.read_inode(self.inode)?;
        inode.size -= ENTRY_SIZE as u64;
        trace!("directory {}: delete {}", self.inode, name);
        structure.write_inode(self.inode, inode)
    }

    /// Snapshot of the current entries; later changes to the directory do not show up in it.
    pub fn list<A: DeviceDriver>(&self, structure: &Structure<A>) -> Result<EntryList> {
        let (block, count) = match self.entries_block(structure)? {
            Some(found) => found,
            None => return Ok(EntryList::new()),
        };
        let data = structure.io.block(block);
        Ok(data[..count * ENTRY_SIZE].chunks(ENTRY_SIZE).map(Entry::from_bytes).collect())
    }

    fn entries_block<A: DeviceDriver>(&self, structure: &Structure<A>) -> Result<Option<(BlockPointer, usize)>> {
        let inode = structure.read_inode(self.inode)?;
        if !inode.is_directory() {
            return Err(Error::NotDirectory);
        }
        let count = (inode.size as usize / ENTRY_SIZE).min(ENTRIES_PER_BLOCK);
        Ok(inode.map_block(0).map(|block| (block, count)))
    }

    fn position(data: &[u8], count: usize, name: &str) -> Option<usize> {
        if name.contains('\0') {
            return None;
        }
        data[..count * ENTRY_SIZE]
            .chunks(ENTRY_SIZE)
            .position(|record| entry_name(record) == name.as_bytes())
    }
}
