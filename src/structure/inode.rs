use log::trace;

use crate::consts::{BlockPointer, DirectPointers, BLOCK_SIZE, DIRECT_POINTERS, MAX_FILE_SIZE};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::blockmap::BlockMap;
use crate::util::error::{Error, Result};
use crate::util::mode::{ModeBits, ModeBitsHelper};
use crate::util::serializable::{le_u16, le_u32, ByteSerializable, KnownSize};

// block 0 is the metadata block, so it never shows up as a data pointer
pub(crate) const NULL_POINTER: BlockPointer = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub(crate) refs: u16,
    pub(crate) mode: ModeBits,
    pub(crate) size: u64,
    pub(crate) pointers: DirectPointers,
}

impl Default for Inode {
    fn default() -> Self {
        Inode::empty()
    }
}

impl Inode {
    pub fn empty() -> Inode {
        Inode { refs: 0, mode: 0, size: 0, pointers: [NULL_POINTER; DIRECT_POINTERS] }
    }

    pub fn is_free(&self) -> bool {
        self.refs == 0
    }

    pub fn is_directory(&self) -> bool {
        self.mode.is_directory()
    }

    pub fn get_size(&self) -> u64 {
        self.size
    }

    pub fn get_mode(&self) -> ModeBits {
        self.mode
    }

    pub fn get_refs(&self) -> u16 {
        self.refs
    }

    pub fn used_pointers(&self) -> usize {
        self.pointers.iter().filter(|pointer| **pointer != NULL_POINTER).count()
    }

    pub fn map_block(&self, logical_index: usize) -> Option<BlockPointer> {
        match self.pointers.get(logical_index) {
            Some(&pointer) if pointer != NULL_POINTER => Some(pointer),
            _ => None,
        }
    }

    pub(crate) fn set_pointer(&mut self, logical_index: usize, pointer: BlockPointer) {
        self.pointers[logical_index] = pointer;
    }

    /// Allocates every missing block below the new size. Blocks obtained before
    /// a `NoSpace` stay attached to the inode; the size only changes on success.
    /// A smaller `new_size` leaves the inode untouched.
    pub fn grow<A: DeviceDriver>(&mut self, io: &mut IO<A>, block_map: &BlockMap, new_size: u64) -> Result<()> {
        if new_size > MAX_FILE_SIZE {
            return Err(Error::FileTooLarge);
        }
        if new_size <= self.size {
            return Ok(());
        }

        for i in 0..Inode::blocks_for(new_size) {
            if self.pointers[i] == NULL_POINTER {
                self.pointers[i] = block_map.allocate(io)?;
            }
        }

        self.clear_tail(io, new_size);
        trace!("grow {} -> {} bytes, blocks {:?}", self.size, new_size, self.pointers);
        self.size = new_size;
        Ok(())
    }

    pub fn shrink<A: DeviceDriver>(&mut self, io: &mut IO<A>, block_map: &BlockMap, new_size: u64) {
        for i in Inode::blocks_for(new_size)..DIRECT_POINTERS {
            if self.pointers[i] != NULL_POINTER {
                block_map.release(io, self.pointers[i]);
                self.pointers[i] = NULL_POINTER;
            }
        }
        trace!("shrink {} -> {} bytes, blocks {:?}", self.size, new_size, self.pointers);
        self.size = new_size;
    }

    pub fn release_blocks<A: DeviceDriver>(&mut self, io: &mut IO<A>, block_map: &BlockMap) {
        self.shrink(io, block_map, 0);
    }

    // zero whatever a previous shrink left behind in the old last block
    fn clear_tail<A: DeviceDriver>(&self, io: &mut IO<A>, new_size: u64) {
        let offset = (self.size % BLOCK_SIZE as u64) as usize;
        if offset == 0 {
            return;
        }
        let logical_index = (self.size / BLOCK_SIZE as u64) as usize;
        if let Some(pointer) = self.map_block(logical_index) {
            let block_start = logical_index as u64 * BLOCK_SIZE as u64;
            let limit = (new_size - block_start).min(BLOCK_SIZE as u64) as usize;
            io.block_mut(pointer)[offset..limit].fill(0);
        }
    }

    #[inline]
    pub(crate) fn blocks_for(size: u64) -> usize {
        ((size + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64) as usize
    }
}

impl KnownSize for Inode {
    fn size_on_disk() -> usize {
        2 + 2 + 4 + DIRECT_POINTERS
    }
}

impl ByteSerializable for Inode {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::<u8>::with_capacity(Inode::size_on_disk());
        bytes.extend_from_slice(&self.refs.to_le_bytes());
        bytes.extend_from_slice(&(self.mode as u16).to_le_bytes());
        bytes.extend_from_slice(&(self.size as u32).to_le_bytes());
        for pointer in self.pointers {
            bytes.push(pointer as u8);
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let refs = le_u16(bytes, 0);
        let mode = le_u16(bytes, 2) as ModeBits;
        let size = le_u32(bytes, 4) as u64;
        let mut pointers = [NULL_POINTER; DIRECT_POINTERS];
        for (i, pointer) in pointers.iter_mut().enumerate() {
            *pointer = bytes[8 + i] as BlockPointer;
        }
        Inode { refs, mode, size, pointers }
    }
}
