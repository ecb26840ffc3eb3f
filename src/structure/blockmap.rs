use log::{trace, warn};

use crate::consts::{BlockPointer, BLOCK_BITMAP_SIZE, BLOCK_COUNT};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::{Error, Result};

const BITMAP_BLOCK: BlockPointer = 0;

/// Block usage bitmap stored in the first bytes of block 0. Bit 0 covers the
/// metadata block itself and is never handed out.
pub struct BlockMap {
    block_count: u64,
}

impl Default for BlockMap {
    fn default() -> Self {
        BlockMap::new()
    }
}

impl BlockMap {
    pub fn new() -> BlockMap {
        BlockMap { block_count: BLOCK_COUNT as u64 }
    }

    pub fn format<A: DeviceDriver>(&self, io: &mut IO<A>) {
        io.zero_block(BITMAP_BLOCK);
        self.mark_used(io, BITMAP_BLOCK);
    }

    pub fn is_formatted<A: DeviceDriver>(&self, io: &IO<A>) -> bool {
        self.is_used(io, BITMAP_BLOCK)
    }

    pub fn allocate<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<BlockPointer> {
        for index in 1..self.block_count {
            if self.is_free(io, index) {
                self.mark_used(io, index);
                io.zero_block(index);
                trace!("alloc_block() -> {}", index);
                return Ok(index);
            }
        }
        Err(Error::NoSpace)
    }

    /// Clears the bit only; the block keeps its bytes until it is handed out again.
    pub fn release<A: DeviceDriver>(&self, io: &mut IO<A>, index: BlockPointer) {
        if index == BITMAP_BLOCK {
            warn!("refusing to release the metadata block");
            return;
        }
        trace!("free_block({})", index);
        self.mark_free(io, index);
    }

    pub fn free_count<A: DeviceDriver>(&self, io: &IO<A>) -> u64 {
        (0..self.block_count).filter(|index| self.is_free(io, *index)).count() as u64
    }

    pub fn is_free<A: DeviceDriver>(&self, io: &IO<A>, index: BlockPointer) -> bool {
        Self::bitmap(io)[(index / 8) as usize] & (1 << (index % 8)) == 0
    }

    pub fn is_used<A: DeviceDriver>(&self, io: &IO<A>, index: BlockPointer) -> bool {
        !self.is_free(io, index)
    }

    fn mark_used<A: DeviceDriver>(&self, io: &mut IO<A>, index: BlockPointer) {
        let byte_index = (index / 8) as usize;
        let bit_index = (index % 8) as usize;
        Self::bitmap_mut(io)[byte_index] |= 1 << bit_index;
    }

    fn mark_free<A: DeviceDriver>(&self, io: &mut IO<A>, index: BlockPointer) {
        let byte_index = (index / 8) as usize;
        let bit_index = (index % 8) as usize;
        Self::bitmap_mut(io)[byte_index] &= !(1 << bit_index);
    }

    fn bitmap<A: DeviceDriver>(io: &IO<A>) -> &[u8] {
        &io.block(BITMAP_BLOCK)[..BLOCK_BITMAP_SIZE]
    }

    fn bitmap_mut<A: DeviceDriver>(io: &mut IO<A>) -> &mut [u8] {
        &mut io.block_mut(BITMAP_BLOCK)[..BLOCK_BITMAP_SIZE]
    }
}
