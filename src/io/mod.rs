use std::io;

use log::debug;
use raw::{raw_read_block, raw_write_block};

use crate::consts::{BlockPointer, BLOCK_COUNT, BLOCK_SIZE, IMAGE_SIZE};
use crate::driver::DeviceDriver;

mod raw;

/// The backing image, held in memory as one buffer and written back to the
/// device block by block on `flush`.
pub struct IO<A: DeviceDriver> {
    device: A,
    image: Vec<u8>,
    dirty: Vec<bool>,
}

impl<A: DeviceDriver> IO<A> {
    pub fn new(device: A) -> io::Result<IO<A>> {
        let sector_size = device.get_sector_size();
        if sector_size == 0 || sector_size > BLOCK_SIZE || BLOCK_SIZE % sector_size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector size {} does not divide block size {}", sector_size, BLOCK_SIZE),
            ));
        }
        if device.get_size() != IMAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("device holds {} bytes, expected {}", device.get_size(), IMAGE_SIZE),
            ));
        }

        let mut image = vec![0u8; IMAGE_SIZE as usize];
        for (index, block) in image.chunks_mut(BLOCK_SIZE).enumerate() {
            raw_read_block(&device, block, index as BlockPointer)?;
        }

        Ok(IO { device, image, dirty: vec![false; BLOCK_COUNT] })
    }

    pub fn block(&self, index: BlockPointer) -> &[u8] {
        let offset = Self::block_offset(index);
        &self.image[offset..offset + BLOCK_SIZE]
    }

    pub fn block_mut(&mut self, index: BlockPointer) -> &mut [u8] {
        let offset = Self::block_offset(index);
        self.dirty[index as usize] = true;
        &mut self.image[offset..offset + BLOCK_SIZE]
    }

    pub fn zero_block(&mut self, index: BlockPointer) {
        self.block_mut(index).fill(0);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.iter().any(|dirty| *dirty)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        let mut written = 0;
        for index in 0..BLOCK_COUNT {
            if !self.dirty[index] {
                continue;
            }
            let offset = index * BLOCK_SIZE;
            raw_write_block(&mut self.device, &self.image[offset..offset + BLOCK_SIZE], index as BlockPointer)?;
            self.dirty[index] = false;
            written += 1;
        }
        self.device.sync()?;
        debug!("flushed {} dirty blocks", written);
        Ok(())
    }

    /// Flushes and hands the device back.
    pub fn close(mut self) -> io::Result<A> {
        self.flush()?;
        Ok(self.device)
    }

    #[inline]
    fn block_offset(index: BlockPointer) -> usize {
        if index >= BLOCK_COUNT as BlockPointer {
            panic!("Block index out of range - {} of {}", index, BLOCK_COUNT);
        }
        index as usize * BLOCK_SIZE
    }
}
