use std::io;

use crate::driver::DeviceDriver;

/// A zero-filled drive held entirely in RAM. Nothing survives a drop.
pub struct MemoryDrive {
    data: Vec<u8>,
    sector_size: usize,
}

impl MemoryDrive {
    pub fn new(bytes: u64, sector_size: usize) -> MemoryDrive {
        MemoryDrive { data: vec![0; bytes as usize], sector_size }
    }
}

impl DeviceDriver for MemoryDrive {
    fn get_sector_count(&self) -> u64 {
        (self.data.len() / self.sector_size) as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64) -> io::Result<Vec<u8>> {
        let offset = index as usize * self.sector_size;
        Ok(self.data[offset..offset + self.sector_size].to_vec())
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        if data.len() != self.sector_size {
            panic!("Sector size mismatch - expected {}, got {}", self.sector_size, data.len());
        }
        let offset = index as usize * self.sector_size;
        self.data[offset..offset + self.sector_size].copy_from_slice(data);
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}
