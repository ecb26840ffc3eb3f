use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::driver::DeviceDriver;

/// A drive backed by a regular image file of fixed length.
pub struct FileDrive {
    file: File,
    bytes: u64,
    sector_size: usize,
    created: bool,
}

impl FileDrive {
    /// Opens the image at `path`, creating and sizing it when it does not exist
    /// yet (or is empty). An existing image of any other length is rejected.
    pub fn open<P: AsRef<Path>>(path: P, bytes: u64, sector_size: usize) -> io::Result<FileDrive> {
        if sector_size == 0 || bytes % sector_size as u64 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("image size {} is not a multiple of sector size {}", bytes, sector_size),
            ));
        }

        let file = OpenOptions::new().read(true).write(true).create(true).open(path.as_ref())?;
        let length = file.metadata()?.len();
        let created = length == 0;

        if created {
            file.set_len(bytes)?;
        } else if length != bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is {} bytes, expected {}", path.as_ref().display(), length, bytes),
            ));
        }

        Ok(FileDrive { file, bytes, sector_size, created })
    }

    /// Whether `open` had to create the image.
    pub fn is_new(&self) -> bool {
        self.created
    }
}

impl DeviceDriver for FileDrive {
    fn get_sector_count(&self) -> u64 {
        self.bytes / self.sector_size as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64) -> io::Result<Vec<u8>> {
        if index >= self.get_sector_count() {
            panic!("Sector index out of range - {} of {}", index, self.get_sector_count());
        }
        let mut buffer = vec![0; self.sector_size];
        self.file.read_exact_at(&mut buffer, index * self.sector_size as u64)?;
        Ok(buffer)
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        if data.len() != self.sector_size {
            panic!("Sector size mismatch - expected {}, got {}", self.sector_size, data.len());
        }
        if index >= self.get_sector_count() {
            panic!("Sector index out of range - {} of {}", index, self.get_sector_count());
        }
        self.file.write_all_at(data, index * self.sector_size as u64)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}

#[cfg(test)]
pub(crate) fn scratch_image(name: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("flatfs-{}-{}.img", std::process::id(), name));
    let _ = std::fs::remove_file(&path);
    path
}
