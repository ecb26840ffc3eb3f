use std::io;

use log::trace;

use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;

pub(crate) fn raw_write_block<A: DeviceDriver>(drive: &mut A, data: &[u8], index: BlockPointer) -> io::Result<()> {
    let sector_size = drive.get_sector_size();
    if data.len() == sector_size {
        return drive.write_sector(index, data);
    }

    let ratio = (data.len() / sector_size) as u64;
    let start = index * ratio;
    for (i, sector) in data.chunks(sector_size).enumerate() {
        trace!("writing sector {} of block {}", start + i as u64, index);
        drive.write_sector(start + i as u64, sector)?;
    }
    Ok(())
}

pub(crate) fn raw_read_block<A: DeviceDriver>(drive: &A, buffer: &mut [u8], index: BlockPointer) -> io::Result<()> {
    let sector_size = drive.get_sector_size();
    if buffer.len() == sector_size {
        buffer.copy_from_slice(&drive.read_sector(index)?);
        return Ok(());
    }

    let ratio = (buffer.len() / sector_size) as u64;
    let start = index * ratio;
    for (i, sector) in buffer.chunks_mut(sector_size).enumerate() {
        sector.copy_from_slice(&drive.read_sector(start + i as u64)?);
    }
    Ok(())
}
