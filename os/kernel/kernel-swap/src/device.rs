//! Sector-addressed storage behind the paging file.

use kernel_info::memory::SECTOR_SIZE;

/// One disk sector.
pub type Sector = [u8; SECTOR_SIZE as usize];

/// Failures reported by a [`BlockDevice`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("sector {0} is beyond the end of the device")]
    OutOfRange(u32),
    #[error("device I/O failed")]
    Io,
}

/// A disk that transfers whole sectors.
///
/// Transfers are synchronous: the call returns once the data has moved.
pub trait BlockDevice {
    /// Number of addressable sectors.
    fn sector_count(&self) -> u32;

    /// Read sector `lba` into `buf`.
    ///
    /// # Errors
    /// [`DeviceError::OutOfRange`] past the end of the device, or a device
    /// specific failure.
    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> Result<(), DeviceError>;

    /// Write `buf` to sector `lba`.
    ///
    /// # Errors
    /// As for [`read_sector`](Self::read_sector).
    fn write_sector(&mut self, lba: u32, buf: &Sector) -> Result<(), DeviceError>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn sector_count(&self) -> u32 {
        (**self).sector_count()
    }

    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> Result<(), DeviceError> {
        (**self).read_sector(lba, buf)
    }

    fn write_sector(&mut self, lba: u32, buf: &Sector) -> Result<(), DeviceError> {
        (**self).write_sector(lba, buf)
    }
}

/// A RAM disk.
pub struct MemoryBlockDevice {
    sectors: alloc::vec::Vec<Sector>,
}

impl MemoryBlockDevice {
    /// A zeroed disk of `sectors` sectors.
    #[must_use]
    pub fn new(sectors: u32) -> Self {
        Self {
            sectors: alloc::vec![[0; SECTOR_SIZE as usize]; sectors as usize],
        }
    }

    /// The raw contents of sector `lba`.
    #[must_use]
    pub fn sector(&self, lba: u32) -> Option<&Sector> {
        self.sectors.get(lba as usize)
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn sector_count(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let n = self.sectors.len() as u32;
        n
    }

    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> Result<(), DeviceError> {
        let sector = self.sectors.get(lba as usize).ok_or(DeviceError::OutOfRange(lba))?;
        buf.copy_from_slice(sector);
        Ok(())
    }

    fn write_sector(&mut self, lba: u32, buf: &Sector) -> Result<(), DeviceError> {
        let sector = self
            .sectors
            .get_mut(lba as usize)
            .ok_or(DeviceError::OutOfRange(lba))?;
        sector.copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sectors_round_trip() {
        let mut disk = MemoryBlockDevice::new(4);
        let mut data = [0u8; 512];
        data[0] = 7;
        data[511] = 9;
        disk.write_sector(3, &data).unwrap();
        let mut back = [0u8; 512];
        disk.read_sector(3, &mut back).unwrap();
        assert_eq!(back, data);
        assert_eq!(disk.sector(2), Some(&[0u8; 512]));
    }

    #[test]
    fn out_of_range() {
        let mut disk = MemoryBlockDevice::new(2);
        let mut buf = [0u8; 512];
        assert_eq!(disk.read_sector(2, &mut buf), Err(DeviceError::OutOfRange(2)));
        assert_eq!(disk.write_sector(9, &buf), Err(DeviceError::OutOfRange(9)));
    }
}
