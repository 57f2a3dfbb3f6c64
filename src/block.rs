//! The block-device abstraction every other module is built on.
//!
//! This is the only point of contact between this crate and whatever is
//! actually storing the bytes. A host binds a concrete [`BlockDevice`] and
//! hands it to [`crate::fs::FileSystem::format`]/[`crate::fs::FileSystem::mount`];
//! everything above this module talks only in sector numbers. The trait
//! returns [`FsError`] directly (rather than an associated error type) so a
//! `Box<dyn BlockDevice>` can live inside the file system's shared state.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use crate::error::FsError;
use crate::params::SECTOR_SIZE;

/// A single on-disk sector.
pub type Sector = [u8; SECTOR_SIZE];

/// Something that can read and write fixed-size sectors by index.
///
/// Implementors are not expected to do their own caching or locking: every
/// call arrives already serialized behind the file system's single lock.
pub trait BlockDevice: Send {
    /// Total number of sectors available on the device.
    fn sector_count(&self) -> u32;

    fn read(&self, sector: u32, buf: &mut Sector) -> Result<(), FsError>;

    fn write(&self, sector: u32, buf: &Sector) -> Result<(), FsError>;
}

/// An in-memory block device, for tests and for hosts that want a scratch
/// disk image they can throw away.
pub struct MemBlockDevice {
    sectors: Mutex<Vec<Sector>>,
}

impl MemBlockDevice {
    /// Creates a zero-filled device with room for `sector_count` sectors.
    pub fn new(sector_count: u32) -> Self {
        Self {
            sectors: Mutex::new(vec![[0u8; SECTOR_SIZE]; sector_count as usize]),
        }
    }
}

impl BlockDevice for MemBlockDevice {
    fn sector_count(&self) -> u32 {
        self.sectors.lock().unwrap().len() as u32
    }

    fn read(&self, sector: u32, buf: &mut Sector) -> Result<(), FsError> {
        let sectors = self.sectors.lock().unwrap();
        buf.copy_from_slice(&sectors[sector as usize]);
        Ok(())
    }

    fn write(&self, sector: u32, buf: &Sector) -> Result<(), FsError> {
        let mut sectors = self.sectors.lock().unwrap();
        sectors[sector as usize].copy_from_slice(buf);
        Ok(())
    }
}

/// A block device backed by a regular file, for hosts that want their disk
/// image to survive a restart.
pub struct FileBlockDevice {
    file: Mutex<File>,
    sector_count: u32,
}

impl FileBlockDevice {
    /// Opens `file` as a device of `sector_count` sectors, growing it with
    /// zero-filled sectors if it is shorter than that.
    pub fn new(mut file: File, sector_count: u32) -> std::io::Result<Self> {
        let want_len = u64::from(sector_count) * SECTOR_SIZE as u64;
        let cur_len = file.metadata()?.len();
        if cur_len < want_len {
            file.set_len(want_len)?;
        }
        Ok(Self {
            file: Mutex::new(file),
            sector_count,
        })
    }
}

impl BlockDevice for FileBlockDevice {
    fn sector_count(&self) -> u32 {
        self.sector_count
    }

    fn read(&self, sector: u32, buf: &mut Sector) -> Result<(), FsError> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(u64::from(sector) * SECTOR_SIZE as u64))
            .map_err(|e| FsError::Io(e.to_string()))?;
        file.read_exact(buf).map_err(|e| FsError::Io(e.to_string()))
    }

    fn write(&self, sector: u32, buf: &Sector) -> Result<(), FsError> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(u64::from(sector) * SECTOR_SIZE as u64))
            .map_err(|e| FsError::Io(e.to_string()))?;
        file.write_all(buf).map_err(|e| FsError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_device_round_trips_sectors() {
        let dev = MemBlockDevice::new(4);
        let mut buf = [0u8; SECTOR_SIZE];
        buf[0] = 0xAB;
        dev.write(2, &buf).unwrap();

        let mut out = [0u8; SECTOR_SIZE];
        dev.read(2, &mut out).unwrap();
        assert_eq!(out, buf);

        let mut zero = [0u8; SECTOR_SIZE];
        dev.read(1, &mut zero).unwrap();
        assert_eq!(zero, [0u8; SECTOR_SIZE]);
    }

    #[test]
    fn file_device_grows_short_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .unwrap();
        let dev = FileBlockDevice::new(file, 8).unwrap();
        assert_eq!(dev.sector_count(), 8);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8 * SECTOR_SIZE as u64);
    }
}
