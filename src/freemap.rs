//! Free-space tracking.
//!
//! The bitmap is persisted as the data of the reserved inode at
//! [`crate::params::FREE_MAP_SECTOR`]. Its own data sectors are carved out
//! once, at format time, written directly against the block device instead
//! of through [`crate::inode`]'s normal growth path — see [`FreeMap::format`]
//! for why. After that one bootstrap step the bitmap's size never changes
//! again (it is sized to the device's sector count, which is fixed for the
//! life of the file system), so every later access goes through the regular
//! inode read/write path like any other file.

use crate::block::{BlockDevice, Sector};
use crate::error::FsError;
use crate::fs::Inner;
use crate::inode::Inode;
use crate::layout::{self, DiskInode, INODE_MAGIC};
use crate::params::{FIRST_FREE_SECTOR, FREE_MAP_SECTOR, NUM_DIRECT, ROOT_DIR_SECTOR, SECTOR_SIZE};

/// An in-memory copy of the free-space bitmap, one bit per sector.
pub struct FreeMap {
    bits: Vec<bool>,
    inode: Option<Inode>,
}

impl FreeMap {
    fn bytes_len(sector_count: u32) -> usize {
        (sector_count as usize).div_ceil(8)
    }

    fn sectors_needed(sector_count: u32) -> u32 {
        Self::bytes_len(sector_count).div_ceil(SECTOR_SIZE) as u32
    }

    /// Builds a fresh bitmap for a device of `sector_count` sectors, marking
    /// the free-map inode's own sector, the root directory's sector, and the
    /// bitmap's own data sectors as allocated, then writes it straight to
    /// the block device.
    ///
    /// This bypasses [`crate::inode::Inode::create`]/`grow_to` on purpose:
    /// those allocate through this very bitmap, and the bitmap does not
    /// exist yet. Bootstrapping by hand breaks the cycle. The bitmap's data
    /// is required to fit in the inode's direct blocks (`NUM_DIRECT`
    /// sectors, i.e. up to ~492 KiB of device capacity per bitmap byte —
    /// comfortably enough for a teaching-scale disk image); larger devices
    /// are out of scope for this bootstrap path.
    pub fn format(block: &dyn BlockDevice, sector_count: u32) -> Result<Self, FsError> {
        let data_sectors = Self::sectors_needed(sector_count);
        assert!(
            (data_sectors as usize) <= NUM_DIRECT,
            "device has too many sectors for the direct-only free-map bootstrap"
        );

        let mut bits = vec![false; sector_count as usize];
        bits[FREE_MAP_SECTOR as usize] = true;
        bits[ROOT_DIR_SECTOR as usize] = true;
        for sector in FIRST_FREE_SECTOR..FIRST_FREE_SECTOR + data_sectors {
            bits[sector as usize] = true;
        }

        let bytes = pack(&bits);
        for (i, chunk) in bytes.chunks(SECTOR_SIZE).enumerate() {
            let mut sector: Sector = [0; SECTOR_SIZE];
            sector[..chunk.len()].copy_from_slice(chunk);
            block.write(FIRST_FREE_SECTOR + i as u32, &sector)?;
        }

        let mut disk = DiskInode::free();
        disk.magic = INODE_MAGIC;
        disk.is_dir = 0;
        disk.length = bytes.len() as i32;
        for i in 0..data_sectors as usize {
            disk.direct[i] = FIRST_FREE_SECTOR + i as u32;
        }
        let mut sector: Sector = [0; SECTOR_SIZE];
        layout::write_into(&mut sector, &disk);
        block.write(FREE_MAP_SECTOR, &sector)?;

        Ok(Self { bits, inode: None })
    }

    /// An empty map with no backing inode. Used only as a placeholder value
    /// for [`std::mem::replace`] while a real map is briefly moved out of
    /// [`Inner`] for a call that also needs `&mut Inner`.
    pub(crate) fn placeholder() -> Self {
        Self {
            bits: Vec::new(),
            inode: None,
        }
    }

    /// Opens this already-bootstrapped map's backing inode, so its
    /// reference is held like any other open file and `close` can flush it
    /// later. Does not re-read the bitmap; the in-memory copy built during
    /// [`FreeMap::format`] is assumed current.
    pub(crate) fn attach(inner: &mut Inner) -> Result<(), FsError> {
        let inode = Inode::open(inner, FREE_MAP_SECTOR)?;
        inner.free_map.inode = Some(inode);
        Ok(())
    }

    /// Loads the bitmap from an already-formatted device, opening its
    /// backing inode in the process.
    pub fn open(inner: &mut Inner) -> Result<Self, FsError> {
        let inode = Inode::open(inner, FREE_MAP_SECTOR)?;
        let len = inode.length(inner).max(0) as usize;
        let mut bytes = vec![0u8; len];
        inode.read_at(inner, &mut bytes, 0)?;

        let sector_count = inner.block.sector_count();
        let mut bits = vec![false; sector_count as usize];
        for (i, bit) in bits.iter_mut().enumerate() {
            *bit = (bytes[i / 8] >> (i % 8)) & 1 != 0;
        }

        Ok(Self { bits, inode: Some(inode) })
    }

    /// Flushes the bitmap back to its inode and closes it. A no-op if this
    /// map was never [`FreeMap::open`]ed (e.g. it is still the in-memory
    /// result of [`FreeMap::format`]).
    pub fn close(&mut self, inner: &mut Inner) -> Result<(), FsError> {
        let Some(inode) = self.inode.take() else {
            return Ok(());
        };
        let bytes = pack(&self.bits);
        inode.write_at(inner, &bytes, 0)?;
        inode.close(inner);
        Ok(())
    }

    /// Allocates `count` contiguous free sectors and returns the first one.
    /// `count == 1` is the common case and always succeeds if any bit is
    /// free; larger runs do a linear scan for contiguous space and fail if
    /// none is found, without side effects.
    pub fn allocate(&mut self, count: usize) -> Result<u32, FsError> {
        if count == 1 {
            let i = self.bits.iter().position(|&used| !used).ok_or(FsError::NoSpace)?;
            self.bits[i] = true;
            return Ok(i as u32);
        }

        let mut run_start = None;
        let mut run_len = 0;
        for (i, &used) in self.bits.iter().enumerate() {
            if used {
                run_start = None;
                run_len = 0;
                continue;
            }
            if run_start.is_none() {
                run_start = Some(i);
            }
            run_len += 1;
            if run_len == count {
                let start = run_start.expect("run_len > 0 implies run_start is set");
                for bit in &mut self.bits[start..start + count] {
                    *bit = true;
                }
                return Ok(start as u32);
            }
        }
        Err(FsError::NoSpace)
    }

    /// Marks `count` sectors starting at `first` as free again.
    pub fn release(&mut self, first: u32, count: usize) {
        for s in first..first + count as u32 {
            debug_assert!(self.bits[s as usize], "releasing an already-free sector {s}");
            self.bits[s as usize] = false;
        }
    }
}

fn pack(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_single_then_release_makes_it_reusable() {
        let mut map = FreeMap {
            bits: vec![true, true, false, false, false],
            inode: None,
        };
        let a = map.allocate(1).unwrap();
        assert_eq!(a, 2);
        let b = map.allocate(1).unwrap();
        assert_eq!(b, 3);

        map.release(2, 1);
        let c = map.allocate(1).unwrap();
        assert_eq!(c, 2);
    }

    #[test]
    fn allocate_out_of_space_fails() {
        let mut map = FreeMap {
            bits: vec![true, true],
            inode: None,
        };
        assert!(matches!(map.allocate(1), Err(FsError::NoSpace)));
    }

    #[test]
    fn allocate_contiguous_run() {
        let mut map = FreeMap {
            bits: vec![true, false, false, true, false, false, false],
            inode: None,
        };
        let start = map.allocate(3).unwrap();
        assert_eq!(start, 4);
    }
}
