//! On-disk byte layout.
//!
//! Every type in this module is `#[repr(C)]` and implements [`dataview::Pod`]
//! so that a sector buffer can be viewed as the type directly, with no
//! serialization step beyond a `memcpy`. This mirrors how the kernel this
//! crate is descended from treats its inode and page-table structures: plain
//! old data, read and written straight out of a block buffer.

use dataview::{Pod, PodMethods as _};

use crate::params::{INDEX_FANOUT, NAME_MAX, NUM_DIRECT, SECTOR_SIZE};

/// Sentinel marking a disk inode as valid.
pub const INODE_MAGIC: u32 = 0x494e_4f44; // b"INOD" read as a little-endian u32

/// The sector number of a 512-byte block on the backing device.
pub type RawSectorNo = u32;

/// A single sector-sized inode, exactly as it is stored on disk.
///
/// `4 + 4 + 4 + NUM_DIRECT * 4 + 4 + 4 == SECTOR_SIZE` for `NUM_DIRECT ==
/// 123`, so this type needs no trailing padding to fill a sector.
#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct DiskInode {
    /// File size in bytes. Always non-negative; stored signed to match the
    /// original on-disk format.
    pub length: i32,
    /// [`INODE_MAGIC`] if this inode is in use, `0` if it is free.
    pub magic: u32,
    /// Non-zero if this inode backs a directory.
    pub is_dir: u32,
    /// Direct data block pointers. `0` means unallocated.
    pub direct: [RawSectorNo; NUM_DIRECT],
    /// Indirect index block pointer. `0` means unallocated.
    pub indirect: RawSectorNo,
    /// Double-indirect index block pointer. `0` means unallocated.
    pub double_indirect: RawSectorNo,
}

const _: () = assert!(size_of::<DiskInode>() == SECTOR_SIZE);

impl DiskInode {
    /// A free (all-zero) inode. `magic == 0` marks it as not in use.
    pub fn free() -> Self {
        Self::zeroed()
    }

    pub fn is_free(&self) -> bool {
        self.magic != INODE_MAGIC
    }
}

/// A sector-sized array of sector numbers, used for indirect and
/// double-indirect block maps.
#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct IndexBlock {
    pub entries: [RawSectorNo; INDEX_FANOUT],
}

const _: () = assert!(size_of::<IndexBlock>() == SECTOR_SIZE);

impl IndexBlock {
    pub fn empty() -> Self {
        Self::zeroed()
    }
}

/// A single directory entry.
///
/// `in_use` is stored as a full word (rather than a single byte) so the
/// record stays naturally aligned without implicit compiler padding, which
/// [`Pod`] disallows.
#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct DirEntry {
    pub in_use: u32,
    pub name: [u8; NAME_MAX],
    _reserved: [u8; 2],
    pub sector: RawSectorNo,
}

impl DirEntry {
    pub fn empty() -> Self {
        Self::zeroed()
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use != 0
    }

    /// Returns the entry's name, trimmed at the first NUL byte.
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.is_in_use() && self.name_str() == name
    }

    pub fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        debug_assert!(bytes.len() <= NAME_MAX);
        self.name = [0; NAME_MAX];
        self.name[..bytes.len()].copy_from_slice(bytes);
    }
}

/// Encodes `value` as its raw bytes.
///
/// Goes through [`PodMethods::as_bytes`] rather than a pointer cast so it
/// works regardless of the destination's alignment.
pub fn encode<T: Pod>(value: &T) -> Vec<u8> {
    value.as_bytes().to_vec()
}

/// Decodes a `T` from the front of `bytes`.
pub fn decode<T: Pod>(bytes: &[u8]) -> T {
    let mut value = T::zeroed();
    value.as_bytes_mut().copy_from_slice(&bytes[..size_of::<T>()]);
    value
}

/// Writes `value`'s bytes into the front of a sector buffer, zeroing the
/// remainder.
pub fn write_into<T: Pod>(buf: &mut [u8; SECTOR_SIZE], value: &T) {
    buf.fill(0);
    let bytes = value.as_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
}

/// Reads a `T` out of the front of a sector buffer.
pub fn read_from<T: Pod>(buf: &[u8; SECTOR_SIZE]) -> T {
    decode(buf)
}
