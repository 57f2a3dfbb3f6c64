//! File system tunables.
//!
//! These mirror the constants the original on-disk layout hard-codes
//! (`param.rs` in the kernel this crate grew out of): sector size, block-map
//! fan-out, and the fixed directory name width.

/// Size in bytes of a single disk sector.
pub const SECTOR_SIZE: usize = 512;

/// Number of direct block pointers stored in an inode.
///
/// Chosen so that `size_of::<DiskInode>() == SECTOR_SIZE` exactly:
/// `4 (length) + 4 (magic) + 4 (is_dir) + NUM_DIRECT * 4 + 4 (indirect) + 4
/// (double_indirect) == 512`.
pub const NUM_DIRECT: usize = 123;

/// Number of sector numbers that fit in one index block.
pub const INDEX_FANOUT: usize = SECTOR_SIZE / 4;

/// Maximum file length addressable through direct, indirect, and
/// double-indirect blocks.
pub const MAX_FILE_SECTORS: usize = NUM_DIRECT + INDEX_FANOUT + INDEX_FANOUT * INDEX_FANOUT;

/// Maximum file length in bytes.
pub const MAX_FILE_SIZE: usize = MAX_FILE_SECTORS * SECTOR_SIZE;

/// Maximum length of a single path component, not counting the NUL
/// terminator.
pub const NAME_MAX: usize = 14;

/// Sector holding the free-space map's inode.
pub const FREE_MAP_SECTOR: u32 = 0;

/// Sector holding the root directory's inode.
pub const ROOT_DIR_SECTOR: u32 = 1;

/// First sector available for free-map data / general-purpose use.
pub const FIRST_FREE_SECTOR: u32 = 2;

/// Initial entry capacity new directories are sized for.
pub const DIR_INITIAL_ENTRIES: usize = 2;
