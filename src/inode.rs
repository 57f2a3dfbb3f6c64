//! The inode engine: on-disk block mapping, growth, and the open-inode table.
//!
//! Every operation here takes `&mut Inner` explicitly rather than reaching
//! for a global, so several independent [`crate::fs::FileSystem`] values can
//! coexist in one process (handy in tests). [`Inode`] itself is a cheap
//! `Copy` handle carrying only a sector number; the live state (reference
//! count, cached [`DiskInode`], deny-write count) lives in the table inside
//! `Inner`.

use std::collections::HashMap;

use crate::block::Sector;
use crate::error::FsError;
use crate::fs::Inner;
use crate::layout::{self, DiskInode, INODE_MAGIC, IndexBlock};
use crate::params::{INDEX_FANOUT, NUM_DIRECT, SECTOR_SIZE};

pub type SectorNo = u32;

struct InodeRecord {
    disk: DiskInode,
    open_count: u32,
    deny_write_count: u32,
    removed: bool,
}

/// Sector-keyed table of live inode records, deduplicating concurrent opens
/// of the same file.
#[derive(Default)]
pub struct OpenInodeTable {
    entries: HashMap<SectorNo, InodeRecord>,
}

impl OpenInodeTable {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A handle to an open inode. Cheap to copy; the real state lives in
/// [`Inner::inodes`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Inode {
    pub sector: SectorNo,
}

impl Inode {
    /// Opens the inode at `sector`, reading it off disk on first open.
    pub fn open(inner: &mut Inner, sector: SectorNo) -> Result<Self, FsError> {
        open(inner, sector)?;
        Ok(Self { sector })
    }

    /// Allocates and initializes a new inode at `sector`, open with
    /// reference count 1.
    pub fn create(inner: &mut Inner, sector: SectorNo, length: i32, is_dir: bool) -> Result<Self, FsError> {
        create(inner, sector, length, is_dir)?;
        Self::open(inner, sector)
    }

    /// Bumps the reference count of an inode this handle's owner already
    /// knows to be open.
    pub fn reopen(self, inner: &mut Inner) -> Self {
        if let Some(rec) = inner.inodes.entries.get_mut(&self.sector) {
            rec.open_count += 1;
        }
        self
    }

    pub fn close(self, inner: &mut Inner) {
        close(inner, self.sector);
    }

    pub fn read_at(self, inner: &mut Inner, buf: &mut [u8], offset: usize) -> Result<usize, FsError> {
        read_at(inner, self.sector, buf, offset)
    }

    pub fn write_at(self, inner: &mut Inner, buf: &[u8], offset: usize) -> Result<usize, FsError> {
        write_at(inner, self.sector, buf, offset)
    }

    pub fn length(self, inner: &Inner) -> i32 {
        length(inner, self.sector)
    }

    pub fn is_dir(self, inner: &Inner) -> bool {
        is_dir(inner, self.sector)
    }

    pub fn deny_write(self, inner: &mut Inner) {
        deny_write(inner, self.sector);
    }

    pub fn allow_write(self, inner: &mut Inner) {
        allow_write(inner, self.sector);
    }

    pub fn mark_removed(self, inner: &mut Inner) {
        mark_removed(inner, self.sector);
    }

    pub fn is_removed(self, inner: &Inner) -> bool {
        is_removed(inner, self.sector)
    }
}

fn open(inner: &mut Inner, sector: SectorNo) -> Result<(), FsError> {
    if let Some(rec) = inner.inodes.entries.get_mut(&sector) {
        rec.open_count += 1;
        return Ok(());
    }
    let disk = read_disk_inode(inner, sector)?;
    if disk.is_free() {
        return Err(FsError::Corrupt(sector));
    }
    inner.inodes.entries.insert(
        sector,
        InodeRecord {
            disk,
            open_count: 1,
            deny_write_count: 0,
            removed: false,
        },
    );
    Ok(())
}

fn close(inner: &mut Inner, sector: SectorNo) {
    let Some(rec) = inner.inodes.entries.get_mut(&sector) else {
        return;
    };
    debug_assert!(rec.open_count > 0, "closing an inode with no opens");
    rec.open_count -= 1;
    if rec.open_count == 0 {
        let rec = inner.inodes.entries.remove(&sector).expect("just confirmed present above");
        if rec.removed {
            deallocate(inner, sector, &rec.disk);
        }
    }
}

fn create(inner: &mut Inner, sector: SectorNo, length: i32, is_dir: bool) -> Result<(), FsError> {
    if length < 0 {
        return Err(FsError::InvalidLength);
    }
    let mut disk = DiskInode::free();
    disk.magic = INODE_MAGIC;
    disk.is_dir = u32::from(is_dir);
    if let Err(e) = grow_to(inner, &mut disk, length as usize) {
        log::warn!("sector {sector}: allocation failed growing to {length} bytes, any partially allocated blocks are leaked: {e}");
        return Err(e);
    }
    disk.length = length;
    write_disk_inode(inner, sector, &disk)?;
    Ok(())
}

fn length(inner: &Inner, sector: SectorNo) -> i32 {
    inner.inodes.entries[&sector].disk.length
}

fn is_dir(inner: &Inner, sector: SectorNo) -> bool {
    inner.inodes.entries[&sector].disk.is_dir != 0
}

fn deny_write(inner: &mut Inner, sector: SectorNo) {
    let rec = inner.inodes.entries.get_mut(&sector).expect("inode not open");
    rec.deny_write_count += 1;
    debug_assert!(rec.deny_write_count <= rec.open_count);
}

fn allow_write(inner: &mut Inner, sector: SectorNo) {
    let rec = inner.inodes.entries.get_mut(&sector).expect("inode not open");
    debug_assert!(rec.deny_write_count > 0);
    rec.deny_write_count -= 1;
}

fn mark_removed(inner: &mut Inner, sector: SectorNo) {
    inner.inodes.entries.get_mut(&sector).expect("inode not open").removed = true;
}

fn is_removed(inner: &Inner, sector: SectorNo) -> bool {
    inner.inodes.entries[&sector].removed
}

fn read_at(inner: &mut Inner, sector: SectorNo, buf: &mut [u8], offset: usize) -> Result<usize, FsError> {
    let file_len = inner.inodes.entries[&sector].disk.length.max(0) as usize;
    if offset >= file_len || buf.is_empty() {
        return Ok(0);
    }
    let end = file_len.min(offset + buf.len());
    let mut disk = inner.inodes.entries[&sector].disk;

    let mut pos = offset;
    let mut written = 0;
    while pos < end {
        let index = pos / SECTOR_SIZE;
        let sector_off = pos % SECTOR_SIZE;
        let chunk = (end - pos).min(SECTOR_SIZE - sector_off);

        match block_for(inner, &mut disk, index, false)? {
            Some(phys) => {
                let mut raw: Sector = [0; SECTOR_SIZE];
                inner.block.read(phys, &mut raw)?;
                buf[written..written + chunk].copy_from_slice(&raw[sector_off..sector_off + chunk]);
            }
            None => buf[written..written + chunk].fill(0),
        }
        pos += chunk;
        written += chunk;
    }
    Ok(written)
}

fn write_at(inner: &mut Inner, sector: SectorNo, buf: &[u8], offset: usize) -> Result<usize, FsError> {
    if buf.is_empty() {
        return Ok(0);
    }
    if inner.inodes.entries[&sector].deny_write_count > 0 {
        return Ok(0);
    }

    let mut disk = inner.inodes.entries[&sector].disk;
    let new_end = offset + buf.len();
    if new_end > disk.length.max(0) as usize {
        match grow_to(inner, &mut disk, new_end) {
            Ok(()) => {}
            Err(FsError::OutOfRange) => return Ok(0),
            Err(e) => {
                log::warn!("sector {sector}: write grew to {new_end} bytes and failed, any partially allocated blocks are leaked: {e}");
                return Err(e);
            }
        }
        disk.length = new_end as i32;
    }

    let mut pos = offset;
    let mut done = 0;
    while done < buf.len() {
        let index = pos / SECTOR_SIZE;
        let sector_off = pos % SECTOR_SIZE;
        let chunk = (buf.len() - done).min(SECTOR_SIZE - sector_off);
        let phys = block_for(inner, &mut disk, index, true)?.expect("grow_to allocated this block");

        let mut raw: Sector = [0; SECTOR_SIZE];
        if sector_off != 0 || chunk < SECTOR_SIZE {
            inner.block.read(phys, &mut raw)?;
        }
        raw[sector_off..sector_off + chunk].copy_from_slice(&buf[done..done + chunk]);
        inner.block.write(phys, &raw)?;

        pos += chunk;
        done += chunk;
    }

    write_disk_inode(inner, sector, &disk)?;
    inner.inodes.entries.get_mut(&sector).expect("inode not open").disk = disk;
    Ok(done)
}

/// Grows `disk`'s block map so that logical sectors `0..ceil(new_length /
/// SECTOR_SIZE)` are all allocated. Idempotent over an already-allocated
/// prefix. Does not touch `disk.length`; callers set that themselves once
/// growth succeeds.
fn grow_to(inner: &mut Inner, disk: &mut DiskInode, new_length: usize) -> Result<(), FsError> {
    let need = new_length.div_ceil(SECTOR_SIZE);
    for index in 0..need {
        block_for(inner, disk, index, true)?;
    }
    Ok(())
}

/// Resolves logical block `index` to a physical sector. When `allocate` is
/// `false`, returns `Ok(None)` for a hole instead of allocating one.
fn block_for(inner: &mut Inner, disk: &mut DiskInode, index: usize, allocate: bool) -> Result<Option<SectorNo>, FsError> {
    if index < NUM_DIRECT {
        if disk.direct[index] == 0 {
            if !allocate {
                return Ok(None);
            }
            disk.direct[index] = alloc_data_sector(inner)?;
        }
        return Ok(Some(disk.direct[index]));
    }

    let index = index - NUM_DIRECT;
    if index < INDEX_FANOUT {
        return index_block_entry(inner, &mut disk.indirect, index, allocate);
    }

    let index = index - INDEX_FANOUT;
    if index < INDEX_FANOUT * INDEX_FANOUT {
        return double_indirect_entry(inner, &mut disk.double_indirect, index / INDEX_FANOUT, index % INDEX_FANOUT, allocate);
    }

    Err(FsError::OutOfRange)
}

fn index_block_entry(inner: &mut Inner, field: &mut SectorNo, slot: usize, allocate: bool) -> Result<Option<SectorNo>, FsError> {
    if *field == 0 {
        if !allocate {
            return Ok(None);
        }
        let sector = alloc_index_sector(inner)?;
        *field = sector;
    }

    let mut block = read_index_block(inner, *field)?;
    if block.entries[slot] == 0 {
        if !allocate {
            return Ok(None);
        }
        block.entries[slot] = alloc_data_sector(inner)?;
        write_index_block(inner, *field, &block)?;
    }
    Ok(Some(block.entries[slot]))
}

fn double_indirect_entry(
    inner: &mut Inner,
    field: &mut SectorNo,
    outer_idx: usize,
    inner_idx: usize,
    allocate: bool,
) -> Result<Option<SectorNo>, FsError> {
    if *field == 0 {
        if !allocate {
            return Ok(None);
        }
        *field = alloc_index_sector(inner)?;
    }

    let mut outer = read_index_block(inner, *field)?;
    if outer.entries[outer_idx] == 0 {
        if !allocate {
            return Ok(None);
        }
        outer.entries[outer_idx] = alloc_index_sector(inner)?;
        write_index_block(inner, *field, &outer)?;
    }

    let leaf_sector = outer.entries[outer_idx];
    let mut leaf = read_index_block(inner, leaf_sector)?;
    if leaf.entries[inner_idx] == 0 {
        if !allocate {
            return Ok(None);
        }
        leaf.entries[inner_idx] = alloc_data_sector(inner)?;
        write_index_block(inner, leaf_sector, &leaf)?;
    }
    Ok(Some(leaf.entries[inner_idx]))
}

/// Releases every data sector and index block a (length-truncated) inode
/// reaches, followed by the inode's own sector. Best-effort: a corrupt index
/// block is skipped rather than aborting the whole walk.
fn deallocate(inner: &mut Inner, sector: SectorNo, disk: &DiskInode) {
    let need = (disk.length.max(0) as usize).div_ceil(SECTOR_SIZE);

    let direct_used = need.min(NUM_DIRECT);
    for slot in disk.direct.iter().take(direct_used) {
        if *slot != 0 {
            inner.free_map.release(*slot, 1);
        }
    }

    if need > NUM_DIRECT && disk.indirect != 0 {
        let used = (need - NUM_DIRECT).min(INDEX_FANOUT);
        free_index_block(inner, disk.indirect, used);
        inner.free_map.release(disk.indirect, 1);
    }

    if need > NUM_DIRECT + INDEX_FANOUT && disk.double_indirect != 0 {
        let remaining = need - NUM_DIRECT - INDEX_FANOUT;
        let outer_used = remaining.div_ceil(INDEX_FANOUT).min(INDEX_FANOUT);
        if let Ok(outer) = read_index_block(inner, disk.double_indirect) {
            for (outer_idx, leaf_sector) in outer.entries.iter().take(outer_used).enumerate() {
                if *leaf_sector == 0 {
                    continue;
                }
                let used_here = if outer_idx + 1 == outer_used {
                    remaining - outer_idx * INDEX_FANOUT
                } else {
                    INDEX_FANOUT
                };
                free_index_block(inner, *leaf_sector, used_here);
                inner.free_map.release(*leaf_sector, 1);
            }
        }
        inner.free_map.release(disk.double_indirect, 1);
    }

    inner.free_map.release(sector, 1);
}

fn free_index_block(inner: &mut Inner, sector: SectorNo, used_entries: usize) {
    if let Ok(block) = read_index_block(inner, sector) {
        for entry in block.entries.iter().take(used_entries) {
            if *entry != 0 {
                inner.free_map.release(*entry, 1);
            }
        }
    }
}

fn alloc_data_sector(inner: &mut Inner) -> Result<SectorNo, FsError> {
    let sector = inner.free_map.allocate(1)?;
    inner.block.write(sector, &[0u8; SECTOR_SIZE])?;
    Ok(sector)
}

fn alloc_index_sector(inner: &mut Inner) -> Result<SectorNo, FsError> {
    let sector = inner.free_map.allocate(1)?;
    write_index_block(inner, sector, &IndexBlock::empty())?;
    Ok(sector)
}

fn read_disk_inode(inner: &Inner, sector: SectorNo) -> Result<DiskInode, FsError> {
    let mut raw: Sector = [0; SECTOR_SIZE];
    inner.block.read(sector, &mut raw)?;
    Ok(layout::read_from(&raw))
}

fn write_disk_inode(inner: &Inner, sector: SectorNo, disk: &DiskInode) -> Result<(), FsError> {
    let mut raw: Sector = [0; SECTOR_SIZE];
    layout::write_into(&mut raw, disk);
    inner.block.write(sector, &raw)
}

fn read_index_block(inner: &Inner, sector: SectorNo) -> Result<IndexBlock, FsError> {
    let mut raw: Sector = [0; SECTOR_SIZE];
    inner.block.read(sector, &mut raw)?;
    Ok(layout::read_from(&raw))
}

fn write_index_block(inner: &Inner, sector: SectorNo, block: &IndexBlock) -> Result<(), FsError> {
    let mut raw: Sector = [0; SECTOR_SIZE];
    layout::write_into(&mut raw, block);
    inner.block.write(sector, &raw)
}

