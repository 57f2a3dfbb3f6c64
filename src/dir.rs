//! The directory layer: directories as files whose data is a packed array
//! of fixed-size entries.

use crate::error::FsError;
use crate::fs::Inner;
use crate::inode::{Inode, SectorNo};
use crate::layout::{self, DirEntry};
use crate::params::{DIR_INITIAL_ENTRIES, NAME_MAX, ROOT_DIR_SECTOR};

const ENTRY_SIZE: usize = std::mem::size_of::<DirEntry>();

/// An open directory: an inode handle plus a cursor for [`Directory::readdir`].
pub struct Directory {
    inode: Inode,
    pos: usize,
}

impl Directory {
    /// Creates a new, empty directory inode at `sector`, sized to hold
    /// `initial_entry_count` entries without needing to grow.
    pub fn create(inner: &mut Inner, sector: SectorNo, initial_entry_count: usize) -> Result<Self, FsError> {
        let size = (initial_entry_count.max(DIR_INITIAL_ENTRIES) * ENTRY_SIZE) as i32;
        let inode = Inode::create(inner, sector, size, true)?;
        Ok(Self { inode, pos: 0 })
    }

    pub fn open(inode: Inode) -> Self {
        Self { inode, pos: 0 }
    }

    pub fn open_root(inner: &mut Inner) -> Result<Self, FsError> {
        Ok(Self::open(Inode::open(inner, ROOT_DIR_SECTOR)?))
    }

    pub fn close(self, inner: &mut Inner) {
        self.inode.close(inner);
    }

    pub fn inode(&self) -> Inode {
        self.inode
    }

    fn entry_count(&self, inner: &Inner) -> usize {
        self.inode.length(inner).max(0) as usize / ENTRY_SIZE
    }

    fn read_entry(&self, inner: &mut Inner, index: usize) -> Result<DirEntry, FsError> {
        let mut buf = [0u8; ENTRY_SIZE];
        self.inode.read_at(inner, &mut buf, index * ENTRY_SIZE)?;
        Ok(layout::decode(&buf))
    }

    fn write_entry(&self, inner: &mut Inner, index: usize, entry: &DirEntry) -> Result<(), FsError> {
        let bytes = layout::encode(entry);
        self.inode.write_at(inner, &bytes, index * ENTRY_SIZE)?;
        Ok(())
    }

    /// Looks up `name` among this directory's entries and opens the
    /// matching child inode, if any.
    pub fn lookup(&self, inner: &mut Inner, name: &str) -> Result<Option<Inode>, FsError> {
        let count = self.entry_count(inner);
        for i in 0..count {
            let entry = self.read_entry(inner, i)?;
            if entry.matches_name(name) {
                return Ok(Some(Inode::open(inner, entry.sector)?));
            }
        }
        Ok(None)
    }

    /// Adds a new entry mapping `name` to `child_sector`.
    ///
    /// Fails with [`FsError::AlreadyExists`] if `name` is already present,
    /// [`FsError::InvalidName`] if it is empty or too long. Reuses a
    /// previously vacated slot if one exists, otherwise appends (which may
    /// grow the directory's backing file).
    pub fn add(&self, inner: &mut Inner, name: &str, child_sector: SectorNo) -> Result<(), FsError> {
        if name.is_empty() || name.len() > NAME_MAX || name == "." || name == ".." {
            return Err(FsError::InvalidName);
        }
        if self.lookup_slot(inner, name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        self.insert(inner, name, child_sector)
    }

    /// Finds the slot index of the in-use entry named `name`, without
    /// opening the inode it points at.
    fn lookup_slot(&self, inner: &mut Inner, name: &str) -> Result<Option<usize>, FsError> {
        let count = self.entry_count(inner);
        for i in 0..count {
            let entry = self.read_entry(inner, i)?;
            if entry.matches_name(name) {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Writes a new entry for `name`/`sector` into the first vacated slot,
    /// or appends (growing the directory's file) if none is free. Assumes
    /// the caller has already checked `name` is not already present.
    fn insert(&self, inner: &mut Inner, name: &str, sector: SectorNo) -> Result<(), FsError> {
        let count = self.entry_count(inner);
        let mut free_slot = None;
        for i in 0..count {
            if !self.read_entry(inner, i)?.is_in_use() {
                free_slot = Some(i);
                break;
            }
        }

        let mut entry = DirEntry::empty();
        entry.in_use = 1;
        entry.set_name(name);
        entry.sector = sector;

        let slot = free_slot.unwrap_or(count);
        self.write_entry(inner, slot, &entry)
    }

    /// Removes the entry named `name`. Fails with
    /// [`FsError::DirectoryNotEmpty`] if it names a non-empty directory.
    /// Marks the target inode removed so its blocks are reclaimed once its
    /// last open handle closes.
    pub fn remove(&self, inner: &mut Inner, name: &str) -> Result<(), FsError> {
        let count = self.entry_count(inner);
        let mut target = None;
        for i in 0..count {
            let entry = self.read_entry(inner, i)?;
            if entry.matches_name(name) {
                target = Some((i, entry));
                break;
            }
        }
        let (slot, entry) = target.ok_or(FsError::NotFound)?;

        let child = Inode::open(inner, entry.sector)?;
        if child.is_dir(inner) {
            let child_dir = Directory::open(child);
            let empty = child_dir.is_empty(inner)?;
            if !empty {
                child_dir.inode.close(inner);
                return Err(FsError::DirectoryNotEmpty);
            }
        }

        let mut cleared = DirEntry::empty();
        cleared.in_use = 0;
        self.write_entry(inner, slot, &cleared)?;

        child.mark_removed(inner);
        child.close(inner);
        Ok(())
    }

    /// A directory is empty when it has no in-use entries besides `.` and `..`.
    pub fn is_empty(&self, inner: &mut Inner) -> Result<bool, FsError> {
        let count = self.entry_count(inner);
        for i in 0..count {
            let entry = self.read_entry(inner, i)?;
            if entry.is_in_use() && entry.name_str() != "." && entry.name_str() != ".." {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns the next in-use entry's name starting from this directory's
    /// cursor, skipping `.`/`..`, advancing the cursor past it. `None` once
    /// every entry has been visited.
    pub fn readdir(&mut self, inner: &mut Inner) -> Result<Option<String>, FsError> {
        let count = self.entry_count(inner);
        while self.pos < count {
            let entry = self.read_entry(inner, self.pos)?;
            self.pos += 1;
            if entry.is_in_use() && entry.name_str() != "." && entry.name_str() != ".." {
                return Ok(Some(entry.name_str().to_owned()));
            }
        }
        Ok(None)
    }

    /// Rewinds the `readdir` cursor to the start of the directory.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Adds the conventional `.` (self) and `..` (parent) entries. Used
    /// right after creating a new subdirectory.
    pub fn link_dots(&self, inner: &mut Inner, parent_sector: SectorNo) -> Result<(), FsError> {
        self.insert(inner, ".", self.inode.sector)?;
        self.insert(inner, "..", parent_sector)
    }
}
