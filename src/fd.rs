//! File descriptors.
//!
//! This layer sits strictly on top of [`crate::fs`]; the core inode/dir/
//! path/fs modules have no knowledge of it. Descriptors 0 and 1 are
//! reserved for console input/output, matching the embedder convention this
//! crate's syscall-dispatch layer is expected to follow.

use std::collections::HashMap;
use std::sync::Arc;

use crate::fs::{FileSystem, Handle};

/// A file descriptor index.
pub type Fd = i32;

/// What a descriptor refers to.
pub enum FdEntry {
    /// Descriptor 0. Reads route to the embedder's console input device.
    ConsoleIn,
    /// Descriptor 1. Writes route to the embedder's console output device.
    ConsoleOut,
    /// An open file or directory handle.
    Handle(Handle),
}

/// A per-task descriptor table.
pub struct FdTable {
    fs: Arc<FileSystem>,
    entries: HashMap<Fd, FdEntry>,
}

impl FdTable {
    /// Starts a table with 0 and 1 already reserved for the console.
    pub fn new(fs: Arc<FileSystem>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(0, FdEntry::ConsoleIn);
        entries.insert(1, FdEntry::ConsoleOut);
        Self { fs, entries }
    }

    /// Registers `handle` under the lowest available descriptor `>= 2`.
    pub fn insert(&mut self, handle: Handle) -> Fd {
        let fd = (2..).find(|fd| !self.entries.contains_key(fd)).expect("descriptor space exhausted");
        self.entries.insert(fd, FdEntry::Handle(handle));
        fd
    }

    pub fn get(&self, fd: Fd) -> Option<&FdEntry> {
        self.entries.get(&fd)
    }

    pub fn get_mut(&mut self, fd: Fd) -> Option<&mut FdEntry> {
        self.entries.get_mut(&fd)
    }

    /// Drops `fd` from the table, closing the underlying handle if it held
    /// one. A no-op for 0/1 or an unregistered descriptor.
    pub fn remove(&mut self, fd: Fd) {
        if let Some(FdEntry::Handle(handle)) = self.entries.remove(&fd) {
            handle.close(&self.fs);
        }
    }
}

impl Drop for FdTable {
    fn drop(&mut self) {
        let fds: Vec<Fd> = self.entries.keys().copied().collect();
        for fd in fds {
            if let Some(FdEntry::Handle(handle)) = self.entries.remove(&fd) {
                handle.close(&self.fs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemBlockDevice;

    #[test]
    fn reserves_console_descriptors() {
        let fs = Arc::new(FileSystem::format(MemBlockDevice::new(64)).unwrap());
        let table = FdTable::new(fs);
        assert!(matches!(table.get(0), Some(FdEntry::ConsoleIn)));
        assert!(matches!(table.get(1), Some(FdEntry::ConsoleOut)));
        assert!(table.get(2).is_none());
    }

    #[test]
    fn insert_skips_reserved_slots() {
        let fs = Arc::new(FileSystem::format(MemBlockDevice::new(64)).unwrap());
        let task = fs.new_task().unwrap();
        fs.create(&task, "f", 0, false).unwrap();
        let handle = fs.open(&task, "f").unwrap();

        let mut table = FdTable::new(fs);
        let fd = table.insert(handle);
        assert_eq!(fd, 2);
        task.close(&table.fs);
    }
}
