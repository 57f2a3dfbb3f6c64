//! The file-system façade: mount/format plus the public create/open/remove/
//! mkdir/chdir operations, all serialized behind one lock.

use std::sync::{Mutex, MutexGuard};

use log::{info, warn};

use crate::block::BlockDevice;
use crate::dir::Directory;
use crate::error::FsError;
use crate::freemap::FreeMap;
use crate::inode::{Inode, OpenInodeTable, SectorNo};
use crate::params::{DIR_INITIAL_ENTRIES, ROOT_DIR_SECTOR};
use crate::path;

/// The state every public operation locks for its duration: the block
/// device, the open-inode table, and the free-space map. See the
/// `inode`/`freemap` modules, which operate on `&mut Inner` directly rather
/// than on `Self` methods, for why this is a plain struct rather than
/// something with its own methods.
pub(crate) struct Inner {
    pub(crate) block: Box<dyn BlockDevice>,
    pub(crate) inodes: OpenInodeTable,
    pub(crate) free_map: FreeMap,
}

/// An open file system. Every public method takes `&self` and locks an
/// internal mutex for its duration ("the big file-system lock"); there is no
/// finer-grained locking below that.
pub struct FileSystem {
    inner: Mutex<Inner>,
}

impl FileSystem {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Formats `block` as a fresh, empty file system: builds the free-space
    /// map, then creates the root directory.
    pub fn format(block: impl BlockDevice + 'static) -> Result<Self, FsError> {
        let sector_count = block.sector_count();
        let free_map = FreeMap::format(&block, sector_count)?;
        let mut inner = Inner {
            block: Box::new(block),
            inodes: OpenInodeTable::default(),
            free_map,
        };

        let root = Directory::create(&mut inner, ROOT_DIR_SECTOR, DIR_INITIAL_ENTRIES)?;
        root.link_dots(&mut inner, ROOT_DIR_SECTOR)?;
        root.close(&mut inner);

        FreeMap::attach(&mut inner)?;

        info!("formatted file system ({sector_count} sectors)");
        Ok(Self { inner: Mutex::new(inner) })
    }

    /// Mounts an already-formatted `block`.
    pub fn mount(block: impl BlockDevice + 'static) -> Result<Self, FsError> {
        let mut inner = Inner {
            block: Box::new(block),
            inodes: OpenInodeTable::default(),
            free_map: FreeMap::placeholder(),
        };
        inner.free_map = FreeMap::open(&mut inner)?;
        Ok(Self { inner: Mutex::new(inner) })
    }

    /// Flushes the free-space map to disk. Safe to call more than once;
    /// runs automatically on [`Drop`].
    pub fn close(&self) -> Result<(), FsError> {
        let mut inner = self.lock();
        let mut free_map = std::mem::replace(&mut inner.free_map, FreeMap::placeholder());
        let result = free_map.close(&mut inner);
        inner.free_map = free_map;
        result
    }

    /// Starts a task context rooted at `/`, analogous to a freshly spawned
    /// process inheriting the root directory before any `chdir`.
    pub fn new_task(&self) -> Result<TaskContext, FsError> {
        let mut inner = self.lock();
        Ok(TaskContext {
            cwd: Inode::open(&mut inner, ROOT_DIR_SECTOR)?,
        })
    }

    /// Creates a new file or (empty) directory at `name`, relative to
    /// `task`'s current directory. Does not open it; call [`Self::open`]
    /// separately for a handle.
    pub fn create(&self, task: &TaskContext, name: &str, size: i32, is_dir: bool) -> Result<(), FsError> {
        let mut inner = self.lock();
        let (parent_inode, leaf) = path::resolve_parent(&mut inner, task.cwd, name)?;
        let parent = Directory::open(parent_inode);
        let result = create_entry(&mut inner, &parent, &leaf, size, is_dir);
        parent.close(&mut inner);
        result
    }

    pub fn mkdir(&self, task: &TaskContext, name: &str) -> Result<(), FsError> {
        self.create(task, name, 0, true)
    }

    /// Resolves `name` and opens a handle to it: a [`Handle::File`] for a
    /// regular file, a [`Handle::Dir`] for a directory (including `"/"`
    /// itself).
    pub fn open(&self, task: &TaskContext, name: &str) -> Result<Handle, FsError> {
        let mut inner = self.lock();
        let inode = path::resolve(&mut inner, task.cwd, name)?;
        if inode.is_dir(&inner) {
            Ok(Handle::Dir(Directory::open(inode)))
        } else {
            Ok(Handle::File(FileHandle { inode, pos: 0 }))
        }
    }

    /// Unlinks `name` from its parent directory. Fails with
    /// [`FsError::DirectoryNotEmpty`] if it names a non-empty directory. The
    /// underlying inode's blocks are reclaimed once every open handle on it
    /// (if any) is closed.
    pub fn remove(&self, task: &TaskContext, name: &str) -> Result<(), FsError> {
        let mut inner = self.lock();
        let (parent_inode, leaf) = path::resolve_parent(&mut inner, task.cwd, name)?;
        let parent = Directory::open(parent_inode);
        let result = parent.remove(&mut inner, &leaf);
        parent.close(&mut inner);
        result
    }

    /// Changes `task`'s current directory to `name`.
    pub fn chdir(&self, task: &mut TaskContext, name: &str) -> Result<(), FsError> {
        let mut inner = self.lock();
        let new_dir = path::resolve(&mut inner, task.cwd, name)?;
        if !new_dir.is_dir(&inner) {
            new_dir.close(&mut inner);
            return Err(FsError::NotADirectory);
        }
        let old = std::mem::replace(&mut task.cwd, new_dir);
        old.close(&mut inner);
        Ok(())
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("error flushing free map while dropping file system: {e}");
        }
    }
}

/// Allocates a sector, creates an inode there, links it into `parent` under
/// `leaf`, and (for directories) adds `.`/`..`. Releases the allocated
/// sector on any failure up through the directory-entry add; a failure in
/// `link_dots` itself is not rolled back, matching `grow_to`'s documented
/// best-effort policy on partial allocation.
fn create_entry(inner: &mut Inner, parent: &Directory, leaf: &str, size: i32, is_dir: bool) -> Result<(), FsError> {
    let sector = inner.free_map.allocate(1)?;

    let child = match Inode::create(inner, sector, size, is_dir) {
        Ok(child) => child,
        Err(e) => {
            inner.free_map.release(sector, 1);
            return Err(e);
        }
    };

    if let Err(e) = parent.add(inner, leaf, sector) {
        child.mark_removed(inner);
        child.close(inner);
        return Err(e);
    }

    if is_dir {
        let child_dir = Directory::open(child);
        let linked = child_dir.link_dots(inner, parent.inode().sector);
        child_dir.close(inner);
        linked?;
    } else {
        child.close(inner);
    }

    Ok(())
}

/// A task's current working directory, the one piece of per-caller state
/// this crate depends on from its host. Analogous to a Pintos thread's
/// `cwd` pointer.
pub struct TaskContext {
    cwd: Inode,
}

impl TaskContext {
    pub fn cwd_sector(&self) -> SectorNo {
        self.cwd.sector
    }

    pub fn close(self, fs: &FileSystem) {
        let mut inner = fs.lock();
        self.cwd.close(&mut inner);
    }
}

/// A handle returned by [`FileSystem::open`].
pub enum Handle {
    File(FileHandle),
    Dir(Directory),
}

impl Handle {
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir(_))
    }

    pub fn inumber(&self) -> SectorNo {
        match self {
            Self::File(f) => f.inode.sector,
            Self::Dir(d) => d.inode().sector,
        }
    }

    /// Returns the next entry name in a directory handle, skipping `.`/`..`;
    /// `None` once every entry has been visited. Fails with
    /// [`FsError::NotADirectory`] on a file handle.
    pub fn readdir(&mut self, fs: &FileSystem) -> Result<Option<String>, FsError> {
        let mut inner = fs.lock();
        match self {
            Self::Dir(d) => d.readdir(&mut inner),
            Self::File(_) => Err(FsError::NotADirectory),
        }
    }

    pub fn close(self, fs: &FileSystem) {
        let mut inner = fs.lock();
        match self {
            Self::File(f) => f.inode.close(&mut inner),
            Self::Dir(d) => d.close(&mut inner),
        }
    }
}

/// An open regular file: an inode handle plus a per-handle seek position.
pub struct FileHandle {
    inode: Inode,
    pos: usize,
}

impl FileHandle {
    pub fn read(&mut self, fs: &FileSystem, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut inner = fs.lock();
        let n = self.inode.read_at(&mut inner, buf, self.pos)?;
        self.pos += n;
        Ok(n)
    }

    pub fn write(&mut self, fs: &FileSystem, buf: &[u8]) -> Result<usize, FsError> {
        let mut inner = fs.lock();
        let n = self.inode.write_at(&mut inner, buf, self.pos)?;
        self.pos += n;
        Ok(n)
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn size(&self, fs: &FileSystem) -> usize {
        let inner = fs.lock();
        self.inode.length(&inner).max(0) as usize
    }

    pub fn deny_write(&self, fs: &FileSystem) {
        let mut inner = fs.lock();
        self.inode.deny_write(&mut inner);
    }

    pub fn allow_write(&self, fs: &FileSystem) {
        let mut inner = fs.lock();
        self.inode.allow_write(&mut inner);
    }

    pub fn inumber(&self) -> SectorNo {
        self.inode.sector
    }

    pub fn close(self, fs: &FileSystem) {
        let mut inner = fs.lock();
        self.inode.close(&mut inner);
    }
}
