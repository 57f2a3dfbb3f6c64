//! A sector-addressable inode file system with hierarchical directories.
//!
//! This crate implements the storage engine end of the classic
//! direct/indirect/double-indirect inode design plus a directory layer and
//! path resolver on top of it. It owns none of its own I/O: callers supply
//! a [`BlockDevice`] and, per task, a [`TaskContext`] tracking that task's
//! current directory. Everything above that — syscall dispatch, scheduling,
//! paging — is out of scope; [`fd::FdTable`] is the one convenience layer
//! this crate ships on top of the core, for embedders that want a
//! ready-made descriptor table rather than rolling their own.
//!
//! ```no_run
//! use inodefs::block::MemBlockDevice;
//! use inodefs::fs::FileSystem;
//!
//! let fs = FileSystem::format(MemBlockDevice::new(4096))?;
//! let mut task = fs.new_task()?;
//! fs.create(&task, "hello.txt", 0, false)?;
//! let handle = fs.open(&task, "hello.txt")?;
//! handle.close(&fs);
//! task.close(&fs);
//! # Ok::<(), inodefs::error::FsError>(())
//! ```

pub mod block;
pub mod dir;
pub mod error;
pub mod fd;
pub mod freemap;
pub mod fs;
pub mod inode;
pub mod layout;
pub mod params;
pub mod path;

pub use block::BlockDevice;
pub use error::FsError;
pub use fs::{FileHandle, FileSystem, Handle, TaskContext};
