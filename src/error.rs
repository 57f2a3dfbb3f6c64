//! The crate's uniform error type.

/// Errors returned by every public operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// A path component was empty, or a name exceeded [`crate::params::NAME_MAX`].
    #[error("invalid name")]
    InvalidName,
    /// A requested file length was negative or otherwise unrepresentable.
    #[error("invalid length")]
    InvalidLength,
    /// A path component does not exist.
    #[error("no such file or directory")]
    NotFound,
    /// `create`/`dir::add` of a name that is already present.
    #[error("already exists")]
    AlreadyExists,
    /// A non-leaf path component, or the target of an operation requiring a
    /// directory, is not one.
    #[error("not a directory")]
    NotADirectory,
    /// Attempted to remove a directory that still has entries besides `.`
    /// and `..`.
    #[error("directory not empty")]
    DirectoryNotEmpty,
    /// The free-space map has no sectors left to satisfy an allocation.
    #[error("no space left on device")]
    NoSpace,
    /// A logical block index fell beyond `D + F + F*F`.
    #[error("file offset out of addressable range")]
    OutOfRange,
    /// An on-disk inode failed its magic-number check.
    #[error("corrupt inode at sector {0}")]
    Corrupt(u32),
    /// The underlying block device reported a read/write failure.
    #[error("block device I/O error: {0}")]
    Io(String),
}
