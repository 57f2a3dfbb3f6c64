//! Path resolution: turning a `/`-separated name into an open inode (or an
//! open parent directory plus a leaf name, for creation).

use crate::dir::Directory;
use crate::error::FsError;
use crate::fs::Inner;
use crate::inode::Inode;
use crate::params::{NAME_MAX, ROOT_DIR_SECTOR};

fn tokenize(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn start_dir(inner: &mut Inner, cwd: Inode, path: &str) -> Result<Inode, FsError> {
    if path.starts_with('/') {
        Inode::open(inner, ROOT_DIR_SECTOR)
    } else {
        Ok(cwd.reopen(inner))
    }
}

fn step(inner: &mut Inner, current: Inode, token: &str) -> Result<Inode, FsError> {
    if !current.is_dir(inner) {
        current.close(inner);
        return Err(FsError::NotADirectory);
    }
    if current.is_removed(inner) {
        current.close(inner);
        return Err(FsError::NotFound);
    }
    let dir = Directory::open(current);
    let next = dir.lookup(inner, token)?;
    dir.close(inner);
    next.ok_or(FsError::NotFound)
}

/// Resolves `path` to an open inode, starting from `cwd` for relative paths
/// or the root for absolute ones. Every token, including the last, is
/// looked up — this is the form `open`/`remove`/`chdir` use.
///
/// A path made of nothing but slashes (e.g. `"/"`) resolves to the start
/// directory itself, with no further lookup.
///
/// Fails with [`FsError::NotFound`] if any intermediate directory component
/// has already been unlinked (its `removed` flag is set), even while it is
/// still kept alive by an open handle elsewhere.
pub fn resolve(inner: &mut Inner, cwd: Inode, path: &str) -> Result<Inode, FsError> {
    if path.is_empty() {
        return Err(FsError::InvalidName);
    }

    let tokens = tokenize(path);
    let mut current = start_dir(inner, cwd, path)?;
    for token in tokens {
        current = step(inner, current, token)?;
    }
    Ok(current)
}

/// Resolves `path` to its parent directory (open) and its leaf component's
/// name, without looking the leaf up. This is the form `create` uses: the
/// leaf is expected not to already exist as an inode the caller has opened.
///
/// Fails on an empty path, a path with no leaf component (e.g. `"/"`), a
/// leaf name longer than [`NAME_MAX`], or a resolved parent (or any
/// intermediate component leading to it) that has already been unlinked.
pub fn resolve_parent(inner: &mut Inner, cwd: Inode, path: &str) -> Result<(Inode, String), FsError> {
    if path.is_empty() {
        return Err(FsError::InvalidName);
    }

    let mut tokens = tokenize(path);
    let leaf = tokens.pop().ok_or(FsError::InvalidName)?;
    if leaf.is_empty() || leaf.len() > NAME_MAX {
        return Err(FsError::InvalidName);
    }

    let mut current = start_dir(inner, cwd, path)?;
    for token in tokens {
        current = step(inner, current, token)?;
    }

    if !current.is_dir(inner) {
        current.close(inner);
        return Err(FsError::NotADirectory);
    }
    if current.is_removed(inner) {
        current.close(inner);
        return Err(FsError::NotFound);
    }

    Ok((current, leaf.to_owned()))
}
