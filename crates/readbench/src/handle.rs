// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::ledger::{Lease, ResourceLedger};
use crate::strategy::StrategyKind;

/// An open file, its known size and the strategy that opened it.
///
/// The handle is generic over the source it reads from: the buffered strategy wraps the
/// file in a `BufReader`, the other strategies read the `std::fs::File` directly.
///
/// A `FileHandle` is exclusively owned by one benchmark invocation and closes the file
/// when dropped, so it is released on every exit path, including early error returns.
pub struct FileHandle<S> {
    source: S,
    path: PathBuf,
    size: u64,
    mode: StrategyKind,
    _lease: Lease,
}

impl<S> FileHandle<S> {
    pub(crate) fn new(source: S, path: &Path, size: u64, mode: StrategyKind, ledger: &ResourceLedger) -> Self {
        tracing::debug!(path = %path.display(), size, %mode, "file opened");
        Self {
            source,
            path: path.to_path_buf(),
            size,
            mode,
            _lease: ledger.lease_handle(),
        }
    }

    /// Length of the file in bytes, as determined when it was opened.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// The strategy that opened the file.
    #[must_use]
    pub const fn mode(&self) -> StrategyKind {
        self.mode
    }

    /// The path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// The underlying source, mutably.
    pub const fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S> fmt::Debug for FileHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<S> Drop for FileHandle<S> {
    fn drop(&mut self) {
        tracing::trace!(path = %self.path.display(), mode = %self.mode, "file closed");
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(FileHandle<File>: Send, Sync);
    }

    #[test]
    fn drop_releases_lease() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"1234567890").unwrap();
        let ledger = ResourceLedger::new();

        let file = File::open(tmp.path()).unwrap();
        let handle = FileHandle::new(file, tmp.path(), 10, StrategyKind::Unbuffered, &ledger);
        assert_eq!(handle.size(), 10);
        assert_eq!(handle.mode(), StrategyKind::Unbuffered);
        assert_eq!(handle.path(), tmp.path());
        assert_eq!(ledger.open_handles(), 1);

        drop(handle);
        assert!(ledger.is_balanced());
        assert_eq!(ledger.handles_acquired(), 1);
    }

    #[test]
    fn file_is_closed_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("closed.bin");
        std::fs::write(&path, b"x").unwrap();
        let ledger = ResourceLedger::new();

        {
            let file = File::open(&path).unwrap();
            let _handle = FileHandle::new(file, &path, 1, StrategyKind::Buffered, &ledger);
        }

        // With the handle gone the file can be removed on every platform.
        std::fs::remove_file(&path).unwrap();
        assert!(ledger.is_balanced());
    }
}
