// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Read};
use std::path::Path;

use crate::buffer::ReadBuffer;
use crate::error::{ReadError, Result};
use crate::handle::FileHandle;
use crate::ledger::ResourceLedger;
use crate::strategy::{ReadOutcome, ReadStrategy, StrategyKind};

/// Reads the whole file with a single direct read call.
///
/// The file is opened without any buffering layer and with a sequential-access hint,
/// its size comes from a metadata query and one read call asks for all of it. The
/// operating system may transfer fewer bytes than asked for; that is reported as a
/// short read rather than retried.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnbufferedStrategy {
    max_buffer_len: Option<u64>,
}

impl UnbufferedStrategy {
    /// Creates an unbuffered strategy refusing files larger than `max_buffer_len`.
    #[must_use]
    pub const fn new(max_buffer_len: Option<u64>) -> Self {
        Self { max_buffer_len }
    }
}

impl ReadStrategy for UnbufferedStrategy {
    type Source = File;

    fn kind(&self) -> StrategyKind {
        StrategyKind::Unbuffered
    }

    fn open(&self, path: &Path, ledger: &ResourceLedger) -> Result<FileHandle<Self::Source>> {
        let file = open_sequential(path).map_err(|source| ReadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let size = file
            .metadata()
            .map_err(|source| ReadError::SizeQuery {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        advise_sequential(&file, path);

        Ok(FileHandle::new(file, path, size, StrategyKind::Unbuffered, ledger))
    }

    fn read_to_completion(&self, mut handle: FileHandle<Self::Source>, ledger: &ResourceLedger) -> Result<ReadOutcome> {
        let requested = handle.size();
        let mut buffer = ReadBuffer::allocate(requested, self.max_buffer_len, ledger)?;

        let transferred = read_once(handle.source_mut(), buffer.as_mut_slice()).map_err(|source| ReadError::Read {
            path: handle.path().to_path_buf(),
            source,
        })?;

        drop(buffer);
        drop(handle);

        Ok(ReadOutcome {
            transferred: transferred as u64,
            requested,
        })
    }
}

/// Issues one read call; only an interrupted call is reissued.
fn read_once(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        match file.read(buf) {
            Err(e) if e.kind() == IoErrorKind::Interrupted => {}
            other => return other,
        }
    }
}

#[cfg(windows)]
fn open_sequential(path: &Path) -> std::io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;

    use windows_sys::Win32::Storage::FileSystem::FILE_FLAG_SEQUENTIAL_SCAN;

    OpenOptions::new()
        .read(true)
        .custom_flags(FILE_FLAG_SEQUENTIAL_SCAN)
        .open(path)
}

#[cfg(not(windows))]
fn open_sequential(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

/// Tells the kernel the whole file will be read front to back.
///
/// The hint is advice; failing to apply it does not fail the read.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn advise_sequential(file: &File, path: &Path) {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file`, which outlives this call.
    let rc = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL) };
    if rc != 0 {
        tracing::warn!(
            path = %path.display(),
            error = %std::io::Error::from_raw_os_error(rc),
            "sequential access hint ignored"
        );
    }
}

/// On Windows the hint is part of the open flags; elsewhere there is none to give.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn advise_sequential(_file: &File, _path: &Path) {}
