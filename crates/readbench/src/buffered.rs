// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs::File;
use std::io::{BufReader, ErrorKind as IoErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use crate::buffer::ReadBuffer;
use crate::error::{ReadError, Result};
use crate::handle::FileHandle;
use crate::ledger::ResourceLedger;
use crate::options::DEFAULT_BUFFER_CAPACITY;
use crate::strategy::{ReadOutcome, ReadStrategy, StrategyKind};

/// Reads the whole file through a `BufReader`.
///
/// The size is probed by seeking to the end and back to the start, a buffer of exactly
/// that size is allocated and filled in one logical read.
#[derive(Clone, Copy, Debug)]
pub struct BufferedStrategy {
    capacity: usize,
    max_buffer_len: Option<u64>,
}

impl Default for BufferedStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, None)
    }
}

impl BufferedStrategy {
    /// Creates a buffered strategy with a buffering layer of `capacity` bytes, refusing
    /// files larger than `max_buffer_len`.
    #[must_use]
    pub const fn new(capacity: usize, max_buffer_len: Option<u64>) -> Self {
        Self { capacity, max_buffer_len }
    }
}

impl ReadStrategy for BufferedStrategy {
    type Source = BufReader<File>;

    fn kind(&self) -> StrategyKind {
        StrategyKind::Buffered
    }

    fn open(&self, path: &Path, ledger: &ResourceLedger) -> Result<FileHandle<Self::Source>> {
        let file = File::open(path).map_err(|source| ReadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::with_capacity(self.capacity, file);

        let size_query = |source| ReadError::SizeQuery {
            path: path.to_path_buf(),
            source,
        };
        let size = reader.seek(SeekFrom::End(0)).map_err(size_query)?;
        let _ = reader.seek(SeekFrom::Start(0)).map_err(size_query)?;

        Ok(FileHandle::new(reader, path, size, StrategyKind::Buffered, ledger))
    }

    fn read_to_completion(&self, mut handle: FileHandle<Self::Source>, ledger: &ResourceLedger) -> Result<ReadOutcome> {
        let requested = handle.size();
        let mut buffer = ReadBuffer::allocate(requested, self.max_buffer_len, ledger)?;

        let transferred = fill(handle.source_mut(), buffer.as_mut_slice()).map_err(|source| ReadError::Read {
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

/// Reads until `buf` is full or the source reports end of file.
pub(crate) fn fill(source: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match source.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
