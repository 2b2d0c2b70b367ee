// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use crate::error::{AllocationFailure, ReadError, Result};
use crate::ledger::{Lease, ResourceLedger};

/// A contiguous, zero-initialized destination region for one read.
///
/// The buffer is owned by the benchmark invocation that allocated it and is released
/// exactly once, when dropped. Allocation is fallible: a zero length, a length above
/// the configured cap or a length the allocator refuses all produce
/// [`ReadError::Allocation`] instead of aborting the process.
pub struct ReadBuffer {
    bytes: Vec<u8>,
    _lease: Lease,
}

impl ReadBuffer {
    /// Allocates a buffer of exactly `len` bytes.
    ///
    /// `limit` caps the length that may be requested; `None` means no cap beyond what the
    /// allocator can provide.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Allocation`] if `len` is zero, above `limit`, larger than the
    /// address space or cannot be satisfied by the allocator.
    pub fn allocate(len: u64, limit: Option<u64>, ledger: &ResourceLedger) -> Result<Self> {
        let refuse = |reason| ReadError::Allocation { len, reason };

        if len == 0 {
            return Err(refuse(AllocationFailure::Empty));
        }
        if let Some(limit) = limit
            && len > limit
        {
            return Err(refuse(AllocationFailure::AboveLimit { limit }));
        }
        let capacity = usize::try_from(len).map_err(|_| refuse(AllocationFailure::Overflow))?;

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(capacity)
            .map_err(|_| refuse(AllocationFailure::OutOfMemory))?;
        bytes.resize(capacity, 0);

        Ok(Self {
            bytes,
            _lease: ledger.lease_buffer(),
        })
    }

    /// Length of the buffer in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false`; zero-length buffers are refused at allocation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The buffer contents.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// The buffer contents, writable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl fmt::Debug for ReadBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadBuffer").field("len", &self.bytes.len()).finish()
    }
}
