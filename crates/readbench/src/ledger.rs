// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
struct Counter {
    live: AtomicUsize,
    peak: AtomicUsize,
    acquired: AtomicUsize,
}

impl Counter {
    fn acquire(&self) {
        let live = self.live.fetch_add(1, Ordering::AcqRel) + 1;
        let _ = self.acquired.fetch_add(1, Ordering::Relaxed);
        let _ = self.peak.fetch_max(live, Ordering::AcqRel);
    }

    fn release(&self) {
        let prev = self.live.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "resource released more often than acquired");
    }
}

#[derive(Default)]
struct LedgerInner {
    handles: Counter,
    buffers: Counter,
}

/// Accounting of the file handles and read buffers acquired by benchmark invocations.
///
/// Every [`FileHandle`](crate::FileHandle) and [`ReadBuffer`](crate::ReadBuffer) holds a
/// lease on a ledger for as long as it is alive. Between invocations both live counts
/// are back to zero; a non-zero count after an invocation returned means a resource
/// outlived it.
///
/// Cloning the ledger is inexpensive and all clones share the same counters.
#[derive(Clone, Default)]
pub struct ResourceLedger {
    inner: Arc<LedgerInner>,
}

impl ResourceLedger {
    /// Creates a ledger with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of file handles currently open.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.inner.handles.live.load(Ordering::Acquire)
    }

    /// Number of read buffers currently allocated.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.inner.buffers.live.load(Ordering::Acquire)
    }

    /// Highest number of file handles that were open at the same time.
    #[must_use]
    pub fn peak_handles(&self) -> usize {
        self.inner.handles.peak.load(Ordering::Acquire)
    }

    /// Highest number of read buffers that were allocated at the same time.
    #[must_use]
    pub fn peak_buffers(&self) -> usize {
        self.inner.buffers.peak.load(Ordering::Acquire)
    }

    /// Total number of file handles ever opened under this ledger.
    #[must_use]
    pub fn handles_acquired(&self) -> usize {
        self.inner.handles.acquired.load(Ordering::Relaxed)
    }

    /// Total number of read buffers ever allocated under this ledger.
    #[must_use]
    pub fn buffers_acquired(&self) -> usize {
        self.inner.buffers.acquired.load(Ordering::Relaxed)
    }

    /// Whether every acquired handle and buffer has been released.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.open_handles() == 0 && self.live_buffers() == 0
    }

    pub(crate) fn lease_handle(&self) -> Lease {
        self.inner.handles.acquire();
        Lease {
            ledger: self.clone(),
            resource: Resource::Handle,
        }
    }

    pub(crate) fn lease_buffer(&self) -> Lease {
        self.inner.buffers.acquire();
        Lease {
            ledger: self.clone(),
            resource: Resource::Buffer,
        }
    }
}

impl fmt::Debug for ResourceLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLedger")
            .field("open_handles", &self.open_handles())
            .field("live_buffers", &self.live_buffers())
            .field("peak_handles", &self.peak_handles())
            .field("peak_buffers", &self.peak_buffers())
            .finish()
    }
}

#[derive(Clone, Copy, Debug)]
enum Resource {
    Handle,
    Buffer,
}

/// Keeps one resource counted as live until dropped.
#[derive(Debug)]
pub(crate) struct Lease {
    ledger: ResourceLedger,
    resource: Resource,
}

impl Drop for Lease {
    fn drop(&mut self) {
        match self.resource {
            Resource::Handle => self.ledger.inner.handles.release(),
            Resource::Buffer => self.ledger.inner.buffers.release(),
        }
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(ResourceLedger: Send, Sync);
    }

    #[test]
    fn lease_counts_until_dropped() {
        let ledger = ResourceLedger::new();
        assert!(ledger.is_balanced());

        let handle = ledger.lease_handle();
        let buffer = ledger.lease_buffer();
        assert_eq!(ledger.open_handles(), 1);
        assert_eq!(ledger.live_buffers(), 1);
        assert!(!ledger.is_balanced());

        drop(buffer);
        assert_eq!(ledger.live_buffers(), 0);
        drop(handle);
        assert!(ledger.is_balanced());
    }

    #[test]
    fn peak_and_totals_survive_release() {
        let ledger = ResourceLedger::new();
        let a = ledger.lease_handle();
        let b = ledger.lease_handle();
        drop(a);
        drop(b);
        let c = ledger.lease_handle();
        drop(c);

        assert_eq!(ledger.peak_handles(), 2);
        assert_eq!(ledger.handles_acquired(), 3);
        assert_eq!(ledger.peak_buffers(), 0);
        assert!(ledger.is_balanced());
    }

    #[test]
    fn clones_share_counters() {
        let ledger = ResourceLedger::new();
        let clone = ledger.clone();
        let lease = clone.lease_buffer();
        assert_eq!(ledger.live_buffers(), 1);
        drop(lease);
        assert_eq!(ledger.live_buffers(), 0);
        assert_eq!(ledger.buffers_acquired(), 1);
    }
}
