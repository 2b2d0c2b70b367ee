// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::num::NonZeroUsize;
use core::time::Duration;

/// Capacity of the `BufReader` used by the buffered strategy.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8192;

/// Size of the destination window used by the asynchronous strategy.
pub const DEFAULT_ASYNC_WINDOW: usize = 1024;

/// Upper bound on dispatcher worker threads.
pub const DEFAULT_DISPATCHER_THREADS: usize = 4;

/// Tunables for a [`BenchmarkRunner`](crate::BenchmarkRunner).
///
/// The defaults reproduce the classic setup: an 8 KiB buffering layer, a 1 KiB async
/// window, no buffer cap and an unbounded wait for async completion.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use readbench::BenchOptions;
///
/// let options = BenchOptions::default()
///     .with_async_window(4096)
///     .with_completion_timeout(Duration::from_secs(5));
/// assert_eq!(options.async_window(), 4096);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenchOptions {
    buffer_capacity: NonZeroUsize,
    async_window: usize,
    completion_timeout: Option<Duration>,
    max_buffer_len: Option<u64>,
    dispatcher_threads: NonZeroUsize,
    queue_capacity: Option<usize>,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: NonZeroUsize::new(DEFAULT_BUFFER_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            async_window: DEFAULT_ASYNC_WINDOW,
            completion_timeout: None,
            max_buffer_len: None,
            dispatcher_threads: NonZeroUsize::new(DEFAULT_DISPATCHER_THREADS).unwrap_or(NonZeroUsize::MIN),
            queue_capacity: None,
        }
    }
}

impl BenchOptions {
    /// Capacity of the buffering layer used by the buffered strategy.
    #[must_use]
    pub const fn buffer_capacity(&self) -> usize {
        self.buffer_capacity.get()
    }

    /// Size of the window the asynchronous strategy reads into.
    #[must_use]
    pub const fn async_window(&self) -> usize {
        self.async_window
    }

    /// Bound on the wait for async completion, if any.
    #[must_use]
    pub const fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout
    }

    /// Largest read buffer any strategy may allocate, if capped.
    #[must_use]
    pub const fn max_buffer_len(&self) -> Option<u64> {
        self.max_buffer_len
    }

    /// Upper bound on dispatcher worker threads.
    #[must_use]
    pub const fn dispatcher_threads(&self) -> usize {
        self.dispatcher_threads.get()
    }

    /// Number of requests that may wait in the dispatcher queue, if bounded.
    #[must_use]
    pub const fn queue_capacity(&self) -> Option<usize> {
        self.queue_capacity
    }

    /// Sets the capacity of the buffering layer. Zero is raised to one byte.
    #[must_use]
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Sets the async window. A zero window makes every async read fail with an
    /// allocation error.
    #[must_use]
    pub const fn with_async_window(mut self, window: usize) -> Self {
        self.async_window = window;
        self
    }

    /// Bounds the wait for async completion; the outstanding request is canceled when
    /// the bound expires.
    #[must_use]
    pub const fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = Some(timeout);
        self
    }

    /// Removes the bound on the wait for async completion.
    #[must_use]
    pub const fn without_completion_timeout(mut self) -> Self {
        self.completion_timeout = None;
        self
    }

    /// Caps the size of any read buffer. Files larger than the cap fail with an
    /// allocation error.
    #[must_use]
    pub const fn with_max_buffer_len(mut self, len: u64) -> Self {
        self.max_buffer_len = Some(len);
        self
    }

    /// Sets the upper bound on dispatcher worker threads. Zero is raised to one.
    #[must_use]
    pub fn with_dispatcher_threads(mut self, threads: usize) -> Self {
        self.dispatcher_threads = NonZeroUsize::new(threads).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Bounds the dispatcher queue; submissions beyond it are rejected. Zero is raised
    /// to one.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity.max(1));
        self
    }
}
