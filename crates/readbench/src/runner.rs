// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::buffered::BufferedStrategy;
use crate::dispatcher::Dispatcher;
use crate::error::{ErrorKind, ReadError};
use crate::ledger::ResourceLedger;
use crate::options::BenchOptions;
use crate::overlapped::AsyncStrategy;
use crate::strategy::{ReadOutcome, ReadStrategy, StrategyKind};
use crate::unbuffered::UnbufferedStrategy;

/// The outcome of one benchmark invocation.
///
/// A result is produced for every invocation, failed or not. A failed invocation
/// carries the [`ErrorKind`] and message of the error that ended it; it read zero
/// bytes, `requested` is the refused length for allocation failures and zero otherwise,
/// and its elapsed time still covers everything up to the point where the resources
/// were released.
///
/// With the `serde` feature the path is serialized as a string, lossily if it is not
/// valid UTF-8.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BenchmarkResult {
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_path_lossy"))]
    path: PathBuf,
    mode: StrategyKind,
    bytes_read: u64,
    requested: u64,
    file_size: Option<u64>,
    elapsed_seconds: f64,
    succeeded: bool,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    error: Option<ErrorKind>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    message: Option<String>,
    short_read: bool,
}

impl BenchmarkResult {
    fn completed(path: &Path, mode: StrategyKind, file_size: u64, outcome: ReadOutcome, elapsed_seconds: f64) -> Self {
        Self {
            path: path.to_path_buf(),
            mode,
            bytes_read: outcome.transferred,
            requested: outcome.requested,
            file_size: Some(file_size),
            elapsed_seconds,
            succeeded: true,
            error: None,
            message: None,
            short_read: outcome.is_short(),
        }
    }

    fn failed(path: &Path, mode: StrategyKind, file_size: Option<u64>, error: &ReadError, elapsed_seconds: f64) -> Self {
        Self {
            path: path.to_path_buf(),
            mode,
            bytes_read: 0,
            requested: match error {
                ReadError::Allocation { len, .. } => *len,
                _ => 0,
            },
            file_size,
            elapsed_seconds,
            succeeded: false,
            error: Some(error.kind()),
            message: Some(error.to_string()),
            short_read: false,
        }
    }

    /// The benchmarked path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The strategy that was benchmarked.
    #[must_use]
    pub const fn mode(&self) -> StrategyKind {
        self.mode
    }

    /// Bytes the read transferred.
    #[must_use]
    pub const fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Bytes the read asked for: the file size for synchronous strategies, the window
    /// for the asynchronous one.
    #[must_use]
    pub const fn requested(&self) -> u64 {
        self.requested
    }

    /// Size of the file, if it was opened.
    #[must_use]
    pub const fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    /// Wall-clock seconds from just before the open to just after the release.
    #[must_use]
    pub const fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    /// Whether the invocation completed.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// What went wrong, if anything.
    #[must_use]
    pub const fn error(&self) -> Option<ErrorKind> {
        self.error
    }

    /// A human-readable description of the failure, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether fewer bytes were transferred than requested.
    #[must_use]
    pub const fn short_read(&self) -> bool {
        self.short_read
    }
}

/// Writes `path` as a string, replacing invalid UTF-8 sequences.
#[cfg(feature = "serde")]
pub(crate) fn serialize_path_lossy<S: serde::Serializer>(path: &Path, serializer: S) -> core::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

/// Drives read strategies end to end and times them.
///
/// Each invocation opens the file, allocates the destination buffer, reads, releases
/// everything and reports a [`BenchmarkResult`]. Errors never escape an invocation.
///
/// The runner owns a [`ResourceLedger`] every invocation accounts its handles and
/// buffers in, and a [`Dispatcher`] shared by all asynchronous invocations. Only the
/// dispatcher's threads are shared; each invocation owns its handle and buffer.
///
/// # Examples
///
/// ```no_run
/// use readbench::{BenchOptions, BenchmarkRunner, StrategyKind};
///
/// let runner = BenchmarkRunner::new(BenchOptions::default());
/// let result = runner.run_kind(StrategyKind::Buffered, "Lab4.txt");
/// println!("{} bytes in {:.6}s", result.bytes_read(), result.elapsed_seconds());
/// ```
#[derive(Debug)]
pub struct BenchmarkRunner {
    options: BenchOptions,
    ledger: ResourceLedger,
    dispatcher: Dispatcher,
}

impl Default for BenchmarkRunner {
    fn default() -> Self {
        Self::new(BenchOptions::default())
    }
}

impl BenchmarkRunner {
    /// Creates a runner with its own ledger and dispatcher.
    #[must_use]
    pub fn new(options: BenchOptions) -> Self {
        let dispatcher = Dispatcher::new(options.dispatcher_threads(), options.queue_capacity());
        Self {
            options,
            ledger: ResourceLedger::new(),
            dispatcher,
        }
    }

    /// The options this runner was created with.
    #[must_use]
    pub const fn options(&self) -> &BenchOptions {
        &self.options
    }

    /// The ledger all invocations account their resources in.
    #[must_use]
    pub const fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// The dispatcher asynchronous invocations submit to.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Benchmarks `strategy` against `path`.
    pub fn run<S: ReadStrategy>(&self, strategy: &S, path: impl AsRef<Path>) -> BenchmarkResult {
        let path = path.as_ref();
        let mode = strategy.kind();
        let mut file_size = None;

        let start = Instant::now();
        let outcome = strategy.open(path, &self.ledger).and_then(|handle| {
            let size = handle.size();
            file_size = Some(size);
            strategy.read_to_completion(handle, &self.ledger).map(|outcome| (size, outcome))
        });
        let elapsed_seconds = start.elapsed().as_secs_f64();

        match outcome {
            Ok((size, outcome)) => {
                if outcome.is_short() {
                    tracing::info!(
                        path = %path.display(),
                        %mode,
                        transferred = outcome.transferred,
                        requested = outcome.requested,
                        "short read"
                    );
                }
                tracing::debug!(path = %path.display(), %mode, bytes = outcome.transferred, elapsed_seconds, "read completed");
                BenchmarkResult::completed(path, mode, size, outcome, elapsed_seconds)
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), %mode, error = %e, "read failed");
                BenchmarkResult::failed(path, mode, file_size, &e, elapsed_seconds)
            }
        }
    }

    /// Benchmarks the strategy `kind`, configured from this runner's options, against
    /// `path`.
    pub fn run_kind(&self, kind: StrategyKind, path: impl AsRef<Path>) -> BenchmarkResult {
        let max = self.options.max_buffer_len();
        match kind {
            StrategyKind::Buffered => self.run(&BufferedStrategy::new(self.options.buffer_capacity(), max), path),
            StrategyKind::Unbuffered => self.run(&UnbufferedStrategy::new(max), path),
            StrategyKind::Async => self.run(
                &AsyncStrategy::new(
                    self.options.async_window(),
                    self.options.completion_timeout(),
                    max,
                    self.dispatcher.clone(),
                ),
                path,
            ),
        }
    }

    /// Benchmarks every strategy against `path`, in [`StrategyKind::ALL`] order.
    pub fn run_all(&self, path: impl AsRef<Path>) -> Vec<BenchmarkResult> {
        let path = path.as_ref();
        StrategyKind::ALL.into_iter().map(|kind| self.run_kind(kind, path)).collect()
    }
}
