// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::time::Duration;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::ReadBuffer;
use crate::dispatcher::Dispatcher;
use crate::error::{ErrorKind, ReadError, Result};
use crate::handle::FileHandle;
use crate::ledger::ResourceLedger;
use crate::options::DEFAULT_ASYNC_WINDOW;
use crate::strategy::{ReadOutcome, ReadStrategy, StrategyKind};

/// Where an [`OverlappedRead`] is in its lifecycle.
///
/// ```text
/// Idle --submit--> Submitted --complete--> Completed
///   |                  |
///   +--rejected--------+--error / timeout / cancel--> Failed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadState {
    /// Created but not yet submitted.
    Idle,
    /// Accepted by the dispatcher and not yet settled.
    Submitted,
    /// Finished; `transferred` bytes landed in the window.
    Completed {
        /// Bytes the operating system reported as transferred.
        transferred: usize,
    },
    /// Rejected at submission, failed after acceptance, timed out or canceled.
    Failed(ErrorKind),
}

/// The file and window a request reads with, until a worker claims them.
struct Request {
    handle: FileHandle<File>,
    window: ReadBuffer,
}

type Completion = io::Result<usize>;

/// One asynchronous positional read of a fixed window at the start of a file.
///
/// Submission hands the request to a [`Dispatcher`] and returns before any data moves;
/// completion is observed separately through [`poll`](Self::poll) or
/// [`wait`](Self::wait). The file handle and window are owned by the request: the
/// worker that executes it releases them before it reports completion, and a request
/// that is canceled before a worker claims it releases them on the canceling thread.
/// Either way they are gone by the time the request settles.
///
/// Only the first `window.len()` bytes are read, with a single read call. Files larger
/// than the window are not drained.
pub struct OverlappedRead {
    state: ReadState,
    request: Arc<Mutex<Option<Request>>>,
    completion: Option<flume::Receiver<Completion>>,
    requested: usize,
}

impl OverlappedRead {
    /// Prepares a read of `window.len()` bytes from the start of the file behind `handle`.
    #[must_use]
    pub fn new(handle: FileHandle<File>, window: ReadBuffer) -> Self {
        let requested = window.len();
        Self {
            state: ReadState::Idle,
            request: Arc::new(Mutex::new(Some(Request { handle, window }))),
            completion: None,
            requested,
        }
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> ReadState {
        self.state
    }

    /// Bytes the request asks for.
    #[must_use]
    pub const fn requested(&self) -> usize {
        self.requested
    }

    /// Hands the request to `dispatcher` without waiting for it to run.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Submission`] if the request is not idle or the dispatcher
    /// refuses it. A refused request moves straight to `Failed` and its handle and
    /// window are released before this returns.
    pub fn submit(&mut self, dispatcher: &Dispatcher) -> Result<()> {
        if self.state != ReadState::Idle {
            return Err(ReadError::Submission {
                reason: format!("request is {:?}, not idle", self.state),
            });
        }

        let (tx, rx) = flume::bounded(1);
        let slot = Arc::clone(&self.request);
        let job = move || {
            let Some(request) = slot.lock().take() else {
                // Canceled while queued.
                return;
            };
            let Request { handle, mut window } = request;
            let result = read_at(handle.source(), window.as_mut_slice(), 0);
            drop(window);
            drop(handle);
            let _ = tx.send(result);
        };

        if let Err(e) = dispatcher.submit(Box::new(job)) {
            drop(self.request.lock().take());
            self.transition(ReadState::Failed(ErrorKind::Submission));
            return Err(ReadError::Submission { reason: e.to_string() });
        }

        self.completion = Some(rx);
        self.transition(ReadState::Submitted);
        Ok(())
    }

    /// Checks for completion without blocking.
    ///
    /// Returns `None` while the request is still in flight and the settled result
    /// otherwise.
    ///
    /// # Errors
    ///
    /// The returned result carries [`ReadError::Completion`] if the read failed.
    pub fn poll(&mut self) -> Option<Result<usize>> {
        match self.state {
            ReadState::Submitted => {}
            other => return Some(settled(other)),
        }

        let received = match self.completion.as_ref()?.try_recv() {
            Ok(result) => Some(result),
            Err(flume::TryRecvError::Empty) => return None,
            Err(flume::TryRecvError::Disconnected) => None,
        };
        Some(self.settle(received))
    }

    /// Blocks the calling thread until the request settles, or until `timeout` expires.
    ///
    /// When the timeout expires the request is canceled and, if a worker already
    /// claimed it, the in-flight read is waited out so that the handle and window are
    /// released before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Completion`] if the read failed, [`ReadError::TimedOut`] if
    /// the timeout expired, or the error of an earlier settlement.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<usize> {
        if self.state != ReadState::Submitted {
            return settled(self.state);
        }
        let Some(rx) = self.completion.as_ref() else {
            return settled(self.state);
        };

        let received = match timeout {
            None => rx.recv().ok(),
            Some(limit) => match rx.recv_timeout(limit) {
                Ok(result) => Some(result),
                Err(flume::RecvTimeoutError::Disconnected) => None,
                Err(flume::RecvTimeoutError::Timeout) => return self.expire(limit),
            },
        };
        self.settle(received)
    }

    /// Settles a request whose wait bound expired.
    ///
    /// A completion that was delivered after the bound but before this point is
    /// settled normally. Otherwise the request is abandoned and reported as timed out.
    fn expire(&mut self, limit: Duration) -> Result<usize> {
        if let Some(Ok(received)) = self.completion.as_ref().map(flume::Receiver::try_recv) {
            return self.settle(Some(received));
        }

        tracing::debug!(limit_ms = limit.as_millis(), "async read timed out");
        let _ = self.abandon();
        self.transition(ReadState::Failed(ErrorKind::TimedOut));
        Err(ReadError::TimedOut { limit })
    }

    /// Cancels an outstanding request.
    ///
    /// Returns `true` if the request was reclaimed before a worker started it. If a
    /// worker is already reading, this blocks until that read finishes and returns
    /// `false`. Either way the request ends in `Failed(Canceled)` with its resources
    /// released. Has no effect unless the request is submitted.
    pub fn cancel(&mut self) -> bool {
        if self.state != ReadState::Submitted {
            return false;
        }
        let reclaimed = self.abandon();
        self.transition(ReadState::Failed(ErrorKind::Canceled));
        reclaimed
    }

    /// Takes the request back if no worker has claimed it, otherwise waits for the
    /// claiming worker to finish with it.
    fn abandon(&mut self) -> bool {
        let reclaimed = self.request.lock().take();
        let completion = self.completion.take();
        match (reclaimed, completion) {
            (Some(request), _) => {
                drop(request);
                true
            }
            (None, Some(rx)) => {
                // The worker releases the request before it reports.
                let _ = rx.recv();
                false
            }
            (None, None) => false,
        }
    }

    fn settle(&mut self, received: Option<Completion>) -> Result<usize> {
        self.completion = None;
        match received {
            Some(Ok(transferred)) => {
                self.transition(ReadState::Completed { transferred });
                Ok(transferred)
            }
            Some(Err(source)) => {
                self.transition(ReadState::Failed(ErrorKind::Completion));
                Err(ReadError::Completion { source })
            }
            None => {
                self.transition(ReadState::Failed(ErrorKind::Completion));
                Err(ReadError::Completion {
                    source: io::Error::other("request dropped by the dispatcher"),
                })
            }
        }
    }

    fn transition(&mut self, next: ReadState) {
        tracing::trace!(from = ?self.state, to = ?next, "async read state change");
        self.state = next;
    }
}

impl std::fmt::Debug for OverlappedRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlappedRead")
            .field("state", &self.state)
            .field("requested", &self.requested)
            .finish_non_exhaustive()
    }
}

impl Drop for OverlappedRead {
    fn drop(&mut self) {
        // Never leave a claimed handle or window behind the caller's back.
        let _ = self.cancel();
    }
}

/// The result a request that already left `Submitted` reports again.
fn settled(state: ReadState) -> Result<usize> {
    match state {
        ReadState::Completed { transferred } => Ok(transferred),
        ReadState::Idle => Err(ReadError::Submission {
            reason: "request was never submitted".to_owned(),
        }),
        ReadState::Failed(ErrorKind::Canceled) => Err(ReadError::Canceled),
        ReadState::Failed(kind) => Err(ReadError::Completion {
            source: io::Error::other(format!("request already failed: {kind}")),
        }),
        ReadState::Submitted => Err(ReadError::Completion {
            source: io::Error::other("request still in flight"),
        }),
    }
}

/// Reads bytes at `offset` without affecting the cursor.
#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

/// Reads bytes at `offset` without affecting the cursor.
#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

/// Reads a fixed window from the start of the file on a dispatcher thread and waits for
/// it to complete.
///
/// The window defaults to 1 KiB and is not grown to the file size: for files larger
/// than the window only the first `window` bytes are transferred.
#[derive(Clone, Debug)]
pub struct AsyncStrategy {
    window: usize,
    timeout: Option<Duration>,
    max_buffer_len: Option<u64>,
    dispatcher: Dispatcher,
}

impl Default for AsyncStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_ASYNC_WINDOW, None, None, Dispatcher::default())
    }
}

impl AsyncStrategy {
    /// Creates an async strategy reading `window` bytes through `dispatcher`, waiting at
    /// most `timeout` for completion.
    #[must_use]
    pub const fn new(window: usize, timeout: Option<Duration>, max_buffer_len: Option<u64>, dispatcher: Dispatcher) -> Self {
        Self {
            window,
            timeout,
            max_buffer_len,
            dispatcher,
        }
    }

    /// The dispatcher requests are submitted to.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl ReadStrategy for AsyncStrategy {
    type Source = File;

    fn kind(&self) -> StrategyKind {
        StrategyKind::Async
    }

    fn open(&self, path: &Path, ledger: &ResourceLedger) -> Result<FileHandle<Self::Source>> {
        let file = File::open(path).map_err(|source| ReadError::Open {
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
        Ok(FileHandle::new(file, path, size, StrategyKind::Async, ledger))
    }

    fn read_to_completion(&self, handle: FileHandle<Self::Source>, ledger: &ResourceLedger) -> Result<ReadOutcome> {
        let window = ReadBuffer::allocate(self.window as u64, self.max_buffer_len, ledger)?;
        let requested = window.len() as u64;

        let mut read = OverlappedRead::new(handle, window);
        read.submit(&self.dispatcher)?;
        tracing::debug!(requested, "async read submitted");
        let transferred = read.wait(self.timeout)?;

        Ok(ReadOutcome {
            transferred: transferred as u64,
            requested,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Instant;

    use static_assertions::assert_impl_all;

    use super::*;

    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    fn file_with(data: &[u8]) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(data).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    fn prepare(tmp: &tempfile::NamedTempFile, window: u64, ledger: &ResourceLedger) -> OverlappedRead {
        let handle = AsyncStrategy::default().open(tmp.path(), ledger).unwrap();
        let window = ReadBuffer::allocate(window, None, ledger).unwrap();
        OverlappedRead::new(handle, window)
    }

    /// Occupies the only worker of `dispatcher` until the returned sender is used or dropped.
    fn block_worker(dispatcher: &Dispatcher) -> flume::Sender<()> {
        let (release_tx, release_rx) = flume::bounded::<()>(1);
        let (started_tx, started_rx) = flume::bounded(1);
        dispatcher
            .submit(Box::new(move || {
                started_tx.send(()).unwrap();
                let _ = release_rx.recv();
            }))
            .unwrap();
        started_rx.recv_timeout(TEST_TIMEOUT).unwrap();
        release_tx
    }

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(OverlappedRead: Send);
        assert_impl_all!(AsyncStrategy: Send, Sync);
    }

    #[test]
    fn idle_submitted_completed() {
        let tmp = file_with(b"hello async world");
        let ledger = ResourceLedger::new();
        let dispatcher = Dispatcher::default();

        let mut read = prepare(&tmp, 1024, &ledger);
        assert_eq!(read.state(), ReadState::Idle);
        assert_eq!(read.requested(), 1024);

        read.submit(&dispatcher).unwrap();
        assert_eq!(read.state(), ReadState::Submitted);

        let transferred = read.wait(Some(TEST_TIMEOUT)).unwrap();
        assert_eq!(transferred, 17);
        assert_eq!(read.state(), ReadState::Completed { transferred: 17 });
        assert!(ledger.is_balanced());

        // Settled requests report the same outcome again.
        assert_eq!(read.wait(None).unwrap(), 17);
    }

    #[test]
    fn window_smaller_than_file_is_a_partial_read() {
        let tmp = file_with(&[9u8; 5000]);
        let ledger = ResourceLedger::new();
        let dispatcher = Dispatcher::default();

        let mut read = prepare(&tmp, 1024, &ledger);
        read.submit(&dispatcher).unwrap();
        assert_eq!(read.wait(Some(TEST_TIMEOUT)).unwrap(), 1024);
    }

    #[test]
    fn rejected_submission_fails_and_releases() {
        let tmp = file_with(b"data");
        let ledger = ResourceLedger::new();
        let dispatcher = Dispatcher::default();
        dispatcher.close();

        let mut read = prepare(&tmp, 64, &ledger);
        let err = read.submit(&dispatcher).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Submission);
        assert_eq!(read.state(), ReadState::Failed(ErrorKind::Submission));
        assert!(ledger.is_balanced());
    }

    #[test]
    fn double_submission_is_rejected() {
        let tmp = file_with(b"data");
        let ledger = ResourceLedger::new();
        let dispatcher = Dispatcher::default();

        let mut read = prepare(&tmp, 64, &ledger);
        read.submit(&dispatcher).unwrap();
        let err = read.submit(&dispatcher).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Submission);
        assert_eq!(read.wait(Some(TEST_TIMEOUT)).unwrap(), 4);
    }

    #[test]
    fn wait_before_submit_is_an_error() {
        let tmp = file_with(b"data");
        let ledger = ResourceLedger::new();
        let mut read = prepare(&tmp, 64, &ledger);
        assert_eq!(read.wait(None).unwrap_err().kind(), ErrorKind::Submission);
        assert_eq!(read.state(), ReadState::Idle);
    }

    #[test]
    fn poll_reports_in_flight_then_completion() {
        let tmp = file_with(b"polling");
        let ledger = ResourceLedger::new();
        let dispatcher = Dispatcher::new(1, None);
        let release = block_worker(&dispatcher);

        let mut read = prepare(&tmp, 64, &ledger);
        read.submit(&dispatcher).unwrap();
        assert!(read.poll().is_none());
        assert_eq!(read.state(), ReadState::Submitted);

        release.send(()).unwrap();

        let deadline = Instant::now() + TEST_TIMEOUT;
        let transferred = loop {
            if let Some(result) = read.poll() {
                break result.unwrap();
            }
            assert!(Instant::now() < deadline, "request never completed");
            std::thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(transferred, 7);
        assert!(ledger.is_balanced());
    }

    #[test]
    fn timeout_cancels_queued_request() {
        let tmp = file_with(b"never read");
        let ledger = ResourceLedger::new();
        let dispatcher = Dispatcher::new(1, None);
        let release = block_worker(&dispatcher);

        let mut read = prepare(&tmp, 64, &ledger);
        read.submit(&dispatcher).unwrap();
        let err = read.wait(Some(Duration::from_millis(20))).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert_eq!(read.state(), ReadState::Failed(ErrorKind::TimedOut));
        // The queued request was reclaimed, so nothing is left open.
        assert!(ledger.is_balanced());

        release.send(()).unwrap();
    }

    #[test]
    fn cancel_reclaims_queued_request() {
        let tmp = file_with(b"abc");
        let ledger = ResourceLedger::new();
        let dispatcher = Dispatcher::new(1, None);
        let release = block_worker(&dispatcher);

        let mut read = prepare(&tmp, 64, &ledger);
        read.submit(&dispatcher).unwrap();
        assert!(read.cancel());
        assert_eq!(read.state(), ReadState::Failed(ErrorKind::Canceled));
        assert_eq!(read.wait(None).unwrap_err().kind(), ErrorKind::Canceled);
        assert!(ledger.is_balanced());

        // Canceling again is a no-op.
        assert!(!read.cancel());
        release.send(()).unwrap();
    }

    #[test]
    fn cancel_waits_for_claimed_request() {
        let tmp = file_with(b"claimed");
        let ledger = ResourceLedger::new();
        let dispatcher = Dispatcher::new(1, None);
        let release = block_worker(&dispatcher);

        let mut read = prepare(&tmp, 64, &ledger);
        read.submit(&dispatcher).unwrap();

        // Claim the request as a worker would and finish with it on another thread.
        let claimed = read.request.lock().take().unwrap();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            drop(claimed);
            release.send(()).unwrap();
        });

        assert!(!read.cancel());
        assert_eq!(read.state(), ReadState::Failed(ErrorKind::Canceled));
        assert!(ledger.is_balanced());
        worker.join().unwrap();
    }

    #[test]
    fn timeout_waits_for_claimed_request() {
        let tmp = file_with(b"claimed");
        let ledger = ResourceLedger::new();
        let dispatcher = Dispatcher::new(1, None);
        let release = block_worker(&dispatcher);

        let mut read = prepare(&tmp, 64, &ledger);
        read.submit(&dispatcher).unwrap();

        let claimed = read.request.lock().take().unwrap();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            drop(claimed);
            release.send(()).unwrap();
        });

        let err = read.wait(Some(Duration::from_millis(10))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert_eq!(read.state(), ReadState::Failed(ErrorKind::TimedOut));
        assert!(ledger.is_balanced());
        worker.join().unwrap();
    }

    #[test]
    fn completion_delivered_after_deadline_is_settled() {
        let tmp = file_with(b"late");
        let ledger = ResourceLedger::new();
        let dispatcher = Dispatcher::new(1, None);

        let mut read = prepare(&tmp, 64, &ledger);
        read.submit(&dispatcher).unwrap();

        let deadline = Instant::now() + TEST_TIMEOUT;
        while dispatcher.pending_count() != 0 {
            assert!(Instant::now() < deadline, "request never completed");
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(read.expire(Duration::ZERO).unwrap(), 4);
        assert_eq!(read.state(), ReadState::Completed { transferred: 4 });
        assert!(ledger.is_balanced());
    }

    #[test]
    fn drop_while_submitted_releases_resources() {
        let tmp = file_with(b"abc");
        let ledger = ResourceLedger::new();
        let dispatcher = Dispatcher::new(1, None);
        let release = block_worker(&dispatcher);

        let mut read = prepare(&tmp, 64, &ledger);
        read.submit(&dispatcher).unwrap();
        drop(read);
        assert!(ledger.is_balanced());
        release.send(()).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn read_error_after_acceptance_is_completion_error() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ResourceLedger::new();
        let dispatcher = Dispatcher::default();

        // Directories open fine on Unix but refuse to be read.
        let handle = AsyncStrategy::default().open(dir.path(), &ledger).unwrap();
        let window = ReadBuffer::allocate(64, None, &ledger).unwrap();
        let mut read = OverlappedRead::new(handle, window);
        read.submit(&dispatcher).unwrap();

        let err = read.wait(Some(TEST_TIMEOUT)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Completion);
        assert_eq!(read.state(), ReadState::Failed(ErrorKind::Completion));
        assert!(ledger.is_balanced());
    }

    #[test]
    fn strategy_reads_window() {
        let tmp = file_with(&[1u8; 3000]);
        let ledger = ResourceLedger::new();
        let strategy = AsyncStrategy::new(2048, Some(TEST_TIMEOUT), None, Dispatcher::default());

        let handle = strategy.open(tmp.path(), &ledger).unwrap();
        assert_eq!(handle.size(), 3000);
        let outcome = strategy.read_to_completion(handle, &ledger).unwrap();

        assert_eq!(outcome.requested, 2048);
        assert_eq!(outcome.transferred, 2048);
        assert!(ledger.is_balanced());
    }

    #[test]
    fn zero_window_is_allocation_error() {
        let tmp = file_with(b"abc");
        let ledger = ResourceLedger::new();
        let strategy = AsyncStrategy::new(0, None, None, Dispatcher::default());

        let handle = strategy.open(tmp.path(), &ledger).unwrap();
        let err = strategy.read_to_completion(handle, &ledger).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Allocation);
        assert!(ledger.is_balanced());
    }
}
