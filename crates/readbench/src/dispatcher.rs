// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use core::time::Duration;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::options::DEFAULT_DISPATCHER_THREADS;

const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// A unit of blocking work executed on a dispatcher thread.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why the dispatcher refused a job.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// [`Dispatcher::close`] was called.
    #[error("dispatcher is closed")]
    Closed,
    /// The bounded queue is full.
    #[error("dispatcher queue is full ({capacity} pending)")]
    QueueFull {
        /// The configured queue capacity.
        capacity: usize,
    },
    /// No worker thread is running and a new one could not be started.
    #[error("cannot start a dispatcher worker: {0}")]
    NoWorker(String),
}

struct Counters {
    thread_count: AtomicUsize,
    pending_count: AtomicUsize,
}

struct DispatcherInner {
    sender: flume::Sender<Job>,
    receiver: flume::Receiver<Job>,
    counters: Arc<Counters>,
    max_threads: usize,
    capacity: Option<usize>,
    closed: AtomicBool,
}

/// A small pool of threads that executes blocking read requests on behalf of the
/// asynchronous strategy.
///
/// No worker exists until the first submission. Workers are added up to the
/// configured maximum when the pending-request count exceeds the current thread
/// count, idle workers retire after ten seconds (the last one stays), and all of them
/// exit once the last `Dispatcher` clone is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DISPATCHER_THREADS, None)
    }
}

impl Dispatcher {
    /// Creates a dispatcher with at most `max_threads` workers and an optionally bounded
    /// queue.
    ///
    /// A queue bound of zero is raised to one: a rendezvous channel would refuse every
    /// submission made while no worker is parked on it.
    #[must_use]
    pub fn new(max_threads: usize, capacity: Option<usize>) -> Self {
        let capacity = capacity.map(|c| c.max(1));
        let (sender, receiver) = capacity.map_or_else(flume::unbounded, flume::bounded);
        Self {
            inner: Arc::new(DispatcherInner {
                sender,
                receiver,
                counters: Arc::new(Counters {
                    thread_count: AtomicUsize::new(0),
                    pending_count: AtomicUsize::new(0),
                }),
                max_threads: max_threads.max(1),
                capacity,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Queues `job` for execution on a worker thread and returns without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the dispatcher is closed, the queue is full, or no
    /// worker is running and none can be started. A refused job is dropped unexecuted.
    pub(crate) fn submit(&self, job: Job) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }

        let counters = &self.inner.counters;
        let prev_pending = counters.pending_count.fetch_add(1, Ordering::AcqRel);

        if let Err(e) = self.inner.sender.try_send(job) {
            let _ = counters.pending_count.fetch_sub(1, Ordering::AcqRel);
            return Err(match e {
                flume::TrySendError::Full(_) => DispatchError::QueueFull {
                    capacity: self.inner.capacity.unwrap_or_default(),
                },
                // The dispatcher owns a receiver, so the channel cannot disconnect while
                // `self` is alive.
                flume::TrySendError::Disconnected(_) => DispatchError::Closed,
            });
        }

        let threads = counters.thread_count.load(Ordering::Acquire);

        // Scale up if the queue is backing up and we haven't hit the limit.
        if prev_pending >= threads
            && threads < self.inner.max_threads
            && counters
                .thread_count
                .compare_exchange(threads, threads + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            && let Err(e) = self.spawn_worker_already_counted()
        {
            let _ = counters.thread_count.fetch_sub(1, Ordering::AcqRel);
            if threads == 0 {
                // Nobody will ever pick the job up; take it back out of the queue.
                let _ = self.inner.receiver.try_recv();
                let _ = counters.pending_count.fetch_sub(1, Ordering::AcqRel);
                return Err(DispatchError::NoWorker(e.to_string()));
            }
            tracing::warn!(error = %e, threads, "cannot add a dispatcher worker");
        }

        Ok(())
    }

    /// Refuses all further submissions. Already queued jobs still run.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("dispatcher closed");
        }
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of worker threads currently running.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.inner.counters.thread_count.load(Ordering::Acquire)
    }

    /// Number of submitted jobs that have not finished yet.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.counters.pending_count.load(Ordering::Acquire)
    }

    /// Spawns a worker thread, assuming the caller already incremented the count.
    fn spawn_worker_already_counted(&self) -> std::io::Result<()> {
        let receiver = self.inner.receiver.clone();
        let counters = Arc::clone(&self.inner.counters);
        let _ = std::thread::Builder::new()
            .name("readbench-dispatcher".into())
            .spawn(move || worker_loop(&receiver, &counters))?;
        Ok(())
    }
}

fn worker_loop(receiver: &flume::Receiver<Job>, counters: &Counters) {
    loop {
        match receiver.recv_timeout(IDLE_TIMEOUT) {
            Ok(job) => {
                // A panicking job drops its completion sender, which the waiting side
                // observes as a failed request. The worker itself carries on.
                if std::panic::catch_unwind(core::panic::AssertUnwindSafe(job)).is_err() {
                    tracing::error!("dispatched read request panicked");
                }
                let _ = counters.pending_count.fetch_sub(1, Ordering::AcqRel);
            }
            Err(flume::RecvTimeoutError::Timeout) => {
                // Scale down: CAS ensures at least one worker remains.
                let mut count = counters.thread_count.load(Ordering::Relaxed);
                loop {
                    if count <= 1 {
                        break;
                    }
                    match counters
                        .thread_count
                        .compare_exchange_weak(count, count - 1, Ordering::AcqRel, Ordering::Relaxed)
                    {
                        Ok(_) => return,
                        Err(actual) => count = actual,
                    }
                }
                // Last worker, keep running.
            }
            Err(flume::RecvTimeoutError::Disconnected) => {
                let _ = counters.thread_count.fetch_sub(1, Ordering::AcqRel);
                return;
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("threads", &self.thread_count())
            .field("pending", &self.pending_count())
            .field("max_threads", &self.inner.max_threads)
            .field("closed", &self.is_closed())
            .finish()
    }
}
