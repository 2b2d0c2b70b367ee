// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(docsrs, feature(doc_cfg))]

//! Compare whole-file read strategies.
//!
//! This crate opens a file, reads it under one of three I/O strategies and reports how
//! long that took and how many bytes moved. It is a harness for comparing strategy
//! overhead, not a general-purpose file-access layer.
//!
//! | Strategy | Open | Size | Read |
//! |----------|------|------|------|
//! | [`BufferedStrategy`]   | `File` wrapped in a `BufReader` | seek to end and back | fill loop until EOF |
//! | [`UnbufferedStrategy`] | `File` with a sequential-access hint | metadata | one read call |
//! | [`AsyncStrategy`]      | `File` | metadata | one positional read of a fixed window on a [`Dispatcher`] thread |
//!
//! # Quick start
//!
//! ```no_run
//! use readbench::{BenchOptions, BenchmarkRunner};
//!
//! let runner = BenchmarkRunner::new(BenchOptions::default());
//! for result in runner.run_all("Lab4.txt") {
//!     match result.error() {
//!         None => println!("{}: {} bytes in {:.6}s", result.mode(), result.bytes_read(), result.elapsed_seconds()),
//!         Some(kind) => println!("{}: {kind}", result.mode()),
//!     }
//! }
//! ```
//!
//! # Resource release
//!
//! Every invocation owns its [`FileHandle`] and [`ReadBuffer`] and releases both
//! before it returns, on success and on every error path. Both types hold a lease on
//! the runner's [`ResourceLedger`], which makes the guarantee observable:
//!
//! ```no_run
//! # use readbench::{BenchmarkRunner, StrategyKind};
//! let runner = BenchmarkRunner::default();
//! let _ = runner.run_kind(StrategyKind::Unbuffered, "missing.txt");
//! assert!(runner.ledger().is_balanced());
//! ```
//!
//! # Asynchronous reads
//!
//! The asynchronous strategy submits an [`OverlappedRead`] to a [`Dispatcher`], a small
//! pool of worker threads, and blocks until that request completes. The request can
//! also be driven by hand through [`OverlappedRead::submit`], [`OverlappedRead::poll`],
//! [`OverlappedRead::wait`] and [`OverlappedRead::cancel`].
//!
//! Only the first window of the file is read (1 KiB unless configured otherwise), so
//! for large files the asynchronous byte count is not comparable to the synchronous
//! ones.
//!
//! # Errors
//!
//! Errors never escape a benchmark invocation. Each one is reported in the
//! [`BenchmarkResult`] as an [`ErrorKind`] plus a message; no operation is retried.
//!
//! # Features
//!
//! - `serde`: derives `Serialize` for [`BenchmarkResult`] and [`FileFacts`].

pub use crate::buffer::ReadBuffer;
pub use crate::buffered::BufferedStrategy;
pub use crate::dispatcher::{DispatchError, Dispatcher};
pub use crate::error::{AllocationFailure, ErrorKind, ReadError, Result};
pub use crate::handle::FileHandle;
pub use crate::ledger::ResourceLedger;
pub use crate::metadata::{Attribute, FileFacts, inspect};
pub use crate::options::{BenchOptions, DEFAULT_ASYNC_WINDOW, DEFAULT_BUFFER_CAPACITY, DEFAULT_DISPATCHER_THREADS};
pub use crate::overlapped::{AsyncStrategy, OverlappedRead, ReadState};
pub use crate::runner::{BenchmarkResult, BenchmarkRunner};
pub use crate::strategy::{ReadOutcome, ReadStrategy, StrategyKind, UnknownStrategy};
pub use crate::unbuffered::UnbufferedStrategy;

mod buffer;
mod buffered;
mod dispatcher;
mod error;
mod handle;
mod ledger;
mod metadata;
mod options;
mod overlapped;
mod runner;
mod strategy;
mod unbuffered;
