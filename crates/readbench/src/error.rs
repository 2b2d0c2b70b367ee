// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Any error that may arise while a read strategy opens, sizes, allocates for or reads a file.
///
/// Every variant is recovered inside the benchmark invocation that raised it: the
/// [`BenchmarkRunner`](crate::BenchmarkRunner) turns it into a failed
/// [`BenchmarkResult`](crate::BenchmarkResult) after all resources are released.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReadError {
    /// The file is missing, inaccessible or permission was denied.
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        /// The path that failed to open.
        path: PathBuf,
        /// The error reported by the operating system.
        source: io::Error,
    },

    /// The size of an opened file could not be determined.
    #[error("cannot determine size of {}: {source}", .path.display())]
    SizeQuery {
        /// The path of the opened file.
        path: PathBuf,
        /// The error reported by the operating system.
        source: io::Error,
    },

    /// A destination buffer of the requested length could not be allocated.
    ///
    /// This includes the degenerate zero-length case, lengths above the configured cap
    /// and lengths the allocator refuses.
    #[error("cannot allocate a {len} byte read buffer: {reason}")]
    Allocation {
        /// The requested buffer length.
        len: u64,
        /// Why the allocation was refused.
        reason: AllocationFailure,
    },

    /// A synchronous read call failed.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// The path of the opened file.
        path: PathBuf,
        /// The error reported by the operating system.
        source: io::Error,
    },

    /// An asynchronous read request was rejected when it was issued.
    #[error("async read request rejected: {reason}")]
    Submission {
        /// Why the request was rejected.
        reason: String,
    },

    /// An asynchronous read request was accepted but later failed.
    #[error("async read request failed: {source}")]
    Completion {
        /// The error reported when the request completed.
        source: io::Error,
    },

    /// An outstanding asynchronous read request was canceled before it completed.
    #[error("async read request canceled")]
    Canceled,

    /// An asynchronous read request did not complete within the configured bound and was canceled.
    #[error("async read request did not complete within {}ms", .limit.as_millis())]
    TimedOut {
        /// The bound that expired.
        limit: std::time::Duration,
    },
}

impl ReadError {
    /// The category of this error, as reported in a [`BenchmarkResult`](crate::BenchmarkResult).
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Open { .. } => ErrorKind::Open,
            Self::SizeQuery { .. } => ErrorKind::SizeQuery,
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::Read { .. } => ErrorKind::Read,
            Self::Submission { .. } => ErrorKind::Submission,
            Self::Completion { .. } => ErrorKind::Completion,
            Self::Canceled => ErrorKind::Canceled,
            Self::TimedOut { .. } => ErrorKind::TimedOut,
        }
    }
}

/// Why a [`ReadBuffer`](crate::ReadBuffer) could not be allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum AllocationFailure {
    /// A zero-length buffer was requested.
    Empty,
    /// The requested length is above the configured cap.
    AboveLimit {
        /// The configured cap.
        limit: u64,
    },
    /// The requested length does not fit in the address space.
    Overflow,
    /// The allocator could not satisfy the request.
    OutOfMemory,
}

impl fmt::Display for AllocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("zero-length buffer"),
            Self::AboveLimit { limit } => write!(f, "above the {limit} byte limit"),
            Self::Overflow => f.write_str("length exceeds the address space"),
            Self::OutOfMemory => f.write_str("out of memory"),
        }
    }
}

/// The category of a failed benchmark invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum ErrorKind {
    /// See [`ReadError::Open`].
    Open,
    /// See [`ReadError::SizeQuery`].
    SizeQuery,
    /// See [`ReadError::Allocation`].
    Allocation,
    /// See [`ReadError::Read`].
    Read,
    /// See [`ReadError::Submission`].
    Submission,
    /// See [`ReadError::Completion`].
    Completion,
    /// See [`ReadError::Canceled`].
    Canceled,
    /// See [`ReadError::TimedOut`].
    TimedOut,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open error",
            Self::SizeQuery => "size query error",
            Self::Allocation => "allocation error",
            Self::Read => "read error",
            Self::Submission => "submission error",
            Self::Completion => "completion error",
            Self::Canceled => "canceled",
            Self::TimedOut => "timed out",
        })
    }
}

/// A specialized `Result` for read strategy operations.
pub type Result<T> = std::result::Result<T, ReadError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(ReadError: Send, Sync);
        assert_impl_all!(ErrorKind: Send, Sync, Copy);
    }

    #[test]
    fn kind_matches_variant() {
        let e = ReadError::Open {
            path: PathBuf::from("missing.txt"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(e.kind(), ErrorKind::Open);

        let e = ReadError::Allocation {
            len: 0,
            reason: AllocationFailure::Empty,
        };
        assert_eq!(e.kind(), ErrorKind::Allocation);

        let e = ReadError::TimedOut {
            limit: Duration::from_millis(5),
        };
        assert_eq!(e.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn display_names_the_path() {
        let e = ReadError::Open {
            path: PathBuf::from("missing.txt"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(e.to_string(), "cannot open missing.txt: no such file");
    }

    #[test]
    fn display_allocation_reason() {
        let e = ReadError::Allocation {
            len: 4096,
            reason: AllocationFailure::AboveLimit { limit: 1024 },
        };
        assert_eq!(
            e.to_string(),
            "cannot allocate a 4096 byte read buffer: above the 1024 byte limit"
        );
    }

    #[test]
    fn timed_out_display() {
        let e = ReadError::TimedOut {
            limit: Duration::from_millis(250),
        };
        assert_eq!(e.to_string(), "async read request did not complete within 250ms");
    }
}
