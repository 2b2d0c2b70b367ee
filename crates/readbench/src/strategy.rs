// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::Result;
use crate::handle::FileHandle;
use crate::ledger::ResourceLedger;

/// The I/O strategies the harness can benchmark.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StrategyKind {
    /// Reads through a buffering layer above the file.
    Buffered,
    /// One direct read call against the file, opened with a sequential-access hint.
    Unbuffered,
    /// A read request submitted to a background completion source and waited on.
    Async,
}

impl StrategyKind {
    /// All strategies, in the order the harness runs them.
    pub const ALL: [Self; 3] = [Self::Buffered, Self::Unbuffered, Self::Async];

    /// The lowercase name used on the command line and in reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Buffered => "buffered",
            Self::Unbuffered => "unbuffered",
            Self::Async => "async",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown strategy name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown read strategy `{0}`, expected one of: buffered, unbuffered, async")]
pub struct UnknownStrategy(String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStrategy(s.to_owned()))
    }
}

/// What a completed read transferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Bytes the operating system reported as transferred.
    pub transferred: u64,
    /// Bytes the read asked for.
    pub requested: u64,
}

impl ReadOutcome {
    /// Whether fewer bytes were transferred than requested.
    ///
    /// This is a notice, not a failure.
    #[must_use]
    pub const fn is_short(&self) -> bool {
        self.transferred < self.requested
    }
}

/// One way of reading a whole file.
///
/// A strategy is split into an open step, which produces a [`FileHandle`] with a known
/// size, and a read step, which consumes the handle. Because the read step takes the
/// handle by value, the file is closed before `read_to_completion` returns, whether it
/// succeeds or fails.
pub trait ReadStrategy {
    /// What the opened handle reads from.
    type Source;

    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Opens `path` in this strategy's mode and determines its size.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Open`](crate::ReadError::Open) if the file cannot be opened
    /// or [`ReadError::SizeQuery`](crate::ReadError::SizeQuery) if its size cannot be
    /// determined.
    fn open(&self, path: &Path, ledger: &ResourceLedger) -> Result<FileHandle<Self::Source>>;

    /// Reads the file behind `handle` and releases the handle and any buffer.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever step failed: allocation, submission, completion
    /// or a read error.
    fn read_to_completion(&self, handle: FileHandle<Self::Source>, ledger: &ResourceLedger) -> Result<ReadOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        assert_eq!("buffered".parse::<StrategyKind>().unwrap(), StrategyKind::Buffered);
        assert_eq!("Unbuffered".parse::<StrategyKind>().unwrap(), StrategyKind::Unbuffered);
        assert_eq!("ASYNC".parse::<StrategyKind>().unwrap(), StrategyKind::Async);

        let err = "mmap".parse::<StrategyKind>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown read strategy `mmap`, expected one of: buffered, unbuffered, async"
        );
    }

    #[test]
    fn display_round_trips_through_parse() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.to_string().parse::<StrategyKind>().unwrap(), kind);
        }
    }

    #[test]
    fn short_read_notice() {
        let full = ReadOutcome {
            transferred: 10,
            requested: 10,
        };
        let short = ReadOutcome {
            transferred: 4,
            requested: 10,
        };
        assert!(!full.is_short());
        assert!(short.is_short());
    }
}
