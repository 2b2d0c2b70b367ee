// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Inspect files and benchmark whole-file read strategies against them.
//!
//! # Usage
//!
//! ```bash
//! readbench                                # Lab4.txt and Lab4_big.txt, all strategies
//! readbench data.bin -s buffered -s async  # selected strategies only
//! readbench data.bin --format json         # one JSON object per line
//! ```
//!
//! The tool exits with code 0 if every benchmark succeeded, 1 if any failed and 2 if
//! the arguments are invalid.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use readbench::{BenchOptions, BenchmarkRunner, StrategyKind, inspect};
use tracing::level_filters::LevelFilter;

use crate::report::{Format, Report};

mod report;

#[derive(Parser, Debug)]
#[command(name = "readbench", version, about = "Benchmarks buffered, unbuffered and asynchronous whole-file reads")]
struct Cli {
    /// Files to benchmark
    #[arg(value_name = "PATHS", default_values = ["Lab4.txt", "Lab4_big.txt"])]
    paths: Vec<PathBuf>,

    /// Strategy to run; repeat to run several [default: all]
    #[arg(short, long = "strategy", value_name = "STRATEGY")]
    strategies: Vec<StrategyKind>,

    /// Capacity of the buffered strategy's buffering layer, in bytes
    #[arg(long, value_name = "BYTES", default_value_t = readbench::DEFAULT_BUFFER_CAPACITY)]
    buffer_capacity: usize,

    /// Bytes the asynchronous strategy reads from the start of the file
    #[arg(long, value_name = "BYTES", default_value_t = readbench::DEFAULT_ASYNC_WINDOW)]
    async_window: usize,

    /// Give up on an asynchronous read after this many milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Refuse to allocate read buffers larger than this, in bytes
    #[arg(long, value_name = "BYTES")]
    max_buffer: Option<u64>,

    /// Skip printing file attributes, size and creation time
    #[arg(long)]
    no_inspect: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Log more; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn options(&self) -> BenchOptions {
        let mut options = BenchOptions::default()
            .with_buffer_capacity(self.buffer_capacity)
            .with_async_window(self.async_window);
        if let Some(ms) = self.timeout_ms {
            options = options.with_completion_timeout(Duration::from_millis(ms));
        }
        if let Some(max) = self.max_buffer {
            options = options.with_max_buffer_len(max);
        }
        options
    }

    fn strategies(&self) -> Vec<StrategyKind> {
        if self.strategies.is_empty() {
            StrategyKind::ALL.to_vec()
        } else {
            self.strategies.clone()
        }
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to install the log subscriber")
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let runner = BenchmarkRunner::new(cli.options());
    let strategies = cli.strategies();
    let stdout = io::stdout();
    let mut report = Report::new(stdout.lock(), cli.format);
    let mut failures = 0_usize;

    for (index, path) in cli.paths.iter().enumerate() {
        if index > 0 {
            report.separator()?;
        }

        if !cli.no_inspect {
            match inspect(path) {
                Ok(facts) => report.facts(&facts)?,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot inspect file"),
            }
        }

        for &kind in &strategies {
            let result = runner.run_kind(kind, path);
            if !result.succeeded() {
                failures += 1;
            }
            report.result(&result)?;
        }
    }

    report.into_inner().flush().context("failed to flush the report")?;
    tracing::debug!(ledger = ?runner.ledger(), failures, "all benchmarks finished");

    Ok(if failures == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
