// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::Write;
use std::time::SystemTime;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use readbench::{BenchmarkResult, FileFacts, StrategyKind};

/// How results are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Writes file facts and benchmark results to an output stream.
#[derive(Debug)]
pub struct Report<W> {
    out: W,
    format: Format,
}

impl<W: Write> Report<W> {
    pub const fn new(out: W, format: Format) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Blank line between files. Nothing in JSON mode.
    pub fn separator(&mut self) -> Result<()> {
        if self.format == Format::Text {
            writeln!(self.out)?;
        }
        Ok(())
    }

    pub fn facts(&mut self, facts: &FileFacts) -> Result<()> {
        match self.format {
            Format::Text => self.facts_text(facts),
            Format::Json => {
                let mut value = serde_json::to_value(facts)?;
                value["kind"] = "file".into();
                value["created_at"] = facts.created_at().map(rfc3339).into();
                writeln!(self.out, "{value}")?;
                Ok(())
            }
        }
    }

    pub fn result(&mut self, result: &BenchmarkResult) -> Result<()> {
        match self.format {
            Format::Text => self.result_text(result),
            Format::Json => {
                let mut value = serde_json::to_value(result)?;
                value["kind"] = "benchmark".into();
                writeln!(self.out, "{value}")?;
                Ok(())
            }
        }
    }

    fn facts_text(&mut self, facts: &FileFacts) -> Result<()> {
        let path = facts.path().display();
        if !facts.exists() {
            writeln!(self.out, "{path}: not found")?;
            return Ok(());
        }

        writeln!(self.out, "File attributes for {path}:")?;
        for attribute in facts.attributes() {
            writeln!(self.out, "- {attribute}")?;
        }
        writeln!(self.out, "File size: {} bytes", facts.size())?;
        match facts.created_at() {
            Some(created) => writeln!(self.out, "Creation time: {}", day_first(created))?,
            None => writeln!(self.out, "Creation time: unavailable")?,
        }
        Ok(())
    }

    fn result_text(&mut self, result: &BenchmarkResult) -> Result<()> {
        let label = label(result.mode());
        if let Some(kind) = result.error() {
            let message = result.message().unwrap_or_default();
            writeln!(self.out, "{label} read failed ({kind}): {message}")?;
            return Ok(());
        }

        write!(
            self.out,
            "{label} read time: {:.6} seconds, {} of {} bytes",
            result.elapsed_seconds(),
            result.bytes_read(),
            result.requested()
        )?;
        if result.short_read() {
            write!(self.out, " (short read)")?;
        }
        writeln!(self.out)?;
        Ok(())
    }
}

const fn label(kind: StrategyKind) -> &'static str {
    match kind {
        StrategyKind::Buffered => "Buffered",
        StrategyKind::Unbuffered => "Unbuffered",
        StrategyKind::Async => "Async",
    }
}

/// `DD/MM/YYYY HH:MM:SS` in UTC.
fn day_first(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format("%d/%m/%Y %H:%M:%S").to_string()
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}
