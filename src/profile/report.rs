//! Wait-event time budgets and their text report.

use std::collections::HashMap;
use std::io::{self, Write};

/// Bucket for time spent not waiting on anything.
pub const RUNNING: &str = "Running";

const RULE: &str = "------ ------------ -----------------------------";

/// Seconds per wait event for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    buckets: HashMap<String, f64>,
    target_elapsed: f64,
    total_elapsed: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.buckets.clear();
        self.target_elapsed = 0.0;
        self.total_elapsed = 0.0;
    }

    /// Credits `seconds` to `wait_entry`, or to [`RUNNING`] when it is empty.
    pub fn add(&mut self, wait_entry: &str, seconds: f64, is_target: bool) {
        let label = if wait_entry.is_empty() {
            RUNNING
        } else {
            wait_entry
        };
        *self.buckets.entry(label.to_string()).or_insert(0.0) += seconds;
        self.total_elapsed += seconds;
        if is_target {
            self.target_elapsed += seconds;
        }
    }

    /// Seconds in one bucket; zero for an unknown one.
    pub fn seconds(&self, label: &str) -> f64 {
        self.buckets.get(label).copied().unwrap_or(0.0)
    }

    /// Time of the profiled process alone.
    pub fn target_elapsed(&self) -> f64 {
        self.target_elapsed
    }

    /// Time of the profiled process and its parallel workers.
    pub fn total_elapsed(&self) -> f64 {
        self.total_elapsed
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Buckets by descending time, ties by name.
    pub fn sorted(&self) -> Vec<(&str, f64)> {
        let mut rows: Vec<(&str, f64)> = self
            .buckets
            .iter()
            .map(|(label, secs)| (label.as_str(), *secs))
            .collect();
        rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        rows
    }
}

/// Writes the header that opens the report of a new query.
pub fn write_header(out: &mut impl Write, query: &str) -> io::Result<()> {
    writeln!(out, "{}", RULE)?;
    writeln!(out, "% time      seconds wait_event         query: {}", query)?;
    writeln!(out, "{}", RULE)
}

/// Writes one line per bucket and the totals line.
pub fn write_report(out: &mut impl Write, acc: &Accumulator) -> io::Result<()> {
    let total = acc.total_elapsed();
    for (label, secs) in acc.sorted() {
        let pct = if total > 0.0 { secs * 100.0 / total } else { 0.0 };
        writeln!(out, "{:>6.2} {:>12.6} {}", pct, secs, label)?;
    }
    writeln!(out, "{}", RULE)?;
    writeln!(
        out,
        "{:>6.2} {:>12.6} (target {:.6}s, with workers {:.6}s)",
        if total > 0.0 { 100.0 } else { 0.0 },
        total,
        acc.target_elapsed(),
        total
    )?;
    writeln!(out)
}
