//! Per-second rates from two samples of the same query.

use std::collections::HashMap;

use thiserror::Error;

use super::{Row, Snapshot};

/// Inclusive range of column indexes that hold cumulative counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffRange {
    first: usize,
    last: usize,
}

impl DiffRange {
    /// Creates a range; bounds given in reverse order are swapped.
    pub const fn new(first: usize, last: usize) -> Self {
        if first <= last {
            Self { first, last }
        } else {
            Self {
                first: last,
                last: first,
            }
        }
    }

    pub const fn first(&self) -> usize {
        self.first
    }

    pub const fn last(&self) -> usize {
        self.last
    }

    pub fn contains(&self, column: usize) -> bool {
        (self.first..=self.last).contains(&column)
    }
}

/// Error produced when a pair of samples cannot be differenced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiffError {
    #[error("cannot parse {value:?} as a number (row {row}, column {column})")]
    Parse {
        row: usize,
        column: usize,
        value: String,
    },
    #[error("invalid sampling interval: {0}s")]
    Interval(f64),
}

/// Computes per-second rates of `current` against `previous`.
///
/// Rows are matched on the text of `key_column`. Matched rows get
/// `(current - previous) / elapsed_secs` in every column covered by `range`;
/// other columns are copied. Rows without a match are copied unchanged and
/// rows that exist only in `previous` are dropped. `range == None` disables
/// differencing and returns `current` as is.
///
/// Floating point cells (those containing `.` or `e`) are formatted with two
/// decimals, integer cells as whole numbers truncated toward zero. A cell that
/// does not parse fails the whole call. NULL cells are passed through.
pub fn diff(
    current: &Snapshot,
    previous: &Snapshot,
    elapsed_secs: f64,
    range: Option<DiffRange>,
    key_column: usize,
) -> Result<Snapshot, DiffError> {
    let Some(range) = range else {
        return Ok(current.clone());
    };
    if previous.row_count() == 0 || key_column >= current.column_count() {
        return Ok(current.clone());
    }
    if !(elapsed_secs.is_finite() && elapsed_secs > 0.0) {
        return Err(DiffError::Interval(elapsed_secs));
    }

    // NULL keys never match; duplicated keys match their first occurrence.
    let mut index: HashMap<&str, &Row> = HashMap::with_capacity(previous.row_count());
    for row in previous.rows() {
        if let Some(Some(key)) = row.get(key_column) {
            index.entry(key.as_str()).or_insert(row);
        }
    }

    let mut rows = Vec::with_capacity(current.row_count());
    for (r, row) in current.rows().iter().enumerate() {
        let matched = row[key_column]
            .as_deref()
            .and_then(|key| index.get(key).copied());

        let Some(prev_row) = matched else {
            rows.push(row.clone());
            continue;
        };

        let mut out = Vec::with_capacity(row.len());
        for (l, cell) in row.iter().enumerate() {
            if !range.contains(l) {
                out.push(cell.clone());
                continue;
            }
            let (Some(curr), Some(Some(prev))) = (cell, prev_row.get(l)) else {
                out.push(cell.clone());
                continue;
            };
            out.push(Some(rate(curr, prev, elapsed_secs).map_err(|value| {
                DiffError::Parse {
                    row: r,
                    column: l,
                    value,
                }
            })?));
        }
        rows.push(out);
    }

    Ok(current.with_rows(rows))
}

/// Returns `true` when the text of a counter should be treated as a float.
fn is_float(text: &str) -> bool {
    text.contains('.') || text.contains('e')
}

/// Formats the rate between two counter readings; on failure returns the
/// text that did not parse.
fn rate(curr: &str, prev: &str, elapsed_secs: f64) -> Result<String, String> {
    let (c, p) = (curr.trim(), prev.trim());

    if is_float(c) {
        let c: f64 = c.parse().map_err(|_| curr.to_string())?;
        let p: f64 = p.parse().map_err(|_| prev.to_string())?;
        return Ok(format!("{:.2}", (c - p) / elapsed_secs));
    }

    let c: i64 = c.parse().map_err(|_| curr.to_string())?;
    let p: i64 = p.parse().map_err(|_| prev.to_string())?;
    let delta = c.saturating_sub(p);
    let value = if elapsed_secs.fract() == 0.0 && elapsed_secs <= i64::MAX as f64 {
        delta / elapsed_secs as i64
    } else {
        (delta as f64 / elapsed_secs).trunc() as i64
    };
    Ok(value.to_string())
}
