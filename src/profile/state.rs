//! Per-process samples and the transition between two of them.

use std::collections::BTreeMap;

use tracing::debug;

use crate::snapshot::Snapshot;

/// What `pg_stat_activity` says about one backend at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileStat {
    /// Seconds since the current query started.
    pub query_duration: f64,
    /// `state_change` as sent by the server; a new value means a new query.
    pub state_change: String,
    pub state: String,
    /// `wait_event_type.wait_event`, empty when not waiting.
    pub wait_entry: String,
    pub query: String,
}

impl ProfileStat {
    pub fn is_active(&self) -> bool {
        self.state == "active"
    }

    fn same_query(&self, other: &ProfileStat) -> bool {
        self.state_change == other.state_change
    }
}

/// One sampling tick: backend PID to its stat.
pub type Sample = BTreeMap<i32, ProfileStat>;

/// Builds a [`Sample`] from the profiling query result.
///
/// Rows without a parsable PID are skipped; a NULL duration counts as zero.
pub fn sample_from_snapshot(snapshot: &Snapshot) -> Sample {
    let col = |name: &str| snapshot.column_index(name);
    let (Some(pid), Some(duration), Some(wait), Some(state), Some(query), Some(change)) = (
        col("pid"),
        col("query_duration"),
        col("wait_entry"),
        col("state"),
        col("query"),
        col("state_change"),
    ) else {
        debug!("profiling result lacks expected columns: {:?}", snapshot.columns());
        return Sample::new();
    };

    let text = |r: usize, c: usize| snapshot.cell(r, c).unwrap_or("").to_string();
    let mut sample = Sample::new();
    for r in 0..snapshot.row_count() {
        let Some(id) = snapshot.cell(r, pid).and_then(|v| v.parse().ok()) else {
            continue;
        };
        sample.insert(
            id,
            ProfileStat {
                query_duration: snapshot
                    .cell(r, duration)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.0),
                state_change: text(r, change),
                state: text(r, state),
                wait_entry: text(r, wait),
                query: text(r, query),
            },
        );
    }
    sample
}

/// State of the profiled process after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    /// Still running the query seen on the previous tick.
    ActiveSameQuery,
    /// Running a query that started since the previous tick.
    ActiveNewQuery,
    /// The process no longer exists.
    Gone,
}

impl ProcessState {
    pub fn is_active(self) -> bool {
        matches!(self, ProcessState::ActiveSameQuery | ProcessState::ActiveNewQuery)
    }
}

/// Compares two readings of the target process.
pub fn classify(previous: Option<&ProfileStat>, current: Option<&ProfileStat>) -> ProcessState {
    let Some(current) = current else {
        return ProcessState::Gone;
    };
    if !current.is_active() {
        return ProcessState::Idle;
    }
    match previous {
        Some(prev) if prev.is_active() && prev.same_query(current) => ProcessState::ActiveSameQuery,
        _ => ProcessState::ActiveNewQuery,
    }
}

/// Seconds `current` spent in its query since `previous` was taken.
///
/// A backend seen for the first time, or one that moved on to another query,
/// is credited its whole query duration. So is a duration that went backwards.
pub fn elapsed_since(previous: Option<&ProfileStat>, current: &ProfileStat) -> f64 {
    match previous {
        Some(prev) if prev.is_active() && prev.same_query(current) => {
            let delta = current.query_duration - prev.query_duration;
            if delta >= 0.0 {
                delta
            } else {
                current.query_duration
            }
        }
        _ => current.query_duration,
    }
}
