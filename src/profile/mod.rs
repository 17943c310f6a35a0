//! Wait-event profiler for a single backend.
//!
//! The profiler samples `pg_stat_activity` for one process (and, on 13+, its
//! parallel workers) at a fixed interval and attributes the time between
//! samples to the wait event each process reported. When the query finishes
//! or is replaced, a report of where its time went is written out.

mod report;
mod state;

use std::io::{self, Write};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::collector::{Database, DbError};
use crate::util::CancelToken;

pub use report::{Accumulator, RUNNING, write_header, write_report};
pub use state::{ProcessState, ProfileStat, Sample, classify, elapsed_since, sample_from_snapshot};

/// Error that ends a profiling session.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("lost connection to the database: {0}")]
    Connection(String),
    #[error("cannot write report: {0}")]
    Io(#[from] io::Error),
}

/// What and how to profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub pid: i32,
    pub interval: Duration,
    /// Query text is cut to this many characters in report headers.
    pub strsize: usize,
    /// Also attribute the time of parallel workers led by `pid`.
    pub include_workers: bool,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            pid: 0,
            interval: Duration::from_millis(10),
            strsize: 128,
            include_workers: true,
        }
    }
}

/// Builds the sampling query for the server version.
pub fn build_profile_query(config: &ProfileConfig, server_version_num: Option<i32>) -> String {
    let v = server_version_num.unwrap_or(0);
    let wait_entry = if v >= 90600 {
        "COALESCE(wait_event_type || '.' || wait_event, '')"
    } else {
        "CASE WHEN waiting THEN 'Lock.waiting' ELSE '' END"
    };
    let filter = if config.include_workers && v >= 130000 {
        format!("pid = {pid} OR leader_pid = {pid}", pid = config.pid)
    } else {
        format!("pid = {}", config.pid)
    };

    format!(
        r#"
            SELECT
                pid,
                extract(epoch FROM clock_timestamp() - query_start) AS query_duration,
                {wait_entry} AS wait_entry,
                state,
                left(query, {strsize}) AS query,
                extract(epoch FROM state_change) AS state_change
            FROM pg_stat_activity
            WHERE {filter}
        "#,
        strsize = config.strsize
    )
}

/// Profiles one process, writing reports to `out`.
pub struct Profiler<D: Database, W: Write> {
    db: D,
    out: W,
    config: ProfileConfig,
    query: String,
    previous: Sample,
    last_state: ProcessState,
    acc: Accumulator,
}

impl<D: Database, W: Write> Profiler<D, W> {
    pub fn new(db: D, out: W, config: ProfileConfig) -> Self {
        let query = build_profile_query(&config, db.server_version_num());
        Self {
            db,
            out,
            config,
            query,
            previous: Sample::new(),
            last_state: ProcessState::Idle,
            acc: Accumulator::new(),
        }
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.acc
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Samples once and acts on the transition.
    ///
    /// A failed sampling query is logged and leaves the state unchanged.
    pub fn step(&mut self) -> Result<ProcessState, ProfileError> {
        let snapshot = match self.db.query(&self.query) {
            Ok(snapshot) => snapshot,
            Err(DbError::Query(msg)) => {
                warn!(pid = self.config.pid, "sampling failed: {}", msg);
                return Ok(self.last_state);
            }
            Err(DbError::Connection(msg)) => return Err(ProfileError::Connection(msg)),
        };

        let current = sample_from_snapshot(&snapshot);
        let pid = self.config.pid;
        let state = classify(self.previous.get(&pid), current.get(&pid));
        let was_active = self.last_state.is_active();

        match state {
            ProcessState::Gone => {
                writeln!(self.out, "LOG: Process {} is gone, stopping", pid)?;
                self.out.flush()?;
                self.last_state = state;
                return Ok(state);
            }
            ProcessState::Idle => {
                if was_active {
                    self.flush_report()?;
                }
            }
            ProcessState::ActiveNewQuery => {
                if was_active {
                    self.flush_report()?;
                }
                let query = current.get(&pid).map(|s| s.query.as_str()).unwrap_or("");
                write_header(&mut self.out, query)?;
                self.acc.reset();
                self.accumulate(&Sample::new(), &current);
            }
            ProcessState::ActiveSameQuery => {
                let previous = std::mem::take(&mut self.previous);
                self.accumulate(&previous, &current);
            }
        }

        if state != self.last_state {
            debug!(pid, from = ?self.last_state, to = ?state, "state change");
        }
        self.last_state = state;
        self.previous = current;
        Ok(state)
    }

    /// Runs until the process is gone or `cancel` is set.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<(), ProfileError> {
        writeln!(
            self.out,
            "LOG: Profiling process {} with {}ms sampling",
            self.config.pid,
            self.config.interval.as_millis()
        )?;
        self.out.flush()?;
        info!(pid = self.config.pid, "profiling started");

        loop {
            if self.step()? == ProcessState::Gone {
                break;
            }
            if !cancel.sleep(self.config.interval) {
                if self.last_state.is_active() {
                    self.flush_report()?;
                }
                break;
            }
        }

        info!(pid = self.config.pid, "profiling stopped");
        Ok(())
    }

    fn accumulate(&mut self, previous: &Sample, current: &Sample) {
        for (pid, stat) in current.iter().filter(|(_, s)| s.is_active()) {
            let seconds = elapsed_since(previous.get(pid), stat);
            self.acc.add(&stat.wait_entry, seconds, *pid == self.config.pid);
        }
    }

    fn flush_report(&mut self) -> Result<(), ProfileError> {
        write_report(&mut self.out, &self.acc)?;
        self.out.flush()?;
        self.acc.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockDb;
    use crate::snapshot::Snapshot;

    const COLUMNS: [&str; 6] = [
        "pid",
        "query_duration",
        "wait_entry",
        "state",
        "query",
        "state_change",
    ];

    fn sample(rows: &[(&str, &str, &str, &str, &str)]) -> Snapshot {
        let rows: Vec<Vec<&str>> = rows
            .iter()
            .map(|(pid, dur, wait, state, change)| vec![*pid, *dur, *wait, *state, "select pg_sleep(5)", *change])
            .collect();
        Snapshot::from_text(&COLUMNS, &rows)
    }

    fn config() -> ProfileConfig {
        ProfileConfig {
            pid: 42,
            ..ProfileConfig::default()
        }
    }

    fn output(profiler: Profiler<MockDb, Vec<u8>>) -> String {
        String::from_utf8(profiler.into_output()).unwrap()
    }

    #[test]
    fn lock_wait_then_running() {
        let db = MockDb::new()
            .push(sample(&[("42", "1.0", "Lock.relation", "active", "100")]))
            .push(sample(&[("42", "2.0", "Lock.relation", "active", "100")]))
            .push(sample(&[("42", "2.5", "", "active", "100")]));
        let mut p = Profiler::new(db, Vec::new(), config());

        assert_eq!(p.step().unwrap(), ProcessState::ActiveNewQuery);
        let lock_before = p.accumulator().seconds("Lock.relation");
        let running_before = p.accumulator().seconds(RUNNING);

        assert_eq!(p.step().unwrap(), ProcessState::ActiveSameQuery);
        assert_eq!(p.accumulator().seconds("Lock.relation") - lock_before, 1.0);
        assert_eq!(p.accumulator().seconds(RUNNING), running_before);

        assert_eq!(p.step().unwrap(), ProcessState::ActiveSameQuery);
        assert_eq!(p.accumulator().seconds(RUNNING), 0.5);
        assert_eq!(p.accumulator().seconds("Lock.relation"), 2.0);
    }

    #[test]
    fn report_is_flushed_when_query_finishes() {
        let db = MockDb::new()
            .push(sample(&[("42", "1.0", "IO.DataFileRead", "active", "100")]))
            .push(sample(&[("42", "3.0", "IO.DataFileRead", "active", "100")]))
            .push(sample(&[("42", "0", "", "idle", "105")]));
        let mut p = Profiler::new(db, Vec::new(), config());

        p.step().unwrap();
        p.step().unwrap();
        assert_eq!(p.step().unwrap(), ProcessState::Idle);
        assert!(p.accumulator().is_empty());

        let text = output(p);
        assert!(text.contains("query: select pg_sleep(5)"));
        assert!(text.contains("100.00     3.000000 IO.DataFileRead"));
    }

    #[test]
    fn new_query_flushes_and_restarts() {
        let db = MockDb::new()
            .push(sample(&[("42", "1.0", "", "active", "100")]))
            .push(sample(&[("42", "0.2", "Lock.tuple", "active", "200")]));
        let mut p = Profiler::new(db, Vec::new(), config());

        p.step().unwrap();
        assert_eq!(p.step().unwrap(), ProcessState::ActiveNewQuery);
        assert_eq!(p.accumulator().seconds(RUNNING), 0.0);
        assert_eq!(p.accumulator().seconds("Lock.tuple"), 0.2);

        let text = output(p);
        assert_eq!(text.matches("query: ").count(), 2);
        assert!(text.contains("100.00     1.000000 Running"));
    }

    #[test]
    fn workers_count_toward_total_only() {
        let db = MockDb::new()
            .with_version(160000)
            .push(sample(&[
                ("42", "1.0", "IPC.ExecuteGather", "active", "100"),
                ("43", "0.5", "IO.DataFileRead", "active", "101"),
            ]))
            .push(sample(&[
                ("42", "2.0", "IPC.ExecuteGather", "active", "100"),
                ("43", "1.5", "IO.DataFileRead", "active", "101"),
                ("44", "0.7", "", "active", "102"),
            ]));
        let log = db.log();
        let mut p = Profiler::new(db, Vec::new(), config());

        p.step().unwrap();
        p.step().unwrap();
        let acc = p.accumulator();
        assert_eq!(acc.seconds("IPC.ExecuteGather"), 2.0);
        assert_eq!(acc.seconds("IO.DataFileRead"), 1.5);
        assert_eq!(acc.seconds(RUNNING), 0.7);
        assert_eq!(acc.target_elapsed(), 2.0);
        assert!((acc.total_elapsed() - 4.2).abs() < 1e-9);
        assert!(log.lock().unwrap()[0].contains("leader_pid = 42"));
    }

    #[test]
    fn idle_processes_are_not_counted() {
        let db = MockDb::new()
            .push(sample(&[("42", "1.0", "", "active", "100"), ("43", "9.0", "", "idle in transaction", "90")]));
        let mut p = Profiler::new(db, Vec::new(), config());
        p.step().unwrap();
        assert_eq!(p.accumulator().total_elapsed(), 1.0);
    }

    #[test]
    fn gone_process_stops_run() {
        let db = MockDb::new()
            .push(sample(&[("42", "1.0", "", "active", "100")]))
            .push(sample(&[]));
        let mut p = Profiler::new(
            db,
            Vec::new(),
            ProfileConfig {
                interval: Duration::from_millis(1),
                ..config()
            },
        );

        p.run(&CancelToken::new()).unwrap();
        let text = output(p);
        assert!(text.starts_with("LOG: Profiling process 42 with 1ms sampling\n"));
        assert!(text.ends_with("LOG: Process 42 is gone, stopping\n"));
    }

    #[test]
    fn query_errors_are_skipped_and_connection_loss_is_fatal() {
        let db = MockDb::new()
            .push(sample(&[("42", "1.0", "", "active", "100")]))
            .push_error(DbError::Query("ERROR: canceling statement due to statement timeout".into()));
        let mut p = Profiler::new(db, Vec::new(), config());

        assert_eq!(p.step().unwrap(), ProcessState::ActiveNewQuery);
        assert_eq!(p.step().unwrap(), ProcessState::ActiveNewQuery);
        assert!(matches!(p.step(), Err(ProfileError::Connection(_))));
    }

    #[test]
    fn query_depends_on_version_and_workers() {
        let cfg = config();
        assert!(build_profile_query(&cfg, Some(130000)).contains("OR leader_pid = 42"));
        assert!(!build_profile_query(&cfg, Some(120000)).contains("leader_pid"));
        assert!(build_profile_query(&cfg, Some(90500)).contains("waiting"));

        let solo = ProfileConfig {
            include_workers: false,
            ..config()
        };
        assert!(!build_profile_query(&solo, Some(160000)).contains("leader_pid"));
        assert!(build_profile_query(&cfg, None).contains("left(query, 128)"));
    }
}
