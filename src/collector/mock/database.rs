//! Scripted database for testing the collector and profiler.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::collector::traits::{Database, DbError};
use crate::snapshot::Snapshot;

/// Statements a [`MockDb`] received, shared with the test.
pub type QueryLog = Arc<Mutex<Vec<String>>>;

/// Replays queued results in order.
///
/// Queries containing a registered fragment get that fixed answer instead of
/// consuming the queue. Once the queue runs dry every query fails with
/// [`DbError::Connection`], which is how tests end a collection loop.
#[derive(Debug, Default)]
pub struct MockDb {
    queue: VecDeque<Result<Snapshot, DbError>>,
    fixed: Vec<(String, Result<Snapshot, DbError>)>,
    version: Option<i32>,
    log: QueryLog,
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn push(mut self, snapshot: Snapshot) -> Self {
        self.queue.push_back(Ok(snapshot));
        self
    }

    pub fn push_error(mut self, error: DbError) -> Self {
        self.queue.push_back(Err(error));
        self
    }

    /// Answers every query containing `fragment` with `result`.
    pub fn respond(mut self, fragment: &str, result: Result<Snapshot, DbError>) -> Self {
        self.fixed.push((fragment.to_string(), result));
        self
    }

    /// Handle to the statements received so far.
    pub fn log(&self) -> QueryLog {
        Arc::clone(&self.log)
    }
}

impl Database for MockDb {
    fn query(&mut self, sql: &str) -> Result<Snapshot, DbError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(sql.to_string());
        }

        if let Some((_, result)) = self.fixed.iter().find(|(f, _)| sql.contains(f.as_str())) {
            return result.clone();
        }

        self.queue
            .pop_front()
            .unwrap_or_else(|| Err(DbError::Connection("no more scripted results".into())))
    }

    fn server_version_num(&self) -> Option<i32> {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_in_order_then_disconnects() {
        let mut db = MockDb::new()
            .push(Snapshot::from_text(&["n"], &[vec!["1"]]))
            .push_error(DbError::Query("boom".into()));

        assert_eq!(db.query("a").unwrap().cell(0, 0), Some("1"));
        assert_eq!(db.query("b"), Err(DbError::Query("boom".into())));
        assert!(matches!(db.query("c"), Err(DbError::Connection(_))));
        assert_eq!(*db.log().lock().unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn fixed_answers_do_not_consume_queue() {
        let mut db = MockDb::new()
            .respond("clock_ticks", Ok(Snapshot::from_text(&["t"], &[vec!["100"]])))
            .push(Snapshot::from_text(&["n"], &[vec!["7"]]));

        assert_eq!(db.query("SELECT rpgtop.clock_ticks()").unwrap().cell(0, 0), Some("100"));
        assert_eq!(db.query("SELECT 7").unwrap().cell(0, 0), Some("7"));
    }
}
