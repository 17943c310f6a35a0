//! Seams between the collector and the outside world.
//!
//! The `FileSystem` trait lets OS metrics be read from the real `/proc` on
//! Linux or from an in-memory `MockFs` in tests. The `Database` trait does the
//! same for the monitored server: production code talks to PostgreSQL, tests
//! replay scripted results.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::snapshot::Snapshot;

/// Abstraction for filesystem reads.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Error returned by [`Database::query`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// The session is gone; callers must stop using this database.
    #[error("PostgreSQL: {0}")]
    Connection(String),
    /// The statement failed; the session is still usable.
    #[error("PostgreSQL query error: {0}")]
    Query(String),
}

/// A monitored database server.
pub trait Database {
    /// Runs `sql` and returns its result with every value rendered as text.
    fn query(&mut self, sql: &str) -> Result<Snapshot, DbError>;

    /// `server_version_num` of the connected server, e.g. `160002`.
    fn server_version_num(&self) -> Option<i32>;
}

impl<D: Database + ?Sized> Database for Box<D> {
    fn query(&mut self, sql: &str) -> Result<Snapshot, DbError> {
        (**self).query(sql)
    }

    fn server_version_num(&self) -> Option<i32> {
        (**self).server_version_num()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_real_fs_read_to_string() {
        let fs = RealFs::new();
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        let content = fs.read_to_string(&cargo_toml).unwrap();
        assert!(content.contains("[package]"));
    }

    #[test]
    fn test_real_fs_missing_file() {
        let fs = RealFs::new();
        assert!(fs.read_to_string(Path::new("/nonexistent/path/12345")).is_err());
    }
}
