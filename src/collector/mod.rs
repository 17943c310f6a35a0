//! Sampling of the monitored database and its host.
//!
//! # Architecture
//!
//! ```text
//!   UI thread                    collector thread
//! ┌────────────┐  Command   ┌──────────────────────────────┐
//! │            │──────────▶ │  Collector                   │
//! │  renderer  │            │  ┌──────────┐  ┌──────────┐  │
//! │            │ ◀──────────│  │ Database │  │ProcReader│  │
//! └────────────┘    Stat    │  └────┬─────┘  └────┬─────┘  │
//!                           │       └──── diff ───┘        │
//!                           └──────────────────────────────┘
//! ```
//!
//! - `traits` - the `FileSystem` and `Database` seams
//! - `procfs` - OS metrics from `/proc`, local or through the helper schema
//! - `pg_collector` - the PostgreSQL session
//! - `collector` - one update cycle producing a `Stat`
//! - `task` - the collector thread and its command channel
//! - `mock` - test doubles for the seams

#[allow(clippy::module_inception)]
mod collector;
pub mod mock;
pub mod pg_collector;
pub mod procfs;
mod task;
mod traits;

pub use collector::{
    CollectError, Collector, CollectorConfig, DEFAULT_TRUNCATE, ExtraTable, OsSource, Stat,
    SysStat,
};
pub use pg_collector::{ConfigError, ConnectionArgs, ConnectionConfig, PostgresDb, SslMode};
pub use task::{Command, CollectorHandle, run, spawn};
pub use traits::{Database, DbError, FileSystem, RealFs};
