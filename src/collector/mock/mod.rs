//! Test doubles for the collector seams.
//!
//! `MockFs` with pre-built `/proc` scenarios stands in for the OS, and
//! `MockDb` replays scripted query results in place of a live server.

mod database;
mod filesystem;
mod scenarios;

pub use database::{MockDb, QueryLog};
pub use filesystem::MockFs;
