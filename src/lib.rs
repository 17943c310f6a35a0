//! rpgtop - live PostgreSQL monitor library.
//!
//! This library provides the core functionality shared between:
//! - `rpgtop` - top-like screen with per-second rates of statistics views
//! - `rpgprofile` - wait-event profiler for a single backend

pub mod collector;
pub mod profile;
pub mod snapshot;
pub mod tui;
pub mod util;
pub mod view;
