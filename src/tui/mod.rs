//! Terminal screen for the live monitor.
//!
//! The screen never talks to the database. It receives [`Stat`]s from the
//! collector thread and turns key presses into collector commands.
//!
//! [`Stat`]: crate::collector::Stat

mod app;
mod event;
mod input;
mod render;

pub use app::{App, AppError};
pub use event::{Event, EventHandler};
pub use input::{InputMode, KeyAction, MAX_REFRESH, MIN_REFRESH, UiState, handle_key};
pub use render::{LineKind, Screen, format_uptime, render, screen_lines};
