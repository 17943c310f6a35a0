//! The collector thread.
//!
//! [`spawn`] moves a [`Collector`] onto its own thread. The thread ticks at
//! the current refresh interval, sends every [`Stat`] on an outbound channel
//! and applies [`Command`]s as they arrive between ticks. It stops when the
//! cancel token is set, when either channel is closed by the other side, or
//! when the database connection is lost; in every case the stats sender is
//! dropped so the consumer sees the end of the stream.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::collector::{CollectError, Collector, Stat};
use super::traits::Database;
use crate::util::CancelToken;
use crate::view::{ExtraStat, View};

/// Longest the thread waits before re-checking the cancel token.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reconfiguration sent to a running collector.
#[derive(Debug, Clone)]
pub enum Command {
    /// Activate another view and sample it immediately.
    SwitchView(Box<View>),
    /// Change the tick interval, effective from the next tick.
    SetRefresh(Duration),
    SetExtra(ExtraStat),
    SetOrder { column: usize, descending: bool },
    /// Set (`Some`) or clear (`None`) the filter on a column.
    SetFilter {
        column: usize,
        pattern: Option<String>,
    },
    ClearFilters,
}

/// Handle to a collector thread.
pub struct CollectorHandle {
    commands: Sender<Command>,
    thread: JoinHandle<Result<(), CollectError>>,
}

impl CollectorHandle {
    /// Sends a command; `false` once the thread has stopped.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Closes the command channel and waits for the thread to finish.
    pub fn join(self) -> Result<(), CollectError> {
        drop(self.commands);
        self.thread.join().map_err(|_| CollectError::Panicked)?
    }
}

/// Starts `collector` on a new thread.
pub fn spawn<D>(
    collector: Collector<D>,
    stats: Sender<Stat>,
    cancel: CancelToken,
) -> Result<CollectorHandle, CollectError>
where
    D: Database + Send + 'static,
{
    let (commands, inbox) = mpsc::channel();
    let thread = thread::Builder::new()
        .name("collector".to_string())
        .spawn(move || run(collector, inbox, stats, cancel))
        .map_err(CollectError::Spawn)?;

    Ok(CollectorHandle { commands, thread })
}

/// Runs the collection loop on the current thread.
pub fn run<D: Database>(
    mut collector: Collector<D>,
    commands: Receiver<Command>,
    stats: Sender<Stat>,
    cancel: CancelToken,
) -> Result<(), CollectError> {
    info!(view = %collector.view().name, "collector started");

    // `None` makes the next iteration tick immediately.
    let mut last_tick: Option<Instant> = None;

    let result = loop {
        if cancel.is_cancelled() {
            break Ok(());
        }

        let now = Instant::now();
        let next_tick = last_tick.map(|t| t + collector.refresh());
        if next_tick.is_none_or(|t| now >= t) {
            last_tick = Some(now);
            match collector.update() {
                Ok(stat) => {
                    if stats.send(stat).is_err() {
                        break Ok(());
                    }
                }
                Err(e) => {
                    error!("collector stopped: {}", e);
                    break Err(e);
                }
            }
            continue;
        }

        let wait = next_tick
            .map_or(Duration::ZERO, |t| t.saturating_duration_since(now))
            .min(POLL_INTERVAL);

        match commands.recv_timeout(wait) {
            Ok(Command::SwitchView(view)) => {
                collector.switch_view(*view);
                last_tick = None;
            }
            Ok(Command::SetRefresh(refresh)) => collector.set_refresh(refresh),
            Ok(Command::SetExtra(extra)) => collector.set_extra(extra),
            Ok(Command::SetOrder { column, descending }) => {
                collector.set_order(column, descending);
                if !republish(&mut collector, &stats) {
                    break Ok(());
                }
            }
            Ok(Command::SetFilter { column, pattern }) => {
                match collector.set_filter(column, pattern.as_deref()) {
                    Ok(()) => {
                        if !republish(&mut collector, &stats) {
                            break Ok(());
                        }
                    }
                    Err(e) => warn!("{}", e),
                }
            }
            Ok(Command::ClearFilters) => {
                collector.clear_filters();
                if !republish(&mut collector, &stats) {
                    break Ok(());
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break Ok(()),
        }
    };

    info!("collector stopped");
    result
}

/// Sends the last result again; `false` when nobody listens any more.
fn republish<D: Database>(collector: &mut Collector<D>, stats: &Sender<Stat>) -> bool {
    match collector.republish() {
        Some(stat) => stats.send(stat).is_ok(),
        None => true,
    }
}
