//! Main TUI application.

use std::io;
use std::sync::mpsc::Receiver;

use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use thiserror::Error;
use tracing::{debug, info};

use crate::collector::{CollectError, CollectorHandle, Stat};
use crate::util::CancelToken;
use crate::view::ViewRegistry;

use super::event::{Event, EventHandler};
use super::input::{KeyAction, UiState, handle_key};
use super::render::render;

/// Error that ends the monitor session.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("terminal error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Collect(#[from] CollectError),
}

/// Live monitor screen.
pub struct App {
    registry: ViewRegistry,
    ui: UiState,
    collector: CollectorHandle,
    cancel: CancelToken,
    last: Option<Stat>,
}

impl App {
    pub fn new(
        registry: ViewRegistry,
        ui: UiState,
        collector: CollectorHandle,
        cancel: CancelToken,
    ) -> Self {
        Self {
            registry,
            ui,
            collector,
            cancel,
            last: None,
        }
    }

    /// Shows `stats` until the user quits or the stream ends.
    ///
    /// Returns the collector's error when the stream ended because the
    /// database went away.
    pub fn run(mut self, stats: Receiver<Stat>) -> Result<(), AppError> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let events = EventHandler::new();
        let relay = events.relay_stats(stats)?;
        let input = events.listen_terminal(self.cancel.clone())?;

        let result = self.event_loop(&mut terminal, &events);

        self.cancel.cancel();
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        drop(events);
        let _ = input.join();
        let _ = relay.join();
        result?;
        self.collector.join()?;
        Ok(())
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        events: &EventHandler,
    ) -> io::Result<()> {
        loop {
            terminal.draw(|frame| render(frame, self.last.as_ref(), &self.ui))?;

            match events.next() {
                Some(Event::Stat(stat)) => {
                    self.ui.observe(&stat);
                    self.last = Some(*stat);
                }
                Some(Event::Key(key)) => match handle_key(&mut self.ui, &self.registry, key) {
                    KeyAction::Quit => {
                        info!("quit requested");
                        return Ok(());
                    }
                    KeyAction::Send(command) => {
                        debug!("sending {:?}", command);
                        if !self.collector.send(command) {
                            return Ok(());
                        }
                    }
                    KeyAction::None => {}
                },
                Some(Event::Resize(..)) => {}
                Some(Event::StreamEnd) | None => return Ok(()),
            }
        }
    }
}
