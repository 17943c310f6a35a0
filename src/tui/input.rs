//! Input handling and keybindings.

use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::collector::{Command, Stat};
use crate::view::{ExtraStat, View, ViewRegistry};

/// Shortest refresh reachable with `-`.
pub const MIN_REFRESH: Duration = Duration::from_secs(1);
/// Longest refresh reachable with `+`.
pub const MAX_REFRESH: Duration = Duration::from_secs(300);
const REFRESH_STEP: Duration = Duration::from_secs(1);

/// What the keyboard is currently typing into.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    /// Regex for the order column; Enter applies, Esc cancels.
    Filter(String),
}

/// Result of handling a key event.
#[derive(Debug)]
pub enum KeyAction {
    None,
    Quit,
    /// Forward to the collector.
    Send(Command),
}

/// The screen's copy of the collector settings.
///
/// The collector owns the real ones; this copy exists so that keys can be
/// turned into absolute commands.
#[derive(Debug, Clone)]
pub struct UiState {
    pub view: View,
    pub refresh: Duration,
    pub extra: ExtraStat,
    /// Columns in the last result, used to wrap the order key.
    pub column_count: usize,
    pub mode: InputMode,
    /// One-line notice shown above the table until the next key.
    pub message: Option<String>,
}

impl UiState {
    pub fn new(view: View, refresh: Duration) -> Self {
        let extra = view.extra;
        let refresh = view.refresh.unwrap_or(refresh);
        Self {
            view,
            refresh,
            extra,
            column_count: 0,
            mode: InputMode::Normal,
            message: None,
        }
    }

    /// Adopts what the collector reports it actually used.
    pub fn observe(&mut self, stat: &Stat) {
        let columns = stat.result.column_count();
        if columns > 0 {
            self.column_count = columns;
        }
        self.view.order_key = stat.order_key;
        self.view.order_desc = stat.order_desc;
        self.refresh = stat.refresh;
    }

    fn order_command(&self) -> Command {
        Command::SetOrder {
            column: self.view.order_key,
            descending: self.view.order_desc,
        }
    }
}

/// Handles key input and updates state.
pub fn handle_key(ui: &mut UiState, registry: &ViewRegistry, key: KeyEvent) -> KeyAction {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return KeyAction::Quit;
    }
    match ui.mode {
        InputMode::Normal => {
            ui.message = None;
            handle_normal_mode(ui, registry, key)
        }
        InputMode::Filter(_) => handle_filter_mode(ui, key),
    }
}

fn handle_normal_mode(ui: &mut UiState, registry: &ViewRegistry, key: KeyEvent) -> KeyAction {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => KeyAction::Quit,

        KeyCode::Char('+') => change_refresh(ui, true),
        KeyCode::Char('-') => change_refresh(ui, false),

        KeyCode::Char('x') => {
            ui.extra = ui.extra.next();
            ui.message = Some(format!("extra stats: {}", ui.extra));
            KeyAction::Send(Command::SetExtra(ui.extra))
        }

        KeyCode::Char('<') | KeyCode::Left => {
            ui.view.shift_order(-1, ui.column_count);
            KeyAction::Send(ui.order_command())
        }
        KeyCode::Char('>') | KeyCode::Right => {
            ui.view.shift_order(1, ui.column_count);
            KeyAction::Send(ui.order_command())
        }
        KeyCode::Char('/') => {
            if ui.column_count == 0 {
                return KeyAction::None;
            }
            ui.view.set_order(ui.view.order_key, ui.column_count);
            KeyAction::Send(ui.order_command())
        }

        KeyCode::Char('F') => {
            ui.mode = InputMode::Filter(String::new());
            KeyAction::None
        }
        KeyCode::Char('C') => {
            ui.view.clear_filters();
            ui.message = Some("filters cleared".to_string());
            KeyAction::Send(Command::ClearFilters)
        }

        KeyCode::Char(c) => match registry.by_hotkey(c) {
            Some(view) if view.name == ui.view.name => KeyAction::None,
            Some(view) => {
                let mut view = view.clone();
                view.extra = ui.extra;
                ui.refresh = view.refresh.unwrap_or(ui.refresh);
                ui.column_count = 0;
                ui.view = view.clone();
                KeyAction::Send(Command::SwitchView(Box::new(view)))
            }
            None => KeyAction::None,
        },

        _ => KeyAction::None,
    }
}

fn handle_filter_mode(ui: &mut UiState, key: KeyEvent) -> KeyAction {
    let InputMode::Filter(buffer) = &mut ui.mode else {
        return KeyAction::None;
    };
    match key.code {
        KeyCode::Esc => {
            ui.mode = InputMode::Normal;
            KeyAction::None
        }
        KeyCode::Backspace => {
            buffer.pop();
            KeyAction::None
        }
        KeyCode::Char(c) => {
            buffer.push(c);
            KeyAction::None
        }
        KeyCode::Enter => {
            let pattern = std::mem::take(buffer);
            ui.mode = InputMode::Normal;
            let column = ui.view.order_key;
            let pattern = (!pattern.is_empty()).then_some(pattern);
            match ui.view.set_filter(column, pattern.as_deref()) {
                Ok(()) => KeyAction::Send(Command::SetFilter { column, pattern }),
                Err(e) => {
                    ui.message = Some(e.to_string());
                    KeyAction::None
                }
            }
        }
        _ => KeyAction::None,
    }
}

fn change_refresh(ui: &mut UiState, increase: bool) -> KeyAction {
    let next = if increase {
        (ui.refresh + REFRESH_STEP).min(MAX_REFRESH)
    } else {
        ui.refresh.saturating_sub(REFRESH_STEP).max(MIN_REFRESH)
    };
    if next == ui.refresh {
        ui.message = Some(format!("refresh stays at {}s", ui.refresh.as_secs()));
        return KeyAction::None;
    }
    ui.refresh = next;
    ui.message = Some(format!("refresh {}s", next.as_secs()));
    KeyAction::Send(Command::SetRefresh(next))
}
