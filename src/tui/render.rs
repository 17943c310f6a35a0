//! Main rendering logic for TUI.
//!
//! The screen is plain text: a few system lines, a status line, the view's
//! table and optionally the device table. [`screen_lines`] builds it without
//! a terminal; [`render`] only paints the result.

use ratatui::Frame;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::collector::{ExtraTable, Stat, SysStat};
use crate::snapshot::{AlignStatus, ColumnWidths, Snapshot};

use super::input::{InputMode, UiState};

/// Kind of a screen line, used only for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Plain,
    Status,
    TableHeader,
    Error,
}

/// Text content of the screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Screen {
    pub lines: Vec<(LineKind, String)>,
}

impl Screen {
    fn push(&mut self, kind: LineKind, text: impl Into<String>) {
        self.lines.push((kind, text.into()));
    }

    /// Lines without their kinds.
    pub fn text(&self) -> Vec<&str> {
        self.lines.iter().map(|(_, l)| l.as_str()).collect()
    }
}

/// Formats seconds since boot as `N days, H:MM` or `H:MM`.
pub fn format_uptime(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64 / 60;
    let (days, hours, minutes) = (total / 1440, total / 60 % 24, total % 60);
    match days {
        0 => format!("{}:{:02}", hours, minutes),
        1 => format!("1 day, {}:{:02}", hours, minutes),
        _ => format!("{} days, {}:{:02}", days, hours, minutes),
    }
}

fn sys_lines(screen: &mut Screen, stat: &Stat) {
    let SysStat {
        cpu,
        mem,
        load,
        uptime,
    } = &stat.sys;

    let up = uptime.map_or_else(|| "?".to_string(), format_uptime);
    screen.push(
        LineKind::Plain,
        format!(
            "rpgtop: {} up {}, refresh {}s, view {}",
            stat.collected_at.format("%H:%M:%S"),
            up,
            stat.refresh.as_secs(),
            stat.view
        ),
    );
    screen.push(
        LineKind::Plain,
        format!(
            "load average: {:.2}, {:.2}, {:.2}",
            load.load1, load.load5, load.load15
        ),
    );
    screen.push(
        LineKind::Plain,
        format!(
            "%cpu: {:.1} us, {:.1} ni, {:.1} sy, {:.1} id, {:.1} wa, {:.1} hi, {:.1} si, {:.1} st",
            cpu.user, cpu.nice, cpu.system, cpu.idle, cpu.iowait, cpu.irq, cpu.softirq, cpu.steal
        ),
    );
    screen.push(
        LineKind::Plain,
        format!(
            "MiB mem: {} total, {} free, {} used, {} buff, {} cached, {} dirty, {} writeback, {} slab",
            mem.total, mem.free, mem.used, mem.buffers, mem.cached, mem.dirty, mem.writeback, mem.slab
        ),
    );
    screen.push(
        LineKind::Plain,
        format!(
            "MiB swap: {} total, {} free, {} used",
            mem.swap_total, mem.swap_free, mem.swap_used
        ),
    );
}

fn pad(text: &str, width: usize) -> String {
    format!("{:<width$}", text, width = width)
}

fn width_of(widths: &ColumnWidths, column: usize, name: &str) -> usize {
    widths
        .get(&column)
        .copied()
        .unwrap_or_else(|| name.chars().count())
}

/// Header and rows of an aligned table; the order column is marked.
fn table_lines(
    screen: &mut Screen,
    table: &Snapshot,
    widths: &ColumnWidths,
    order: Option<(usize, bool)>,
) {
    let header: Vec<String> = table
        .columns()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let label = match order {
                Some((key, desc)) if key == i => {
                    format!("{}{}", name, if desc { "▼" } else { "▲" })
                }
                _ => name.clone(),
            };
            pad(&label, width_of(widths, i, name).max(label.chars().count()))
        })
        .collect();
    screen.push(LineKind::TableHeader, header.join(" ").trim_end().to_string());

    for row in table.rows() {
        let cells: Vec<String> = table
            .columns()
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut width = width_of(widths, i, name);
                if let Some((key, _)) = order
                    && key == i
                {
                    width = width.max(name.chars().count() + 1);
                }
                let value = row.get(i).and_then(|c| c.as_deref()).unwrap_or("");
                pad(value, width)
            })
            .collect();
        screen.push(LineKind::Plain, cells.join(" ").trim_end().to_string());
    }
}

fn extra_lines(screen: &mut Screen, extra: &ExtraTable) {
    screen.push(LineKind::Plain, "");
    table_lines(screen, &extra.table, &extra.widths, None);
}

/// Builds the whole screen for `stat`.
pub fn screen_lines(stat: &Stat, ui: &UiState) -> Screen {
    let mut screen = Screen::default();
    sys_lines(&mut screen, stat);

    let status = match (&ui.mode, &ui.message) {
        (InputMode::Filter(buffer), _) => {
            let column = stat
                .result
                .columns()
                .get(ui.view.order_key)
                .map_or("?", String::as_str);
            format!("filter {}: {}", column, buffer)
        }
        (InputMode::Normal, Some(message)) => message.clone(),
        (InputMode::Normal, None) if stat.filtered => {
            format!("{} rows (filtered)", stat.result.row_count())
        }
        (InputMode::Normal, None) => String::new(),
    };
    screen.push(LineKind::Status, status);

    if let Some(error) = stat.result.error() {
        screen.push(LineKind::Error, error);
    } else {
        table_lines(
            &mut screen,
            &stat.result,
            &stat.widths,
            Some((stat.order_key, stat.order_desc)),
        );
        if stat.align == AlignStatus::NoRows {
            screen.push(LineKind::Plain, "(no rows)");
        }
    }

    if let Some(extra) = &stat.extra {
        extra_lines(&mut screen, extra);
    }
    screen
}

fn style(kind: LineKind) -> Style {
    match kind {
        LineKind::Plain => Style::default(),
        LineKind::Status => Style::default().fg(Color::Yellow),
        LineKind::TableHeader => Style::default()
            .fg(Color::Black)
            .bg(Color::Gray)
            .add_modifier(Modifier::BOLD),
        LineKind::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

/// Paints the last stat, or a waiting notice before the first one.
pub fn render(frame: &mut Frame, stat: Option<&Stat>, ui: &UiState) {
    let lines: Vec<Line> = match stat {
        Some(stat) => screen_lines(stat, ui)
            .lines
            .into_iter()
            .map(|(kind, text)| Line::from(Span::styled(text, style(kind))))
            .collect(),
        None => vec![Line::from(format!(
            "rpgtop: waiting for the first sample of {}...",
            ui.view.name
        ))],
    };
    frame.render_widget(Paragraph::new(lines), frame.area());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockDb, MockFs};
    use crate::collector::procfs::LocalProc;
    use crate::collector::{Collector, CollectorConfig, DbError, OsSource};
    use crate::view::{ExtraStat, View};
    use std::time::Duration;

    fn collector(db: MockDb, view: View) -> (Collector<MockDb>, MockFs) {
        let fs = MockFs::typical_system();
        let os = OsSource::Local(Box::new(LocalProc::new(fs.clone())));
        (
            Collector::new(db, os, view, CollectorConfig::default()),
            fs,
        )
    }

    fn ui(view: &View) -> UiState {
        UiState::new(view.clone(), Duration::from_secs(1))
    }

    #[test]
    fn uptime_formats() {
        assert_eq!(format_uptime(12345.67), "3:25");
        assert_eq!(format_uptime(86400.0 + 3600.0), "1 day, 1:00");
        assert_eq!(format_uptime(3.0 * 86400.0 + 59.0), "3 days, 0:00");
    }

    #[test]
    fn table_is_padded_and_order_marked() {
        let view = View::new("main", "SELECT").with_order(1, true);
        let db = MockDb::new().push(Snapshot::from_text(
            &["name", "n"],
            &[vec!["ab", "1"], vec!["abcd", "22"]],
        ));
        let (mut c, _) = collector(db, view.clone());
        let stat = c.update().unwrap();

        let screen = screen_lines(&stat, &ui(&view));
        let text = screen.text();
        assert!(text[0].starts_with("rpgtop: "));
        assert!(text[0].ends_with("up 3:25, refresh 1s, view main"));
        assert_eq!(text[1], "load average: 0.15, 0.10, 0.05");

        let header = text.iter().position(|l| l.starts_with("name")).unwrap();
        assert_eq!(screen.lines[header].0, LineKind::TableHeader);
        assert_eq!(text[header], "name n▼");
        assert_eq!(text[header + 1], "abcd 22");
        assert_eq!(text[header + 2], "ab   1");
    }

    #[test]
    fn query_error_replaces_table() {
        let view = View::new("main", "SELECT");
        let db = MockDb::new().push_error(DbError::Query("ERROR: relation does not exist".into()));
        let (mut c, _) = collector(db, view.clone());
        let stat = c.update().unwrap();

        let screen = screen_lines(&stat, &ui(&view));
        let (kind, text) = screen.lines.last().unwrap();
        assert_eq!(*kind, LineKind::Error);
        assert_eq!(text, "ERROR: relation does not exist");
    }

    #[test]
    fn empty_result_says_so() {
        let view = View::new("main", "SELECT");
        let db = MockDb::new().push(Snapshot::from_text::<&str>(&["pid", "query"], &[]));
        let (mut c, _) = collector(db, view.clone());
        let stat = c.update().unwrap();

        let text = screen_lines(&stat, &ui(&view)).text().join("\n");
        assert!(text.ends_with("(no rows)"));
    }

    #[test]
    fn extra_table_follows_main_table() {
        let view = View::new("main", "SELECT").with_extra(ExtraStat::Netdev);
        let db = MockDb::new().push(Snapshot::from_text(&["n"], &[vec!["1"]]));
        let (mut c, _) = collector(db, view.clone());
        let stat = c.update().unwrap();

        let text = screen_lines(&stat, &ui(&view)).text().join("\n");
        assert!(text.contains("\ninterface"));
        assert!(text.contains("\neth0"));
    }

    #[test]
    fn filter_prompt_shows_column() {
        let view = View::new("main", "SELECT");
        let db = MockDb::new().push(Snapshot::from_text(&["state"], &[vec!["idle"]]));
        let (mut c, _) = collector(db, view.clone());
        let stat = c.update().unwrap();

        let mut ui = ui(&view);
        ui.mode = InputMode::Filter("act".into());
        let screen = screen_lines(&stat, &ui);
        assert!(screen.lines.contains(&(LineKind::Status, "filter state: act".to_string())));
    }
}
