//! Views: named, swappable descriptions of what is being monitored.
//!
//! A [`View`] carries a ready-to-run query together with everything the
//! collector needs to turn its result into rates (diff range, key column) and
//! the runtime state the user changes while watching it (ordering, filters,
//! column widths). Views are plain values: the UI owns the registry and hands
//! copies to the collector over its command channel.

mod builtin;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::snapshot::{ColumnWidths, DiffRange, Row};

/// Error returned when a view is reconfigured with bad input.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("invalid filter pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("column {column} does not exist (view has {count} columns)")]
    Column { column: usize, count: usize },
}

/// Auxiliary OS table shown together with a view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtraStat {
    #[default]
    None,
    /// Per-device block I/O from `/proc/diskstats`.
    Diskstats,
    /// Per-interface traffic from `/proc/net/dev`.
    Netdev,
}

impl ExtraStat {
    /// Cycles none → disks → network → none.
    pub fn next(self) -> Self {
        match self {
            ExtraStat::None => ExtraStat::Diskstats,
            ExtraStat::Diskstats => ExtraStat::Netdev,
            ExtraStat::Netdev => ExtraStat::None,
        }
    }
}

impl fmt::Display for ExtraStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtraStat::None => write!(f, "none"),
            ExtraStat::Diskstats => write!(f, "diskstats"),
            ExtraStat::Netdev => write!(f, "netdev"),
        }
    }
}

/// Row filter on one column.
#[derive(Debug, Clone)]
pub struct ColumnFilter {
    pattern: String,
    regex: Regex,
}

impl ColumnFilter {
    pub fn new(pattern: &str) -> Result<Self, ViewError> {
        let regex = Regex::new(pattern).map_err(|source| ViewError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// NULL cells never match.
    pub fn matches(&self, cell: Option<&str>) -> bool {
        cell.is_some_and(|text| self.regex.is_match(text))
    }
}

/// One monitored view.
#[derive(Debug, Clone)]
pub struct View {
    pub name: String,
    pub query: String,
    /// Counter columns; `None` shows the query result as is.
    pub diff: Option<DiffRange>,
    /// Column used to match rows between samples.
    pub unique_key: usize,
    pub order_key: usize,
    pub order_desc: bool,
    /// Refresh interval this view asks for; `None` keeps the current one.
    pub refresh: Option<Duration>,
    pub filters: BTreeMap<usize, ColumnFilter>,
    pub widths: ColumnWidths,
    pub extra: ExtraStat,
    /// Key that selects the view in the interactive monitor.
    pub hotkey: Option<char>,
}

impl View {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            diff: None,
            unique_key: 0,
            order_key: 0,
            order_desc: true,
            refresh: None,
            filters: BTreeMap::new(),
            widths: ColumnWidths::new(),
            extra: ExtraStat::None,
            hotkey: None,
        }
    }

    pub fn with_diff(mut self, first: usize, last: usize) -> Self {
        self.diff = Some(DiffRange::new(first, last));
        self
    }

    pub fn with_unique_key(mut self, column: usize) -> Self {
        self.unique_key = column;
        self
    }

    pub fn with_order(mut self, column: usize, descending: bool) -> Self {
        self.order_key = column;
        self.order_desc = descending;
        self
    }

    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = Some(refresh);
        self
    }

    pub fn with_extra(mut self, extra: ExtraStat) -> Self {
        self.extra = extra;
        self
    }

    pub fn with_hotkey(mut self, key: char) -> Self {
        self.hotkey = Some(key);
        self
    }

    /// Orders by `column`, flipping the direction when it is already the key.
    ///
    /// `column_count` is the width of the last result; the key is clamped to
    /// it so that it always names an existing column.
    pub fn set_order(&mut self, column: usize, column_count: usize) {
        let column = column.min(column_count.saturating_sub(1));
        if column == self.order_key {
            self.order_desc = !self.order_desc;
        } else {
            self.order_key = column;
            self.order_desc = true;
        }
    }

    /// Moves the order key one column left (`step < 0`) or right, wrapping.
    pub fn shift_order(&mut self, step: isize, column_count: usize) {
        if column_count == 0 {
            return;
        }
        let count = column_count as isize;
        let next = (self.order_key as isize + step).rem_euclid(count);
        self.order_key = next as usize;
    }

    /// Sets or clears (`pattern == None`, or empty) the filter of a column.
    pub fn set_filter(&mut self, column: usize, pattern: Option<&str>) -> Result<(), ViewError> {
        match pattern.filter(|p| !p.is_empty()) {
            Some(p) => {
                self.filters.insert(column, ColumnFilter::new(p)?);
            }
            None => {
                self.filters.remove(&column);
            }
        }
        Ok(())
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    /// `true` when a row passes every column filter.
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|(column, filter)| {
            filter.matches(row.get(*column).and_then(|c| c.as_deref()))
        })
    }
}

/// Ordered collection of views.
#[derive(Debug, Clone, Default)]
pub struct ViewRegistry {
    views: Vec<View>,
}

impl ViewRegistry {
    pub fn new(views: Vec<View>) -> Self {
        Self { views }
    }

    /// Views built into the monitor, with queries chosen for the server
    /// version (`server_version_num`, e.g. `160002`).
    pub fn builtin(server_version_num: Option<i32>) -> Self {
        Self::new(builtin::views(server_version_num.unwrap_or(0)))
    }

    pub fn get(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|v| v.name == name)
    }

    pub fn by_hotkey(&self, key: char) -> Option<&View> {
        self.views.iter().find(|v| v.hotkey == Some(key))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.views.iter().map(|v| v.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &View> {
        self.views.iter()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| Some(c.to_string())).collect()
    }

    #[test]
    fn set_order_toggles_on_same_column() {
        let mut v = View::new("t", "select 1").with_order(2, true);
        v.set_order(2, 5);
        assert_eq!((v.order_key, v.order_desc), (2, false));
        v.set_order(3, 5);
        assert_eq!((v.order_key, v.order_desc), (3, true));
    }

    #[test]
    fn set_order_clamps_to_column_count() {
        let mut v = View::new("t", "select 1");
        v.set_order(10, 3);
        assert_eq!(v.order_key, 2);
    }

    #[test]
    fn shift_order_wraps() {
        let mut v = View::new("t", "select 1").with_order(0, true);
        v.shift_order(-1, 4);
        assert_eq!(v.order_key, 3);
        v.shift_order(1, 4);
        assert_eq!(v.order_key, 0);
    }

    #[test]
    fn filters_are_anded() {
        let mut v = View::new("t", "select 1");
        v.set_filter(0, Some("^post")).unwrap();
        v.set_filter(1, Some("active")).unwrap();

        assert!(v.matches(&row(&["postgres", "active"])));
        assert!(!v.matches(&row(&["postgres", "idle"])));
        assert!(!v.matches(&row(&["app", "active"])));
    }

    #[test]
    fn empty_pattern_clears_filter() {
        let mut v = View::new("t", "select 1");
        v.set_filter(0, Some("x")).unwrap();
        v.set_filter(0, Some("")).unwrap();
        assert!(v.filters.is_empty());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let mut v = View::new("t", "select 1");
        let err = v.set_filter(0, Some("(unclosed")).unwrap_err();
        assert!(matches!(err, ViewError::Pattern { .. }));
        assert!(v.filters.is_empty());
    }

    #[test]
    fn null_cell_does_not_match_filter() {
        let mut v = View::new("t", "select 1");
        v.set_filter(0, Some(".*")).unwrap();
        assert!(!v.matches(&vec![None]));
    }

    #[test]
    fn extra_stat_cycles() {
        assert_eq!(ExtraStat::None.next(), ExtraStat::Diskstats);
        assert_eq!(ExtraStat::Diskstats.next(), ExtraStat::Netdev);
        assert_eq!(ExtraStat::Netdev.next(), ExtraStat::None);
    }

    #[test]
    fn builtin_registry_has_unique_names_and_hotkeys() {
        let reg = ViewRegistry::builtin(Some(160000));
        let mut names: Vec<_> = reg.names().collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), reg.len());

        let mut keys: Vec<_> = reg.iter().filter_map(|v| v.hotkey).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), reg.len());
        assert!(reg.get("activity").is_some());
        assert_eq!(reg.by_hotkey('d').map(|v| v.name.as_str()), Some("databases"));
    }
}
