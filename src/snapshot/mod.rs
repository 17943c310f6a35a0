//! Tabular samples and the delta engine built on top of them.
//!
//! A [`Snapshot`] is one sample of a query result (or of an OS metrics
//! source) rendered as text cells. Two snapshots taken some seconds apart are
//! turned into per-second rates by [`diff`], ordered by [`sort`] and prepared
//! for fixed-width display by [`align`].

mod align;
mod diff;
mod sort;

pub use align::{AlignStatus, ColumnWidths, MAX_AUTO_WIDTH, MIN_COLUMN_WIDTH, TRUNCATION_MARKER, align};
pub use diff::{DiffError, DiffRange, diff};
pub use sort::{column_is_numeric, sort};

/// A single nullable text cell.
pub type Cell = Option<String>;

/// One row: a cell per column, in column order.
pub type Row = Vec<Cell>;

/// One tabular sample.
///
/// Every row always holds exactly one cell per column; constructors pad or
/// cut rows to keep that true. A snapshot with an error never has rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    columns: Vec<String>,
    rows: Vec<Row>,
    valid: bool,
    error: Option<String>,
}

impl Snapshot {
    /// A snapshot that was never sampled.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a valid snapshot from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();

        Self {
            columns,
            rows,
            valid: true,
            error: None,
        }
    }

    /// Convenience constructor for fixtures and OS metric tables.
    pub fn from_text<S: AsRef<str>>(columns: &[S], rows: &[Vec<S>]) -> Self {
        Self::new(
            columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| Some(c.as_ref().to_string())).collect())
                .collect(),
        )
    }

    /// A sampled-but-failed snapshot: valid for the pipeline, no rows.
    pub fn failed(columns: Vec<String>, error: impl Into<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            valid: true,
            error: Some(error.into()),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// `false` until a read completed, successfully or not.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Text of a cell; `None` for NULL or out-of-range coordinates.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }

    /// Returns the index of the named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Keeps only rows for which `keep` returns `true`.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&Row) -> bool) {
        self.rows.retain(|row| keep(row));
    }

    /// Builds a snapshot with the same shape but new rows.
    pub(crate) fn with_rows(&self, rows: Vec<Row>) -> Self {
        Self {
            columns: self.columns.clone(),
            rows,
            valid: self.valid,
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_is_not_valid() {
        let s = Snapshot::empty();
        assert!(!s.is_valid());
        assert_eq!(s.row_count(), 0);
        assert_eq!(s.column_count(), 0);
    }

    #[test]
    fn new_pads_and_cuts_rows_to_column_count() {
        let s = Snapshot::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![Some("1".into())],
                vec![Some("1".into()), Some("2".into()), Some("3".into())],
            ],
        );
        assert!(s.is_valid());
        assert_eq!(s.rows()[0].len(), 2);
        assert_eq!(s.rows()[1].len(), 2);
        assert_eq!(s.cell(0, 1), None);
        assert_eq!(s.cell(1, 1), Some("2"));
    }

    #[test]
    fn failed_snapshot_is_valid_without_rows() {
        let s = Snapshot::failed(vec!["pid".into()], "ERROR: relation does not exist");
        assert!(s.is_valid());
        assert_eq!(s.row_count(), 0);
        assert_eq!(s.error(), Some("ERROR: relation does not exist"));
    }

    #[test]
    fn retain_rows_filters_in_place() {
        let mut s = Snapshot::from_text(&["name"], &[vec!["a"], vec!["b"], vec!["a"]]);
        s.retain_rows(|row| row[0].as_deref() == Some("a"));
        assert_eq!(s.row_count(), 2);
    }

    #[test]
    fn column_index_finds_by_name() {
        let s = Snapshot::from_text(&["pid", "state"], &[]);
        assert_eq!(s.column_index("state"), Some(1));
        assert_eq!(s.column_index("query"), None);
    }
}
