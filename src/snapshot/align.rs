//! Column widths for fixed-width display.

use std::collections::BTreeMap;

use super::Snapshot;

/// Column index to display width.
pub type ColumnWidths = BTreeMap<usize, usize>;

/// Appended to values cut at the truncation limit.
pub const TRUNCATION_MARKER: char = '~';

/// Widest a column grows to on its own when dynamic widths are off.
pub const MAX_AUTO_WIDTH: usize = 32;

/// Narrowest width given to a column of an empty result.
pub const MIN_COLUMN_WIDTH: usize = 1;

/// Outcome of [`align`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignStatus {
    Aligned,
    /// The snapshot had no rows; widths come from column names only.
    NoRows,
}

/// Updates `widths` for every column of `snapshot`.
///
/// Widths never shrink below what is already recorded. Values at least
/// `limit` characters long are cut to `limit - 1` characters plus
/// [`TRUNCATION_MARKER`] in place. `limit == 0` disables truncation. The
/// last column takes `limit` (or its longest value when truncation is off).
/// With `dynamic` set, columns grow to fit their values.
pub fn align(
    snapshot: &mut Snapshot,
    widths: &mut ColumnWidths,
    limit: usize,
    dynamic: bool,
) -> AlignStatus {
    let names: Vec<usize> = snapshot
        .columns()
        .iter()
        .map(|name| name.chars().count())
        .collect();

    if snapshot.row_count() == 0 {
        for (i, name_len) in names.iter().enumerate() {
            widths.insert(i, (*name_len).max(MIN_COLUMN_WIDTH));
        }
        return AlignStatus::NoRows;
    }

    let last = names.len().saturating_sub(1);
    let rows = snapshot.rows_mut();

    for (i, &name_len) in names.iter().enumerate() {
        let mut width = widths.get(&i).copied().unwrap_or(0).max(name_len);
        let mut longest = 0;

        for row in rows.iter_mut() {
            let Some(value) = row[i].as_mut() else {
                continue;
            };
            let len = value.chars().count();

            let candidate = if len == 0 {
                name_len
            } else if limit > 0 && len >= limit {
                truncate(value, limit);
                limit
            } else if len <= name_len {
                name_len
            } else if dynamic {
                len
            } else if len > 2 * name_len {
                len.min(MAX_AUTO_WIDTH)
            } else {
                name_len
            };

            longest = longest.max(value.chars().count());
            width = width.max(candidate);
        }

        if i == last {
            width = if limit == 0 { width.max(longest) } else { limit };
        }
        widths.insert(i, width);
    }

    AlignStatus::Aligned
}

fn truncate(value: &mut String, limit: usize) {
    let mut cut: String = value.chars().take(limit.saturating_sub(1)).collect();
    cut.push(TRUNCATION_MARKER);
    *value = cut;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_value_is_truncated_with_marker() {
        let mut s = Snapshot::from_text(&["id"], &[vec!["1"], vec!["22"], vec!["48752"]]);
        let mut widths = ColumnWidths::new();

        let status = align(&mut s, &mut widths, 4, false);

        assert_eq!(status, AlignStatus::Aligned);
        assert_eq!(s.cell(2, 0), Some("487~"));
        assert_eq!(s.cell(1, 0), Some("22"));
        assert_eq!(widths[&0], 4);
    }

    #[test]
    fn values_shorter_than_header_are_still_truncated() {
        let mut s = Snapshot::from_text(
            &["datname", "q"],
            &[vec!["postgres", "x"], vec!["abcdef", "x"], vec!["abc", "x"]],
        );
        let mut widths = ColumnWidths::new();

        align(&mut s, &mut widths, 4, false);

        assert_eq!(s.cell(0, 0), Some("pos~"));
        assert_eq!(s.cell(1, 0), Some("abc~"));
        assert_eq!(s.cell(2, 0), Some("abc"));
        assert_eq!(widths[&0], 7);
    }

    #[test]
    fn empty_result_uses_name_lengths() {
        let mut s = Snapshot::from_text(&["pid", "datname", "query"], &[]);
        let mut widths = ColumnWidths::new();

        let status = align(&mut s, &mut widths, 32, false);

        assert_eq!(status, AlignStatus::NoRows);
        assert_eq!(widths[&0], 3);
        assert_eq!(widths[&1], 7);
        assert_eq!(widths[&2], 5);
    }

    #[test]
    fn short_values_take_name_length() {
        let mut s = Snapshot::from_text(&["state", "q"], &[vec!["on", "x"]]);
        let mut widths = ColumnWidths::new();
        align(&mut s, &mut widths, 0, false);
        assert_eq!(widths[&0], 5);
    }

    #[test]
    fn static_widths_only_grow_for_much_longer_values() {
        let mut s = Snapshot::from_text(
            &["name", "user", "q"],
            &[vec!["abcdef", "abcdefghijklmnopqrstuvwxyz0123456789", "x"]],
        );
        let mut widths = ColumnWidths::new();
        align(&mut s, &mut widths, 0, false);

        // 6 <= 2 * 4: keep the name width.
        assert_eq!(widths[&0], 4);
        // 36 > 2 * 4: grow, capped.
        assert_eq!(widths[&1], MAX_AUTO_WIDTH);
    }

    #[test]
    fn dynamic_widths_follow_values() {
        let mut s = Snapshot::from_text(&["name", "q"], &[vec!["abcdef", "x"]]);
        let mut widths = ColumnWidths::new();
        align(&mut s, &mut widths, 0, true);
        assert_eq!(widths[&0], 6);
    }

    #[test]
    fn recorded_width_never_shrinks() {
        let mut s = Snapshot::from_text(&["id", "q"], &[vec!["1", "x"]]);
        let mut widths = ColumnWidths::from([(0, 10)]);
        align(&mut s, &mut widths, 0, false);
        assert_eq!(widths[&0], 10);
    }

    #[test]
    fn last_column_takes_limit_or_longest_value() {
        let mut s = Snapshot::from_text(&["id", "query"], &[vec!["1", "select 1"]]);
        let mut widths = ColumnWidths::new();
        align(&mut s, &mut widths, 20, false);
        assert_eq!(widths[&1], 20);

        let mut s = Snapshot::from_text(&["id", "query"], &[vec!["1", "select now()"]]);
        let mut widths = ColumnWidths::new();
        align(&mut s, &mut widths, 0, false);
        assert_eq!(widths[&1], 12);
    }

    #[test]
    fn null_cells_do_not_widen_columns() {
        let mut s = Snapshot::new(vec!["ab".into(), "q".into()], vec![vec![None, None]]);
        let mut widths = ColumnWidths::new();
        assert_eq!(align(&mut s, &mut widths, 8, false), AlignStatus::Aligned);
        assert_eq!(widths[&0], 2);
    }

    #[test]
    fn truncation_respects_multibyte_characters() {
        let mut s = Snapshot::from_text(&["n"], &[vec!["привет мир"]]);
        let mut widths = ColumnWidths::new();
        align(&mut s, &mut widths, 5, false);
        assert_eq!(s.cell(0, 0), Some("прив~"));
    }
}
