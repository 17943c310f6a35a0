//! Ordering rows of a snapshot by one column.

use std::cmp::Ordering;

use super::Snapshot;

/// Decides whether a column is ordered numerically.
///
/// Only the first row is inspected: if its cell parses as a float the whole
/// column is treated as numeric. A NULL or a non-numeric sentinel in row 0 of
/// an otherwise numeric column makes the column sort as text.
pub fn column_is_numeric(snapshot: &Snapshot, column: usize) -> bool {
    snapshot
        .cell(0, column)
        .is_some_and(|text| text.trim().parse::<f64>().is_ok())
}

/// Sorts rows in place by `column`. Does nothing for an unknown column.
///
/// In a numeric column cells that do not parse compare as zero; in a text
/// column NULL compares as the empty string. The sort is stable.
pub fn sort(snapshot: &mut Snapshot, column: usize, descending: bool) {
    if column >= snapshot.column_count() || snapshot.row_count() < 2 {
        return;
    }

    let numeric = column_is_numeric(snapshot, column);
    let rows = snapshot.rows_mut();

    if numeric {
        let value = |cell: &Option<String>| -> f64 {
            cell.as_deref()
                .and_then(|text| text.trim().parse().ok())
                .unwrap_or(0.0)
        };
        rows.sort_by(|a, b| directed(value(&a[column]).total_cmp(&value(&b[column])), descending));
    } else {
        rows.sort_by(|a, b| {
            let a = a[column].as_deref().unwrap_or("");
            let b = b[column].as_deref().unwrap_or("");
            directed(a.cmp(b), descending)
        });
    }
}

fn directed(ordering: Ordering, descending: bool) -> Ordering {
    if descending { ordering.reverse() } else { ordering }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(snapshot: &Snapshot, c: usize) -> Vec<String> {
        (0..snapshot.row_count())
            .map(|r| snapshot.cell(r, c).unwrap_or("NULL").to_string())
            .collect()
    }

    #[test]
    fn numeric_descending_then_ascending_is_reversed() {
        let mut s = Snapshot::from_text(
            &["name", "calls"],
            &[vec!["a", "10"], vec!["b", "2.5"], vec!["c", "300"], vec!["d", "41"]],
        );
        sort(&mut s, 1, true);
        let desc = column(&s, 0);
        assert_eq!(desc, ["c", "d", "a", "b"]);

        sort(&mut s, 1, false);
        let mut asc = column(&s, 0);
        asc.reverse();
        assert_eq!(asc, desc);
    }

    #[test]
    fn numeric_column_is_not_compared_as_text() {
        let mut s = Snapshot::from_text(&["n"], &[vec!["9"], vec!["10"], vec!["100"]]);
        sort(&mut s, 0, false);
        assert_eq!(column(&s, 0), ["9", "10", "100"]);
    }

    #[test]
    fn text_column_is_lexicographic() {
        let mut s = Snapshot::from_text(&["n"], &[vec!["direct"], vec!["bronze"], vec!["cilla"]]);
        sort(&mut s, 0, false);
        assert_eq!(column(&s, 0), ["bronze", "cilla", "direct"]);
        sort(&mut s, 0, true);
        assert_eq!(column(&s, 0), ["direct", "cilla", "bronze"]);
    }

    #[test]
    fn type_is_sniffed_from_first_row_only() {
        let s = Snapshot::from_text(&["n"], &[vec!["5"], vec!["abc"]]);
        assert!(column_is_numeric(&s, 0));

        let s = Snapshot::from_text(&["n"], &[vec!["n/a"], vec!["5"]]);
        assert!(!column_is_numeric(&s, 0));

        let s = Snapshot::new(
            vec!["n".into()],
            vec![vec![None], vec![Some("5".into())]],
        );
        assert!(!column_is_numeric(&s, 0));
    }

    #[test]
    fn unparsable_cells_sort_as_zero_in_numeric_column() {
        let mut s = Snapshot::from_text(&["n"], &[vec!["5"], vec!["-1"], vec!["junk"]]);
        sort(&mut s, 0, false);
        assert_eq!(column(&s, 0), ["-1", "junk", "5"]);
    }

    #[test]
    fn unknown_column_is_ignored() {
        let mut s = Snapshot::from_text(&["n"], &[vec!["b"], vec!["a"]]);
        sort(&mut s, 3, false);
        assert_eq!(column(&s, 0), ["b", "a"]);
    }
}
