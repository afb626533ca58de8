//! Row ordering by a column's display values.

use super::Workbook;
use crate::error::WorkbookError;
use gridsync_engine::engine::{CellId, parse_number};
use std::cmp::Ordering;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = WorkbookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(WorkbookError::InvalidSortDirection(other.to_string())),
        }
    }
}

/// Compare two non-empty display values: numbers before text, numbers
/// numerically, text lexicographically.
fn compare_values(a: &str, b: &str) -> Ordering {
    match (parse_number(a), parse_number(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

impl Workbook {
    /// Row numbers `1..=rows` ordered by the display values in `column` on
    /// the current page. Empty cells always sort last. The sort is stable.
    pub fn sorted_rows(&self, column: u32, rows: u32, direction: SortDirection) -> Vec<u32> {
        let store = self.store();
        let mut keyed: Vec<(u32, String)> = (1..=rows)
            .map(|row| (row, store.display_value(CellId::new(column, row - 1))))
            .collect();

        keyed.sort_by(|(_, a), (_, b)| match (a.is_empty(), b.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = compare_values(a, b);
                match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            }
        });

        keyed.into_iter().map(|(row, _)| row).collect()
    }
}
