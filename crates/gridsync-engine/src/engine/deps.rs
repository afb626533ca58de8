//! Dependency extraction from formula bodies.
//!
//! Every substring made of uppercase letters followed by digits is a
//! reference. Range tokens (`A1:B3`) expand to the rectangle between their
//! corners, whichever corner comes first.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use super::cell_ref::CellId;

/// Ranges larger than this are never expanded.
pub const MAX_RANGE_CELLS: u64 = 1_000_000;

/// Scan a formula body (without the leading `=`) for cell references.
///
/// Results are deduplicated and keep first-occurrence order. Tokens that look
/// like references but are not valid ids (`A0`) are skipped.
pub fn extract_dependencies(body: &str) -> Vec<CellId> {
    let mut seen = HashSet::new();
    let mut deps = Vec::new();
    for m in reference_re().find_iter(body) {
        if let Some(id) = CellId::parse(m.as_str())
            && seen.insert(id)
        {
            deps.push(id);
        }
    }
    deps
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Z]+[0-9]+").expect("reference regex must compile"))
}

/// Parse a range like "A1:B5" into its two corners.
pub fn parse_range(range: &str) -> Option<(CellId, CellId)> {
    let (start, end) = range.split_once(':')?;
    Some((CellId::parse(start)?, CellId::parse(end)?))
}

/// Expand two corners into every cell of the rectangle, row by row.
///
/// Returns None when the rectangle exceeds [`MAX_RANGE_CELLS`].
pub fn expand_range(start: CellId, end: CellId) -> Option<Vec<CellId>> {
    let min_row = start.row.min(end.row);
    let max_row = start.row.max(end.row);
    let min_col = start.col.min(end.col);
    let max_col = start.col.max(end.col);

    let row_count = (max_row - min_row) as u64 + 1;
    let col_count = (max_col - min_col) as u64 + 1;
    let cell_count = row_count.checked_mul(col_count)?;
    if cell_count > MAX_RANGE_CELLS {
        return None;
    }

    let mut cells = Vec::with_capacity(cell_count as usize);
    for row in min_row..=max_row {
        for col in min_col..=max_col {
            cells.push(CellId::new(col, row));
        }
    }
    Some(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<CellId> {
        names.iter().map(|n| CellId::parse(n).unwrap()).collect()
    }

    #[test]
    fn test_extract_dedups_in_first_occurrence_order() {
        assert_eq!(extract_dependencies("B2+A1*B2+A10"), ids(&["B2", "A1", "A10"]));
    }

    #[test]
    fn test_extract_ignores_lowercase_and_invalid_rows() {
        assert_eq!(extract_dependencies("a1+A0+C3"), ids(&["C3"]));
    }

    #[test]
    fn test_extract_finds_range_corners() {
        assert_eq!(extract_dependencies("SUM(A1:A3)"), ids(&["A1", "A3"]));
    }

    #[test]
    fn test_expand_range_normalizes_corners() {
        let (start, end) = parse_range("B2:A1").unwrap();
        assert_eq!(expand_range(start, end).unwrap(), ids(&["A1", "B1", "A2", "B2"]));
    }

    #[test]
    fn test_expand_range_over_limit() {
        let (start, end) = parse_range("A1:A1000001").unwrap();
        assert!(expand_range(start, end).is_none());
    }

    #[test]
    fn test_parse_range_rejects_garbage() {
        assert!(parse_range("A1").is_none());
        assert!(parse_range("A1:").is_none());
        assert!(parse_range("A1:B0").is_none());
    }
}
