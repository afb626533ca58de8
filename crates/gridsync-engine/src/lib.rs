//! gridsync_engine - Reactive formula engine for collaborative grids.

pub mod engine;

pub use engine::{Cell, CellId, CellStore, apply_edit, evaluate};

#[cfg(test)]
mod tests {
    use crate::engine::*;
    use pretty_assertions::assert_eq;

    fn id(name: &str) -> CellId {
        CellId::parse(name).unwrap()
    }

    fn store_with(values: &[(&str, &str)]) -> CellStore {
        let mut store = CellStore::new();
        for (name, raw) in values {
            apply_edit(&mut store, id(name), raw);
        }
        store
    }

    #[test]
    fn test_parse_single_letter_columns() {
        let a1 = id("A1");
        assert_eq!((a1.col, a1.row), (0, 0));
        let z1 = id("Z1");
        assert_eq!((z1.col, z1.row), (25, 0));
    }

    #[test]
    fn test_parse_multi_letter_columns() {
        assert_eq!(id("AA1").col, 26);
        assert_eq!(id("AB1").col, 27);
        assert_eq!(id("AZ1").col, 51);
        assert_eq!(id("BA1").col, 52);
        assert_eq!(id("AA17").row, 16);
    }

    #[test]
    fn test_parse_invalid_inputs() {
        assert!(CellId::parse("").is_none());
        assert!(CellId::parse("123").is_none());
        assert!(CellId::parse("ABC").is_none());
        assert!(CellId::parse("A0").is_none());
        assert!(CellId::parse("1A").is_none());
        assert!(CellId::parse("A 1").is_none());
        assert!(CellId::parse("a1").is_none());
    }

    #[test]
    fn test_literals_evaluate_to_themselves() {
        let store = store_with(&[("A1", "3")]);
        for literal in ["", "hello", "42", " =A1", "#ERROR", "SUM(A1:A2)"] {
            let evaluation = evaluate(literal, &store);
            assert_eq!(evaluation.display_value, literal);
            assert!(evaluation.dependencies.is_empty());
        }
    }

    #[test]
    fn test_sum_average_count() {
        let store = store_with(&[("A1", "3"), ("A2", "4")]);
        let sum = evaluate("=SUM(A1:A2)", &store);
        assert_eq!(sum.display_value, "7");
        assert_eq!(sum.dependencies, vec![id("A1"), id("A2")]);
        assert_eq!(evaluate("=AVERAGE(A1:A2)", &store).display_value, "3.5");

        let store = store_with(&[("A2", "4")]);
        assert_eq!(evaluate("=COUNT(A1:A2)", &store).display_value, "1");
    }

    #[test]
    fn test_arithmetic_with_references() {
        let store = store_with(&[("A1", "3"), ("A2", "4")]);
        let evaluation = evaluate("=A1+A2", &store);
        assert_eq!(evaluation.display_value, "7");
        assert_eq!(evaluation.dependencies, vec![id("A1"), id("A2")]);

        let store = store_with(&[("A1", "3"), ("A2", "")]);
        assert_eq!(evaluate("=A1+A2", &store).display_value, "3");
    }

    #[test]
    fn test_division_by_zero_is_error() {
        let store = store_with(&[("A1", "3")]);
        assert_eq!(evaluate("=A1/0", &store).display_value, ERROR_SENTINEL);
    }

    #[test]
    fn test_evaluate_is_pure() {
        let store = store_with(&[("A1", "3"), ("B1", "=A1*2")]);
        let before = store.clone();
        let first = evaluate("=B1+A1", &store);
        let second = evaluate("=B1+A1", &store);
        assert_eq!(first, second);
        assert_eq!(store, before);
    }

    #[test]
    fn test_same_edit_twice_is_idempotent() {
        let mut once = store_with(&[("A1", "3"), ("B1", "=A1*2"), ("C1", "=SUM(A1:B1)")]);
        let mut twice = once.clone();
        apply_edit(&mut once, id("A1"), "10");
        apply_edit(&mut twice, id("A1"), "10");
        apply_edit(&mut twice, id("A1"), "10");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_propagation_reaches_transitive_dependents() {
        let mut store = store_with(&[("B1", "=A1*2"), ("C1", "=B1+1")]);
        apply_edit(&mut store, id("A1"), "4");
        assert_eq!(store.display_value(id("B1")), "8");
        assert_eq!(store.display_value(id("C1")), "9");
    }

    #[test]
    fn test_replicas_converge_on_same_history() {
        let history = [
            ("A1", "1"),
            ("B1", "=A1+A2"),
            ("A2", "2"),
            ("C1", "=AVERAGE(A1:B1)"),
            ("A1", "5"),
            ("D1", "=C1/B1"),
            ("A2", "text"),
            ("B1", "=A1*3"),
            ("A1", ""),
        ];
        let mut left = CellStore::new();
        let mut right = CellStore::new();
        for (cell, raw) in history {
            apply_edit(&mut left, id(cell), raw);
        }
        for (cell, raw) in history {
            apply_edit(&mut right, id(cell), raw);
        }
        assert_eq!(left.sorted_cells(), right.sorted_cells());
        assert_eq!(left.display_value(id("D1")), ERROR_SENTINEL);
        assert_eq!(left.display_value(id("C1")), "0");
    }

    #[test]
    fn test_dependencies_match_formula_text() {
        let mut store = CellStore::new();
        apply_edit(&mut store, id("C3"), "=B2*(A1+B2)-AA10");
        assert_eq!(
            store.dependencies_of(id("C3")),
            vec![id("B2"), id("A1"), id("AA10")]
        );
        apply_edit(&mut store, id("C3"), "=COUNT(A1:B2)");
        assert_eq!(
            store.dependencies_of(id("C3")),
            vec![id("A1"), id("B1"), id("A2"), id("B2")]
        );
    }
}
