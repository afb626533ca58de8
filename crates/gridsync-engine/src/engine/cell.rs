//! Cell records.
//!
//! A [`Cell`] keeps what the user typed, what should be rendered, and the
//! cells its formula reads from. Absent cells are implicitly empty.

use serde::{Deserialize, Serialize};

use super::cell_ref::CellId;

/// Display sentinel for formulas that fail to evaluate.
pub const ERROR_SENTINEL: &str = "#ERROR";
/// Display sentinel for formulas that take part in a dependency cycle.
pub const CYCLE_SENTINEL: &str = "#CYCLE";

/// A cell in the store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    /// Exactly what the user typed: literal text, number text, or `=formula`.
    #[serde(rename = "value", alias = "rawInput")]
    pub raw_input: String,
    /// The string to render. Equals `raw_input` for literals.
    #[serde(default)]
    pub display_value: String,
    /// Cells the current formula reads from, in first-occurrence order.
    #[serde(default)]
    pub dependencies: Vec<CellId>,
}

impl Cell {
    pub fn new(raw_input: &str, display_value: String, dependencies: Vec<CellId>) -> Cell {
        Cell {
            raw_input: raw_input.to_string(),
            display_value,
            dependencies,
        }
    }

    /// A literal cell: displays exactly what was typed.
    pub fn literal(text: &str) -> Cell {
        Cell::new(text, text.to_string(), Vec::new())
    }

    pub fn is_formula(&self) -> bool {
        self.raw_input.starts_with('=')
    }

    pub fn is_empty(&self) -> bool {
        self.raw_input.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_displays_input() {
        let cell = Cell::literal("hello");
        assert_eq!(cell.display_value, "hello");
        assert!(cell.dependencies.is_empty());
        assert!(!cell.is_formula());
    }

    #[test]
    fn test_serde_field_names() {
        let cell = Cell::new("=A1", "3".to_string(), vec![CellId::new(0, 0)]);
        let json = serde_json::to_string(&cell).unwrap();
        assert!(json.contains("\"value\":\"=A1\""));
        assert!(json.contains("\"displayValue\":\"3\""));
        assert!(json.contains("\"dependencies\":[\"A1\"]"));
    }

    #[test]
    fn test_accepts_raw_input_alias() {
        let cell: Cell = serde_json::from_str(r#"{"rawInput":"x","displayValue":"x"}"#).unwrap();
        assert_eq!(cell.raw_input, "x");
        assert!(cell.dependencies.is_empty());
    }
}
