//! Cell id parsing and formatting.
//!
//! Provides bidirectional conversion between spreadsheet-style cell ids
//! (e.g., "A1", "B2", "AA100") and zero-indexed column/row coordinates.
//! Column letters use bijective base-26 (A = 0, Z = 25, AA = 26).
//!
//! # Examples
//!
//! ```
//! use gridsync_engine::engine::CellId;
//!
//! let cell: CellId = "B3".parse().unwrap();
//! assert_eq!(cell.col, 1); // 0-indexed
//! assert_eq!(cell.row, 2);
//! assert_eq!(cell.to_string(), "B3");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Error returned when text is not a valid cell id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid cell id: {0}")]
pub struct CellIdError(pub String);

/// The address of a cell by column and row indices (0-indexed).
///
/// On the wire and in snapshots a `CellId` is always its A1 string.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CellId {
    pub row: u32,
    pub col: u32,
}

impl CellId {
    pub fn new(col: u32, row: u32) -> CellId {
        CellId { row, col }
    }

    /// Parse a cell id from uppercase A1 notation.
    /// Returns None for lowercase letters, row 0, or out-of-range coordinates.
    pub fn parse(name: &str) -> Option<CellId> {
        let caps = cell_id_re().captures(name)?;
        let col = column_index(&caps["letters"])?;
        let row = caps["numbers"].parse::<u32>().ok()?.checked_sub(1)?;
        Some(CellId::new(col, row))
    }

    /// The column letters of this id (e.g. "AA").
    pub fn column_letters(&self) -> String {
        column_letter(self.col)
    }

    /// The 1-based row number shown to users.
    pub fn row_number(&self) -> u64 {
        self.row as u64 + 1
    }
}

fn cell_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?<letters>[A-Z]+)(?<numbers>[0-9]+)$").expect("cell id regex must compile")
    })
}

/// Convert column index to spreadsheet-style letters (0 -> A, 25 -> Z, 26 -> AA).
pub fn column_letter(col: u32) -> String {
    let mut result = Vec::new();
    let mut n = col as u64 + 1;
    while n > 0 {
        n -= 1;
        result.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    result.reverse();
    String::from_utf8(result).unwrap_or_default()
}

/// Convert uppercase column letters back to a 0-based index (A -> 0, AA -> 26).
/// Returns None for empty, non-uppercase, or overflowing input.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut acc = 0u64;
    for c in letters.bytes() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        let digit = (c - b'A') as u64 + 1;
        acc = acc.checked_mul(26)?.checked_add(digit)?;
    }
    u32::try_from(acc - 1).ok()
}

impl std::str::FromStr for CellId {
    type Err = CellIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellId::parse(s).ok_or_else(|| CellIdError(s.to_string()))
    }
}

impl TryFrom<String> for CellId {
    type Error = CellIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CellId> for String {
    fn from(id: CellId) -> String {
        id.to_string()
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letter(self.col), self.row_number())
    }
}

/// Row-major order: A1, B1, ..., A2.
impl Ord for CellId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row.cmp(&other.row).then(self.col.cmp(&other.col))
    }
}

impl PartialOrd for CellId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
