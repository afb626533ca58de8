//! Workbook state and logic (UI-agnostic).

mod io;
mod sort;
mod state;

pub use sort::SortDirection;
pub use state::{Page, Workbook};
