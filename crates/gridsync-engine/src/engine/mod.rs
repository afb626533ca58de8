//! Reactive formula engine API.
//!
//! This module provides the core computation engine for the grid:
//!
//! - [`CellId`] - Cell id parsing (A1 notation ↔ column/row indices)
//! - [`Cell`], [`CellStore`] - Cell records and their per-page store
//! - [`evaluate`] - Turn raw input into a display value and dependencies
//! - [`apply_edit`] - Write a cell and propagate to its dependents
//! - [`detect_cycle`] - Circular dependency detection
//! - [`extract_dependencies`], [`expand_range`] - Reference scanning
//! - [`format_number`] - Format computed values for display

mod cell;
mod cell_ref;
mod cycle;
mod deps;
mod eval;
mod expr;
mod format;
mod propagate;
mod store;

pub use cell::{CYCLE_SENTINEL, Cell, ERROR_SENTINEL};
pub use cell_ref::{CellId, CellIdError, column_index, column_letter};
pub use cycle::detect_cycle;
pub use deps::{MAX_RANGE_CELLS, expand_range, extract_dependencies, parse_range};
pub use eval::{Evaluation, evaluate, evaluate_expression};
pub use expr::{ExprError, evaluate_arithmetic};
pub use format::{format_number, parse_number};
pub use propagate::{apply_edit, recalculate_all};
pub use store::{CellStore, Grid};
