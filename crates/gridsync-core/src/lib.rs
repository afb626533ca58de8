//! gridsync-core - UI-agnostic workbook model + snapshot storage.

pub mod document;
pub mod error;
pub mod storage;

pub use document::{Page, SortDirection, Workbook};
pub use error::{Result, WorkbookError};

pub use gridsync_engine::engine::{CellId, CellStore};
