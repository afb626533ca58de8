//! Storage module for the JSON workbook snapshot format

mod snapshot;

pub use snapshot::{parse_snapshot, read_snapshot, write_snapshot, write_snapshot_content};
