//! Gridsync - shared pieces of the `gridsync` and `gridsync-relay` binaries.
//!
//! The engine, workbook and sync logic live in the workspace crates; this
//! crate holds configuration, client identity, logging setup and the console
//! command parser.

pub mod config;
pub mod console;
pub mod error;
pub mod identity;
pub mod logging;

pub use error::{GridsyncError, Result};
