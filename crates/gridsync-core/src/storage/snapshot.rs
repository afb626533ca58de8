//! Reader and writer for workbook snapshots.
//!
//! A snapshot maps page ids to pages and records the current page:
//!
//! ```text
//! {
//!   "pages": {
//!     "page-1": {
//!       "id": "page-1",
//!       "name": "page-1",
//!       "cells": {
//!         "A1": { "value": "=B1*2", "displayValue": "4", "dependencies": ["B1"] }
//!       }
//!     }
//!   },
//!   "currentPageId": "page-1"
//! }
//! ```

use crate::document::Workbook;
use crate::error::{Result, WorkbookError};
use std::fs;
use std::path::Path;

const MAX_SNAPSHOT_BYTES: u64 = 64 * 1_048_576; // 64 MiB

/// Read a snapshot file into a workbook
pub fn read_snapshot(path: &Path) -> Result<Workbook> {
    let meta = fs::metadata(path)?;
    if meta.len() > MAX_SNAPSHOT_BYTES {
        return Err(WorkbookError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Refusing to read {}: snapshot too large ({} bytes, max {})",
                path.display(),
                meta.len(),
                MAX_SNAPSHOT_BYTES
            ),
        )));
    }
    let content = fs::read_to_string(path)?;
    let workbook = parse_snapshot(&content)?;
    tracing::debug!(path = %path.display(), pages = workbook.pages.len(), "read snapshot");
    Ok(workbook)
}

/// Parse snapshot content from a string.
/// Stored records are trusted as-is; the reverse dependency index is rebuilt.
pub fn parse_snapshot(content: &str) -> Result<Workbook> {
    Ok(serde_json::from_str(content)?)
}

/// Write a workbook to a snapshot file
pub fn write_snapshot(path: &Path, workbook: &Workbook) -> Result<()> {
    let content = write_snapshot_content(workbook)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    tracing::debug!(path = %path.display(), "wrote snapshot");
    Ok(())
}

/// Write a workbook to snapshot format (cells in row-major order)
pub fn write_snapshot_content(workbook: &Workbook) -> Result<String> {
    let mut content = serde_json::to_string_pretty(workbook)?;
    content.push('\n');
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsync_engine::engine::CellId;
    use pretty_assertions::assert_eq;

    fn id(name: &str) -> CellId {
        CellId::parse(name).unwrap()
    }

    const SAMPLE: &str = r#"{
  "pages": {
    "page-1": {
      "id": "page-1",
      "name": "page-1",
      "cells": {
        "A1": {
          "value": "3",
          "displayValue": "3",
          "dependencies": []
        },
        "B1": {
          "value": "=A1*2",
          "displayValue": "6",
          "dependencies": [
            "A1"
          ]
        }
      }
    },
    "page-2": {
      "id": "page-2",
      "name": "page-2",
      "cells": {}
    }
  },
  "currentPageId": "page-2"
}
"#;

    #[test]
    fn test_load_then_save_reproduces_document() {
        let workbook = parse_snapshot(SAMPLE).unwrap();
        assert_eq!(workbook.current_page_id(), "page-2");
        assert_eq!(write_snapshot_content(&workbook).unwrap(), SAMPLE);
    }

    #[test]
    fn test_loaded_store_propagates() {
        let mut workbook = parse_snapshot(SAMPLE).unwrap();
        workbook.switch_page("page-1").unwrap();
        workbook.apply_edit(id("A1"), "5");
        assert_eq!(workbook.store().display_value(id("B1")), "10");
    }

    #[test]
    fn test_accepts_extra_fields_and_aliases() {
        let content = r#"{
            "pages": {"page-1": {"id": "page-1", "name": "Sheet", "cells": {
                "A1": {"rawInput": "x", "formula": "x", "displayValue": "x"}
            }}},
            "currentPageId": "page-1"
        }"#;
        let workbook = parse_snapshot(content).unwrap();
        assert_eq!(workbook.current_page().name, "Sheet");
        assert_eq!(workbook.store().raw_input(id("A1")), "x");
    }

    #[test]
    fn test_repairs_missing_current_page() {
        let workbook = parse_snapshot(r#"{"pages": {}, "currentPageId": "gone"}"#).unwrap();
        assert_eq!(workbook.current_page_id(), "page-1");
    }

    #[test]
    fn test_invalid_cell_id_is_error() {
        let content = r#"{"pages": {"page-1": {"id": "page-1", "name": "page-1",
            "cells": {"a1": {"value": "x"}}}}, "currentPageId": "page-1"}"#;
        assert!(matches!(parse_snapshot(content), Err(WorkbookError::Json(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("book.json");
        let workbook = parse_snapshot(SAMPLE).unwrap();
        write_snapshot(&path, &workbook).unwrap();
        let loaded = read_snapshot(&path).unwrap();
        assert_eq!(loaded, workbook);
    }
}
