use super::Workbook;
use crate::error::{Result, WorkbookError};
use crate::storage::{read_snapshot, write_snapshot};
use std::path::{Path, PathBuf};

impl Workbook {
    /// Open a snapshot file, or start an empty workbook bound to `path` if
    /// the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let mut workbook = if path.exists() {
            read_snapshot(path)?
        } else {
            Workbook::new()
        };
        workbook.file_path = Some(path.to_path_buf());
        workbook.modified = false;
        Ok(workbook)
    }

    /// Save to the current file path.
    /// Returns the path saved to.
    pub fn save_file(&mut self) -> Result<PathBuf> {
        let Some(path) = &self.file_path else {
            return Err(WorkbookError::NoFilePath);
        };
        write_snapshot(path, self)?;
        self.modified = false;
        Ok(path.clone())
    }

    /// Save if a path is set and something changed since the last save.
    /// Returns whether a save happened.
    pub fn save_if_modified(&mut self) -> Result<bool> {
        if !self.modified || self.file_path.is_none() {
            return Ok(false);
        }
        self.save_file()?;
        Ok(true)
    }
}
