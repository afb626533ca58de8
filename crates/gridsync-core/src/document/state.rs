use crate::error::{Result, WorkbookError};
use gridsync_engine::engine::{CellId, CellStore, apply_edit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Id given to the page a fresh workbook starts with.
pub const DEFAULT_PAGE_ID: &str = "page-1";

/// One page of the workbook: an independent cell store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cells: CellStore,
}

impl Page {
    pub fn new(id: &str) -> Self {
        Page {
            id: id.to_string(),
            name: id.to_string(),
            cells: CellStore::new(),
        }
    }
}

/// UI-agnostic workbook: a set of pages, one of which is current.
///
/// Serializes to the snapshot format
/// `{"pages": {id: {id, name, cells}}, "currentPageId": id}`. Deserializing
/// always yields at least one page and a valid current page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredWorkbook")]
pub struct Workbook {
    pub(crate) pages: BTreeMap<String, Page>,
    pub(crate) current_page_id: String,
    /// Snapshot path used by save-on-change.
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
    /// Whether the workbook changed since the last save.
    #[serde(skip)]
    pub modified: bool,
}

/// Snapshot shape as stored, before repair.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredWorkbook {
    #[serde(default)]
    pages: BTreeMap<String, Page>,
    #[serde(default)]
    current_page_id: String,
}

impl From<StoredWorkbook> for Workbook {
    fn from(stored: StoredWorkbook) -> Self {
        let mut workbook = Workbook {
            pages: stored.pages,
            current_page_id: stored.current_page_id,
            file_path: None,
            modified: false,
        };
        workbook.normalize();
        workbook
    }
}

impl Workbook {
    /// Create a workbook with a single empty page.
    ///
    /// This constructor is side-effect free: it does not touch the filesystem.
    pub fn new() -> Self {
        let mut pages = BTreeMap::new();
        pages.insert(DEFAULT_PAGE_ID.to_string(), Page::new(DEFAULT_PAGE_ID));
        Workbook {
            pages,
            current_page_id: DEFAULT_PAGE_ID.to_string(),
            file_path: None,
            modified: false,
        }
    }

    /// Guarantee at least one page, a valid current page, and page ids
    /// matching their keys.
    fn normalize(&mut self) {
        for (key, page) in self.pages.iter_mut() {
            if page.id != *key {
                page.id = key.clone();
            }
        }
        if self.pages.is_empty() {
            self.pages
                .insert(DEFAULT_PAGE_ID.to_string(), Page::new(DEFAULT_PAGE_ID));
        }
        if !self.pages.contains_key(&self.current_page_id) {
            self.current_page_id = self.first_page_id();
        }
    }

    fn first_page_id(&self) -> String {
        self.pages
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| DEFAULT_PAGE_ID.to_string())
    }

    pub fn current_page_id(&self) -> &str {
        &self.current_page_id
    }

    pub fn current_page(&self) -> &Page {
        &self.pages[&self.current_page_id]
    }

    /// The active page's cell store.
    pub fn store(&self) -> &CellStore {
        &self.current_page().cells
    }

    pub fn store_mut(&mut self) -> &mut CellStore {
        let id = self.current_page_id.clone();
        &mut self
            .pages
            .entry(id)
            .or_insert_with_key(|key| Page::new(key))
            .cells
    }

    pub fn page_ids(&self) -> Vec<String> {
        self.pages.keys().cloned().collect()
    }

    pub fn page(&self, id: &str) -> Option<&Page> {
        self.pages.get(id)
    }

    /// Apply an edit to the current page and propagate it.
    /// Returns the cells whose records were rewritten.
    pub fn apply_edit(&mut self, cell_id: CellId, raw_input: &str) -> Vec<CellId> {
        let updated = apply_edit(self.store_mut(), cell_id, raw_input);
        self.modified = true;
        updated
    }

    /// Create a page with the first unused `page-N` id and make it current.
    pub fn new_page(&mut self) -> String {
        let mut n = self.pages.len() + 1;
        let id = loop {
            let candidate = format!("page-{}", n);
            if !self.pages.contains_key(&candidate) {
                break candidate;
            }
            n += 1;
        };
        self.pages.insert(id.clone(), Page::new(&id));
        self.current_page_id = id.clone();
        self.modified = true;
        id
    }

    pub fn switch_page(&mut self, id: &str) -> Result<()> {
        if !self.pages.contains_key(id) {
            return Err(WorkbookError::UnknownPage(id.to_string()));
        }
        self.current_page_id = id.to_string();
        self.modified = true;
        Ok(())
    }

    /// Delete a page. Deleting the current page moves to the first remaining
    /// one; deleting the last page leaves a fresh empty `page-1`.
    pub fn delete_page(&mut self, id: &str) -> Result<()> {
        if self.pages.remove(id).is_none() {
            return Err(WorkbookError::UnknownPage(id.to_string()));
        }
        if self.pages.is_empty() {
            self.pages
                .insert(DEFAULT_PAGE_ID.to_string(), Page::new(DEFAULT_PAGE_ID));
        }
        if self.current_page_id == id {
            self.current_page_id = self.first_page_id();
        }
        self.modified = true;
        Ok(())
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}
