//! The per-page cell store.
//!
//! Sparse storage for cell records plus a reverse dependency index
//! ("which cells read from X"), kept in step with every write.

use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::cell::Cell;
use super::cell_ref::CellId;

/// Thread-safe sparse grid storage.
pub type Grid = DashMap<CellId, Cell>;

/// Map from cell id to cell record. Absent ids are empty cells.
#[derive(Debug, Default, Clone)]
pub struct CellStore {
    cells: Grid,
    /// Reverse dependency map: cell -> cells whose formulas read it.
    dependents: HashMap<CellId, BTreeSet<CellId>>,
}

impl CellStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from existing records, trusting their stored values.
    pub fn from_cells<I>(cells: I) -> Self
    where
        I: IntoIterator<Item = (CellId, Cell)>,
    {
        let mut store = Self::new();
        for (id, cell) in cells {
            store.insert(id, cell);
        }
        store
    }

    pub fn get(&self, id: CellId) -> Option<Cell> {
        self.cells.get(&id).map(|entry| entry.value().clone())
    }

    /// The display value of a cell; empty for absent cells.
    pub fn display_value(&self, id: CellId) -> String {
        self.cells
            .get(&id)
            .map(|entry| entry.display_value.clone())
            .unwrap_or_default()
    }

    /// The raw input of a cell; empty for absent cells.
    pub fn raw_input(&self, id: CellId) -> String {
        self.cells
            .get(&id)
            .map(|entry| entry.raw_input.clone())
            .unwrap_or_default()
    }

    pub fn dependencies_of(&self, id: CellId) -> Vec<CellId> {
        self.cells
            .get(&id)
            .map(|entry| entry.dependencies.clone())
            .unwrap_or_default()
    }

    /// Cells whose formulas read `id`, in row-major order.
    pub fn dependents_of(&self, id: CellId) -> Vec<CellId> {
        self.dependents
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Write a record. A record with empty raw input is dropped instead.
    pub fn insert(&mut self, id: CellId, cell: Cell) {
        self.unlink(id);
        if cell.is_empty() {
            self.cells.remove(&id);
            return;
        }
        for dep in &cell.dependencies {
            self.dependents.entry(*dep).or_default().insert(id);
        }
        self.cells.insert(id, cell);
    }

    /// Replace only the display value of an existing record.
    pub fn set_display_value(&mut self, id: CellId, display_value: String) {
        if let Some(mut entry) = self.cells.get_mut(&id) {
            entry.display_value = display_value;
        }
    }

    pub fn remove(&mut self, id: CellId) -> Option<Cell> {
        self.unlink(id);
        self.cells.remove(&id).map(|(_, cell)| cell)
    }

    fn unlink(&mut self, id: CellId) {
        let Some(old) = self.cells.get(&id).map(|entry| entry.dependencies.clone()) else {
            return;
        };
        for dep in old {
            if let Some(set) = self.dependents.get_mut(&dep) {
                set.remove(&id);
                if set.is_empty() {
                    self.dependents.remove(&dep);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.dependents.clear();
    }

    /// All records in row-major order.
    pub fn sorted_cells(&self) -> Vec<(CellId, Cell)> {
        let mut cells: Vec<(CellId, Cell)> = self
            .cells
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        cells.sort_by_key(|(id, _)| *id);
        cells
    }
}

/// Two stores are equal when they hold the same records.
impl PartialEq for CellStore {
    fn eq(&self, other: &Self) -> bool {
        self.sorted_cells() == other.sorted_cells()
    }
}

impl Serialize for CellStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<CellId, Cell> = self.sorted_cells().into_iter().collect();
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CellStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<CellId, Cell>::deserialize(deserializer)?;
        Ok(CellStore::from_cells(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> CellId {
        CellId::parse(name).unwrap()
    }

    #[test]
    fn test_absent_cells_are_empty() {
        let store = CellStore::new();
        assert_eq!(store.display_value(id("A1")), "");
        assert_eq!(store.raw_input(id("A1")), "");
        assert!(store.dependencies_of(id("A1")).is_empty());
    }

    #[test]
    fn test_reverse_index_follows_writes() {
        let mut store = CellStore::new();
        store.insert(id("C1"), Cell::new("=A1+B1", "0".into(), vec![id("A1"), id("B1")]));
        assert_eq!(store.dependents_of(id("A1")), vec![id("C1")]);

        store.insert(id("C1"), Cell::new("=B1", "0".into(), vec![id("B1")]));
        assert!(store.dependents_of(id("A1")).is_empty());
        assert_eq!(store.dependents_of(id("B1")), vec![id("C1")]);

        store.remove(id("C1"));
        assert!(store.dependents_of(id("B1")).is_empty());
    }

    #[test]
    fn test_empty_raw_input_drops_record() {
        let mut store = CellStore::new();
        store.insert(id("A1"), Cell::literal("x"));
        store.insert(id("A1"), Cell::literal(""));
        assert!(store.is_empty());
    }

    #[test]
    fn test_serializes_as_sorted_map() {
        let mut store = CellStore::new();
        store.insert(id("B2"), Cell::literal("2"));
        store.insert(id("A1"), Cell::literal("1"));
        let json = serde_json::to_string(&store).unwrap();
        assert!(json.starts_with("{\"A1\":"));

        let back: CellStore = serde_json::from_str(&json).unwrap();
        assert_eq!(back, store);
    }
}
