use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::data::model::Table;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Dataset store
// ---------------------------------------------------------------------------

/// Named datasets shared between requests.
///
/// Readers get an `Arc` snapshot and never observe a partially replaced
/// table; writers swap whole entries and the last writer wins.
#[derive(Debug, Default)]
pub struct DatasetStore {
    tables: RwLock<BTreeMap<String, Arc<Table>>>,
}

/// One entry of [`DatasetStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetListing {
    pub name: String,
    pub rows: usize,
    pub columns: Vec<String>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `table` under `name`, returning the snapshot it replaced.
    pub fn insert(&self, name: impl Into<String>, table: Table) -> Option<Arc<Table>> {
        let name = name.into();
        log::info!("storing dataset '{name}' ({} rows, {} columns)", table.len(), table.width());
        self.tables.write().insert(name, Arc::new(table))
    }

    pub fn get(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDataset(name.to_string()))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.write().remove(name)
    }

    /// Every dataset, ordered by name.
    pub fn list(&self) -> Vec<DatasetListing> {
        self.tables
            .read()
            .iter()
            .map(|(name, table)| DatasetListing {
                name: name.clone(),
                rows: table.len(),
                columns: table.column_names(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Column, ColumnData};
    use std::thread;

    fn table(rows: usize) -> Table {
        Table::new(vec![Column::new(
            "v",
            ColumnData::Numeric((0..rows).map(|i| Some(i as f64)).collect()),
        )])
    }

    #[test]
    fn snapshots_survive_replacement() {
        let store = DatasetStore::new();
        store.insert("sales", table(3));
        let before = store.get("sales").unwrap();
        let replaced = store.insert("sales", table(5));
        assert_eq!(replaced.map(|t| t.len()), Some(3));
        assert_eq!(before.len(), 3);
        assert_eq!(store.get("sales").unwrap().len(), 5);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let store = DatasetStore::new();
        assert!(matches!(store.get("nope"), Err(Error::UnknownDataset(ref n)) if n == "nope"));
        assert!(store.remove("nope").is_none());
    }

    #[test]
    fn listing_is_sorted_by_name() {
        let store = DatasetStore::new();
        store.insert("b", table(2));
        store.insert("a", table(1));
        let names: Vec<_> = store.list().into_iter().map(|l| (l.name, l.rows)).collect();
        assert_eq!(names, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let store = Arc::new(DatasetStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.insert(format!("d{}", i % 4), table(i + 1));
                    store.list().len()
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap() >= 1);
        }
        assert_eq!(store.len(), 4);
    }
}
