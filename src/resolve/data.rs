//! Reference data tables
//!
//! Static JSON maps (machine types, CPU families, database tiers) keyed by a
//! domain string. Tables are read on first use and kept for the whole run.
//! A file in the configured data directory shadows the embedded copy.

use crate::error::{EngineError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Embedded reference data (compiled into the binary): file name, content
const EMBEDDED_DATA: &[(&str, &str)] = &[
    (
        "gcp_machine_types.json",
        include_str!("../resources/data/gcp_machine_types.json"),
    ),
    (
        "gcp_machine_families.json",
        include_str!("../resources/data/gcp_machine_families.json"),
    ),
    (
        "gcp_sql_tiers.json",
        include_str!("../resources/data/gcp_sql_tiers.json"),
    ),
];

pub struct DataStore {
    data_dir: Option<PathBuf>,
    tables: Mutex<HashMap<String, Arc<Value>>>,
}

impl DataStore {
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir,
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Get a table by file name, loading it on first access
    pub fn table(&self, file_name: &str) -> Result<Arc<Value>> {
        let mut tables = self
            .tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(table) = tables.get(file_name) {
            return Ok(Arc::clone(table));
        }

        let content = self.read(file_name)?;
        let table: Value =
            serde_json::from_str(&content).map_err(|e| EngineError::MalformedDataFile {
                name: file_name.to_string(),
                message: e.to_string(),
            })?;
        if !table.is_object() {
            return Err(EngineError::MalformedDataFile {
                name: file_name.to_string(),
                message: "expected a JSON object keyed by name".to_string(),
            });
        }

        tracing::debug!("loaded reference data {}", file_name);
        let table = Arc::new(table);
        tables.insert(file_name.to_string(), Arc::clone(&table));
        Ok(table)
    }

    fn read(&self, file_name: &str) -> Result<String> {
        if let Some(dir) = &self.data_dir {
            let path = dir.join(file_name);
            if path.is_file() {
                return std::fs::read_to_string(&path)
                    .map_err(|_| EngineError::MissingDataFile(path.display().to_string()));
            }
        }

        EMBEDDED_DATA
            .iter()
            .find(|(name, _)| *name == file_name)
            .map(|(_, content)| content.to_string())
            .ok_or_else(|| EngineError::MissingDataFile(file_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_embedded_machine_types() {
        let store = DataStore::new(None);
        let table = store.table("gcp_machine_types.json").unwrap();
        assert_eq!(table["n1-standard-1"]["vcpus"], 1);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let store = DataStore::new(None);
        let err = store.table("nope.json").unwrap_err();
        assert!(matches!(err, EngineError::MissingDataFile(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_data_dir_shadows_embedded() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("gcp_machine_types.json"),
            r#"{"tiny-1": {"vcpus": 1, "memoryMb": 512}}"#,
        )
        .unwrap();

        let store = DataStore::new(Some(temp_dir.path().to_path_buf()));
        let table = store.table("gcp_machine_types.json").unwrap();
        assert!(table.get("tiny-1").is_some());
        assert!(table.get("n1-standard-1").is_none());
    }

    #[test]
    fn test_non_object_table_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("list.json"), "[1, 2]").unwrap();
        let store = DataStore::new(Some(temp_dir.path().to_path_buf()));
        assert!(matches!(
            store.table("list.json"),
            Err(EngineError::MalformedDataFile { .. })
        ));
    }
}
