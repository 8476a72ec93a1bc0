//! JSONL-based storage implementation with in-memory caching.
//!
//! Each collection is one `<collection>.jsonl` file. Creates append; updates
//! and deletes rewrite the collection through a temporary file that is then
//! renamed over the original, so a crash mid-write leaves the previous
//! version intact.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Serialize, de::DeserializeOwned};

use super::traits::{Filter, HasId, Storage};
use crate::error::{Result, TemporaError};

type Cache = HashMap<String, Vec<serde_json::Value>>;

/// JSONL-based storage with in-memory caching.
pub struct JsonlStorage {
    base_path: PathBuf,
    cache: RwLock<Cache>,
}

fn record_id(record: &serde_json::Value) -> Option<&str> {
    record.get("id").and_then(|v| v.as_str())
}

impl JsonlStorage {
    /// Open (creating if needed) a storage directory.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    fn read_cache(&self) -> Result<RwLockReadGuard<'_, Cache>> {
        self.cache.read().map_err(|e| TemporaError::Persistence(e.to_string()))
    }

    fn write_cache(&self) -> Result<RwLockWriteGuard<'_, Cache>> {
        self.cache.write().map_err(|e| TemporaError::Persistence(e.to_string()))
    }

    /// Load a collection into cache if not already loaded.
    fn ensure_loaded(&self, collection: &str) -> Result<()> {
        if self.read_cache()?.contains_key(collection) {
            return Ok(());
        }

        let mut cache = self.write_cache()?;
        if cache.contains_key(collection) {
            return Ok(());
        }

        let path = self.collection_path(collection);
        let mut records = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (lineno, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: serde_json::Value = serde_json::from_str(&line).map_err(|e| {
                    TemporaError::Persistence(format!("{}:{}: {}", path.display(), lineno + 1, e))
                })?;
                records.push(record);
            }
        }

        cache.insert(collection.to_string(), records);
        Ok(())
    }

    fn append_to_file(&self, collection: &str, record: &serde_json::Value) -> Result<()> {
        let path = self.collection_path(collection);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        file.sync_data()?;
        Ok(())
    }

    /// Write `records` to a sibling temp file and rename it into place.
    fn rewrite_file(&self, collection: &str, records: &[serde_json::Value]) -> Result<()> {
        let path = self.collection_path(collection);
        let tmp = self.base_path.join(format!(".{}.jsonl.tmp", collection));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for record in records {
                writeln!(writer, "{}", serde_json::to_string(record)?)?;
            }
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn not_loaded(collection: &str) -> TemporaError {
        TemporaError::Persistence(format!("Collection not loaded: {}", collection))
    }
}

impl Storage for JsonlStorage {
    fn create<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;
        let value = serde_json::to_value(record)?;

        let mut cache = self.write_cache()?;
        let records = cache.get_mut(collection).ok_or_else(|| Self::not_loaded(collection))?;
        if records.iter().any(|r| record_id(r) == Some(record.id())) {
            return Err(TemporaError::Persistence(format!(
                "Duplicate id in {}: {}",
                collection,
                record.id()
            )));
        }

        // File first; the cache only changes once the write succeeded.
        self.append_to_file(collection, &value)?;
        records.push(value);
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.read_cache()?;
        let records = cache.get(collection).ok_or_else(|| Self::not_loaded(collection))?;
        match records.iter().find(|r| record_id(r) == Some(id)) {
            Some(record) => Ok(Some(serde_json::from_value(record.clone())?)),
            None => Ok(None),
        }
    }

    fn update<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;
        let value = serde_json::to_value(record)?;
        let id = record.id();

        let mut cache = self.write_cache()?;
        let records = cache.get_mut(collection).ok_or_else(|| Self::not_loaded(collection))?;
        let idx = records
            .iter()
            .position(|r| record_id(r) == Some(id))
            .ok_or_else(|| TemporaError::PlanNotFound(id.to_string()))?;

        let mut next = records.clone();
        next[idx] = value;
        self.rewrite_file(collection, &next)?;
        *records = next;
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.ensure_loaded(collection)?;

        let mut cache = self.write_cache()?;
        let records = cache.get_mut(collection).ok_or_else(|| Self::not_loaded(collection))?;
        let next: Vec<serde_json::Value> = records.iter().filter(|r| record_id(r) != Some(id)).cloned().collect();
        if next.len() == records.len() {
            return Err(TemporaError::PlanNotFound(id.to_string()));
        }

        self.rewrite_file(collection, &next)?;
        *records = next;
        Ok(())
    }

    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.read_cache()?;
        let records = cache.get(collection).ok_or_else(|| Self::not_loaded(collection))?;
        records
            .iter()
            .filter(|record| filters.iter().all(|f| f.matches(record)))
            .map(|record| serde_json::from_value(record.clone()).map_err(TemporaError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Note {
        id: String,
        status: String,
    }

    impl HasId for Note {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn note(id: &str, status: &str) -> Note {
        Note {
            id: id.to_string(),
            status: status.to_string(),
        }
    }

    fn create_test_storage() -> (JsonlStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = JsonlStorage::new(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_create_and_get() {
        let (storage, _temp) = create_test_storage();
        storage.create("notes", &note("1", "draft")).unwrap();
        let got: Option<Note> = storage.get("notes", "1").unwrap();
        assert_eq!(got, Some(note("1", "draft")));
        let missing: Option<Note> = storage.get("notes", "2").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let (storage, _temp) = create_test_storage();
        storage.create("notes", &note("1", "draft")).unwrap();
        let err = storage.create("notes", &note("1", "active")).unwrap_err();
        assert!(err.is_persistence());
    }

    #[test]
    fn test_update_and_not_found() {
        let (storage, _temp) = create_test_storage();
        storage.create("notes", &note("1", "draft")).unwrap();
        storage.update("notes", &note("1", "active")).unwrap();
        let got: Option<Note> = storage.get("notes", "1").unwrap();
        assert_eq!(got.unwrap().status, "active");

        let err = storage.update("notes", &note("9", "active")).unwrap_err();
        assert!(matches!(err, TemporaError::PlanNotFound(id) if id == "9"));
    }

    #[test]
    fn test_upsert() {
        let (storage, _temp) = create_test_storage();
        storage.upsert("notes", &note("1", "draft")).unwrap();
        storage.upsert("notes", &note("1", "completed")).unwrap();
        let all: Vec<Note> = storage.list("notes").unwrap();
        assert_eq!(all, vec![note("1", "completed")]);
    }

    #[test]
    fn test_delete() {
        let (storage, _temp) = create_test_storage();
        storage.create("notes", &note("1", "draft")).unwrap();
        storage.delete("notes", "1").unwrap();
        assert!(storage.list::<Note>("notes").unwrap().is_empty());
        assert!(storage.delete("notes", "1").is_err());
    }

    #[test]
    fn test_query_with_filters() {
        let (storage, _temp) = create_test_storage();
        storage.create("notes", &note("1", "active")).unwrap();
        storage.create("notes", &note("2", "suspended")).unwrap();
        storage.create("notes", &note("3", "active")).unwrap();

        let active: Vec<Note> = storage.query("notes", &[Filter::eq("status", "active")]).unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|n| n.status == "active"));
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        {
            let storage = JsonlStorage::new(temp_dir.path()).unwrap();
            storage.create("notes", &note("1", "draft")).unwrap();
            storage.update("notes", &note("1", "suspended")).unwrap();
        }
        let storage = JsonlStorage::new(temp_dir.path()).unwrap();
        let got: Option<Note> = storage.get("notes", "1").unwrap();
        assert_eq!(got, Some(note("1", "suspended")));
        assert!(!temp_dir.path().join(".notes.jsonl.tmp").exists());
    }

    #[test]
    fn test_corrupt_line_is_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("notes.jsonl"), "{not json}\n").unwrap();
        let storage = JsonlStorage::new(temp_dir.path()).unwrap();
        let err = storage.list::<Note>("notes").unwrap_err();
        assert!(matches!(err, TemporaError::Persistence(msg) if msg.contains("notes.jsonl:1")));
    }
}
