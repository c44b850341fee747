//! Persistence for collections and environments.
//!
//! This module provides the [`Repository`] abstraction used to load the
//! definitions a run needs and to save environments whose current values a
//! script changed. The file-backed implementation stores one record per line
//! (JSON Lines) with file locking for concurrent access safety.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{Collection, Environment};

/// Identifies a stored record within its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Owning workspace.
    pub workspace: String,
    /// Record name.
    pub name: String,
}

impl RecordKey {
    /// Creates a key.
    pub fn new(workspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace, self.name)
    }
}

/// A value that can live in a [`Repository`].
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Singular name of the record kind, used in errors and file names.
    const KIND: &'static str;

    /// The record's key.
    fn key(&self) -> RecordKey;
}

impl Record for Collection {
    const KIND: &'static str = "collection";

    fn key(&self) -> RecordKey {
        RecordKey::new(&self.workspace, &self.name)
    }
}

impl Record for Environment {
    const KIND: &'static str = "environment";

    fn key(&self) -> RecordKey {
        RecordKey::new(&self.workspace, &self.name)
    }
}

/// Storage backend for one kind of record.
///
/// Implementations must handle concurrent access safely.
pub trait Repository<T: Record>: Send + Sync {
    /// Loads a record by key.
    ///
    /// ## Errors
    ///
    /// Returns an error if reading or parsing fails.
    fn get(&self, key: &RecordKey) -> Result<Option<T>, StoreError>;

    /// Lists the records of a workspace, in stored order.
    ///
    /// ## Errors
    ///
    /// Returns an error if reading or parsing fails.
    fn list(&self, workspace: &str) -> Result<Vec<T>, StoreError>;

    /// Inserts a record or replaces the one with the same key.
    ///
    /// ## Errors
    ///
    /// Returns an error if writing fails.
    fn save(&self, record: &T) -> Result<(), StoreError>;

    /// Modifies a stored record in place and returns the stored result.
    ///
    /// The load, the modification and the write happen as one step, so
    /// concurrent updates of the same record never lose each other's writes.
    ///
    /// ## Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record has the key, or an
    /// error if reading or writing fails.
    fn update(&self, key: &RecordKey, apply: &mut dyn FnMut(&mut T)) -> Result<T, StoreError>;

    /// Loads a record, treating absence as an error.
    ///
    /// ## Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record has the key.
    fn require(&self, key: &RecordKey) -> Result<T, StoreError> {
        self.get(key)?
            .ok_or_else(|| StoreError::not_found(T::KIND, key))
    }
}

/// In-process repository.
#[derive(Debug)]
pub struct MemoryRepository<T> {
    records: RwLock<Vec<T>>,
}

impl<T> MemoryRepository<T> {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Repository<T> for MemoryRepository<T> {
    fn get(&self, key: &RecordKey) -> Result<Option<T>, StoreError> {
        Ok(self.records.read().iter().find(|r| r.key() == *key).cloned())
    }

    fn list(&self, workspace: &str) -> Result<Vec<T>, StoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.key().workspace == workspace)
            .cloned()
            .collect())
    }

    fn save(&self, record: &T) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let key = record.key();
        match records.iter_mut().find(|r| r.key() == key) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    fn update(&self, key: &RecordKey, apply: &mut dyn FnMut(&mut T)) -> Result<T, StoreError> {
        let mut records = self.records.write();
        let record = records
            .iter_mut()
            .find(|r| r.key() == *key)
            .ok_or_else(|| StoreError::not_found(T::KIND, key))?;
        apply(record);
        Ok(record.clone())
    }
}

/// JSONL file-based repository.
///
/// Stores records as newline-delimited JSON with `fs2` file locking: shared
/// locks for reads, an exclusive lock around each read-modify-write save.
///
/// ## Examples
///
/// ```no_run
/// use courier_lib::{Environment, JsonFileRepository, RecordKey, Repository};
///
/// let store: JsonFileRepository<Environment> = JsonFileRepository::in_dir("/tmp/courier");
/// store.save(&Environment::new("acme", "dev").with_variable("host", "localhost")).unwrap();
///
/// let env = store.get(&RecordKey::new("acme", "dev")).unwrap().unwrap();
/// assert_eq!(env.value("host"), Some("localhost"));
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileRepository<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> JsonFileRepository<T> {
    /// Creates a repository backed by the given file.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _record: PhantomData,
        }
    }

    /// Creates a repository at `<dir>/<kind>s.jsonl`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(format!("{}s.jsonl", T::KIND)))
    }

    /// Returns the path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(reader: impl BufRead) -> Result<Vec<T>, StoreError> {
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    fn load_all(&self) -> Result<Vec<T>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        FileExt::lock_shared(&file).map_err(|_| StoreError::Lock)?;
        let records = Self::read_all(BufReader::new(&file));
        FileExt::unlock(&file).map_err(|_| StoreError::Lock)?;
        records
    }

    /// Runs a read-modify-write over all records under an exclusive lock.
    /// Nothing is written when `f` fails.
    fn modify<R>(
        &self,
        f: impl FnOnce(&mut Vec<T>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        FileExt::lock_exclusive(&file).map_err(|_| StoreError::Lock)?;

        let result = (|| -> Result<R, StoreError> {
            let mut records = Self::read_all(BufReader::new(&file))?;
            let output = f(&mut records)?;

            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            for r in &records {
                let json = serde_json::to_string(r)?;
                writeln!(file, "{json}")?;
            }
            file.flush()?;
            Ok(output)
        })();

        FileExt::unlock(&file).map_err(|_| StoreError::Lock)?;
        result
    }
}

impl<T: Record> Repository<T> for JsonFileRepository<T> {
    fn get(&self, key: &RecordKey) -> Result<Option<T>, StoreError> {
        Ok(self.load_all()?.into_iter().find(|r| r.key() == *key))
    }

    fn list(&self, workspace: &str) -> Result<Vec<T>, StoreError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|r| r.key().workspace == workspace)
            .collect())
    }

    fn save(&self, record: &T) -> Result<(), StoreError> {
        self.modify(|records| {
            let key = record.key();
            match records.iter_mut().find(|r| r.key() == key) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
            Ok(())
        })
    }

    fn update(&self, key: &RecordKey, apply: &mut dyn FnMut(&mut T)) -> Result<T, StoreError> {
        self.modify(|records| {
            let record = records
                .iter_mut()
                .find(|r| r.key() == *key)
                .ok_or_else(|| StoreError::not_found(T::KIND, key))?;
            apply(record);
            Ok(record.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ApiDefinition;
    use tempfile::TempDir;

    fn create_test_store() -> (JsonFileRepository<Environment>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileRepository::in_dir(temp_dir.path());
        (store, temp_dir)
    }

    #[test]
    fn get_returns_none_for_nonexistent_file() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.get(&RecordKey::new("ws", "dev")).unwrap().is_none());
        assert!(store.list("ws").unwrap().is_empty());
    }

    #[test]
    fn file_name_follows_kind() {
        let (store, temp_dir) = create_test_store();
        assert_eq!(store.path(), temp_dir.path().join("environments.jsonl"));
    }

    #[test]
    fn save_upserts_by_key() {
        let (store, _temp_dir) = create_test_store();

        store
            .save(&Environment::new("ws", "dev").with_variable("a", "1"))
            .unwrap();
        store.save(&Environment::new("ws", "prod")).unwrap();
        store
            .save(&Environment::new("ws", "dev").with_variable("a", "2"))
            .unwrap();

        let all = store.list("ws").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "dev");
        assert_eq!(all[0].value("a"), Some("2"));

        let contents = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn list_filters_by_workspace() {
        let (store, _temp_dir) = create_test_store();
        store.save(&Environment::new("one", "dev")).unwrap();
        store.save(&Environment::new("two", "dev")).unwrap();

        let listed = store.list("two").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].workspace, "two");
    }

    #[test]
    fn empty_lines_are_skipped_during_load() {
        let (store, _temp_dir) = create_test_store();
        store.save(&Environment::new("ws", "dev")).unwrap();

        let mut contents = std::fs::read_to_string(store.path()).unwrap();
        contents.push_str("\n\n");
        std::fs::write(store.path(), contents).unwrap();

        assert_eq!(store.list("ws").unwrap().len(), 1);
    }

    #[test]
    fn corrupt_line_is_a_parse_error() {
        let (store, _temp_dir) = create_test_store();
        std::fs::write(store.path(), "{not json}\n").unwrap();
        assert!(matches!(store.list("ws"), Err(StoreError::Parse(_))));
    }

    #[test]
    fn update_modifies_stored_record() {
        let (store, _temp_dir) = create_test_store();
        store
            .save(&Environment::new("ws", "dev").with_variable("a", "1"))
            .unwrap();

        let updated = store
            .update(&RecordKey::new("ws", "dev"), &mut |env| env.set_current("b", "2"))
            .unwrap();
        assert_eq!(updated.value("b"), Some("2"));

        let stored = store.require(&RecordKey::new("ws", "dev")).unwrap();
        assert_eq!(stored.value("a"), Some("1"));
        assert_eq!(stored.value("b"), Some("2"));
    }

    #[test]
    fn update_of_missing_record_writes_nothing() {
        let (store, _temp_dir) = create_test_store();
        store.save(&Environment::new("ws", "dev")).unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        let err = store
            .update(&RecordKey::new("ws", "prod"), &mut |env| env.set_current("a", "1"))
            .unwrap_err();
        assert_eq!(err.to_string(), "environment not found: ws/prod");
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn concurrent_updates_keep_every_variable() {
        let (store, _temp_dir) = create_test_store();
        store.save(&Environment::new("ws", "dev")).unwrap();
        let key = RecordKey::new("ws", "dev");

        std::thread::scope(|scope| {
            for i in 0..8 {
                let store = store.clone();
                let key = key.clone();
                scope.spawn(move || {
                    store
                        .update(&key, &mut |env| env.set_current(&format!("v{i}"), i.to_string()))
                        .unwrap();
                });
            }
        });

        let stored = store.require(&key).unwrap();
        for i in 0..8 {
            assert_eq!(stored.value(&format!("v{i}")), Some(i.to_string().as_str()));
        }
    }

    #[test]
    fn memory_update_requires_record() {
        let repo: MemoryRepository<Environment> = MemoryRepository::new();
        assert!(repo.update(&RecordKey::new("ws", "dev"), &mut |_| {}).is_err());

        repo.save(&Environment::new("ws", "dev")).unwrap();
        let updated = repo
            .update(&RecordKey::new("ws", "dev"), &mut |env| env.set_current("x", "1"))
            .unwrap();
        assert_eq!(updated.value("x"), Some("1"));
    }

    #[test]
    fn require_reports_missing_record() {
        let repo: MemoryRepository<Collection> = MemoryRepository::new();
        let err = repo.require(&RecordKey::new("ws", "users")).unwrap_err();
        assert_eq!(err.to_string(), "collection not found: ws/users");
    }

    #[test]
    fn memory_repository_upserts() {
        let repo = MemoryRepository::new();
        let api = ApiDefinition::builder().name("list").url("/users").build();
        repo.save(&Collection::new("ws", "users")).unwrap();
        repo.save(&Collection::new("ws", "users").with_api(api)).unwrap();

        let stored = repo.require(&RecordKey::new("ws", "users")).unwrap();
        assert_eq!(stored.apis.len(), 1);
        assert_eq!(repo.list("ws").unwrap().len(), 1);
    }
}
