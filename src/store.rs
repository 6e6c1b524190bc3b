//! The store: database registry and whole-snapshot persistence.
//!
//! A [`Store`] owns one file path — either a file ending in `.mdb` or a
//! directory that gets a `mainydb.mdb` inside — and serializes its entire
//! database → collection → documents mapping into it as one MessagePack
//! object graph:
//!
//! ```text
//! { <database>: { <collection>: { documents: […],
//!                                 indexes: [{name, fields}, …] } } }
//! ```
//!
//! Indexes persist as descriptors only; their contents rebuild from the
//! documents on load. Saving writes a temporary file and renames it over
//! the target, so a reader never observes a partial snapshot. The file is
//! written on explicit [`Store::close`] (or [`Store::save`]), not on drop.

use crate::database::Database;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::index::IndexDescriptor;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name used when the store path is a directory.
const STORE_FILE_NAME: &str = "mainydb.mdb";

#[derive(serde::Serialize, serde::Deserialize)]
struct CollectionSnapshot {
    documents: Vec<Document>,
    indexes: Vec<IndexDescriptor>,
}

type StoreSnapshot = IndexMap<String, IndexMap<String, CollectionSnapshot>>;

struct StoreCore {
    file_path: PathBuf,
    databases: Mutex<IndexMap<String, Database>>,
}

/// An open store. Clones share the registry and file path.
///
/// # Examples
///
/// ```
/// use mainydb::{doc, Store};
///
/// let dir = tempfile::tempdir()?;
/// let store = Store::open(dir.path())?;
/// let users = store.database("app").collection("users")?;
/// users.insert_one(doc! { "name" => "alpha", "age" => 30 })?;
///
/// let found = users.find_one(doc! { "name" => "alpha" })?.unwrap();
/// assert_eq!(found.get_i64("age"), Some(30));
/// store.close()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct Store {
    core: Arc<StoreCore>,
}

impl Store {
    /// Opens a store at `path`, loading the snapshot if one exists.
    ///
    /// A path ending in `.mdb` is used as the snapshot file; any other
    /// path is treated as a directory holding `mainydb.mdb`.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptStore`] when an existing snapshot fails to
    /// deserialize; [`Error::Io`] for underlying file failures.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file_path = resolve_store_path(path.as_ref());
        let store = Store {
            core: Arc::new(StoreCore {
                file_path,
                databases: Mutex::new(IndexMap::new()),
            }),
        };
        if store.core.file_path.is_file() {
            store.load()?;
        }
        Ok(store)
    }

    /// The resolved snapshot file path.
    pub fn path(&self) -> &Path {
        &self.core.file_path
    }

    /// Returns the named database, creating it on first access.
    pub fn database(&self, name: &str) -> Database {
        let mut databases = self.core.databases.lock();
        if let Some(existing) = databases.get(name) {
            return existing.clone();
        }
        let database = Database::new(name.to_string());
        databases.insert(name.to_string(), database.clone());
        database
    }

    /// Names of the existing databases, in creation order.
    pub fn database_names(&self) -> Vec<String> {
        self.core.databases.lock().keys().cloned().collect()
    }

    /// Drops a database and everything in it. Returns whether it existed.
    pub fn drop_database(&self, name: &str) -> bool {
        self.core.databases.lock().shift_remove(name).is_some()
    }

    /// Serializes the whole store to its file.
    ///
    /// The snapshot is written to a temporary sibling and renamed over
    /// the target.
    pub fn save(&self) -> Result<()> {
        let snapshot = self.build_snapshot();

        if let Some(parent) = self.core.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.core.file_path.with_extension("mdb.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            rmp_serde::encode::write_named(&mut file, &snapshot)
                .map_err(|e| Error::Io(format!("failed to serialize snapshot: {}", e)))?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.core.file_path)?;
        Ok(())
    }

    /// Saves and consumes the store.
    pub fn close(self) -> Result<()> {
        self.save()
    }

    fn build_snapshot(&self) -> StoreSnapshot {
        let databases = self.core.databases.lock();
        let mut snapshot = StoreSnapshot::new();
        for (db_name, database) in databases.iter() {
            let mut collections = IndexMap::new();
            for (coll_name, collection) in database.collections_snapshot() {
                let (documents, indexes) = collection.snapshot_contents();
                collections.insert(
                    coll_name,
                    CollectionSnapshot { documents, indexes },
                );
            }
            snapshot.insert(db_name.clone(), collections);
        }
        snapshot
    }

    fn load(&self) -> Result<()> {
        let file = File::open(&self.core.file_path)?;
        let snapshot: StoreSnapshot = rmp_serde::decode::from_read(file)
            .map_err(|e| Error::CorruptStore(format!("cannot deserialize snapshot: {}", e)))?;

        let mut databases = self.core.databases.lock();
        databases.clear();
        for (db_name, collections) in snapshot {
            let database = Database::new(db_name.clone());
            for (coll_name, contents) in collections {
                let collection = database.install_collection(&coll_name);
                collection.restore(contents.documents, contents.indexes)?;
            }
            databases.insert(db_name, database);
        }
        Ok(())
    }
}

fn resolve_store_path(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "mdb") {
        path.to_path_buf()
    } else {
        path.join(STORE_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_directory_path_resolves_to_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.path(), dir.path().join("mainydb.mdb"));
    }

    #[test]
    fn test_explicit_mdb_path_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mydb.mdb");
        let store = Store::open(&file).unwrap();
        assert_eq!(store.path(), file);
    }

    #[test]
    fn test_close_writes_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store
            .database("testdb")
            .collection("items")
            .unwrap()
            .insert_one(doc! { "name" => "alpha" })
            .unwrap();
        store.close().unwrap();

        let expected = dir.path().join("mainydb.mdb");
        assert!(expected.is_file());
        // Nothing else in the directory: no temp files, no per-database dirs
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("mainydb.mdb")]);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            let coll = store.database("persist").collection("docs").unwrap();
            for i in 0..3 {
                coll.insert_one(doc! { "n" => i }).unwrap();
            }
            coll.create_index(vec![("n", 1)]).unwrap();
            store.close().unwrap();
        }

        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.database_names(), vec!["persist"]);
        let coll = store.database("persist").collection("docs").unwrap();
        assert_eq!(coll.count_documents(doc! {}).unwrap(), 3);
        assert_eq!(coll.index_names(), vec!["n_1"]);
        // Rebuilt index answers queries
        let found = coll.find_one(doc! { "n" => 1 }).unwrap().unwrap();
        assert_eq!(found.get_i64("n"), Some(1));
    }

    #[test]
    fn test_corrupt_snapshot_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mainydb.mdb");
        std::fs::write(&file, b"definitely not msgpack").unwrap();
        assert!(matches!(
            Store::open(dir.path()),
            Err(Error::CorruptStore(_))
        ));
    }

    #[test]
    fn test_drop_without_close_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            store
                .database("d")
                .collection("c")
                .unwrap()
                .insert_one(doc! { "x" => 1 })
                .unwrap();
            // dropped here without close()
        }
        assert!(!dir.path().join("mainydb.mdb").exists());
    }
}
