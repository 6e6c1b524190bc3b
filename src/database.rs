//! Databases: name → collection registries.
//!
//! A database hands out [`Collection`] handles, creating collections on
//! first access by name. A handle opened in strict mode refuses implicit
//! creation and fails with [`Error::UnknownCollection`] instead — useful
//! when a typo in a collection name should be an error rather than an
//! empty collection.

use crate::collection::Collection;
use crate::encryption::EncryptionManager;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

pub(crate) struct DatabaseCore {
    name: String,
    collections: Mutex<IndexMap<String, Collection>>,
}

impl DatabaseCore {
    pub(crate) fn get_collection(&self, name: &str) -> Option<Collection> {
        self.collections.lock().get(name).cloned()
    }

    pub(crate) fn remove_collection(&self, name: &str) {
        self.collections.lock().shift_remove(name);
    }
}

/// Handle to a named database inside a [`Store`](crate::Store).
///
/// Clones share the same registry. The `strict` flag belongs to the
/// handle, so one caller can opt into strict lookups while others keep
/// implicit creation.
#[derive(Clone)]
pub struct Database {
    core: Arc<DatabaseCore>,
    strict: bool,
}

impl Database {
    pub(crate) fn new(name: String) -> Self {
        Database {
            core: Arc::new(DatabaseCore {
                name,
                collections: Mutex::new(IndexMap::new()),
            }),
            strict: false,
        }
    }

    /// Returns this handle with strict collection lookup enabled.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// The database name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Returns the named collection, creating it on first access.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownCollection`] in strict mode when the collection
    /// does not exist yet.
    pub fn collection(&self, name: &str) -> Result<Collection> {
        let mut collections = self.core.collections.lock();
        if let Some(existing) = collections.get(name) {
            return Ok(existing.clone());
        }
        if self.strict {
            return Err(Error::UnknownCollection(format!(
                "'{}' does not exist in database '{}'",
                name, self.core.name
            )));
        }
        let collection = Collection::new(name.to_string(), Arc::downgrade(&self.core), None);
        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    /// Explicitly creates a collection (or returns the existing one).
    pub fn create_collection(&self, name: &str) -> Result<Collection> {
        let mut collections = self.core.collections.lock();
        if let Some(existing) = collections.get(name) {
            return Ok(existing.clone());
        }
        let collection = Collection::new(name.to_string(), Arc::downgrade(&self.core), None);
        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    /// Creates a collection with an attached encryption manager, or
    /// attaches the manager to an existing collection that has none yet.
    /// The latter is how key material comes back after a snapshot load,
    /// which restores documents in their stored form but cannot restore
    /// the keys.
    ///
    /// # Errors
    ///
    /// `BadQuery` if the collection already has an encryption manager.
    pub fn create_collection_with_encryption(
        &self,
        name: &str,
        encryption: EncryptionManager,
    ) -> Result<Collection> {
        let mut collections = self.core.collections.lock();
        if let Some(existing) = collections.get(name) {
            existing.attach_encryption(encryption)?;
            return Ok(existing.clone());
        }
        let collection = Collection::new(
            name.to_string(),
            Arc::downgrade(&self.core),
            Some(encryption),
        );
        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    /// Names of the existing collections, in creation order.
    pub fn list_collection_names(&self) -> Vec<String> {
        self.core.collections.lock().keys().cloned().collect()
    }

    /// Drops a collection by name. Returns whether it existed.
    pub fn drop_collection(&self, name: &str) -> bool {
        self.core
            .collections
            .lock()
            .shift_remove(name)
            .is_some()
    }

    /// Snapshot of the registered collections for persistence.
    pub(crate) fn collections_snapshot(&self) -> Vec<(String, Collection)> {
        self.core
            .collections
            .lock()
            .iter()
            .map(|(name, collection)| (name.clone(), collection.clone()))
            .collect()
    }

    /// Registers a collection restored from a snapshot.
    pub(crate) fn install_collection(&self, name: &str) -> Collection {
        let mut collections = self.core.collections.lock();
        let collection = Collection::new(name.to_string(), Arc::downgrade(&self.core), None);
        collections.insert(name.to_string(), collection.clone());
        collection
    }
}
