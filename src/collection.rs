//! Collections: documents, indexes, and the lock that guards them.
//!
//! A collection owns its document map (`_id` → stored document), its
//! [`IndexSet`], and optionally an [`EncryptionManager`]. One mutex guards
//! all of it; every coarse operation (insert, update, delete, find
//! filtering, index creation, a whole bulk batch) holds the lock for its
//! duration. Cursors only snapshot matching ids under the lock and do the
//! expensive part (sort, project, decrypt) outside it.
//!
//! Write path per document: media ingestion (file-path strings become
//! blobs), then field encryption, then `_id` assignment and uniqueness
//! check, then index maintenance.

use crate::binary::Blob;
use crate::cursor::Cursor;
use crate::database::DatabaseCore;
use crate::document::Document;
use crate::encryption::EncryptionManager;
use crate::error::{BulkWriteFailure, Error, Result};
use crate::index::{IndexDescriptor, IndexKeys, IndexSet};
use crate::matcher::{self, MatchContext};
use crate::oid::ObjectId;
use crate::update;
use crate::value::Value;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Result of `insert_one`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// The `_id` of the inserted document
    pub inserted_id: Value,
}

/// Result of `insert_many`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyResult {
    /// The `_id`s of the inserted documents, in input order
    pub inserted_ids: Vec<Value>,
}

/// Result of the update family.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    /// Documents the filter matched
    pub matched_count: u64,
    /// Documents actually changed (an update that leaves the stored
    /// document identical counts as matched, not modified)
    pub modified_count: u64,
    /// `_id` of the document inserted by an upsert
    pub upserted_id: Option<Value>,
}

/// Result of the delete family.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResult {
    /// Documents removed
    pub deleted_count: u64,
}

/// Collection statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStats {
    /// Number of documents
    pub count: u64,
    /// Total serialized size in bytes
    pub size: u64,
    /// Average serialized document size in bytes
    pub avg_obj_size: u64,
}

/// Options for the update family.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Insert a synthesized document when nothing matches
    pub upsert: bool,
}

/// One tagged operation in a bulk write.
#[derive(Debug, Clone)]
pub enum BulkOp {
    /// Insert a single document
    InsertOne {
        /// The document to insert
        document: Document,
    },
    /// Update the first matching document
    UpdateOne {
        /// Filter selecting the document
        filter: Document,
        /// Update document
        update: Document,
        /// Upsert when nothing matches
        upsert: bool,
    },
    /// Update every matching document
    UpdateMany {
        /// Filter selecting the documents
        filter: Document,
        /// Update document
        update: Document,
        /// Upsert when nothing matches
        upsert: bool,
    },
    /// Replace the first matching document
    ReplaceOne {
        /// Filter selecting the document
        filter: Document,
        /// Replacement document (no operators)
        replacement: Document,
        /// Upsert when nothing matches
        upsert: bool,
    },
    /// Delete the first matching document
    DeleteOne {
        /// Filter selecting the document
        filter: Document,
    },
    /// Delete every matching document
    DeleteMany {
        /// Filter selecting the documents
        filter: Document,
    },
}

/// Aggregate counts of a completed bulk write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteResult {
    /// Documents inserted
    pub inserted_count: u64,
    /// Documents modified
    pub modified_count: u64,
    /// Documents deleted
    pub deleted_count: u64,
    /// Documents upserted
    pub upserted_count: u64,
}

pub(crate) struct CollectionState {
    documents: IndexMap<Value, Document>,
    indexes: IndexSet,
}

pub(crate) struct CollectionCore {
    name: String,
    database: Weak<DatabaseCore>,
    /// Set at creation, or attached once afterwards: snapshot loads
    /// restore documents in their stored form but cannot restore runtime
    /// key material
    encryption: OnceCell<EncryptionManager>,
    state: Mutex<CollectionState>,
}

/// Handle to a collection. Clones share the same underlying state.
#[derive(Clone)]
pub struct Collection {
    core: Arc<CollectionCore>,
}

impl Collection {
    pub(crate) fn new(
        name: String,
        database: Weak<DatabaseCore>,
        encryption: Option<EncryptionManager>,
    ) -> Self {
        let cell = OnceCell::new();
        if let Some(manager) = encryption {
            let _ = cell.set(manager);
        }
        Collection {
            core: Arc::new(CollectionCore {
                name,
                database,
                encryption: cell,
                state: Mutex::new(CollectionState {
                    documents: IndexMap::new(),
                    indexes: IndexSet::default(),
                }),
            }),
        }
    }

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    fn encryption(&self) -> Option<&EncryptionManager> {
        self.core.encryption.get()
    }

    /// Attaches an encryption manager to a collection that has none yet.
    /// Typically follows a snapshot load, which restores stored-form
    /// documents without their key material.
    pub(crate) fn attach_encryption(&self, manager: EncryptionManager) -> Result<()> {
        self.core.encryption.set(manager).map_err(|_| {
            Error::BadQuery(format!(
                "collection '{}' already has an encryption manager",
                self.core.name
            ))
        })
    }

    /// Inserts one document, assigning an `_id` if absent.
    pub fn insert_one(&self, document: Document) -> Result<InsertOneResult> {
        let mut state = self.core.state.lock();
        let inserted_id = insert_locked(&mut state, self.encryption(), document)?;
        Ok(InsertOneResult { inserted_id })
    }

    /// Inserts many documents in order. Stops at the first failure;
    /// documents inserted before it stay in the collection.
    pub fn insert_many(&self, documents: Vec<Document>) -> Result<InsertManyResult> {
        let mut state = self.core.state.lock();
        let mut inserted_ids = Vec::with_capacity(documents.len());
        for document in documents {
            inserted_ids.push(insert_locked(&mut state, self.encryption(), document)?);
        }
        Ok(InsertManyResult { inserted_ids })
    }

    /// Filters documents and returns a lazy cursor over the matches.
    ///
    /// Projection, sort, skip, and limit chain on the returned [`Cursor`].
    pub fn find(&self, filter: Document) -> Result<Cursor> {
        let state = self.core.state.lock();
        let ids = find_ids_locked(&state, self.encryption(), &filter)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        drop(state);
        Ok(Cursor::from_ids(self.clone(), ids))
    }

    /// Filters documents and applies a projection to each result.
    pub fn find_with_projection(&self, filter: Document, projection: Document) -> Result<Cursor> {
        Ok(self.find(filter)?.projection(projection))
    }

    /// First matching document, if any.
    pub fn find_one(&self, filter: Document) -> Result<Option<Document>> {
        Ok(self.find(filter)?.limit(1).to_vec()?.into_iter().next())
    }

    /// First matching document with a projection applied.
    pub fn find_one_with_projection(
        &self,
        filter: Document,
        projection: Document,
    ) -> Result<Option<Document>> {
        Ok(self
            .find(filter)?
            .projection(projection)
            .limit(1)
            .to_vec()?
            .into_iter()
            .next())
    }

    /// Updates the first matching document.
    pub fn update_one(&self, filter: Document, update: Document) -> Result<UpdateResult> {
        self.update_one_with_options(filter, update, UpdateOptions::default())
    }

    /// Updates the first matching document, optionally upserting.
    pub fn update_one_with_options(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        let mut state = self.core.state.lock();
        update_locked(
            &mut state,
            self.encryption(),
            &filter,
            &update,
            false,
            options.upsert,
        )
    }

    /// Updates every matching document.
    pub fn update_many(&self, filter: Document, update: Document) -> Result<UpdateResult> {
        self.update_many_with_options(filter, update, UpdateOptions::default())
    }

    /// Updates every matching document, optionally upserting.
    pub fn update_many_with_options(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        let mut state = self.core.state.lock();
        update_locked(
            &mut state,
            self.encryption(),
            &filter,
            &update,
            true,
            options.upsert,
        )
    }

    /// Replaces the first matching document wholesale, preserving `_id`.
    pub fn replace_one(&self, filter: Document, replacement: Document) -> Result<UpdateResult> {
        self.replace_one_with_options(filter, replacement, UpdateOptions::default())
    }

    /// Replaces the first matching document, optionally upserting.
    pub fn replace_one_with_options(
        &self,
        filter: Document,
        replacement: Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        if update::is_operator_update(&replacement) {
            return Err(Error::BadQuery(
                "replacement document must not contain operators".to_string(),
            ));
        }
        let mut state = self.core.state.lock();
        update_locked(
            &mut state,
            self.encryption(),
            &filter,
            &replacement,
            false,
            options.upsert,
        )
    }

    /// Deletes the first matching document.
    pub fn delete_one(&self, filter: Document) -> Result<DeleteResult> {
        let mut state = self.core.state.lock();
        delete_locked(&mut state, self.encryption(), &filter, false)
    }

    /// Deletes every matching document.
    pub fn delete_many(&self, filter: Document) -> Result<DeleteResult> {
        let mut state = self.core.state.lock();
        delete_locked(&mut state, self.encryption(), &filter, true)
    }

    /// Number of documents matching the filter (empty filter counts all).
    pub fn count_documents(&self, filter: Document) -> Result<u64> {
        let state = self.core.state.lock();
        if filter.is_empty() {
            return Ok(state.documents.len() as u64);
        }
        Ok(find_ids_locked(&state, self.encryption(), &filter)?.len() as u64)
    }

    /// Unique values of a (dotted) field across matching documents, in
    /// first-appearance order. Array values contribute their elements.
    pub fn distinct(&self, key: &str, filter: Document) -> Result<Vec<Value>> {
        let state = self.core.state.lock();
        let matches = find_ids_locked(&state, self.encryption(), &filter)?;
        let path = crate::path::FieldPath::parse(key);
        let mut seen: Vec<Value> = Vec::new();
        for (id, _) in matches {
            let Some(doc) = state.documents.get(&id) else {
                continue;
            };
            let doc = decrypt_for_read(self.encryption(), doc);
            for value in crate::path::resolve_all(&doc, path.segments()) {
                let candidates: Vec<Value> = match value {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                for candidate in candidates {
                    if !seen.contains(&candidate) {
                        seen.push(candidate);
                    }
                }
            }
        }
        Ok(seen)
    }

    /// Runs an aggregation pipeline and returns a cursor over its output.
    ///
    /// The source stream is a decrypted snapshot taken under the
    /// collection lock; stages run outside it. `$lookup` resolves sibling
    /// collections through this collection's database.
    pub fn aggregate(&self, pipeline: &[Document]) -> Result<Cursor> {
        let input = self.decrypted_snapshot();
        let database = self.core.database.clone();
        let lookup = move |name: &str| -> Option<Vec<Document>> {
            let core = database.upgrade()?;
            let collection = core.get_collection(name)?;
            Some(collection.decrypted_snapshot())
        };
        let output = crate::aggregate::run_pipeline(input, pipeline, &lookup)?;
        Ok(Cursor::from_documents(output))
    }

    /// Creates an index from a field list or `(field, direction)` list and
    /// returns its name. Creating an identical index again is a no-op.
    pub fn create_index(&self, keys: impl Into<IndexKeys>) -> Result<String> {
        let mut state = self.core.state.lock();
        let CollectionState { documents, indexes } = &mut *state;
        indexes.create(keys.into(), documents.iter())
    }

    /// Drops an index by name.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.core.state.lock().indexes.drop(name)
    }

    /// Names of the collection's indexes, in creation order.
    pub fn index_names(&self) -> Vec<String> {
        self.core.state.lock().indexes.names()
    }

    /// Runs a list of tagged operations under one lock acquisition, in
    /// list order. Stops at the first failure; the error carries the
    /// partial tally.
    pub fn bulk_write(&self, operations: Vec<BulkOp>) -> Result<BulkWriteResult> {
        let mut state = self.core.state.lock();
        let mut tally = BulkWriteResult::default();
        for (index, operation) in operations.into_iter().enumerate() {
            let step = apply_bulk_op(&mut state, self.encryption(), operation, &mut tally);
            if let Err(source) = step {
                return Err(Error::BulkWrite(Box::new(BulkWriteFailure {
                    index,
                    inserted_count: tally.inserted_count,
                    modified_count: tally.modified_count,
                    deleted_count: tally.deleted_count,
                    upserted_count: tally.upserted_count,
                    source,
                })));
            }
        }
        Ok(tally)
    }

    /// Document count and serialized sizes.
    pub fn stats(&self) -> Result<CollectionStats> {
        let state = self.core.state.lock();
        let count = state.documents.len() as u64;
        let mut size = 0u64;
        for doc in state.documents.values() {
            let bytes = rmp_serde::to_vec_named(doc).map_err(|e| Error::Io(e.to_string()))?;
            size += bytes.len() as u64;
        }
        Ok(CollectionStats {
            count,
            size,
            avg_obj_size: if count == 0 { 0 } else { size / count },
        })
    }

    /// Empties the collection and removes it from its database.
    pub fn drop(&self) {
        {
            let mut state = self.core.state.lock();
            state.documents.clear();
            state.indexes.clear();
        }
        if let Some(database) = self.core.database.upgrade() {
            database.remove_collection(&self.core.name);
        }
    }

    // --- crate-internal surface ------------------------------------------

    /// Resolves a snapshot of ids into cloned stored documents, skipping
    /// ids whose document vanished since the snapshot.
    pub(crate) fn fetch_snapshot(&self, ids: &[Value]) -> Vec<Document> {
        let state = self.core.state.lock();
        ids.iter()
            .filter_map(|id| state.documents.get(id).cloned())
            .collect()
    }

    /// Decrypts cipher-fields for a document leaving the collection.
    pub(crate) fn decrypt_outgoing(&self, doc: &Document) -> Document {
        decrypt_for_read(self.encryption(), doc)
    }

    /// Decrypted clone of every document, in insertion order.
    pub(crate) fn decrypted_snapshot(&self) -> Vec<Document> {
        let state = self.core.state.lock();
        state
            .documents
            .values()
            .map(|doc| decrypt_for_read(self.encryption(), doc))
            .collect()
    }

    /// Documents and index descriptors for the store snapshot.
    pub(crate) fn snapshot_contents(&self) -> (Vec<Document>, Vec<IndexDescriptor>) {
        let state = self.core.state.lock();
        (
            state.documents.values().cloned().collect(),
            state.indexes.descriptors(),
        )
    }

    /// Restores documents and rebuilds indexes from a loaded snapshot.
    pub(crate) fn restore(
        &self,
        documents: Vec<Document>,
        descriptors: Vec<IndexDescriptor>,
    ) -> Result<()> {
        let mut state = self.core.state.lock();
        state.documents.clear();
        for doc in documents {
            let id = doc
                .get("_id")
                .cloned()
                .ok_or_else(|| Error::CorruptStore("stored document missing _id".to_string()))?;
            if state.documents.insert(id.clone(), doc).is_some() {
                return Err(Error::CorruptStore(format!(
                    "duplicate _id in stored collection: {:?}",
                    id
                )));
            }
        }
        let CollectionState { documents, indexes } = &mut *state;
        indexes.rebuild(descriptors, documents.iter());
        Ok(())
    }
}

fn decrypt_for_read(encryption: Option<&EncryptionManager>, doc: &Document) -> Document {
    match encryption {
        Some(manager) => manager.decrypt_document(doc),
        None => doc.clone(),
    }
}

/// Media ingestion: any string value naming a readable file is replaced by
/// the file's bytes. Applies recursively; only the insert/update boundary
/// ever sees the path form.
fn ingest_media(doc: &mut Document) {
    for value in doc.values_mut() {
        ingest_value(value);
    }
}

fn ingest_value(value: &mut Value) {
    match value {
        Value::String(candidate) => {
            if let Some(blob) = Blob::from_file_path(candidate) {
                *value = Value::Binary(blob);
            }
        }
        Value::Array(items) => {
            for item in items {
                ingest_value(item);
            }
        }
        Value::Object(nested) => ingest_media(nested),
        _ => {}
    }
}

/// Write-path normalization: media ingestion, then field encryption.
fn prepare_for_storage(
    encryption: Option<&EncryptionManager>,
    mut doc: Document,
) -> Result<Document> {
    ingest_media(&mut doc);
    match encryption {
        Some(manager) => manager.encrypt_document(&doc),
        None => Ok(doc),
    }
}

fn insert_locked(
    state: &mut CollectionState,
    encryption: Option<&EncryptionManager>,
    document: Document,
) -> Result<Value> {
    let mut doc = prepare_for_storage(encryption, document)?;
    if !doc.contains_key("_id") {
        doc.insert("_id", Value::Id(ObjectId::new()));
    }
    let id = doc.get("_id").cloned().expect("just ensured");
    if state.documents.contains_key(&id) {
        return Err(Error::DuplicateId(format!("{:?}", id)));
    }
    state.indexes.insert_doc(&doc, &id);
    state.documents.insert(id.clone(), doc);
    Ok(id)
}

/// Filters documents under the lock: planner candidates (or full scan),
/// then full predicate re-evaluation per candidate. Returns ids in a
/// deterministic order (index-key order for planned queries, insertion
/// order for scans) with the positional capture for each match.
fn find_ids_locked(
    state: &CollectionState,
    encryption: Option<&EncryptionManager>,
    filter: &Document,
) -> Result<Vec<(Value, MatchContext)>> {
    // Equality against a hash-field can only ever compare plaintext with
    // a salted digest, so the equality family (bare literal, $eq, $in) is
    // defined to match nothing. Structural operators ($exists, $type,
    // $ne, …) still evaluate against the stored form.
    if let Some(manager) = encryption {
        for (field, condition) in filter.iter() {
            if !manager.config().is_sha256_field(field) {
                continue;
            }
            let equality_form = match condition {
                Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                    ops.contains_key("$eq") || ops.contains_key("$in")
                }
                _ => true,
            };
            if equality_form {
                log::warn!(
                    "equality query on hash-field '{}' matches nothing (values are salted digests)",
                    field
                );
                return Ok(Vec::new());
            }
        }
    }

    let needs_decrypt =
        encryption.is_some_and(|manager| !manager.config().aes256_fields().is_empty());
    // Index keys come from the stored (encrypted) form, so a clause on a
    // cipher-field must bypass the planner and scan decrypted candidates
    let query_touches_cipher = needs_decrypt
        && encryption.is_some_and(|manager| {
            filter
                .keys()
                .any(|field| manager.config().is_aes256_field(field))
        });

    let mut out = Vec::new();
    let mut check = |id: &Value, doc: &Document| -> Result<()> {
        let context = if needs_decrypt {
            let plain = decrypt_for_read(encryption, doc);
            matcher::matches(filter, &plain)?
        } else {
            matcher::matches(filter, doc)?
        };
        if let Some(context) = context {
            out.push((id.clone(), context));
        }
        Ok(())
    };

    let candidates = if query_touches_cipher {
        None
    } else {
        state.indexes.candidates(filter)
    };
    match candidates {
        Some(candidates) => {
            let mut seen = rustc_hash::FxHashSet::default();
            for id in candidates {
                if !seen.insert(id.clone()) {
                    continue;
                }
                if let Some(doc) = state.documents.get(&id) {
                    check(&id, doc)?;
                }
            }
        }
        None => {
            for (id, doc) in state.documents.iter() {
                check(id, doc)?;
            }
        }
    }
    Ok(out)
}

fn update_locked(
    state: &mut CollectionState,
    encryption: Option<&EncryptionManager>,
    filter: &Document,
    update_doc: &Document,
    multi: bool,
    upsert: bool,
) -> Result<UpdateResult> {
    let matches = find_ids_locked(state, encryption, filter)?;

    if matches.is_empty() {
        if upsert {
            let seeded = update::synthesize_upsert(filter, update_doc)?;
            let upserted_id = insert_locked(state, encryption, seeded)?;
            return Ok(UpdateResult {
                matched_count: 0,
                modified_count: 0,
                upserted_id: Some(upserted_id),
            });
        }
        return Ok(UpdateResult {
            matched_count: 0,
            modified_count: 0,
            upserted_id: None,
        });
    }

    let targets: Vec<(Value, MatchContext)> = if multi {
        matches
    } else {
        matches.into_iter().take(1).collect()
    };

    let mut matched_count = 0;
    let mut modified_count = 0;
    for (id, context) in targets {
        let old = state
            .documents
            .get(&id)
            .cloned()
            .expect("matched under this lock");
        let new_doc = update::apply(&old, update_doc, &context)?;
        let new_stored = prepare_for_storage(encryption, new_doc)?;
        if new_stored.get("_id") != old.get("_id") {
            return Err(Error::BadQuery("update cannot change _id".to_string()));
        }
        matched_count += 1;
        if new_stored != old {
            state.indexes.update_doc(&old, &new_stored, &id);
            state.documents.insert(id.clone(), new_stored);
            modified_count += 1;
        }
    }

    Ok(UpdateResult {
        matched_count,
        modified_count,
        upserted_id: None,
    })
}

fn delete_locked(
    state: &mut CollectionState,
    encryption: Option<&EncryptionManager>,
    filter: &Document,
    multi: bool,
) -> Result<DeleteResult> {
    let matches = find_ids_locked(state, encryption, filter)?;
    let targets = if multi {
        matches
    } else {
        matches.into_iter().take(1).collect()
    };

    let mut deleted_count = 0;
    for (id, _) in targets {
        if let Some(doc) = state.documents.shift_remove(&id) {
            state.indexes.remove_doc(&doc, &id);
            deleted_count += 1;
        }
    }
    Ok(DeleteResult { deleted_count })
}

fn apply_bulk_op(
    state: &mut CollectionState,
    encryption: Option<&EncryptionManager>,
    operation: BulkOp,
    tally: &mut BulkWriteResult,
) -> Result<()> {
    match operation {
        BulkOp::InsertOne { document } => {
            insert_locked(state, encryption, document)?;
            tally.inserted_count += 1;
        }
        BulkOp::UpdateOne {
            filter,
            update,
            upsert,
        } => {
            let result = update_locked(state, encryption, &filter, &update, false, upsert)?;
            tally.modified_count += result.modified_count;
            if result.upserted_id.is_some() {
                tally.upserted_count += 1;
            }
        }
        BulkOp::UpdateMany {
            filter,
            update,
            upsert,
        } => {
            let result = update_locked(state, encryption, &filter, &update, true, upsert)?;
            tally.modified_count += result.modified_count;
            if result.upserted_id.is_some() {
                tally.upserted_count += 1;
            }
        }
        BulkOp::ReplaceOne {
            filter,
            replacement,
            upsert,
        } => {
            if update::is_operator_update(&replacement) {
                return Err(Error::BadQuery(
                    "replacement document must not contain operators".to_string(),
                ));
            }
            let result = update_locked(state, encryption, &filter, &replacement, false, upsert)?;
            tally.modified_count += result.modified_count;
            if result.upserted_id.is_some() {
                tally.upserted_count += 1;
            }
        }
        BulkOp::DeleteOne { filter } => {
            let result = delete_locked(state, encryption, &filter, false)?;
            tally.deleted_count += result.deleted_count;
        }
        BulkOp::DeleteMany { filter } => {
            let result = delete_locked(state, encryption, &filter, true)?;
            tally.deleted_count += result.deleted_count;
        }
    }
    Ok(())
}
