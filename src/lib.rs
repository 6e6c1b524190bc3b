//! MainyDB - Embedded Document Database
//!
//! MainyDB is an embedded, in-process document database with a
//! document/collection model in the MongoDB style: heterogeneous documents
//! keyed by generated identifiers inside named collections grouped under
//! named databases, with the whole dataset persisted to a single file.
//!
//! # Quick Start
//!
//! ```rust
//! use mainydb::{doc, Store};
//!
//! let dir = tempfile::tempdir()?;
//! let store = Store::open(dir.path())?;
//! let users = store.database("app").collection("users")?;
//!
//! // CRUD
//! users.insert_one(doc! { "name" => "John Doe", "age" => 30 })?;
//! users.update_one(doc! { "name" => "John Doe" }, doc! { "$inc" => doc! { "age" => 1 } })?;
//! let john = users.find_one(doc! { "age" => doc! { "$gte" => 31 } })?.unwrap();
//! assert_eq!(john.get_str("name"), Some("John Doe"));
//!
//! // Cursors chain sort/skip/limit/projection
//! let names = users
//!     .find(doc! {})?
//!     .sort("age", -1)
//!     .projection(doc! { "name" => 1, "_id" => 0 })
//!     .to_vec()?;
//! assert_eq!(names.len(), 1);
//!
//! // Snapshot to disk on close
//! store.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Key Features
//!
//! - **Match engine**: comparison, logical, element, array, and regex
//!   operator families with dotted paths and positional `$` capture
//! - **Update engine**: field, arithmetic, and array modifier families,
//!   replacement semantics, and upserts
//! - **Indexes**: single- and compound-field with a prefix-coverage
//!   planner; contents rebuilt from documents on load
//! - **Aggregation**: `$match`, `$project`, `$unwind`, `$group`, `$sort`,
//!   `$skip`, `$limit`, `$lookup`, `$count` plus an expression evaluator
//! - **Per-field encryption**: salted SHA-256 hash-fields and AES-256-CBC
//!   cipher-fields, transparent on the write and read paths
//! - **Thread safety**: one mutex per collection; cursors materialize
//!   outside the lock
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  Store (one .mdb snapshot file)           │
//! │  └─ Database (name → collection registry) │
//! │     └─ Collection ── one mutex over:      │
//! │        ├─ documents (_id → document)      │
//! │        ├─ IndexSet (planner + B-trees)    │
//! │        └─ EncryptionManager (optional)    │
//! └───────────────────────────────────────────┘
//!        find → planner → match → Cursor
//!        (sort → skip → limit → project → decrypt)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
mod aggregate;
/// Binary payloads and media ingestion
pub mod binary;
/// Collections: CRUD, bulk ops, stats
pub mod collection;
/// Lazy cursors with sort/skip/limit/projection
pub mod cursor;
/// Name → collection registries
pub mod database;
/// Ordered documents and the `doc!` macro
pub mod document;
/// Per-field SHA-256 hashing and AES-256 encryption
pub mod encryption;
/// Error types
pub mod error;
/// Index descriptors and creation inputs
pub mod index;
mod matcher;
/// Document identifiers
pub mod oid;
mod path;
/// The store: registry root and snapshot persistence
pub mod store;
mod update;
/// Dynamic document values
pub mod value;

// Re-exports for the common path

pub use crate::binary::Blob;
pub use crate::collection::{
    BulkOp, BulkWriteResult, Collection, CollectionStats, DeleteResult, InsertManyResult,
    InsertOneResult, UpdateOptions, UpdateResult,
};
pub use crate::cursor::Cursor;
pub use crate::database::Database;
pub use crate::document::Document;
pub use crate::encryption::{
    Aes256Cipher, AesKey, EncryptionConfig, EncryptionManager, Sha256Hasher,
};
pub use crate::error::{BulkWriteFailure, Error, Result};
pub use crate::index::{IndexDescriptor, IndexKeys};
pub use crate::oid::ObjectId;
pub use crate::store::Store;
pub use crate::value::Value;

// Version information
/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
