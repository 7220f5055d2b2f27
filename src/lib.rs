//! # conftree - Hierarchical Configuration Store
//!
//! conftree is a persistent configuration store built on SQLite. It keeps a
//! tree of named entries, each carrying exactly one typed value (signed 64-bit
//! integer, Unicode text, or opaque bytes) together with a revision stamp that
//! clients use to detect change.
//!
//! Entries are addressed by dotted paths (the delimiter is configurable per
//! store and persisted inside it):
//!
//! ```rust
//! use conftree::Store;
//!
//! let store = Store::open_in_memory('.')?;
//!
//! store.create("network.proxy.port", 8080)?;
//!
//! assert!(store.exists("network.proxy")?);       // auto-vivified ancestor
//! assert_eq!(store.get_integer("network.proxy.port")?, 8080);
//! # Ok::<(), conftree::Error>(())
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Store (tree engine)                      │
//! │         create / set / get / children / delete / revisions      │
//! └───────┬──────────────────────┬──────────────────────┬───────────┘
//!         │                      │                      │
//!         ▼                      ▼                      ▼
//! ┌──────────────┐      ┌───────────────┐      ┌────────────────────┐
//! │ name parsing │      │  transactions │      │   settings table   │
//! │ (delimiter)  │      │  + savepoints │      │ (version, delim.)  │
//! └──────────────┘      └───────┬───────┘      └────────────────────┘
//!                               │
//!                               ▼
//!                       ┌──────────────┐
//!                       │    SQLite    │
//!                       │  (rusqlite)  │
//!                       └──────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! These hold on every committed state and are verified by
//! [`Store::check_data_consistency`]:
//!
//! 1. Exactly one root entry exists (`id = 0`, empty local name).
//! 2. Every other entry has an existing parent; the parent chain ends at
//!    the root.
//! 3. No stored local name contains the active delimiter.
//! 4. `(parent, name)` is unique.
//! 5. Any change to an entry changes the revision of the root and of every
//!    ancestor on the path to the entry.
//!
//! ## Concurrency Model
//!
//! A [`Store`] is single-threaded by construction (the handle is neither
//! `Send` nor `Sync`); create one instance per thread. Instances backed by
//! the same file serialize through SQLite's own locking with a 15-second
//! busy timeout. Within an instance, at most one transaction is active at a
//! time: readers share it, nested writers stack savepoints on it, and a
//! writer request while only a read transaction is active fails with
//! [`Error::InvalidTransaction`].

pub mod error;

/// Name validation and path tokenization.
///
/// Names are split at the store's delimiter character; validation is
/// character-exact with no Unicode normalization or case folding.
pub mod name;

/// Domain types: typed values, wire type tags, revision stamps.
pub mod types;

/// SQLite DDL and low-level database handling (pragmas, integrity checks,
/// statement cache).
pub mod schema;

/// Transaction scopes and savepoint management.
///
/// [`ReadTransaction`] and [`WriteTransaction`] are RAII scopes: dropping a
/// writer without committing rolls its changes back (the savepoint for a
/// nested writer, the whole transaction for the outermost one).
pub mod txn;

/// The store itself: open/create, settings, and the tree engine.
pub mod store;

mod consistency;

pub use error::{Error, Result};
pub use store::{Store, DEFAULT_NAME_DELIMITER};
pub use txn::{ReadTransaction, WriteTransaction};
pub use types::{Revision, Value, ValueType};
