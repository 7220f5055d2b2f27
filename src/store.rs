//! # The Configuration Store
//!
//! [`Store`] ties everything together: it owns the database handle, the
//! persisted configuration (schema version, name delimiter), the settings
//! table, and the tree engine that resolves dotted paths to entries.
//!
//! ## Path Resolution and Auto-Vivification
//!
//! A name like `a.b.c` is split into segments and resolved left to right
//! against the `(name, parent)` unique index, producing the id chain
//! `[id_a, id_b, id_c]`. Writers that create entries (`create`,
//! `set_or_create`) accept a partially resolvable path and materialize the
//! missing tail: intermediate entries get the default payload
//! `(Integer, 0)`, the terminal entry gets the caller's value, and every new
//! row starts at a random revision drawn from the full signed 64-bit range.
//!
//! ## Revision Propagation
//!
//! Every successful write bumps the revision of the root and of each
//! pre-existing ancestor on the affected chain by one (read, then store
//! `+1`). `set` additionally bumps the modified entry itself. Deletion bumps
//! the surviving ancestors only. Reads never change revisions.
//!
//! ## Transactions
//!
//! Each public operation joins the active transaction or opens its own
//! (deferred for reads, immediate for writes) and commits it before
//! returning. Inside a caller-held [`WriteTransaction`] the per-operation
//! writer becomes a savepoint, so a failed operation rolls back cleanly
//! without disturbing the outer scope.

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::{Rc, Weak};

use rand::Rng;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::name;
use crate::schema::Db;
use crate::txn::{ReadTransaction, TxnHandle, WriteTransaction};
use crate::types::{Revision, Value, ValueType};

// =============================================================================
// Constants
// =============================================================================

/// The delimiter a store is created with unless the caller chooses another.
pub const DEFAULT_NAME_DELIMITER: char = '.';

/// Id of the root entry. The root always exists and is never deleted.
pub(crate) const ROOT_ID: i64 = 0;

/// Version of the persistent format written by this build. Opening a store
/// whose major version is higher fails with
/// [`VersionNotSupported`](Error::VersionNotSupported).
const CURRENT_MAJOR_VERSION: i64 = 1;
const CURRENT_MINOR_VERSION: i64 = 0;

const SETTING_MAJOR_VERSION: &str = "MajorVersion";
const SETTING_MINOR_VERSION: &str = "MinorVersion";
const SETTING_NAME_DELIMITER: &str = "NameDelimiter";

// =============================================================================
// Store
// =============================================================================

/// A persistent, hierarchical configuration store.
///
/// One instance per thread: the handle is intentionally neither `Send` nor
/// `Sync`. Instances backed by the same file coordinate through SQLite's
/// locking (immediate transactions serialize writers, deferred transactions
/// allow concurrent readers), with a 15-second busy timeout.
#[derive(Debug)]
pub struct Store {
    db: Db,

    /// The active name delimiter. Loaded from (or first persisted to) the
    /// settings table at open; changed only by `set_new_delimiter`.
    delimiter: Cell<char>,

    version_major: Cell<i64>,
    version_minor: Cell<i64>,

    /// The currently active transaction, if any. The store only observes it;
    /// transaction scopes own it. When the last scope exits, the weak
    /// reference expires and the next operation starts fresh.
    txn: RefCell<Weak<TxnHandle>>,
}

impl Store {
    // =========================================================================
    // Opening
    // =========================================================================

    /// Opens a configuration store, creating the database file first when
    /// `create` is set.
    ///
    /// For a new store the supplied `delimiter` is persisted; for an
    /// existing store the persisted delimiter wins and `delimiter` is
    /// ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::Sqlite`] if the file cannot be opened or created
    /// - [`Error::VersionNotSupported`] if the store was written by a newer
    ///   major version
    /// - [`Error::InvalidConfiguration`] / [`Error::InvalidDelimiterSetting`]
    ///   for damaged configuration rows
    /// - [`Error::RootEntryMissing`] / [`Error::InvalidRootEntry`] for a
    ///   damaged root
    pub fn open(path: impl AsRef<Path>, create: bool, delimiter: char) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), create, "opening configuration store");

        Self::finish_open(Db::open(path, create)?, delimiter)
    }

    /// Opens a fresh in-memory store. Contents are lost on drop; intended
    /// for tests and benchmarks.
    pub fn open_in_memory(delimiter: char) -> Result<Self> {
        Self::finish_open(Db::open_in_memory()?, delimiter)
    }

    fn finish_open(db: Db, delimiter: char) -> Result<Self> {
        let store = Self {
            db,
            delimiter: Cell::new(delimiter),
            version_major: Cell::new(0),
            version_minor: Cell::new(0),
            txn: RefCell::new(Weak::new()),
        };

        // Schema creation, the sanity checks and the configuration
        // bootstrap commit as one unit.
        let txn = store.write_transaction()?;
        store.db.create_schema()?;
        store.db.run_integrity_checks()?;
        store.load_or_init_config(delimiter)?;
        store.check_or_create_root()?;
        txn.commit()?;

        Ok(store)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Opens an explicit read scope. See [`ReadTransaction`].
    pub fn read_transaction(&self) -> Result<ReadTransaction> {
        ReadTransaction::begin(self)
    }

    /// Opens an explicit writer scope. See [`WriteTransaction`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTransaction`] if only a read transaction is active.
    pub fn write_transaction(&self) -> Result<WriteTransaction> {
        WriteTransaction::begin(self)
    }

    /// Returns the active transaction handle, or begins a new one. Readers
    /// join anything; a writer request joins only a writeable transaction.
    pub(crate) fn transaction(&self, writeable: bool) -> Result<Rc<TxnHandle>> {
        if let Some(txn) = self.txn.borrow().upgrade() {
            if txn.is_open() {
                if writeable && !txn.writeable() {
                    return Err(Error::InvalidTransaction);
                }
                return Ok(txn);
            }
        }

        let txn = TxnHandle::begin(self.db.share_conn(), writeable)?;
        *self.txn.borrow_mut() = Rc::downgrade(&txn);
        Ok(txn)
    }

    fn in_transaction(&self) -> bool {
        matches!(self.txn.borrow().upgrade(), Some(txn) if txn.is_open())
    }

    pub(crate) fn conn(&self) -> &Connection {
        self.db.conn()
    }

    // =========================================================================
    // Names
    // =========================================================================

    /// The delimiter this store splits names at.
    pub fn name_delimiter(&self) -> char {
        self.delimiter.get()
    }

    /// The persistent-format version of the underlying database.
    pub fn version(&self) -> (i64, i64) {
        (self.version_major.get(), self.version_minor.get())
    }

    /// Whether `name` is valid under this store's delimiter.
    pub fn is_valid_name(&self, name: &str) -> bool {
        name::is_valid_name(name, self.delimiter.get())
    }

    fn parse_name(&self, name: &str) -> Result<Vec<String>> {
        let delimiter = self.delimiter.get();
        if !name::is_valid_name(name, delimiter) {
            return Err(Error::InvalidName {
                name: name.to_owned(),
            });
        }
        Ok(name::split_name(name, delimiter))
    }

    pub(crate) fn path_to_name(&self, path: &[String]) -> String {
        name::join_path(path, self.delimiter.get())
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Returns whether `name` resolves to an entry.
    pub fn exists(&self, name: &str) -> Result<bool> {
        let path = self.parse_name(name)?;
        let _txn = self.read_transaction()?;

        let ids = self.lookup_path(&path)?;
        Ok(ids.len() == path.len())
    }

    /// Returns the value type of the named entry.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if the entry is missing;
    /// [`Error::UnknownEntryType`] if its on-disk tag is unrecognized.
    pub fn get_type(&self, name: &str) -> Result<ValueType> {
        let path = self.parse_name(name)?;
        let _txn = self.read_transaction()?;

        self.entry_type(self.entry_id(&path)?)
    }

    /// Whether the named entry holds an integer.
    pub fn is_integer(&self, name: &str) -> Result<bool> {
        Ok(self.get_type(name)? == ValueType::Integer)
    }

    /// Whether the named entry holds text.
    pub fn is_string(&self, name: &str) -> Result<bool> {
        Ok(self.get_type(name)? == ValueType::Text)
    }

    /// Whether the named entry holds a byte sequence.
    pub fn is_binary(&self, name: &str) -> Result<bool> {
        Ok(self.get_type(name)? == ValueType::Blob)
    }

    /// Returns the `{id, revision}` stamp of the named entry; the empty
    /// name denotes the root, i.e. the revision of the whole store.
    pub fn get_revision(&self, name: &str) -> Result<Revision> {
        let _txn = self.read_transaction()?;

        let id = self.named_or_root_id(name)?;
        Ok(Revision {
            id,
            revision: self.entry_revision(id)?,
        })
    }

    /// Whether the named entry (the root for the empty name) has at least
    /// one child.
    pub fn has_child(&self, name: &str) -> Result<bool> {
        let _txn = self.read_transaction()?;

        let id = self.named_or_root_id(name)?;
        self.has_child_id(id)
    }

    /// Returns the local names of the immediate children of the named entry
    /// (the root for the empty name), in the backing store's natural row
    /// order.
    pub fn get_children(&self, name: &str) -> Result<Vec<String>> {
        let _txn = self.read_transaction()?;

        let id = self.named_or_root_id(name)?;
        self.child_names(id)
    }

    /// Reads the named entry as an integer.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if missing, [`Error::WrongValueType`] if the
    /// entry holds another type.
    pub fn get_integer(&self, name: &str) -> Result<i64> {
        match self.get_typed(name, ValueType::Integer)? {
            Value::Integer(value) => Ok(value),
            other => Err(Error::WrongValueType {
                name: name.to_owned(),
                expected: ValueType::Integer,
                actual: other.value_type(),
            }),
        }
    }

    /// Reads the named entry as text.
    pub fn get_string(&self, name: &str) -> Result<String> {
        match self.get_typed(name, ValueType::Text)? {
            Value::Text(value) => Ok(value),
            other => Err(Error::WrongValueType {
                name: name.to_owned(),
                expected: ValueType::Text,
                actual: other.value_type(),
            }),
        }
    }

    /// Reads the named entry as a byte sequence. An empty stored blob comes
    /// back as an empty vector.
    pub fn get_binary(&self, name: &str) -> Result<Vec<u8>> {
        match self.get_typed(name, ValueType::Blob)? {
            Value::Blob(value) => Ok(value),
            other => Err(Error::WrongValueType {
                name: name.to_owned(),
                expected: ValueType::Blob,
                actual: other.value_type(),
            }),
        }
    }

    fn get_typed(&self, name: &str, expected: ValueType) -> Result<Value> {
        let path = self.parse_name(name)?;
        let _txn = self.read_transaction()?;

        let id = self.entry_id(&path)?;
        let actual = self.entry_type(id)?;
        if actual != expected {
            return Err(Error::WrongValueType {
                name: name.to_owned(),
                expected,
                actual,
            });
        }

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT value FROM entries WHERE id = ?1")?;
        stmt.query_row([id], |row| Value::read_column(expected, row, 0))
            .optional()?
            .ok_or_else(|| Error::InvalidQuery {
                reason: format!("failed to query value of entry '{name}'"),
            })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Creates a new entry, auto-vivifying missing ancestors with the
    /// default payload `(Integer, 0)`.
    ///
    /// # Errors
    ///
    /// [`Error::NameAlreadyExists`] if the full path already resolves;
    /// [`Error::InvalidTransaction`] while only a read scope is active.
    pub fn create(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let path = self.parse_name(name)?;
        let txn = self.write_transaction()?;

        let ids = self.lookup_path(&path)?;
        if ids.len() == path.len() {
            return Err(Error::NameAlreadyExists {
                name: name.to_owned(),
            });
        }

        self.create_missing(&ids, &path[ids.len()..], &value)?;
        self.update_revisions(&ids)?;

        txn.commit()
    }

    /// Replaces type and value of an existing entry. Siblings and children
    /// are unaffected.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if the entry is missing.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let path = self.parse_name(name)?;
        let txn = self.write_transaction()?;

        let ids = self.require_path(&path)?;
        self.set_entry(&ids, &value)?;

        txn.commit()
    }

    /// `set` when the entry exists, `create` when it does not.
    pub fn set_or_create(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let path = self.parse_name(name)?;
        let txn = self.write_transaction()?;

        let ids = self.lookup_path(&path)?;
        if ids.len() == path.len() {
            self.set_entry(&ids, &value)?;
        } else {
            self.create_missing(&ids, &path[ids.len()..], &value)?;
            self.update_revisions(&ids)?;
        }

        txn.commit()
    }

    /// Deletes the named entry. Returns `false` when the entry does not
    /// exist, or when it has children and `recursive` is off; `true` when
    /// something was deleted.
    pub fn try_delete(&self, name: &str, recursive: bool) -> Result<bool> {
        let path = self.parse_name(name)?;
        let txn = self.write_transaction()?;

        let ids = self.lookup_path(&path)?;
        if ids.len() != path.len() {
            return Ok(false);
        }
        if !self.delete_entry(&ids, recursive)? {
            return Ok(false);
        }

        txn.commit()?;
        Ok(true)
    }

    /// Deletes the named entry and, with `recursive`, its whole subtree.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if the entry is missing;
    /// [`Error::HasChildEntry`] if `recursive` is off and children exist.
    pub fn delete(&self, name: &str, recursive: bool) -> Result<()> {
        let path = self.parse_name(name)?;
        let txn = self.write_transaction()?;

        let ids = self.require_path(&path)?;
        if !self.delete_entry(&ids, recursive)? {
            return Err(Error::HasChildEntry {
                name: name.to_owned(),
            });
        }

        txn.commit()
    }

    // =========================================================================
    // Path Resolution
    // =========================================================================

    /// Looks up one `(parent, segment)` step in the unique index.
    fn lookup_child(&self, parent: i64, segment: &str) -> Result<Option<i64>> {
        debug_assert!(self.in_transaction());

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT id FROM entries WHERE name = ?1 AND parent = ?2")?;
        Ok(stmt
            .query_row(params![segment, parent], |row| row.get(0))
            .optional()?)
    }

    /// Resolves as much of `path` as exists, left to right from the root.
    /// The returned chain covers the longest valid prefix; the path fully
    /// resolved iff the chain is as long as the path.
    fn lookup_path(&self, path: &[String]) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(path.len());
        for segment in path {
            let parent = ids.last().copied().unwrap_or(ROOT_ID);
            match self.lookup_child(parent, segment)? {
                Some(id) => ids.push(id),
                None => break,
            }
        }
        Ok(ids)
    }

    /// Resolves the full path or fails with `EntryNotFound`.
    fn require_path(&self, path: &[String]) -> Result<Vec<i64>> {
        let ids = self.lookup_path(path)?;
        if ids.len() != path.len() {
            return Err(Error::EntryNotFound {
                name: self.path_to_name(path),
            });
        }
        Ok(ids)
    }

    /// Id of the entry the full path resolves to.
    fn entry_id(&self, path: &[String]) -> Result<i64> {
        let ids = self.require_path(path)?;
        // Validated paths have at least one segment.
        Ok(ids[ids.len() - 1])
    }

    /// Id for the read-side convention: empty name means the root.
    fn named_or_root_id(&self, name: &str) -> Result<i64> {
        if name.is_empty() {
            return Ok(ROOT_ID);
        }
        let path = self.parse_name(name)?;
        self.entry_id(&path)
    }

    // =========================================================================
    // Entry Access
    // =========================================================================

    fn entry_type(&self, id: i64) -> Result<ValueType> {
        debug_assert!(self.in_transaction());

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT type FROM entries WHERE id = ?1")?;
        let tag: i64 = stmt
            .query_row([id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| Error::InvalidQuery {
                reason: format!("failed to query value type of entry {id}"),
            })?;

        ValueType::from_tag(tag).ok_or(Error::UnknownEntryType { id, tag })
    }

    fn entry_revision(&self, id: i64) -> Result<i64> {
        debug_assert!(self.in_transaction());

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT revision FROM entries WHERE id = ?1")?;
        stmt.query_row([id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| Error::InvalidQuery {
                reason: format!("failed to query revision of entry {id}"),
            })
    }

    fn has_child_id(&self, parent: i64) -> Result<bool> {
        debug_assert!(self.in_transaction());

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT COUNT(id) FROM entries WHERE parent = ?1 AND id != 0")?;
        let count: i64 = stmt.query_row([parent], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Ids of the immediate children of `parent`, natural row order.
    pub(crate) fn child_ids(&self, parent: i64) -> Result<Vec<i64>> {
        debug_assert!(self.in_transaction());

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT id FROM entries WHERE parent = ?1 AND id != 0")?;
        let rows = stmt.query_map([parent], |row| row.get(0))?;

        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    fn child_names(&self, parent: i64) -> Result<Vec<String>> {
        debug_assert!(self.in_transaction());

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT name FROM entries WHERE parent = ?1 AND id != 0")?;
        let rows = stmt.query_map([parent], |row| row.get(0))?;

        let mut names = Vec::new();
        for name in rows {
            names.push(name?);
        }
        Ok(names)
    }

    // =========================================================================
    // Mutation Internals
    // =========================================================================

    /// A fresh entry revision, uniform over the full signed 64-bit range. A
    /// deleted-and-recreated entry thereby almost certainly shows a
    /// different `{id, revision}` pair even if SQLite reuses the row id;
    /// collisions are bounded by 2^-64 per re-creation.
    fn random_revision(&self) -> i64 {
        rand::thread_rng().gen()
    }

    /// Bumps the revision of the root and then of every id in `ids`, in
    /// order: read the current value, store `+1`.
    fn update_revisions(&self, ids: &[i64]) -> Result<()> {
        debug_assert!(self.in_transaction());

        let conn = self.conn();
        let mut get = conn.prepare_cached("SELECT revision FROM entries WHERE id = ?1")?;
        let mut set = conn.prepare_cached("UPDATE entries SET revision = ?2 WHERE id = ?1")?;

        let mut bump = |id: i64| -> Result<()> {
            let revision: i64 = get
                .query_row([id], |row| row.get(0))
                .optional()?
                .ok_or_else(|| Error::InvalidQuery {
                    reason: format!("failed to query revision of entry {id}"),
                })?;
            set.execute(params![id, revision.wrapping_add(1)])?;
            Ok(())
        };

        bump(ROOT_ID)?;
        for &id in ids {
            bump(id)?;
        }
        Ok(())
    }

    /// Inserts one child row and returns its id.
    fn create_entry(&self, parent: i64, name: &str, value: &Value) -> Result<i64> {
        debug_assert!(self.in_transaction());

        let mut stmt = self.conn().prepare_cached(
            "INSERT INTO entries (name, parent, type, revision, value) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        let inserted = stmt.execute(params![
            name,
            parent,
            value.value_type().tag(),
            self.random_revision(),
            value,
        ])?;
        if inserted != 1 {
            return Err(Error::InvalidInsert {
                reason: format!("failed to insert entry '{name}' under parent {parent}"),
            });
        }

        Ok(self.conn().last_insert_rowid())
    }

    /// Materializes the unresolved tail of a path: default payloads for the
    /// intermediates, the caller's value for the terminal segment.
    fn create_missing(&self, prefix_ids: &[i64], segments: &[String], value: &Value) -> Result<()> {
        let mut parent = prefix_ids.last().copied().unwrap_or(ROOT_ID);

        for (index, segment) in segments.iter().enumerate() {
            if index + 1 == segments.len() {
                self.create_entry(parent, segment, value)?;
            } else {
                parent = self.create_entry(parent, segment, &Value::default())?;
            }
        }
        Ok(())
    }

    /// Replaces type and value of the chain's terminal entry, then bumps
    /// the whole chain (terminal included).
    fn set_entry(&self, ids: &[i64], value: &Value) -> Result<()> {
        debug_assert!(self.in_transaction());

        let mut stmt = self
            .conn()
            .prepare_cached("UPDATE entries SET type = ?1, value = ?2 WHERE id = ?3")?;
        stmt.execute(params![
            value.value_type().tag(),
            value,
            ids[ids.len() - 1]
        ])?;
        drop(stmt);

        self.update_revisions(ids)
    }

    fn delete_row(&self, id: i64) -> Result<()> {
        debug_assert!(self.in_transaction());
        debug_assert_ne!(id, ROOT_ID);

        let mut stmt = self
            .conn()
            .prepare_cached("DELETE FROM entries WHERE id = ?1")?;
        stmt.execute([id])?;
        Ok(())
    }

    /// Deletes the chain's terminal entry. With `recursive`, removes the
    /// subtree descendants-first (each level's children are collected
    /// before any row in the subtree is deleted); without it, refuses when
    /// children exist. On success, bumps the surviving ancestors.
    fn delete_entry(&self, ids: &[i64], recursive: bool) -> Result<bool> {
        let id = ids[ids.len() - 1];

        if recursive {
            let mut order = Vec::new();
            let mut stack = vec![id];
            while let Some(next) = stack.pop() {
                order.push(next);
                stack.extend(self.child_ids(next)?);
            }
            for &entry in order.iter().rev() {
                self.delete_row(entry)?;
            }
        } else {
            if self.has_child_id(id)? {
                return Ok(false);
            }
            self.delete_row(id)?;
        }

        self.update_revisions(&ids[..ids.len() - 1])?;
        Ok(true)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub(crate) fn setting_exists(&self, name: &str) -> Result<bool> {
        debug_assert!(self.in_transaction());

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT 1 FROM settings WHERE name = ?1")?;
        Ok(stmt.query_row([name], |_| Ok(())).optional()?.is_some())
    }

    pub(crate) fn set_setting(&self, name: &str, value: &Value) -> Result<()> {
        debug_assert!(self.in_transaction());

        let mut stmt = self
            .conn()
            .prepare_cached("INSERT OR REPLACE INTO settings (name, value) VALUES (?1, ?2)")?;
        stmt.execute(params![name, value])?;
        Ok(())
    }

    /// Reads a setting, typed by the SQL type of the stored value. `NULL`
    /// is the empty blob.
    pub(crate) fn get_setting(&self, name: &str) -> Result<Value> {
        debug_assert!(self.in_transaction());

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT value FROM settings WHERE name = ?1")?;
        let raw: SqlValue = stmt
            .query_row([name], |row| row.get(0))
            .optional()?
            .ok_or_else(|| Error::SettingNotFound {
                name: name.to_owned(),
            })?;

        match raw {
            SqlValue::Integer(value) => Ok(Value::Integer(value)),
            SqlValue::Text(value) => Ok(Value::Text(value)),
            SqlValue::Blob(value) => Ok(Value::Blob(value)),
            SqlValue::Null => Ok(Value::Blob(Vec::new())),
            SqlValue::Real(_) => Err(Error::SettingTypeMismatch {
                name: name.to_owned(),
                expected: "integer, text, or blob",
                actual: rusqlite::types::Type::Real,
            }),
        }
    }

    pub(crate) fn get_setting_integer(&self, name: &str) -> Result<i64> {
        match self.get_setting(name)? {
            Value::Integer(value) => Ok(value),
            other => Err(Error::SettingTypeMismatch {
                name: name.to_owned(),
                expected: "integer",
                actual: other.sql_type(),
            }),
        }
    }

    pub(crate) fn get_setting_text(&self, name: &str) -> Result<String> {
        match self.get_setting(name)? {
            Value::Text(value) => Ok(value),
            other => Err(Error::SettingTypeMismatch {
                name: name.to_owned(),
                expected: "text",
                actual: other.sql_type(),
            }),
        }
    }

    // =========================================================================
    // Configuration Bootstrap
    // =========================================================================

    fn load_or_init_config(&self, delimiter: char) -> Result<()> {
        // Version information: both settings present, or neither (new store).
        let has_major = self.setting_exists(SETTING_MAJOR_VERSION)?;
        let has_minor = self.setting_exists(SETTING_MINOR_VERSION)?;

        if !has_major || !has_minor {
            if has_major != has_minor {
                return Err(Error::InvalidConfiguration {
                    reason: "partial version information found".to_owned(),
                });
            }
            self.set_setting(SETTING_MAJOR_VERSION, &Value::Integer(CURRENT_MAJOR_VERSION))?;
            self.set_setting(SETTING_MINOR_VERSION, &Value::Integer(CURRENT_MINOR_VERSION))?;
        }

        let major = self.get_setting_integer(SETTING_MAJOR_VERSION)?;
        let minor = self.get_setting_integer(SETTING_MINOR_VERSION)?;
        if major > CURRENT_MAJOR_VERSION {
            return Err(Error::VersionNotSupported { major, minor });
        }
        self.version_major.set(major);
        self.version_minor.set(minor);

        // Name delimiter: a persisted value wins over the caller's.
        if self.setting_exists(SETTING_NAME_DELIMITER)? {
            let stored = self.get_setting_text(SETTING_NAME_DELIMITER)?;
            let mut chars = stored.chars();
            match (chars.next(), chars.next()) {
                (Some(delimiter), None) => self.delimiter.set(delimiter),
                _ => return Err(Error::InvalidDelimiterSetting { value: stored }),
            }
        } else {
            self.set_setting(SETTING_NAME_DELIMITER, &Value::Text(delimiter.to_string()))?;
            self.delimiter.set(delimiter);
        }

        Ok(())
    }

    fn check_or_create_root(&self) -> Result<()> {
        let conn = self.conn();

        let root_count: i64 =
            conn.query_row("SELECT COUNT(id) FROM entries WHERE id = 0", [], |row| {
                row.get(0)
            })?;
        if root_count > 1 {
            return Err(Error::MultipleRootEntries { count: root_count });
        }

        if root_count == 0 {
            // A store without a root must be a store without entries.
            let entry_count: i64 =
                conn.query_row("SELECT COUNT(id) FROM entries", [], |row| row.get(0))?;
            if entry_count != 0 {
                return Err(Error::RootEntryMissing);
            }

            let inserted = conn.execute(
                "INSERT INTO entries (id, parent, revision, name, type, value) \
                 VALUES (0, 0, 0, ?1, ?2, ?3)",
                params!["", ValueType::Integer.tag(), Value::Integer(0)],
            )?;
            if inserted != 1 {
                return Err(Error::InvalidInsert {
                    reason: "failed to insert the root entry".to_owned(),
                });
            }
            return Ok(());
        }

        // Root exists: parent, name, type and value are fixed at their
        // initial values; only the revision advances.
        let (parent, name, tag, value): (i64, String, i64, SqlValue) = conn.query_row(
            "SELECT parent, name, type, value FROM entries WHERE id = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        if parent != ROOT_ID {
            return Err(Error::InvalidRootEntry {
                reason: format!("parent is {parent}"),
            });
        }
        if !name.is_empty() {
            return Err(Error::InvalidRootEntry {
                reason: format!("name is '{name}'"),
            });
        }
        if tag != ValueType::Integer.tag() {
            return Err(Error::InvalidRootEntry {
                reason: format!("type tag is {tag}"),
            });
        }
        if !matches!(value, SqlValue::Integer(0)) {
            return Err(Error::InvalidRootEntry {
                reason: "value is not 0".to_owned(),
            });
        }

        Ok(())
    }

    // =========================================================================
    // Delimiter Management
    // =========================================================================

    /// Whether `delimiter` occurs in no stored local name. A `true` result
    /// implies `set_new_delimiter` with the same character will succeed.
    pub(crate) fn is_valid_new_delimiter(&self, delimiter: char) -> Result<bool> {
        let _txn = self.read_transaction()?;

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT name FROM entries WHERE id != 0")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;

        for name in names {
            if name?.contains(delimiter) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Switches the store to a new name delimiter. Subsequent name
    /// validation and parsing use the new character.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDelimiter`] if any stored entry name contains the
    /// candidate character.
    pub(crate) fn set_new_delimiter(&self, delimiter: char) -> Result<()> {
        let txn = self.write_transaction()?;

        if !self.is_valid_new_delimiter(delimiter)? {
            return Err(Error::InvalidDelimiter { delimiter });
        }

        self.set_setting(SETTING_NAME_DELIMITER, &Value::Text(delimiter.to_string()))?;
        self.delimiter.set(delimiter);
        txn.commit()?;

        tracing::debug!(%delimiter, "name delimiter changed");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_of_fresh_store() {
        let store = Store::open_in_memory('.').expect("should open store");
        assert_eq!(store.version(), (1, 0));
        assert_eq!(store.name_delimiter(), '.');
    }

    #[test]
    fn test_setting_round_trip() {
        let store = Store::open_in_memory('.').expect("should open store");
        let txn = store.write_transaction().expect("should open writer");

        store
            .set_setting("TestInt", &Value::Integer(42))
            .expect("should store integer");
        store
            .set_setting("TestText", &Value::Text("hello".to_owned()))
            .expect("should store text");
        store
            .set_setting("TestBlob", &Value::Blob(vec![1, 2, 3]))
            .expect("should store blob");
        store
            .set_setting("TestEmptyBlob", &Value::Blob(Vec::new()))
            .expect("should store empty blob");

        assert_eq!(
            store.get_setting_integer("TestInt").expect("should read"),
            42
        );
        assert_eq!(
            store.get_setting_text("TestText").expect("should read"),
            "hello"
        );
        assert_eq!(
            store.get_setting("TestBlob").expect("should read"),
            Value::Blob(vec![1, 2, 3])
        );
        // Empty blobs are stored as NULL and come back empty.
        assert_eq!(
            store.get_setting("TestEmptyBlob").expect("should read"),
            Value::Blob(Vec::new())
        );

        // INSERT OR REPLACE semantics.
        store
            .set_setting("TestInt", &Value::Integer(43))
            .expect("should replace");
        assert_eq!(
            store.get_setting_integer("TestInt").expect("should read"),
            43
        );

        assert!(store.setting_exists("TestInt").expect("should query"));
        assert!(!store.setting_exists("Missing").expect("should query"));

        assert!(matches!(
            store.get_setting("Missing"),
            Err(Error::SettingNotFound { .. })
        ));
        assert!(matches!(
            store.get_setting_integer("TestText"),
            Err(Error::SettingTypeMismatch { .. })
        ));
        assert!(matches!(
            store.get_setting_text("TestInt"),
            Err(Error::SettingTypeMismatch { .. })
        ));

        txn.commit().expect("should commit");
    }

    #[test]
    fn test_delimiter_change_checks_stored_names() {
        let store = Store::open_in_memory('.').expect("should open store");
        store.create("a.b", 1).expect("should create");

        // '/' is unused; 'a' and 'b' occur as local names.
        assert!(store.is_valid_new_delimiter('/').expect("should query"));
        assert!(!store.is_valid_new_delimiter('a').expect("should query"));

        assert!(matches!(
            store.set_new_delimiter('a'),
            Err(Error::InvalidDelimiter { delimiter: 'a' })
        ));
        assert_eq!(store.name_delimiter(), '.');

        store.set_new_delimiter('/').expect("should switch");
        assert_eq!(store.name_delimiter(), '/');

        // The old two-level path is now addressed with '/'; "a.b" is a
        // single (unused) segment name.
        assert!(store.exists("a/b").expect("should query"));
        assert!(!store.exists("a.b").expect("should query"));
        assert!(store.is_valid_name("x.y"));
        assert!(!store.is_valid_name("x/"));

        // And the change is persisted as a setting.
        let _txn = store.read_transaction().expect("should open reader");
        assert_eq!(
            store
                .get_setting_text(SETTING_NAME_DELIMITER)
                .expect("should read"),
            "/"
        );
    }

    #[test]
    fn test_every_unused_character_is_a_valid_new_delimiter() {
        let store = Store::open_in_memory('.').expect("should open store");
        let txn = store.write_transaction().expect("should open writer");

        for delimiter in ['/', ':', '|', '#', '@', '-'] {
            assert!(
                store
                    .is_valid_new_delimiter(delimiter)
                    .expect("should query"),
                "empty store must accept '{delimiter}'"
            );
            store.set_new_delimiter(delimiter).expect("should switch");
            assert_eq!(store.name_delimiter(), delimiter);

            assert!(!store.is_valid_name(&delimiter.to_string()));
            assert!(!store.is_valid_name(&format!("a{delimiter}")));
            assert!(store.is_valid_name(&format!("a{delimiter}b")));
        }

        txn.commit().expect("should commit");
    }
}
