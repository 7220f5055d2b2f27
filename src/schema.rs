//! # SQLite Schema and Low-Level Database Handling
//!
//! This module owns the DDL and the raw connection: open/create flags, the
//! busy timeout, pragmas, table and index creation, and the integrity checks
//! run at open time.
//!
//! ## Table Overview
//!
//! ```text
//! settings                      entries
//! ┌──────────────┐              ┌────────────────────────────┐
//! │ name (PK)    │              │ id (PK)   ── 0 is the root │
//! │ value BLOB   │              │ parent ───► entries.id     │
//! └──────────────┘              │ revision                   │
//!                               │ name   ── local, no delim. │
//! MajorVersion                  │ type   ── 1/2/3 tag        │
//! MinorVersion                  │ value BLOB (NULL = empty)  │
//! NameDelimiter                 └────────────────────────────┘
//! ```
//!
//! The entries table forms a rooted tree under `parent`; the unique index on
//! `(name, parent)` makes every path resolve to at most one entry and is the
//! lookup path for each segment during resolution.
//!
//! ## Statement Cache
//!
//! All repeated SQL goes through the connection's prepared-statement cache
//! (`prepare_cached`), keyed by SQL text; statements return to the cache and
//! are reset when the handle drops. The cache is per connection, which for
//! this crate means per store instance.

use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use crate::error::{Error, Result};

// =============================================================================
// DDL
// =============================================================================

/// Maximum time an operation waits on the backing-store lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(15);

/// Capacity of the prepared-statement cache. The store uses a fixed set of
/// statement shapes, so this comfortably holds all of them.
const STATEMENT_CACHE_CAPACITY: usize = 64;

/// The `settings` table: a small typed key/value store for configuration
/// that must live inside the database file itself (schema version, name
/// delimiter). The value column keeps whatever SQL type was bound.
const CREATE_SETTINGS: &str = "\
CREATE TABLE IF NOT EXISTS settings (
    name  TEXT PRIMARY KEY,
    value BLOB
)";

/// The `entries` table: the persistent tree.
///
/// - `id`: entry id; `0` is reserved for the root
/// - `parent`: id of the parent entry; the root is its own parent
/// - `revision`: change-detection counter (random at insert, then +1 per
///   change at or below the entry)
/// - `name`: local name; empty only for the root, never contains the
///   delimiter
/// - `type`: value type tag (1 = Integer, 2 = Text, 3 = Blob)
/// - `value`: payload; NULL represents an empty blob
const CREATE_ENTRIES: &str = "\
CREATE TABLE IF NOT EXISTS entries (
    id       INTEGER PRIMARY KEY,
    parent   INTEGER NOT NULL,
    revision INTEGER NOT NULL,
    name     TEXT    NOT NULL,
    type     INTEGER NOT NULL,
    value    BLOB
)";

const CREATE_ENTRIES_NAME_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS entries_name ON entries (name)";

const CREATE_ENTRIES_PARENT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS entries_parent ON entries (parent)";

/// Uniqueness of `(name, parent)` is what makes paths unambiguous; segment
/// lookup during path resolution runs against this index.
const CREATE_ENTRIES_NAME_PARENT_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS entries_name_parent ON entries (name, parent)";

/// Pragmas applied to every connection before any transaction is opened.
/// `journal_mode` and `auto_vacuum` cannot change inside a transaction.
const PRAGMAS: &str = r#"
PRAGMA auto_vacuum        = FULL;
PRAGMA synchronous        = FULL;
PRAGMA foreign_keys       = TRUE;
PRAGMA encoding           = "UTF-8";
PRAGMA journal_mode       = DELETE;
PRAGMA locking_mode       = NORMAL;
PRAGMA recursive_triggers = TRUE;
PRAGMA secure_delete      = TRUE;
"#;

// =============================================================================
// Database Wrapper
// =============================================================================

/// A configured SQLite connection, shared between the store and any
/// transaction handles that outlive their scope.
///
/// The `Rc` keeps the connection alive for as long as either the store or a
/// still-open transaction handle needs it; the store itself stays
/// single-threaded (`Rc` is `!Send`).
#[derive(Debug)]
pub(crate) struct Db {
    conn: Rc<Connection>,
}

impl Db {
    /// Opens (or, with `create`, creates) a database file and applies the
    /// connection configuration: busy timeout, statement-cache capacity and
    /// pragmas. Schema creation happens separately, inside the store's
    /// open transaction.
    pub(crate) fn open(path: impl AsRef<Path>, create: bool) -> Result<Self> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if create {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        let conn = Connection::open_with_flags(path, flags)?;
        Self::configure(conn)
    }

    /// Opens a fresh in-memory database. Contents are lost when the store
    /// is dropped; useful for tests and benchmarks.
    pub(crate) fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
        conn.execute_batch(PRAGMAS)?;

        Ok(Self {
            conn: Rc::new(conn),
        })
    }

    /// Creates tables and indexes if absent. Idempotent; runs inside the
    /// store's open transaction.
    pub(crate) fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(CREATE_SETTINGS)?;
        self.conn.execute_batch(CREATE_ENTRIES)?;
        self.conn.execute_batch(CREATE_ENTRIES_NAME_INDEX)?;
        self.conn.execute_batch(CREATE_ENTRIES_PARENT_INDEX)?;
        self.conn.execute_batch(CREATE_ENTRIES_NAME_PARENT_INDEX)?;
        Ok(())
    }

    /// Runs SQLite's own integrity checks against the file.
    ///
    /// `PRAGMA integrity_check` must report `ok` and
    /// `PRAGMA foreign_key_check` must report nothing.
    pub(crate) fn run_integrity_checks(&self) -> Result<()> {
        let report: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if report != "ok" {
            return Err(Error::InvalidQuery {
                reason: format!("integrity check failed: {report}"),
            });
        }

        let mut stmt = self.conn.prepare("PRAGMA foreign_key_check")?;
        let mut rows = stmt.query([])?;
        if rows.next()?.is_some() {
            return Err(Error::InvalidQuery {
                reason: "foreign key check reported violations".to_string(),
            });
        }

        Ok(())
    }

    /// The shared connection handle.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// A second owner of the connection, for transaction handles.
    pub(crate) fn share_conn(&self) -> Rc<Connection> {
        Rc::clone(&self.conn)
    }
}

// =============================================================================
// Tests
// =============================================================================
