//! # Transactions and Savepoints
//!
//! Every store operation runs inside a transaction. At most one underlying
//! SQLite transaction is active per store instance; scopes share it:
//!
//! ```text
//! Idle ──first reader──► Reader ──more readers──► (join, share handle)
//!   │                      │
//!   │                      └──writer request──► InvalidTransaction
//!   │
//!   └──first writer──► Writer (BEGIN IMMEDIATE)
//!                        │
//!                        ├──nested writer──► SAVEPOINT sp_n
//!                        │                     commit  = RELEASE sp_n
//!                        │                     drop    = ROLLBACK TO + RELEASE
//!                        │
//!                        └──reader──► (join; a writer implies read access)
//! ```
//!
//! The store keeps a weak reference to the current handle; scopes keep
//! strong ones. When the last scope exits, the weak reference expires and
//! the next operation starts a fresh transaction. Readers begin `DEFERRED`
//! (lazy read locks), writers begin `IMMEDIATE` (eager write lock), so
//! writers from different instances serialize in the backing store.
//!
//! ## Failure Policy
//!
//! Dropping an uncommitted writer rolls its changes back. If that rollback
//! itself fails, the database state can no longer be reasoned about and the
//! process terminates; continuing would risk committing half a scope.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::Connection;

use crate::error::Result;
use crate::store::Store;

// =============================================================================
// Savepoint Names
// =============================================================================

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns a savepoint name unique within this process. Each nested writer
/// keeps its name for its whole lifetime (set, release and rollback must all
/// address the same savepoint).
fn next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("conftree_sp_{n}")
}

// =============================================================================
// Transaction Handle
// =============================================================================

/// The underlying SQL-level transaction, shared by every scope that joined
/// it. Owns a second reference to the connection so an open handle keeps the
/// database alive even past the store.
#[derive(Debug)]
pub(crate) struct TxnHandle {
    conn: Rc<Connection>,
    writeable: bool,
    open: Cell<bool>,
}

impl TxnHandle {
    /// Begins a new transaction: `DEFERRED` for readers, `IMMEDIATE` for
    /// writers.
    pub(crate) fn begin(conn: Rc<Connection>, writeable: bool) -> Result<Rc<Self>> {
        conn.execute_batch(if writeable {
            "BEGIN IMMEDIATE"
        } else {
            "BEGIN DEFERRED"
        })?;

        Ok(Rc::new(Self {
            conn,
            writeable,
            open: Cell::new(true),
        }))
    }

    /// Whether this transaction may write.
    pub(crate) fn writeable(&self) -> bool {
        self.writeable
    }

    /// Whether the underlying transaction is still open (neither committed
    /// nor rolled back). A handle can outlive its commit when read scopes
    /// still hold it; such a handle must not be joined.
    pub(crate) fn is_open(&self) -> bool {
        self.open.get()
    }

    /// Commits the underlying transaction.
    pub(crate) fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.open.set(false);
        Ok(())
    }

    pub(crate) fn set_savepoint(&self, name: &str) -> Result<()> {
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        Ok(())
    }

    /// Keeps the savepoint's changes and removes it from the stack.
    pub(crate) fn release_savepoint(&self, name: &str) -> Result<()> {
        self.conn.execute_batch(&format!("RELEASE SAVEPOINT {name}"))?;
        Ok(())
    }

    /// Discards the savepoint's changes and removes it from the stack.
    pub(crate) fn rollback_savepoint(&self, name: &str) -> Result<()> {
        self.conn.execute_batch(&format!(
            "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"
        ))?;
        Ok(())
    }
}

impl Drop for TxnHandle {
    fn drop(&mut self) {
        if !self.open.get() {
            return;
        }

        if let Err(err) = self.conn.execute_batch("ROLLBACK") {
            if self.writeable {
                // An uncommitted writer that cannot roll back leaves the
                // store in an unknowable state; recovery is unsafe.
                tracing::error!(error = %err, "rollback of open write transaction failed");
                std::process::abort();
            }
            tracing::warn!(error = %err, "rollback of read transaction failed");
        }
    }
}

// =============================================================================
// Read Scope
// =============================================================================

/// A read transaction scope.
///
/// Opening one pins a consistent snapshot for its lifetime; all read
/// operations issued while it is open observe the same committed state.
/// Readers nest freely and join an active writer. While only readers are
/// active, any write operation fails with
/// [`InvalidTransaction`](crate::Error::InvalidTransaction).
///
/// ```rust
/// use conftree::Store;
///
/// let store = Store::open_in_memory('.')?;
/// store.create("a", 1)?;
///
/// let snapshot = store.read_transaction()?;
/// assert_eq!(store.get_integer("a")?, 1);
/// assert!(store.set("a", 2).is_err()); // writer blocked by read scope
/// drop(snapshot);
///
/// store.set("a", 2)?;
/// # Ok::<(), conftree::Error>(())
/// ```
#[derive(Debug)]
pub struct ReadTransaction {
    _txn: Rc<TxnHandle>,
}

impl ReadTransaction {
    pub(crate) fn begin(store: &Store) -> Result<Self> {
        Ok(Self {
            _txn: store.transaction(false)?,
        })
    }
}

// =============================================================================
// Write Scope
// =============================================================================

/// A writeable transaction scope.
///
/// The outermost scope owns the `IMMEDIATE` transaction; nested scopes run
/// inside uniquely named savepoints. [`commit`](WriteTransaction::commit)
/// keeps the scope's changes (releasing the savepoint, or committing the
/// outer transaction); dropping the scope without committing discards them.
///
/// ```rust
/// use conftree::Store;
///
/// let store = Store::open_in_memory('.')?;
/// store.create("a", 0)?;
/// store.create("b", 0)?;
///
/// let outer = store.write_transaction()?;
/// store.set("a", 1)?;
/// {
///     let _inner = store.write_transaction()?;
///     store.set("b", 1)?;
///     // dropped without commit: only the inner change is rolled back
/// }
/// outer.commit()?;
///
/// assert_eq!(store.get_integer("a")?, 1);
/// assert_eq!(store.get_integer("b")?, 0);
/// # Ok::<(), conftree::Error>(())
/// ```
#[derive(Debug)]
pub struct WriteTransaction {
    txn: Rc<TxnHandle>,
    /// `Some` for a nested scope; the name stays stable for the scope's
    /// lifetime.
    savepoint: Option<String>,
    committed: bool,
}

impl WriteTransaction {
    pub(crate) fn begin(store: &Store) -> Result<Self> {
        let txn = store.transaction(true)?;

        // If other scopes already hold the handle, this scope is nested and
        // isolates itself with a savepoint.
        let savepoint = if Rc::strong_count(&txn) > 1 {
            let name = next_savepoint_name();
            txn.set_savepoint(&name)?;
            Some(name)
        } else {
            None
        };

        Ok(Self {
            txn,
            savepoint,
            committed: false,
        })
    }

    /// Makes this scope's changes permanent: releases the savepoint of a
    /// nested scope, or commits the underlying transaction for the
    /// outermost one.
    pub fn commit(mut self) -> Result<()> {
        match &self.savepoint {
            Some(name) => self.txn.release_savepoint(name)?,
            None => self.txn.commit()?,
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for WriteTransaction {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        if let Some(name) = &self.savepoint {
            if let Err(err) = self.txn.rollback_savepoint(name) {
                tracing::error!(error = %err, savepoint = %name, "savepoint rollback failed");
                std::process::abort();
            }
        }
        // Outermost scope: the handle itself rolls back once the last
        // shared reference drops.
    }
}

// =============================================================================
// Tests
// =============================================================================
