//! # Error Handling
//!
//! A single error enum ([`Error`]) covers every failure mode of the store,
//! which keeps function signatures simple and lets callers match on exactly
//! the cases they care about.
//!
//! ## Error Families
//!
//! | Family | Examples | Typical response |
//! |----------|----------|------------------|
//! | Validation | `InvalidName` | Fix the caller-supplied name |
//! | Lookup | `EntryNotFound`, `SettingNotFound` | Create the entry, or treat as absent |
//! | Structure | `NameAlreadyExists`, `HasChildEntry`, `WrongValueType` | Adjust the operation |
//! | Transactions | `InvalidTransaction` | Commit or drop the read scope first |
//! | Configuration | `VersionNotSupported`, `InvalidConfiguration` | Migrate or restore the database |
//! | Backing store | `Sqlite`, `InvalidQuery`, `InvalidInsert` | Log and investigate |
//! | Consistency | `AbandonedEntry`, `InvalidEntryLinking`, ... | The on-disk tree is damaged |
//!
//! Validation and lookup errors surface to the caller directly. Backing-store
//! and consistency errors propagate out of the enclosing writer scope, whose
//! drop rolls the scope back.

use thiserror::Error;

use crate::types::ValueType;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in store operations.
///
/// Each variant is the machine-readable kind; the `#[error(...)]` string is
/// the human-readable message, embedding the offending names, ids or tags.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Input validation
    // =========================================================================
    /// A non-empty name violates the validity rules: it starts or ends with
    /// the delimiter, or contains two adjacent delimiters. The empty string
    /// is only accepted where it denotes the root (`has_child`,
    /// `get_children`, `get_revision`).
    #[error("invalid name: '{name}'")]
    InvalidName {
        /// The rejected name, verbatim.
        name: String,
    },

    // =========================================================================
    // Lookup
    // =========================================================================
    /// The named entry does not exist (or its path prefix is incomplete).
    #[error("entry not found: '{name}'")]
    EntryNotFound {
        /// The full path that failed to resolve.
        name: String,
    },

    /// A required row in the settings table is missing.
    #[error("setting not found: '{name}'")]
    SettingNotFound {
        /// The settings key.
        name: String,
    },

    // =========================================================================
    // Structure
    // =========================================================================
    /// `create` found the full path already present.
    #[error("name already exists: '{name}'")]
    NameAlreadyExists {
        /// The colliding path.
        name: String,
    },

    /// A non-recursive delete was blocked by existing children.
    #[error("failed to delete '{name}': entry has child entries")]
    HasChildEntry {
        /// The path whose deletion was refused.
        name: String,
    },

    /// A typed read did not match the entry's stored type.
    #[error("expected value type {expected} for entry '{name}' but found {actual}")]
    WrongValueType {
        /// The path that was read.
        name: String,
        /// The type the caller asked for.
        expected: ValueType,
        /// The type actually stored.
        actual: ValueType,
    },

    // =========================================================================
    // Transactions
    // =========================================================================
    /// A writeable transaction was requested while only a read transaction
    /// is active on this store instance.
    #[error("a read-only transaction is already active")]
    InvalidTransaction,

    // =========================================================================
    // Configuration
    // =========================================================================
    /// The stored configuration is incomplete or malformed (for example,
    /// only one of the two version settings is present).
    #[error("invalid store configuration: {reason}")]
    InvalidConfiguration {
        /// What exactly is wrong.
        reason: String,
    },

    /// The persisted `NameDelimiter` setting is not exactly one character.
    #[error("invalid value for the NameDelimiter setting: '{value}'")]
    InvalidDelimiterSetting {
        /// The stored setting value, verbatim.
        value: String,
    },

    /// The database was written by a newer, incompatible version.
    #[error("database version {major}.{minor} is not supported by this build")]
    VersionNotSupported {
        /// Stored major version.
        major: i64,
        /// Stored minor version.
        minor: i64,
    },

    /// A settings row holds a value of an unexpected SQL type.
    #[error("setting '{name}' has type {actual:?}, expected {expected}")]
    SettingTypeMismatch {
        /// The settings key.
        name: String,
        /// The expected SQL type, in words.
        expected: &'static str,
        /// The SQL type actually found.
        actual: rusqlite::types::Type,
    },

    // =========================================================================
    // Backing store
    // =========================================================================
    /// An error reported by SQLite itself (file locked, disk full, ...).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A query that must return rows returned none, or reported something
    /// structurally impossible.
    #[error("query failed: {reason}")]
    InvalidQuery {
        /// What the query was trying to establish.
        reason: String,
    },

    /// An insert did not affect exactly one row.
    #[error("insert failed: {reason}")]
    InvalidInsert {
        /// What the insert was trying to create.
        reason: String,
    },

    /// A new delimiter was rejected because an existing entry name
    /// contains it.
    #[error("delimiter '{delimiter}' occurs in at least one stored entry name")]
    InvalidDelimiter {
        /// The rejected delimiter character.
        delimiter: char,
    },

    // =========================================================================
    // Consistency (raised by open-time checks and check_data_consistency)
    // =========================================================================
    /// The entries table is non-empty but has no root row.
    #[error("missing root entry in non-empty entries table")]
    RootEntryMissing,

    /// More than one row claims the root id.
    #[error("found {count} root entries, expected exactly one")]
    MultipleRootEntries {
        /// Number of rows with the root id.
        count: i64,
    },

    /// The root row exists but carries unexpected data.
    #[error("root entry contains invalid data: {reason}")]
    InvalidRootEntry {
        /// Which column deviates.
        reason: String,
    },

    /// One or more stored local names contain the active delimiter.
    #[error("found entries with the name delimiter in their name, ids: {ids:?}")]
    InvalidEntryNameFound {
        /// Ids of the offending entries.
        ids: Vec<i64>,
    },

    /// An entry id occurred more than once during enumeration.
    #[error("there are multiple entries with id {id}")]
    EntryIdNotUnique {
        /// The duplicated id.
        id: i64,
    },

    /// Entries that cannot be reached from the root via parent links.
    #[error("found abandoned entries, ids: {ids:?}")]
    AbandonedEntry {
        /// Ids of the unreachable entries.
        ids: Vec<i64>,
    },

    /// Entries that were reached more than once during traversal.
    #[error("found entries with broken linking, ids: {ids:?}")]
    InvalidEntryLinking {
        /// Ids visited more than once.
        ids: Vec<i64>,
    },

    /// An entry row carries a type tag outside the recognized set.
    #[error("entry {id} has unknown value type tag {tag}")]
    UnknownEntryType {
        /// Id of the offending entry.
        id: i64,
        /// The unrecognized on-disk tag.
        tag: i64,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
