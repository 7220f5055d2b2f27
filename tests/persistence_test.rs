//! Behavior across close/reopen: durability of values, the version gates,
//! delimiter persistence, and validation of the root row.

mod common;

use common::{create_temp_store, open_raw, random_blob, store_path, test_rng};
use conftree::{Error, Store, Value, DEFAULT_NAME_DELIMITER};
use rusqlite::params;

#[test]
fn values_survive_reopen() {
    let (dir, store) = create_temp_store();
    let mut rng = test_rng();
    let blob = random_blob(&mut rng, 4096);

    store.create("int", -42).expect("create");
    store.create("text.deep", "späße ✓").expect("create");
    store.create("blob", blob.clone()).expect("create");
    let root = store.get_revision("").expect("revision");
    drop(store);

    let store = Store::open(store_path(&dir), false, DEFAULT_NAME_DELIMITER).expect("reopen");

    assert_eq!(store.get_integer("int").expect("read"), -42);
    assert_eq!(store.get_string("text.deep").expect("read"), "späße ✓");
    assert_eq!(store.get_binary("blob").expect("read"), blob);
    // Revisions are part of the persistent state, not per-session counters.
    assert_eq!(root, store.get_revision("").expect("revision"));

    store.check_data_consistency().expect("clean after reopen");
}

#[test]
fn opening_a_missing_file_without_create_fails() {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let result = Store::open(dir.path().join("absent.db"), false, '.');
    assert!(matches!(result, Err(Error::Sqlite(_))));
}

#[test]
fn empty_blob_is_stored_as_null() {
    let (dir, store) = create_temp_store();
    store.create("empty", Vec::<u8>::new()).expect("create");
    assert_eq!(store.get_binary("empty").expect("read"), Vec::<u8>::new());
    drop(store);

    let raw = open_raw(&store_path(&dir));
    let is_null: bool = raw
        .query_row(
            "SELECT value IS NULL FROM entries WHERE name = 'empty'",
            [],
            |row| row.get(0),
        )
        .expect("inspect row");
    assert!(is_null, "empty blob must be stored as SQL NULL");
}

// =============================================================================
// Delimiter persistence
// =============================================================================

#[test]
fn the_stored_delimiter_wins_on_reopen() {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = store_path(&dir);

    let store = Store::open(&path, true, '/').expect("create with '/'");
    store.create("net/proxy", 1).expect("create");
    drop(store);

    // The caller expects '.', but the store was created with '/'.
    let store = Store::open(&path, false, '.').expect("reopen");
    assert_eq!(store.name_delimiter(), '/');
    assert!(store.exists("net/proxy").expect("query"));
    assert!(store.is_valid_name("a.b"), "'.' is an ordinary character here");
    assert!(!store.is_valid_name("a/"));
}

#[test]
fn malformed_delimiter_setting_is_rejected() {
    let (dir, store) = create_temp_store();
    drop(store);

    let raw = open_raw(&store_path(&dir));
    raw.execute(
        "UPDATE settings SET value = 'ab' WHERE name = 'NameDelimiter'",
        [],
    )
    .expect("corrupt delimiter setting");
    drop(raw);

    let result = Store::open(store_path(&dir), false, '.');
    match result {
        Err(Error::InvalidDelimiterSetting { value }) => assert_eq!(value, "ab"),
        other => panic!("expected InvalidDelimiterSetting, got {other:?}"),
    }
}

// =============================================================================
// Version gates
// =============================================================================

#[test]
fn fresh_stores_carry_the_current_version() {
    let (dir, store) = create_temp_store();
    assert_eq!(store.version(), (1, 0));
    drop(store);

    let raw = open_raw(&store_path(&dir));
    let (major, minor): (i64, i64) = raw
        .query_row(
            "SELECT (SELECT value FROM settings WHERE name = 'MajorVersion'), \
                    (SELECT value FROM settings WHERE name = 'MinorVersion')",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("read version settings");
    assert_eq!((major, minor), (1, 0));
}

#[test]
fn newer_major_versions_are_refused() {
    let (dir, store) = create_temp_store();
    drop(store);

    let raw = open_raw(&store_path(&dir));
    raw.execute(
        "UPDATE settings SET value = ?1 WHERE name = 'MajorVersion'",
        params![2_i64],
    )
    .expect("bump stored version");
    drop(raw);

    match Store::open(store_path(&dir), false, '.') {
        Err(Error::VersionNotSupported { major: 2, minor: 0 }) => {}
        other => panic!("expected VersionNotSupported, got {other:?}"),
    }
}

/// A newer minor version of the same major format stays readable.
#[test]
fn newer_minor_versions_are_accepted() {
    let (dir, store) = create_temp_store();
    store.create("kept", 5).expect("create");
    drop(store);

    let raw = open_raw(&store_path(&dir));
    raw.execute(
        "UPDATE settings SET value = ?1 WHERE name = 'MinorVersion'",
        params![9_i64],
    )
    .expect("bump minor version");
    drop(raw);

    let store = Store::open(store_path(&dir), false, '.').expect("reopen");
    assert_eq!(store.version(), (1, 9));
    assert_eq!(store.get_integer("kept").expect("read"), 5);
}

#[test]
fn partial_version_information_is_rejected() {
    let (dir, store) = create_temp_store();
    drop(store);

    let raw = open_raw(&store_path(&dir));
    raw.execute("DELETE FROM settings WHERE name = 'MinorVersion'", [])
        .expect("drop minor version");
    drop(raw);

    assert!(matches!(
        Store::open(store_path(&dir), false, '.'),
        Err(Error::InvalidConfiguration { .. })
    ));
}

// =============================================================================
// Root row validation
// =============================================================================

#[test]
fn missing_root_in_a_nonempty_tree_is_rejected() {
    let (dir, store) = create_temp_store();
    store.create("survivor", 1).expect("create");
    drop(store);

    let raw = open_raw(&store_path(&dir));
    raw.execute("DELETE FROM entries WHERE id = 0", [])
        .expect("drop root");
    drop(raw);

    assert!(matches!(
        Store::open(store_path(&dir), false, '.'),
        Err(Error::RootEntryMissing)
    ));
}

#[test]
fn tampered_root_rows_are_rejected() {
    for (column, value) in [
        ("parent", "7"),
        ("name", "'renamed'"),
        ("type", "2"),
        ("value", "5"),
    ] {
        let (dir, store) = create_temp_store();
        drop(store);

        let raw = open_raw(&store_path(&dir));
        raw.execute(
            &format!("UPDATE entries SET {column} = {value} WHERE id = 0"),
            [],
        )
        .expect("tamper with root");
        drop(raw);

        assert!(
            matches!(
                Store::open(store_path(&dir), false, '.'),
                Err(Error::InvalidRootEntry { .. })
            ),
            "tampered column {column} must be rejected"
        );
    }
}

/// The root's revision is the one root column that legitimately changes.
#[test]
fn advanced_root_revision_is_accepted() {
    let (dir, store) = create_temp_store();
    store.create("a", 1).expect("create, bumps root revision");
    let root = store.get_revision("").expect("revision");
    assert_ne!(root.revision, 0);
    drop(store);

    let store = Store::open(store_path(&dir), false, '.').expect("reopen");
    assert_eq!(store.get_revision("").expect("revision"), root);
}

// =============================================================================
// Settings table shape
// =============================================================================

#[test]
fn settings_rows_use_the_documented_keys_and_types() {
    let (dir, store) = create_temp_store();
    drop(store);

    let raw = open_raw(&store_path(&dir));
    let mut stmt = raw
        .prepare("SELECT name, typeof(value) FROM settings ORDER BY name")
        .expect("prepare");
    let rows: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("collect");

    assert_eq!(
        rows,
        vec![
            ("MajorVersion".to_string(), "integer".to_string()),
            ("MinorVersion".to_string(), "integer".to_string()),
            ("NameDelimiter".to_string(), "text".to_string()),
        ]
    );
}

#[test]
fn value_enum_reports_its_type() {
    // The public Value type is part of the persistence contract.
    assert_eq!(Value::from(1_i64).value_type(), conftree::ValueType::Integer);
    assert_eq!(Value::from("x").value_type(), conftree::ValueType::Text);
    assert_eq!(
        Value::from(vec![1_u8]).value_type(),
        conftree::ValueType::Blob
    );
}
