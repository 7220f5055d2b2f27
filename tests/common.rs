#![allow(dead_code)]

use std::path::{Path, PathBuf};

use conftree::{Store, DEFAULT_NAME_DELIMITER};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;
use tempfile::TempDir;

/// Characters used for generated names and strings; the default delimiter
/// is excluded separately where needed.
const NAME_CHARSET: &str = "!\"#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                            [\\]^_`abcdefghijklmnopqrstuvwxyz{|}~äöüß€";

pub fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("config.db")
}

/// Creates a fresh on-disk store under a new temp directory.
pub fn create_temp_store() -> (TempDir, Store) {
    let dir = TempDir::new().expect("create temp dir");
    let store =
        Store::open(store_path(&dir), true, DEFAULT_NAME_DELIMITER).expect("create store");
    (dir, store)
}

/// Opens a plain SQLite connection to a store file, bypassing the store
/// API. Used to inspect the raw schema and to seed corruption.
pub fn open_raw(path: &Path) -> Connection {
    Connection::open(path).expect("open raw connection")
}

/// Fails the test if the store's tree no longer passes the consistency
/// check. Run at the end of every mutating scenario.
pub fn assert_consistent(store: &Store) {
    store
        .check_data_consistency()
        .expect("store must stay consistent");
}

/// A deterministic generator so failures reproduce.
pub fn test_rng() -> StdRng {
    StdRng::seed_from_u64(4711)
}

/// A random single-segment name that avoids the given delimiter.
pub fn random_name(rng: &mut StdRng, delimiter: char) -> String {
    let charset: Vec<char> = NAME_CHARSET.chars().filter(|&c| c != delimiter).collect();
    let len = rng.gen_range(1..=16);
    (0..len).map(|_| charset[rng.gen_range(0..charset.len())]).collect()
}

pub fn random_blob(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut data = vec![0_u8; len];
    rng.fill(data.as_mut_slice());
    data
}
