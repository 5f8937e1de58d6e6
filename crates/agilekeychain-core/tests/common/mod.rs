#![allow(dead_code)]

use std::num::NonZeroU32;
use std::path::PathBuf;

use agilekeychain_core::DataSource;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

pub const FIXTURE_PASSWORD: &str = "fixture-password";
pub const SL3_KEY_ID: &str = "BE4CC37CD7C044E79B5CC1CC19A82A13";
pub const SL5_KEY_ID: &str = "98EB2E946008403280A3A8D9261018A4";
pub const FIXTURE_ITEM_ID: &str = "2E21D652E0754BD59F6B94B0323D0142";

/// Iterations for vaults created in tests.
pub const TEST_ITERATIONS: NonZeroU32 = NonZeroU32::new(50).unwrap();

/// Path of the checked-in fixture vault. Never write to it; use
/// [`fixture_copy`] for tests that modify the vault.
pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test.agilekeychain")
}

/// A writable copy of the fixture vault.
pub fn fixture_copy() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let vault = temp.child("test.agilekeychain");
    vault.create_dir_all().unwrap();
    vault.copy_from(fixture_path(), &["**/*"]).unwrap();
    let path = vault.path().to_path_buf();
    (temp, path)
}

/// A freshly initialised vault protected by `password`.
pub fn new_vault(password: &str) -> (TempDir, DataSource) {
    let temp = TempDir::new().unwrap();
    let source = DataSource::new(temp.child("new.agilekeychain").path()).with_iterations(TEST_ITERATIONS);
    source.initialise(password, &mut seeded_rng(1)).unwrap();
    (temp, source)
}

pub fn seeded_rng(seed: u64) -> ChaCha20Rng {
    ChaCha20Rng::seed_from_u64(seed)
}

/// Install a tracing subscriber honouring `RUST_LOG`; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
