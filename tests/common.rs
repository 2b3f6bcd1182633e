//! Test utilities & fixtures.
//! Every helper returns the `TempDir` alongside the engine; keep it alive for
//! the duration of the test or the store directory disappears underneath it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use growquest::engine::{Catalog, Engine, EngineStoreBuilder};
use tempfile::TempDir;

/// Path of the catalog shipped under `data/seeds`.
#[allow(dead_code)]
pub fn shipped_catalog() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("data")
        .join("seeds")
        .join("catalog.json")
}

/// Engine on a fresh store using the starter catalog.
#[allow(dead_code)]
pub fn temp_engine() -> (TempDir, Engine) {
    temp_engine_with(Catalog::starter())
}

#[allow(dead_code)]
pub fn temp_engine_with(catalog: Catalog) -> (TempDir, Engine) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = EngineStoreBuilder::new(dir.path()).open().expect("store");
    (dir, Engine::new(store, catalog))
}

/// Fixed reference instant so elapsed-time assertions are exact.
#[allow(dead_code)]
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 8, 0, 0).unwrap()
}
