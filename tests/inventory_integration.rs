/// Integration tests for the inventory ledger.
/// Covers quantity round trips, row deletion at zero and persistence across reopen.
mod common;

use growquest::engine::inventory::{add_item, list_inventory, quantity, remove_item};
use growquest::engine::{Catalog, Engine, EngineError, EngineStore};

#[test]
fn remove_then_add_restores_original_quantity() {
    let (_dir, engine) = common::temp_engine();
    let now = common::t0();
    for (item, start, delta) in [("wheat", 10, 3), ("egg", 4, 4), ("milk", 1, 1), ("coin", 500, 499)] {
        add_item(&engine, "alice", item, start, now).unwrap();
        remove_item(&engine, "alice", item, delta, now).unwrap();
        add_item(&engine, "alice", item, delta, now).unwrap();
        assert_eq!(quantity(&engine, "alice", item).unwrap(), start, "{}", item);
    }
}

#[test]
fn absent_and_zero_read_the_same() {
    let (_dir, engine) = common::temp_engine();
    let now = common::t0();
    assert_eq!(quantity(&engine, "alice", "carrot").unwrap(), 0);
    add_item(&engine, "alice", "carrot", 2, now).unwrap();
    remove_item(&engine, "alice", "carrot", 2, now).unwrap();
    assert_eq!(quantity(&engine, "alice", "carrot").unwrap(), 0);
    assert!(list_inventory(&engine, "alice").unwrap().is_empty());

    let err = remove_item(&engine, "alice", "carrot", 1, now).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientResources {
            required: 1,
            available: 0,
            ..
        }
    ));
}

#[test]
fn users_do_not_share_inventory() {
    let (_dir, engine) = common::temp_engine();
    let now = common::t0();
    add_item(&engine, "alice", "wheat", 5, now).unwrap();
    add_item(&engine, "bob", "wheat", 1, now).unwrap();
    assert_eq!(quantity(&engine, "alice", "wheat").unwrap(), 5);
    assert_eq!(quantity(&engine, "bob", "wheat").unwrap(), 1);
    assert_eq!(list_inventory(&engine, "bob").unwrap().len(), 1);
}

#[test]
fn inventory_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let now = common::t0();
    {
        let engine = Engine::new(EngineStore::open(dir.path()).unwrap(), Catalog::starter());
        add_item(&engine, "alice", "egg", 6, now).unwrap();
        remove_item(&engine, "alice", "egg", 2, now).unwrap();
    }
    let engine = Engine::new(EngineStore::open(dir.path()).unwrap(), Catalog::starter());
    assert_eq!(quantity(&engine, "alice", "egg").unwrap(), 4);
}

#[test]
fn errors_map_to_client_messages() {
    let (_dir, engine) = common::temp_engine();
    let err = remove_item(&engine, "alice", "wheat", 3, common::t0()).unwrap_err();
    assert_eq!(err.kind(), growquest::engine::ErrorKind::InsufficientResources);
    assert!(err.client_message().contains("wheat"));
}

#[test]
fn ids_containing_separators_stay_distinct() {
    let (_dir, engine) = common::temp_engine();
    let now = common::t0();
    add_item(&engine, "team:alice", "wheat", 5, now).unwrap();

    assert_eq!(quantity(&engine, "team", "alice:wheat").unwrap(), 0);
    assert!(matches!(
        remove_item(&engine, "team", "alice:wheat", 5, now),
        Err(EngineError::InsufficientResources { available: 0, .. })
    ));
    assert_eq!(quantity(&engine, "team:alice", "wheat").unwrap(), 5);

    add_item(&engine, "team", "alice:wheat", 2, now).unwrap();
    assert_eq!(quantity(&engine, "team:alice", "wheat").unwrap(), 5);
    assert_eq!(quantity(&engine, "team", "alice:wheat").unwrap(), 2);
    let listed = list_inventory(&engine, "team").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].item_id, "alice:wheat");
}
