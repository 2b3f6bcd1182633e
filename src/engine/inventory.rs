/// Inventory ledger: per-user, per-item quantity counters.
///
/// The `*_in` functions operate on a transactional view of the inventory tree
/// so that timers, pets and grading can debit and credit items inside their own
/// unit of work. A missing row and a zero quantity mean the same thing.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::info;
use sled::transaction::TransactionalTree;

use crate::engine::errors::EngineError;
use crate::engine::storage::{keys, tx_abort, tx_get_owned, tx_put, TxResult};
use crate::engine::types::{InventoryEntry, ItemQuantity};
use crate::engine::Engine;

// ============================================================================
// Transaction-level operations
// ============================================================================

pub(crate) fn quantity_in(tree: &TransactionalTree, user_id: &str, item_id: &str) -> TxResult<u32> {
    let entry: Option<InventoryEntry> =
        tx_get_owned(tree, &keys::inventory(user_id, item_id), user_id, item_id)?;
    Ok(entry.map(|e| e.quantity).unwrap_or(0))
}

/// Upsert-increment.
pub(crate) fn add_in(
    tree: &TransactionalTree,
    user_id: &str,
    item_id: &str,
    quantity: u32,
    now: DateTime<Utc>,
) -> TxResult<InventoryEntry> {
    let key = keys::inventory(user_id, item_id);
    let mut entry = tx_get_owned::<InventoryEntry>(tree, &key, user_id, item_id)?
        .unwrap_or_else(|| InventoryEntry::new(user_id, item_id, 0, now));
    entry.quantity = match entry.quantity.checked_add(quantity) {
        Some(total) => total,
        None => {
            return tx_abort(EngineError::InvalidInput(format!(
                "quantity overflow for {}",
                item_id
            )))
        }
    };
    entry.updated_at = now;
    tx_put(tree, &key, &entry)?;
    Ok(entry)
}

/// Decrement, deleting the row when it reaches zero. Aborts with
/// `InsufficientResources` when the row holds less than `quantity`.
pub(crate) fn remove_in(
    tree: &TransactionalTree,
    user_id: &str,
    item_id: &str,
    quantity: u32,
    now: DateTime<Utc>,
) -> TxResult<InventoryEntry> {
    let key = keys::inventory(user_id, item_id);
    let mut entry = tx_get_owned::<InventoryEntry>(tree, &key, user_id, item_id)?
        .unwrap_or_else(|| InventoryEntry::new(user_id, item_id, 0, now));
    if entry.quantity < quantity {
        return tx_abort(EngineError::InsufficientResources {
            item_id: item_id.to_string(),
            required: quantity,
            available: entry.quantity,
        });
    }
    entry.quantity -= quantity;
    entry.updated_at = now;
    if entry.quantity == 0 {
        tree.remove(key)?;
    } else {
        tx_put(tree, &key, &entry)?;
    }
    Ok(entry)
}

/// Sum duplicate item ids so a recipe listing an item twice is checked against
/// its combined requirement.
fn combine(items: &[ItemQuantity]) -> BTreeMap<&str, u32> {
    let mut combined: BTreeMap<&str, u32> = BTreeMap::new();
    for item in items {
        let slot = combined.entry(item.item_id.as_str()).or_insert(0);
        *slot = slot.saturating_add(item.quantity);
    }
    combined
}

/// Verify every requirement first, then debit all of them.
pub(crate) fn debit_all_in(
    tree: &TransactionalTree,
    user_id: &str,
    items: &[ItemQuantity],
    now: DateTime<Utc>,
) -> TxResult<()> {
    let combined = combine(items);
    for (item_id, required) in &combined {
        let available = quantity_in(tree, user_id, item_id)?;
        if available < *required {
            return tx_abort(EngineError::InsufficientResources {
                item_id: item_id.to_string(),
                required: *required,
                available,
            });
        }
    }
    for (item_id, required) in combined {
        remove_in(tree, user_id, item_id, required, now)?;
    }
    Ok(())
}

pub(crate) fn credit_all_in(
    tree: &TransactionalTree,
    user_id: &str,
    items: &[ItemQuantity],
    now: DateTime<Utc>,
) -> TxResult<()> {
    for (item_id, quantity) in combine(items) {
        add_in(tree, user_id, item_id, quantity, now)?;
    }
    Ok(())
}

// ============================================================================
// Ledger operations
// ============================================================================

fn require_positive(quantity: u32) -> Result<(), EngineError> {
    if quantity == 0 {
        return Err(EngineError::InvalidInput(
            "quantity must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Current quantity of an item; absent rows read as zero.
pub fn quantity(engine: &Engine, user_id: &str, item_id: &str) -> Result<u32, EngineError> {
    Ok(engine
        .store
        .get_inventory_entry(user_id, item_id)?
        .map(|e| e.quantity)
        .unwrap_or(0))
}

pub fn has_items(engine: &Engine, user_id: &str, items: &[ItemQuantity]) -> Result<bool, EngineError> {
    for (item_id, required) in combine(items) {
        if quantity(engine, user_id, item_id)? < required {
            return Ok(false);
        }
    }
    Ok(true)
}

pub fn list_inventory(engine: &Engine, user_id: &str) -> Result<Vec<InventoryEntry>, EngineError> {
    engine.store.list_inventory(user_id)
}

/// Add `quantity` of an item. Emits `inventory:updated`.
pub fn add_item(
    engine: &Engine,
    user_id: &str,
    item_id: &str,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<InventoryEntry, EngineError> {
    require_positive(quantity)?;
    let entry = engine
        .store
        .inventory
        .transaction(|tree| add_in(tree, user_id, item_id, quantity, now))?;
    engine.store.flush()?;
    info!("inventory: +{} {} for {}", quantity, item_id, user_id);
    engine.notify(user_id, "inventory", "updated", &entry);
    Ok(entry)
}

/// Remove `quantity` of an item. Returns the remaining entry (quantity 0 when
/// the row was deleted). Emits `inventory:updated`.
pub fn remove_item(
    engine: &Engine,
    user_id: &str,
    item_id: &str,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<InventoryEntry, EngineError> {
    require_positive(quantity)?;
    let entry = engine
        .store
        .inventory
        .transaction(|tree| remove_in(tree, user_id, item_id, quantity, now))?;
    engine.store.flush()?;
    info!("inventory: -{} {} for {}", quantity, item_id, user_id);
    engine.notify(user_id, "inventory", "updated", &entry);
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Catalog, EngineStoreBuilder};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Engine) {
        let dir = TempDir::new().expect("tempdir");
        let store = EngineStoreBuilder::new(dir.path()).open().expect("store");
        (dir, Engine::new(store, Catalog::starter()))
    }

    #[test]
    fn add_creates_then_increments() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        add_item(&engine, "alice", "wheat", 3, now).unwrap();
        let entry = add_item(&engine, "alice", "wheat", 2, now).unwrap();
        assert_eq!(entry.quantity, 5);
        assert_eq!(quantity(&engine, "alice", "wheat").unwrap(), 5);
    }

    #[test]
    fn remove_more_than_held_fails_without_change() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        add_item(&engine, "alice", "egg", 2, now).unwrap();
        let err = remove_item(&engine, "alice", "egg", 3, now).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientResources {
                required: 3,
                available: 2,
                ..
            }
        ));
        assert_eq!(quantity(&engine, "alice", "egg").unwrap(), 2);
    }

    #[test]
    fn removing_everything_deletes_the_row() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        add_item(&engine, "alice", "milk", 1, now).unwrap();
        let entry = remove_item(&engine, "alice", "milk", 1, now).unwrap();
        assert_eq!(entry.quantity, 0);
        assert!(engine
            .store
            .get_inventory_entry("alice", "milk")
            .unwrap()
            .is_none());
        assert!(list_inventory(&engine, "alice").unwrap().is_empty());
    }

    #[test]
    fn remove_then_add_restores_quantity() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        add_item(&engine, "alice", "carrot", 7, now).unwrap();
        remove_item(&engine, "alice", "carrot", 4, now).unwrap();
        add_item(&engine, "alice", "carrot", 4, now).unwrap();
        assert_eq!(quantity(&engine, "alice", "carrot").unwrap(), 7);
    }

    #[test]
    fn zero_quantity_is_invalid() {
        let (_dir, engine) = setup();
        assert!(matches!(
            add_item(&engine, "alice", "wheat", 0, Utc::now()),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn debit_all_checks_combined_requirement() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        add_item(&engine, "alice", "wheat", 3, now).unwrap();
        let recipe = vec![ItemQuantity::new("wheat", 2), ItemQuantity::new("wheat", 2)];
        let result: Result<(), EngineError> = engine
            .store
            .inventory
            .transaction(|tree| debit_all_in(tree, "alice", &recipe, now))
            .map_err(EngineError::from);
        assert!(matches!(
            result,
            Err(EngineError::InsufficientResources { required: 4, .. })
        ));
        assert_eq!(quantity(&engine, "alice", "wheat").unwrap(), 3);
        assert!(!has_items(&engine, "alice", &recipe).unwrap());
    }
}
