use std::path::{Path, PathBuf};

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionalTree};

use crate::engine::errors::EngineError;
use crate::engine::types::{
    AchievementUnlock, AnimalInstance, InventoryEntry, Pet, PlantInstance, ProductionOrder,
    Submission, ZoneProgress, INVENTORY_SCHEMA_VERSION, PET_SCHEMA_VERSION,
    PROGRESS_SCHEMA_VERSION, SUBMISSION_SCHEMA_VERSION, TIMER_SCHEMA_VERSION,
    UNLOCK_SCHEMA_VERSION,
};

const TREE_INVENTORY: &str = "growquest_inventory";
const TREE_TIMERS: &str = "growquest_timers";
const TREE_PETS: &str = "growquest_pets";
const TREE_PROGRESS: &str = "growquest_progress";
const TREE_UNLOCKS: &str = "growquest_unlocks";
const TREE_SUBMISSIONS: &str = "growquest_submissions";

/// Result type used inside sled transaction closures.
pub(crate) type TxResult<T> = Result<T, ConflictableTransactionError<EngineError>>;

/// Abort the surrounding transaction with a domain error.
pub(crate) fn tx_abort<T>(err: EngineError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

/// Lift a plain engine result (catalog lookups, validation) into a transaction.
pub(crate) fn tx_try<T>(result: Result<T, EngineError>) -> TxResult<T> {
    result.map_err(ConflictableTransactionError::Abort)
}

/// Records persisted by the store carry a schema version checked on every read.
pub trait Versioned {
    const ENTITY: &'static str;
    const VERSION: u8;
    fn schema_version(&self) -> u8;
}

macro_rules! versioned {
    ($ty:ty, $entity:literal, $version:expr) => {
        impl Versioned for $ty {
            const ENTITY: &'static str = $entity;
            const VERSION: u8 = $version;
            fn schema_version(&self) -> u8 {
                self.schema_version
            }
        }
    };
}

versioned!(InventoryEntry, "inventory", INVENTORY_SCHEMA_VERSION);
versioned!(PlantInstance, "plant", TIMER_SCHEMA_VERSION);
versioned!(AnimalInstance, "animal", TIMER_SCHEMA_VERSION);
versioned!(ProductionOrder, "production_order", TIMER_SCHEMA_VERSION);
versioned!(Pet, "pet", PET_SCHEMA_VERSION);
versioned!(ZoneProgress, "zone_progress", PROGRESS_SCHEMA_VERSION);
versioned!(AchievementUnlock, "achievement_unlock", UNLOCK_SCHEMA_VERSION);
versioned!(Submission, "submission", SUBMISSION_SCHEMA_VERSION);

/// Records addressed by owner and id. A record read back must carry the
/// identity its key was built from; anything else is treated as absent.
pub trait Owned {
    fn owner(&self) -> &str;
    fn record_id(&self) -> &str;

    fn belongs_to(&self, user_id: &str, record_id: &str) -> bool {
        self.owner() == user_id && self.record_id() == record_id
    }
}

macro_rules! owned {
    ($ty:ty, $id:ident) => {
        impl Owned for $ty {
            fn owner(&self) -> &str {
                &self.user_id
            }
            fn record_id(&self) -> &str {
                &self.$id
            }
        }
    };
}

owned!(InventoryEntry, item_id);
owned!(PlantInstance, id);
owned!(AnimalInstance, id);
owned!(ProductionOrder, id);
owned!(Pet, id);
owned!(ZoneProgress, zone_id);
owned!(AchievementUnlock, achievement_id);

fn owned_match<T: Owned>(record: T, user_id: &str, record_id: &str) -> Option<T> {
    if record.belongs_to(user_id, record_id) {
        Some(record)
    } else {
        warn!(
            "store: record at {}/{} belongs to {}/{}; ignoring",
            user_id,
            record_id,
            record.owner(),
            record.record_id()
        );
        None
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, EngineError> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned + Versioned>(bytes: &[u8]) -> Result<T, EngineError> {
    let record: T = bincode::deserialize(bytes)?;
    if record.schema_version() != T::VERSION {
        return Err(EngineError::SchemaMismatch {
            entity: T::ENTITY,
            expected: T::VERSION,
            found: record.schema_version(),
        });
    }
    Ok(record)
}

/// Read and decode a record inside a transaction.
pub(crate) fn tx_get<T: DeserializeOwned + Versioned>(
    tree: &TransactionalTree,
    key: &[u8],
) -> TxResult<Option<T>> {
    match tree.get(key)? {
        Some(bytes) => match decode(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => tx_abort(e),
        },
        None => Ok(None),
    }
}

/// Read a user-owned record inside a transaction, ignoring a row whose
/// decoded owner or id differs from the ones requested.
pub(crate) fn tx_get_owned<T: DeserializeOwned + Versioned + Owned>(
    tree: &TransactionalTree,
    key: &[u8],
    user_id: &str,
    record_id: &str,
) -> TxResult<Option<T>> {
    Ok(tx_get::<T>(tree, key)?.and_then(|record| owned_match(record, user_id, record_id)))
}

/// Encode and write a record inside a transaction.
pub(crate) fn tx_put<T: Serialize>(tree: &TransactionalTree, key: &[u8], value: &T) -> TxResult<()> {
    match encode(value) {
        Ok(bytes) => {
            tree.insert(key, bytes)?;
            Ok(())
        }
        Err(e) => tx_abort(e),
    }
}

/// Read a plain string pointer (slot and index entries) inside a transaction.
pub(crate) fn tx_get_pointer(tree: &TransactionalTree, key: &[u8]) -> TxResult<Option<String>> {
    Ok(tree
        .get(key)?
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
}

/// Keys are `kind` followed by `|<len>:<component>` per component, so ids may
/// contain any character without two (user, id) pairs sharing a key.
pub(crate) mod keys {
    fn compose(kind: &str, parts: &[&str]) -> Vec<u8> {
        let mut key = String::from(kind);
        for part in parts {
            key.push_str(&format!("|{}:{}", part.len(), part));
        }
        key.into_bytes()
    }

    /// Prefix shared by every `kind` key owned by `user_id`.
    fn owned_prefix(kind: &str, user_id: &str) -> Vec<u8> {
        let mut prefix = compose(kind, &[user_id]);
        prefix.push(b'|');
        prefix
    }

    pub fn inventory(user_id: &str, item_id: &str) -> Vec<u8> {
        compose("inv", &[user_id, item_id])
    }

    pub fn inventory_prefix(user_id: &str) -> Vec<u8> {
        owned_prefix("inv", user_id)
    }

    pub fn plant(user_id: &str, plant_id: &str) -> Vec<u8> {
        compose("plant", &[user_id, plant_id])
    }

    pub fn animal(user_id: &str, animal_id: &str) -> Vec<u8> {
        compose("animal", &[user_id, animal_id])
    }

    pub fn order(user_id: &str, order_id: &str) -> Vec<u8> {
        compose("order", &[user_id, order_id])
    }

    pub fn timer_prefix(kind: &str, user_id: &str) -> Vec<u8> {
        owned_prefix(kind, user_id)
    }

    /// Garden slots hold plants, workshop slots hold production orders.
    pub fn slot(area: &str, user_id: &str, zone_id: &str, slot_index: u32) -> Vec<u8> {
        compose("slot", &[area, user_id, zone_id, &slot_index.to_string()])
    }

    pub fn pet(user_id: &str, pet_id: &str) -> Vec<u8> {
        compose("pet", &[user_id, pet_id])
    }

    pub fn pet_prefix(user_id: &str) -> Vec<u8> {
        owned_prefix("pet", user_id)
    }

    pub fn current_pet(user_id: &str) -> Vec<u8> {
        compose("current", &[user_id])
    }

    pub fn progress(user_id: &str, zone_id: &str) -> Vec<u8> {
        compose("progress", &[user_id, zone_id])
    }

    pub fn progress_prefix(user_id: &str) -> Vec<u8> {
        owned_prefix("progress", user_id)
    }

    pub fn unlock(user_id: &str, achievement_id: &str) -> Vec<u8> {
        compose("unlock", &[user_id, achievement_id])
    }

    pub fn unlock_prefix(user_id: &str) -> Vec<u8> {
        owned_prefix("unlock", user_id)
    }

    pub fn submission(submission_id: &str) -> Vec<u8> {
        compose("submission", &[submission_id])
    }

    /// Index entry whose value is the submission id.
    pub fn user_submission(user_id: &str, submission_id: &str) -> Vec<u8> {
        compose("by_user", &[user_id, submission_id])
    }

    pub fn user_submission_prefix(user_id: &str) -> Vec<u8> {
        owned_prefix("by_user", user_id)
    }
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct EngineStoreBuilder {
    path: PathBuf,
    temporary: bool,
}

impl EngineStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: false,
        }
    }

    /// Remove the database files when the store is dropped.
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn open(self) -> Result<EngineStore, EngineError> {
        std::fs::create_dir_all(&self.path)?;
        let db = sled::Config::new()
            .path(&self.path)
            .temporary(self.temporary)
            .open()?;
        EngineStore::from_db(db)
    }
}

/// Per-tree record counts, reported by the `status` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub inventory: usize,
    pub timers: usize,
    pub pets: usize,
    pub progress: usize,
    pub unlocks: usize,
    pub submissions: usize,
}

/// Sled-backed persistence for every aggregate the engine owns.
///
/// Each aggregate family lives in its own tree so that units of work can lock
/// exactly the trees they touch via sled's multi-tree transactions.
pub struct EngineStore {
    _db: sled::Db,
    pub(crate) inventory: sled::Tree,
    pub(crate) timers: sled::Tree,
    pub(crate) pets: sled::Tree,
    pub(crate) progress: sled::Tree,
    pub(crate) unlocks: sled::Tree,
    pub(crate) submissions: sled::Tree,
}

impl EngineStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        EngineStoreBuilder::new(path.as_ref()).open()
    }

    fn from_db(db: sled::Db) -> Result<Self, EngineError> {
        Ok(Self {
            inventory: db.open_tree(TREE_INVENTORY)?,
            timers: db.open_tree(TREE_TIMERS)?,
            pets: db.open_tree(TREE_PETS)?,
            progress: db.open_tree(TREE_PROGRESS)?,
            unlocks: db.open_tree(TREE_UNLOCKS)?,
            submissions: db.open_tree(TREE_SUBMISSIONS)?,
            _db: db,
        })
    }

    /// Flush every tree after a committed unit of work.
    pub fn flush(&self) -> Result<(), EngineError> {
        for tree in [
            &self.inventory,
            &self.timers,
            &self.pets,
            &self.progress,
            &self.unlocks,
            &self.submissions,
        ] {
            tree.flush()?;
        }
        Ok(())
    }

    fn get<T: DeserializeOwned + Versioned>(
        tree: &sled::Tree,
        key: &[u8],
    ) -> Result<Option<T>, EngineError> {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_owned<T: DeserializeOwned + Versioned + Owned>(
        tree: &sled::Tree,
        key: &[u8],
        user_id: &str,
        record_id: &str,
    ) -> Result<Option<T>, EngineError> {
        Ok(Self::get::<T>(tree, key)?.and_then(|record| owned_match(record, user_id, record_id)))
    }

    fn scan<T: DeserializeOwned + Versioned>(
        tree: &sled::Tree,
        prefix: &[u8],
    ) -> Result<Vec<T>, EngineError> {
        tree.scan_prefix(prefix)
            .map(|entry| {
                entry
                    .map_err(EngineError::from)
                    .and_then(|(_key, value)| decode(&value))
            })
            .collect()
    }

    pub fn get_inventory_entry(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Option<InventoryEntry>, EngineError> {
        Self::get_owned(
            &self.inventory,
            &keys::inventory(user_id, item_id),
            user_id,
            item_id,
        )
    }

    pub fn list_inventory(&self, user_id: &str) -> Result<Vec<InventoryEntry>, EngineError> {
        let mut entries: Vec<InventoryEntry> =
            Self::scan(&self.inventory, &keys::inventory_prefix(user_id))?;
        entries.retain(|e| e.user_id == user_id);
        Ok(entries)
    }

    pub fn list_plants(&self, user_id: &str) -> Result<Vec<PlantInstance>, EngineError> {
        let mut plants: Vec<PlantInstance> =
            Self::scan(&self.timers, &keys::timer_prefix("plant", user_id))?;
        plants.retain(|p| p.user_id == user_id);
        Ok(plants)
    }

    pub fn list_animals(&self, user_id: &str) -> Result<Vec<AnimalInstance>, EngineError> {
        let mut animals: Vec<AnimalInstance> =
            Self::scan(&self.timers, &keys::timer_prefix("animal", user_id))?;
        animals.retain(|a| a.user_id == user_id);
        Ok(animals)
    }

    pub fn list_orders(&self, user_id: &str) -> Result<Vec<ProductionOrder>, EngineError> {
        let mut orders: Vec<ProductionOrder> =
            Self::scan(&self.timers, &keys::timer_prefix("order", user_id))?;
        orders.retain(|o| o.user_id == user_id);
        Ok(orders)
    }

    /// Id of the user's pet that has not run away, if any.
    pub fn current_pet_id(&self, user_id: &str) -> Result<Option<String>, EngineError> {
        Ok(self
            .pets
            .get(keys::current_pet(user_id))?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn get_pet(&self, user_id: &str, pet_id: &str) -> Result<Pet, EngineError> {
        Self::get_owned(&self.pets, &keys::pet(user_id, pet_id), user_id, pet_id)?
            .ok_or_else(|| EngineError::NotFound(format!("pet: {}", pet_id)))
    }

    /// Every pet the user ever had, run-away ones included, oldest first.
    pub fn list_pets(&self, user_id: &str) -> Result<Vec<Pet>, EngineError> {
        let mut pets: Vec<Pet> = Self::scan(&self.pets, &keys::pet_prefix(user_id))?;
        pets.retain(|p| p.user_id == user_id);
        pets.sort_by_key(|p| p.created_at);
        Ok(pets)
    }

    pub fn get_progress(
        &self,
        user_id: &str,
        zone_id: &str,
    ) -> Result<Option<ZoneProgress>, EngineError> {
        Self::get_owned(
            &self.progress,
            &keys::progress(user_id, zone_id),
            user_id,
            zone_id,
        )
    }

    pub fn list_progress(&self, user_id: &str) -> Result<Vec<ZoneProgress>, EngineError> {
        let mut progress: Vec<ZoneProgress> =
            Self::scan(&self.progress, &keys::progress_prefix(user_id))?;
        progress.retain(|p| p.user_id == user_id);
        Ok(progress)
    }

    pub fn get_unlock(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> Result<Option<AchievementUnlock>, EngineError> {
        Self::get_owned(
            &self.unlocks,
            &keys::unlock(user_id, achievement_id),
            user_id,
            achievement_id,
        )
    }

    pub fn list_unlocks(&self, user_id: &str) -> Result<Vec<AchievementUnlock>, EngineError> {
        let mut unlocks: Vec<AchievementUnlock> =
            Self::scan(&self.unlocks, &keys::unlock_prefix(user_id))?;
        unlocks.retain(|u| u.user_id == user_id);
        unlocks.sort_by_key(|u| u.unlocked_at);
        Ok(unlocks)
    }

    pub fn get_submission(&self, submission_id: &str) -> Result<Submission, EngineError> {
        Self::get(&self.submissions, &keys::submission(submission_id))?
            .ok_or_else(|| EngineError::NotFound(format!("submission: {}", submission_id)))
    }

    pub fn list_submissions(&self, user_id: &str) -> Result<Vec<Submission>, EngineError> {
        let mut submissions = Vec::new();
        for entry in self
            .submissions
            .scan_prefix(keys::user_submission_prefix(user_id))
        {
            let (_key, value) = entry?;
            let submission_id = String::from_utf8_lossy(&value);
            let submission = self.get_submission(&submission_id)?;
            if submission.user_id == user_id {
                submissions.push(submission);
            }
        }
        submissions.sort_by_key(|s| s.submitted_at);
        Ok(submissions)
    }

    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            inventory: self.inventory.len(),
            timers: self.timers.len(),
            pets: self.pets.len(),
            progress: self.progress.len(),
            unlocks: self.unlocks.len(),
            submissions: self.submissions.len(),
        }
    }
}
