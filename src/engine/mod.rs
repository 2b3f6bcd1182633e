//! Time-based progression and simulation engine.
//!
//! Nothing here ticks in the background: every elapsed-time effect (plant
//! maturity, animal production, production orders, pet decay) is derived from
//! stored timestamps and the caller's `now`. Mutations that span aggregates run
//! in one sled transaction; realtime notifications go out only after commit.

pub mod achievement;
pub mod catalog;
pub mod errors;
pub mod grading;
pub mod inventory;
pub mod pet;
pub mod progression;
pub mod realtime;
pub mod storage;
pub mod timers;
pub mod types;

use log::debug;
use serde::Serialize;

use crate::config::{Config, PetConfig, ProgressionConfig};

pub use catalog::Catalog;
pub use errors::{EngineError, ErrorKind};
pub use realtime::{RealtimeError, RealtimeEvent, RealtimeHub, SessionHandle};
pub use storage::{EngineStore, EngineStoreBuilder};
pub use types::*;

/// Everything an engine operation needs: the store, the read-only catalog, the
/// realtime hub and the configured game rules.
pub struct Engine {
    pub store: EngineStore,
    pub catalog: Catalog,
    pub realtime: RealtimeHub,
    pub pet_rules: PetConfig,
    pub progression_rules: ProgressionConfig,
}

impl Engine {
    pub fn new(store: EngineStore, catalog: Catalog) -> Self {
        Self {
            store,
            catalog,
            realtime: RealtimeHub::default(),
            pet_rules: PetConfig::default(),
            progression_rules: ProgressionConfig::default(),
        }
    }

    /// Open the configured store and catalog.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let store = EngineStore::open(&config.storage.data_dir)?;
        let catalog = match &config.storage.catalog_file {
            Some(path) => Catalog::load_json(path)?,
            None => Catalog::starter(),
        };
        Ok(Self::new(store, catalog)
            .with_realtime(RealtimeHub::new(config.realtime.max_sessions_per_user))
            .with_pet_rules(config.pet.clone())
            .with_progression_rules(config.progression.clone()))
    }

    pub fn with_realtime(mut self, realtime: RealtimeHub) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn with_pet_rules(mut self, rules: PetConfig) -> Self {
        self.pet_rules = rules;
        self
    }

    pub fn with_progression_rules(mut self, rules: ProgressionConfig) -> Self {
        self.progression_rules = rules;
        self
    }

    /// Post-commit push of `{entity}:{verb}` to the user's room.
    pub(crate) fn notify<T: Serialize>(&self, user_id: &str, entity: &str, verb: &str, payload: &T) {
        let event = RealtimeEvent::new(entity, verb, payload);
        let name = event.name.clone();
        let delivered = self.realtime.emit(user_id, event);
        debug!("{} -> {} ({} session(s))", name, user_id, delivered);
    }
}
