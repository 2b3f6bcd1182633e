//! Pet vitality state machine.
//!
//! A pet is `Alive` until any stat decays to zero or it goes `run_away_days`
//! without care, after which it is `RanAway` forever. Stats are stored as of
//! their own action timestamp and decay one point per whole hour since then.
//! Plain reads derive the decayed values without writing; only the run-away
//! transition and explicit care actions persist.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::Serialize;
use sled::transaction::{Transactional, TransactionalTree};

use crate::config::PetConfig;
use crate::engine::errors::EngineError;
use crate::engine::inventory::remove_in;
use crate::engine::storage::{keys, tx_abort, tx_get_owned, tx_get_pointer, tx_put, TxResult};
use crate::engine::types::{CareAction, Pet};
use crate::engine::Engine;
use crate::metrics;

/// Stats of a pet derived at a point in time.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PetVitality {
    pub hunger: u32,
    pub thirst: u32,
    pub happiness: u32,
    pub runs_away: bool,
}

/// A pet record together with its vitality at evaluation time.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PetView {
    pub pet: Pet,
    pub vitality: PetVitality,
}

fn decayed(base: u32, since: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let hours = (now - since).num_hours().max(0);
    let hours = u32::try_from(hours).unwrap_or(u32::MAX);
    base.saturating_sub(hours)
}

impl PetVitality {
    /// Pure decay evaluation. Each stat decays from its own timestamp.
    pub fn evaluate(pet: &Pet, now: DateTime<Utc>, rules: &PetConfig) -> Self {
        if pet.has_run_away() {
            return Self {
                hunger: pet.hunger,
                thirst: pet.thirst,
                happiness: pet.happiness,
                runs_away: true,
            };
        }
        let hunger = decayed(pet.hunger, pet.last_fed_at, now);
        let thirst = decayed(pet.thirst, pet.last_watered_at, now);
        let happiness = decayed(pet.happiness, pet.last_played_at, now);
        let neglected = now - pet.last_interaction() >= Duration::days(rules.run_away_days);
        Self {
            hunger,
            thirst,
            happiness,
            runs_away: hunger == 0 || thirst == 0 || happiness == 0 || neglected,
        }
    }
}

fn view(pet: Pet, now: DateTime<Utc>, rules: &PetConfig) -> PetView {
    let vitality = PetVitality::evaluate(&pet, now, rules);
    PetView { pet, vitality }
}

fn load_current(pets: &TransactionalTree, user_id: &str) -> TxResult<Pet> {
    let Some(pet_id) = tx_get_pointer(pets, &keys::current_pet(user_id))? else {
        return tx_abort(EngineError::NotFound(format!("pet for user {}", user_id)));
    };
    match tx_get_owned::<Pet>(pets, &keys::pet(user_id, &pet_id), user_id, &pet_id)? {
        Some(pet) => Ok(pet),
        None => tx_abort(EngineError::NotFound(format!("pet: {}", pet_id))),
    }
}

/// Set one stat to `value` as of `now`.
fn restore(pet: &mut Pet, action: CareAction, value: u32, now: DateTime<Utc>) {
    match action {
        CareAction::Feed => {
            pet.hunger = value;
            pet.last_fed_at = now;
        }
        CareAction::Water => {
            pet.thirst = value;
            pet.last_watered_at = now;
        }
        CareAction::Play => {
            pet.happiness = value;
            pet.last_played_at = now;
        }
    }
}

/// The user's current pet with derived stats, without persisting or notifying.
pub fn pet_vitality(
    engine: &Engine,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<PetView>, EngineError> {
    let Some(pet_id) = engine.store.current_pet_id(user_id)? else {
        return Ok(None);
    };
    let pet = engine.store.get_pet(user_id, &pet_id)?;
    Ok(Some(view(pet, now, &engine.pet_rules)))
}

/// Evaluate the current pet's decay and persist a run-away transition.
///
/// A pet whose derived state says it runs away is marked `ran_away_at = now`,
/// dropped from the current-pet index and reported as `pet:ran_away`; the call
/// then returns `None`. A pet still at home is returned without notifying.
fn settle(
    engine: &Engine,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<PetView>, EngineError> {
    let Some(current) = pet_vitality(engine, user_id, now)? else {
        return Ok(None);
    };
    if !current.vitality.runs_away {
        return Ok(Some(current));
    }

    let rules = &engine.pet_rules;
    let ran_away = engine
        .store
        .pets
        .transaction(|pets| -> TxResult<Option<PetView>> {
            let Some(pet_id) = tx_get_pointer(pets, &keys::current_pet(user_id))? else {
                return Ok(None);
            };
            let key = keys::pet(user_id, &pet_id);
            let Some(mut pet) = tx_get_owned::<Pet>(pets, &key, user_id, &pet_id)? else {
                return Ok(None);
            };
            let vitality = PetVitality::evaluate(&pet, now, rules);
            if !vitality.runs_away {
                return Ok(None);
            }
            pet.hunger = vitality.hunger;
            pet.thirst = vitality.thirst;
            pet.happiness = vitality.happiness;
            pet.ran_away_at = Some(now);
            tx_put(pets, &key, &pet)?;
            pets.remove(keys::current_pet(user_id))?;
            Ok(Some(PetView { pet, vitality }))
        })?;

    if let Some(gone) = ran_away {
        engine.store.flush()?;
        metrics::inc_pets_ran_away();
        info!("pet: {} ({}) ran away from {}", gone.pet.name, gone.pet.id, user_id);
        engine.notify(user_id, "pet", "ran_away", &gone);
    }
    Ok(None)
}

/// Read the current pet with decay applied.
///
/// A run-away is persisted and reported as `pet:ran_away`, and the call
/// returns `None`. Otherwise the derived stats go out as `pet:updated`.
pub fn current_pet(
    engine: &Engine,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<PetView>, EngineError> {
    let current = settle(engine, user_id, now)?;
    if let Some(view) = &current {
        debug!(
            "pet: {} hunger={} thirst={} happiness={}",
            view.pet.id, view.vitality.hunger, view.vitality.thirst, view.vitality.happiness
        );
        engine.notify(user_id, "pet", "updated", view);
    }
    Ok(current)
}

/// Adopt a new pet. Fails with `Conflict` while the user still has one.
pub fn create_pet(
    engine: &Engine,
    user_id: &str,
    name: &str,
    pet_type: &str,
    now: DateTime<Utc>,
) -> Result<PetView, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidInput("pet name is empty".to_string()));
    }
    // A neglected pet must be allowed to leave before the check below.
    settle(engine, user_id, now)?;

    let rules = &engine.pet_rules;
    let pet = Pet::new(user_id, name, pet_type, rules.initial_stat, now);
    engine.store.pets.transaction(|pets| -> TxResult<()> {
        let current_key = keys::current_pet(user_id);
        if let Some(existing) = tx_get_pointer(pets, &current_key)? {
            return tx_abort(EngineError::Conflict(format!(
                "user {} already has pet {}",
                user_id, existing
            )));
        }
        tx_put(pets, &keys::pet(user_id, &pet.id), &pet)?;
        pets.insert(current_key, pet.id.as_bytes())?;
        Ok(())
    })?;
    engine.store.flush()?;

    info!("pet: {} adopted {} the {}", user_id, pet.name, pet.pet_type);
    let created = view(pet, now, rules);
    engine.notify(user_id, "pet", "created", &created);
    Ok(created)
}

/// Apply decay, then the action's bonus, and restart that stat's clock.
pub fn care(
    engine: &Engine,
    user_id: &str,
    action: CareAction,
    now: DateTime<Utc>,
) -> Result<PetView, EngineError> {
    if settle(engine, user_id, now)?.is_none() {
        return Err(EngineError::NotFound(format!("pet for user {}", user_id)));
    }

    let rules = &engine.pet_rules;
    let pet = engine.store.pets.transaction(|pets| -> TxResult<Pet> {
        let mut pet = load_current(pets, user_id)?;
        let vitality = PetVitality::evaluate(&pet, now, rules);
        if vitality.runs_away {
            return tx_abort(EngineError::NotFound(format!("pet for user {}", user_id)));
        }
        let (current, bonus) = match action {
            CareAction::Feed => (vitality.hunger, rules.feed_bonus),
            CareAction::Water => (vitality.thirst, rules.water_bonus),
            CareAction::Play => (vitality.happiness, rules.play_bonus),
        };
        restore(
            &mut pet,
            action,
            current.saturating_add(bonus).min(rules.max_stat),
            now,
        );
        tx_put(pets, &keys::pet(user_id, &pet.id), &pet)?;
        Ok(pet)
    })?;
    engine.store.flush()?;

    let cared = view(pet, now, rules);
    engine.notify(user_id, "pet", action.event_verb(), &cared);
    Ok(cared)
}

pub fn feed_pet(engine: &Engine, user_id: &str, now: DateTime<Utc>) -> Result<PetView, EngineError> {
    care(engine, user_id, CareAction::Feed, now)
}

pub fn water_pet(engine: &Engine, user_id: &str, now: DateTime<Utc>) -> Result<PetView, EngineError> {
    care(engine, user_id, CareAction::Water, now)
}

pub fn play_with_pet(
    engine: &Engine,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<PetView, EngineError> {
    care(engine, user_id, CareAction::Play, now)
}

/// Give the current pet one consumable from inventory.
///
/// Each stat with a non-zero delta is decayed, raised by the delta (capped)
/// and has its clock restarted, exactly like the matching care action.
/// Stats the item does not touch keep decaying from their old timestamps.
pub fn use_item_on_pet(
    engine: &Engine,
    user_id: &str,
    item_id: &str,
    now: DateTime<Utc>,
) -> Result<PetView, EngineError> {
    let consumable = engine.catalog.consumable(item_id)?;
    if settle(engine, user_id, now)?.is_none() {
        return Err(EngineError::NotFound(format!("pet for user {}", user_id)));
    }

    let rules = &engine.pet_rules;
    let pet = (&engine.store.inventory, &engine.store.pets).transaction(
        |(inventory, pets)| -> TxResult<Pet> {
            let mut pet = load_current(pets, user_id)?;
            let vitality = PetVitality::evaluate(&pet, now, rules);
            if vitality.runs_away {
                return tx_abort(EngineError::NotFound(format!("pet for user {}", user_id)));
            }
            remove_in(inventory, user_id, item_id, 1, now)?;
            for (action, current, delta) in [
                (CareAction::Feed, vitality.hunger, consumable.hunger),
                (CareAction::Water, vitality.thirst, consumable.thirst),
                (CareAction::Play, vitality.happiness, consumable.happiness),
            ] {
                if delta > 0 {
                    let value = current.saturating_add(delta).min(rules.max_stat);
                    restore(&mut pet, action, value, now);
                }
            }
            tx_put(pets, &keys::pet(user_id, &pet.id), &pet)?;
            Ok(pet)
        },
    )?;
    engine.store.flush()?;

    info!("pet: {} gave {} to {}", user_id, item_id, pet.id);
    let used = view(pet, now, rules);
    engine.notify(user_id, "pet", "item_used", &used);
    Ok(used)
}

/// Every pet the user has had, oldest first.
pub fn pet_history(engine: &Engine, user_id: &str) -> Result<Vec<Pet>, EngineError> {
    engine.store.list_pets(user_id)
}
