//! Resource timer engine: plants, animals and production orders.
//!
//! Nothing is ticked. Readiness is recomputed from stored timestamps on every
//! read, and the harvest/collect paths re-validate it inside the transaction
//! that credits outputs. Starting a timer debits its inputs in the same
//! transaction that creates the record, so a short ingredient leaves nothing
//! behind.

use chrono::{DateTime, Utc};
use log::{debug, info};
use sled::transaction::{Transactional, TransactionalTree};

use crate::engine::catalog::{AnimalDefinition, SeedDefinition};
use crate::engine::errors::EngineError;
use crate::engine::inventory::{credit_all_in, debit_all_in, remove_in};
use crate::engine::storage::{
    keys, tx_abort, tx_get_owned, tx_get_pointer, tx_put, tx_try, TxResult,
};
use crate::engine::types::{
    AnimalInstance, AnimalView, CollectOutcome, ItemQuantity, OrderView, PlantInstance, PlantView,
    ProductionOrder, Readiness, TimerView, STAT_CAP,
};
use crate::engine::Engine;

const GARDEN: &str = "garden";
const WORKSHOP: &str = "workshop";

fn require_ready(readiness: Readiness) -> TxResult<()> {
    match readiness {
        Readiness::Ready => Ok(()),
        Readiness::Pending { ready_at, .. } => tx_abort(EngineError::NotReady { ready_at }),
    }
}

fn claim_slot(
    timers: &TransactionalTree,
    area: &str,
    user_id: &str,
    zone_id: &str,
    slot_index: u32,
    record_id: &str,
) -> TxResult<()> {
    let key = keys::slot(area, user_id, zone_id, slot_index);
    if let Some(existing) = tx_get_pointer(timers, &key)? {
        return tx_abort(EngineError::Conflict(format!(
            "{} slot {}/{} is occupied by {}",
            area, zone_id, slot_index, existing
        )));
    }
    timers.insert(key, record_id.as_bytes())?;
    Ok(())
}

fn plant_readiness(seed: &SeedDefinition, plant: &PlantInstance, now: DateTime<Utc>) -> Readiness {
    Readiness::evaluate(plant.planted_at, seed.growth_seconds, now)
}

fn animal_readiness(
    definition: &AnimalDefinition,
    animal: &AnimalInstance,
    now: DateTime<Utc>,
) -> Readiness {
    Readiness::evaluate(animal.last_collected_at, definition.production_seconds, now)
}

// ============================================================================
// Plants
// ============================================================================

/// Plant one `seed_item_id` from inventory into a free garden slot.
pub fn plant_seed(
    engine: &Engine,
    user_id: &str,
    zone_id: &str,
    slot_index: u32,
    seed_item_id: &str,
    now: DateTime<Utc>,
) -> Result<PlantView, EngineError> {
    let seed = engine.catalog.seed(seed_item_id)?;
    let plant = PlantInstance::new(user_id, zone_id, slot_index, seed_item_id, now);

    (&engine.store.inventory, &engine.store.timers).transaction(
        |(inventory, timers)| -> TxResult<()> {
            claim_slot(timers, GARDEN, user_id, zone_id, slot_index, &plant.id)?;
            remove_in(inventory, user_id, seed_item_id, 1, now)?;
            tx_put(timers, &keys::plant(user_id, &plant.id), &plant)?;
            Ok(())
        },
    )?;
    engine.store.flush()?;

    info!(
        "plant: {} planted {} in {}/{}",
        user_id, seed_item_id, zone_id, slot_index
    );
    let view = TimerView {
        readiness: plant_readiness(seed, &plant, now),
        record: plant,
    };
    engine.notify(user_id, "plant", "planted", &view);
    Ok(view)
}

/// Clear the plant's `needs_water` flag. Maturity is unaffected.
pub fn water_plant(
    engine: &Engine,
    user_id: &str,
    plant_id: &str,
    now: DateTime<Utc>,
) -> Result<PlantView, EngineError> {
    let plant = engine.store.timers.transaction(|timers| -> TxResult<PlantInstance> {
        let key = keys::plant(user_id, plant_id);
        let found: Option<PlantInstance> = tx_get_owned(timers, &key, user_id, plant_id)?;
        let Some(mut plant) = found else {
            return tx_abort(EngineError::NotFound(format!("plant: {}", plant_id)));
        };
        plant.watered_at = Some(now);
        plant.needs_water = false;
        tx_put(timers, &key, &plant)?;
        Ok(plant)
    })?;
    engine.store.flush()?;

    let seed = engine.catalog.seed(&plant.seed_item_id)?;
    let view = TimerView {
        readiness: plant_readiness(seed, &plant, now),
        record: plant,
    };
    engine.notify(user_id, "plant", "watered", &view);
    Ok(view)
}

/// Credit the seed's outputs and remove the plant, freeing its slot.
pub fn harvest_plant(
    engine: &Engine,
    user_id: &str,
    plant_id: &str,
    now: DateTime<Utc>,
) -> Result<CollectOutcome, EngineError> {
    let catalog = &engine.catalog;
    let outcome = (&engine.store.inventory, &engine.store.timers).transaction(
        |(inventory, timers)| -> TxResult<CollectOutcome> {
            let key = keys::plant(user_id, plant_id);
            let found: Option<PlantInstance> = tx_get_owned(timers, &key, user_id, plant_id)?;
            let Some(plant) = found else {
                return tx_abort(EngineError::NotFound(format!("plant: {}", plant_id)));
            };
            let seed = tx_try(catalog.seed(&plant.seed_item_id))?;
            require_ready(plant_readiness(seed, &plant, now))?;

            credit_all_in(inventory, user_id, &seed.outputs, now)?;
            timers.remove(key)?;
            timers.remove(keys::slot(GARDEN, user_id, &plant.zone_id, plant.slot_index))?;
            Ok(CollectOutcome {
                source_id: plant.id.clone(),
                credited: seed.outputs.clone(),
            })
        },
    )?;
    engine.store.flush()?;

    info!("plant: {} harvested {}", user_id, plant_id);
    engine.notify(user_id, "plant", "harvested", &outcome);
    Ok(outcome)
}

pub fn list_plants(
    engine: &Engine,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<PlantView>, EngineError> {
    let mut views = Vec::new();
    for plant in engine.store.list_plants(user_id)? {
        let seed = engine.catalog.seed(&plant.seed_item_id)?;
        views.push(TimerView {
            readiness: plant_readiness(seed, &plant, now),
            record: plant,
        });
    }
    views.sort_by_key(|v| (v.record.zone_id.clone(), v.record.slot_index));
    debug!("plant: {} has {} plant(s)", user_id, views.len());
    Ok(views)
}

// ============================================================================
// Animals
// ============================================================================

/// Pay the animal's cost and add it to the user's farm. Production starts now.
pub fn acquire_animal(
    engine: &Engine,
    user_id: &str,
    animal_id: &str,
    now: DateTime<Utc>,
) -> Result<AnimalView, EngineError> {
    let definition = engine.catalog.animal(animal_id)?;
    let animal = AnimalInstance::new(user_id, animal_id, now);

    (&engine.store.inventory, &engine.store.timers).transaction(
        |(inventory, timers)| -> TxResult<()> {
            debit_all_in(inventory, user_id, &definition.cost, now)?;
            tx_put(timers, &keys::animal(user_id, &animal.id), &animal)?;
            Ok(())
        },
    )?;
    engine.store.flush()?;

    info!("animal: {} acquired {} ({})", user_id, animal_id, animal.id);
    let view = TimerView {
        readiness: animal_readiness(definition, &animal, now),
        record: animal,
    };
    engine.notify(user_id, "animal", "acquired", &view);
    Ok(view)
}

/// Feed an animal, consuming one feed item when its definition names one.
pub fn feed_animal(
    engine: &Engine,
    user_id: &str,
    instance_id: &str,
    now: DateTime<Utc>,
) -> Result<AnimalView, EngineError> {
    let catalog = &engine.catalog;
    let animal = (&engine.store.inventory, &engine.store.timers).transaction(
        |(inventory, timers)| -> TxResult<AnimalInstance> {
            let key = keys::animal(user_id, instance_id);
            let found: Option<AnimalInstance> = tx_get_owned(timers, &key, user_id, instance_id)?;
            let Some(mut animal) = found else {
                return tx_abort(EngineError::NotFound(format!("animal: {}", instance_id)));
            };
            let definition = tx_try(catalog.animal(&animal.animal_id))?;
            if let Some(feed_item) = &definition.feed_item {
                remove_in(inventory, user_id, feed_item, 1, now)?;
            }
            animal.happiness = animal
                .happiness
                .saturating_add(definition.feed_happiness)
                .min(STAT_CAP);
            animal.last_fed_at = now;
            tx_put(timers, &key, &animal)?;
            Ok(animal)
        },
    )?;
    engine.store.flush()?;

    let definition = engine.catalog.animal(&animal.animal_id)?;
    let view = TimerView {
        readiness: animal_readiness(definition, &animal, now),
        record: animal,
    };
    engine.notify(user_id, "animal", "fed", &view);
    Ok(view)
}

/// Collect an animal's production. The animal stays and its production
/// timer restarts at `now`.
pub fn collect_animal(
    engine: &Engine,
    user_id: &str,
    instance_id: &str,
    now: DateTime<Utc>,
) -> Result<CollectOutcome, EngineError> {
    let catalog = &engine.catalog;
    let outcome = (&engine.store.inventory, &engine.store.timers).transaction(
        |(inventory, timers)| -> TxResult<CollectOutcome> {
            let key = keys::animal(user_id, instance_id);
            let found: Option<AnimalInstance> = tx_get_owned(timers, &key, user_id, instance_id)?;
            let Some(mut animal) = found else {
                return tx_abort(EngineError::NotFound(format!("animal: {}", instance_id)));
            };
            let definition = tx_try(catalog.animal(&animal.animal_id))?;
            require_ready(animal_readiness(definition, &animal, now))?;

            credit_all_in(inventory, user_id, &definition.outputs, now)?;
            animal.last_collected_at = now;
            tx_put(timers, &key, &animal)?;
            Ok(CollectOutcome {
                source_id: animal.id.clone(),
                credited: definition.outputs.clone(),
            })
        },
    )?;
    engine.store.flush()?;

    info!("animal: {} collected from {}", user_id, instance_id);
    engine.notify(user_id, "animal", "collected", &outcome);
    Ok(outcome)
}

pub fn list_animals(
    engine: &Engine,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<AnimalView>, EngineError> {
    let mut views = Vec::new();
    for animal in engine.store.list_animals(user_id)? {
        let definition = engine.catalog.animal(&animal.animal_id)?;
        views.push(TimerView {
            readiness: animal_readiness(definition, &animal, now),
            record: animal,
        });
    }
    views.sort_by_key(|v| v.record.last_collected_at);
    Ok(views)
}

// ============================================================================
// Production chains
// ============================================================================

/// Debit every ingredient of `chain_id` and start an order in a free workshop
/// slot. All-or-nothing: a short ingredient debits nothing and creates nothing.
pub fn start_production(
    engine: &Engine,
    user_id: &str,
    zone_id: &str,
    slot_index: u32,
    chain_id: &str,
    now: DateTime<Utc>,
) -> Result<OrderView, EngineError> {
    let chain = engine.catalog.chain(chain_id)?;
    let order = ProductionOrder::new(
        user_id,
        zone_id,
        slot_index,
        chain_id,
        chain.duration_seconds,
        now,
    );

    (&engine.store.inventory, &engine.store.timers).transaction(
        |(inventory, timers)| -> TxResult<()> {
            claim_slot(timers, WORKSHOP, user_id, zone_id, slot_index, &order.id)?;
            debit_all_in(inventory, user_id, &chain.ingredients, now)?;
            tx_put(timers, &keys::order(user_id, &order.id), &order)?;
            Ok(())
        },
    )?;
    engine.store.flush()?;

    info!(
        "production: {} started {} in {}/{} (ready {})",
        user_id, chain_id, zone_id, slot_index, order.finish_at
    );
    let view = TimerView {
        readiness: order.readiness(now),
        record: order,
    };
    engine.notify(user_id, "production", "started", &view);
    Ok(view)
}

/// Credit the chain's outputs and remove the finished order.
pub fn collect_production(
    engine: &Engine,
    user_id: &str,
    order_id: &str,
    now: DateTime<Utc>,
) -> Result<CollectOutcome, EngineError> {
    let catalog = &engine.catalog;
    let outcome = (&engine.store.inventory, &engine.store.timers).transaction(
        |(inventory, timers)| -> TxResult<CollectOutcome> {
            let key = keys::order(user_id, order_id);
            let found: Option<ProductionOrder> = tx_get_owned(timers, &key, user_id, order_id)?;
            let Some(order) = found else {
                return tx_abort(EngineError::NotFound(format!(
                    "production order: {}",
                    order_id
                )));
            };
            require_ready(order.readiness(now))?;
            let chain = tx_try(catalog.chain(&order.chain_id))?;

            credit_all_in(inventory, user_id, &chain.outputs, now)?;
            timers.remove(key)?;
            timers.remove(keys::slot(WORKSHOP, user_id, &order.zone_id, order.slot_index))?;
            Ok(CollectOutcome {
                source_id: order.id.clone(),
                credited: chain.outputs.clone(),
            })
        },
    )?;
    engine.store.flush()?;

    info!("production: {} collected order {}", user_id, order_id);
    engine.notify(user_id, "production", "collected", &outcome);
    Ok(outcome)
}

pub fn list_orders(
    engine: &Engine,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<OrderView>, EngineError> {
    let mut views: Vec<OrderView> = engine
        .store
        .list_orders(user_id)?
        .into_iter()
        .map(|order| TimerView {
            readiness: order.readiness(now),
            record: order,
        })
        .collect();
    views.sort_by_key(|v| v.record.finish_at);
    Ok(views)
}

/// Sum of everything a user could collect right now, for summaries.
pub fn ready_outputs(
    engine: &Engine,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<ItemQuantity>, EngineError> {
    let mut ready = Vec::new();
    for view in list_plants(engine, user_id, now)? {
        if view.readiness.is_ready() {
            ready.extend(engine.catalog.seed(&view.record.seed_item_id)?.outputs.clone());
        }
    }
    for view in list_animals(engine, user_id, now)? {
        if view.readiness.is_ready() {
            ready.extend(engine.catalog.animal(&view.record.animal_id)?.outputs.clone());
        }
    }
    for view in list_orders(engine, user_id, now)? {
        if view.readiness.is_ready() {
            ready.extend(engine.catalog.chain(&view.record.chain_id)?.outputs.clone());
        }
    }
    Ok(ready)
}
