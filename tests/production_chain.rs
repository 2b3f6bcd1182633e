/// Integration tests for the resource timer engine.
/// Walks seeds through harvest into production chains and checks that
/// failed starts and early collects leave inventory and timers untouched.
mod common;

use chrono::Duration;
use growquest::engine::inventory::{add_item, quantity};
use growquest::engine::timers::{
    collect_production, harvest_plant, list_orders, list_plants, plant_seed, ready_outputs,
    start_production,
};
use growquest::engine::{Catalog, EngineError, ItemQuantity, Readiness};

const SINGLE_INGREDIENT: &str = r#"{
  "chains": [
    {
      "id": "widget",
      "name": "Widget",
      "duration_seconds": 600,
      "ingredients": [{ "item_id": "itemA", "quantity": 3 }],
      "outputs": [{ "item_id": "widget", "quantity": 1 }]
    }
  ]
}"#;

#[test]
fn short_ingredient_creates_nothing() {
    let catalog = Catalog::from_json_str(SINGLE_INGREDIENT).unwrap();
    let (_dir, engine) = common::temp_engine_with(catalog);
    let now = common::t0();
    add_item(&engine, "alice", "itemA", 2, now).unwrap();

    let err = start_production(&engine, "alice", "workshop", 0, "widget", now).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientResources {
            required: 3,
            available: 2,
            ..
        }
    ));
    assert_eq!(quantity(&engine, "alice", "itemA").unwrap(), 2);
    assert!(list_orders(&engine, "alice", now).unwrap().is_empty());

    // the slot was not claimed by the failed start
    add_item(&engine, "alice", "itemA", 1, now).unwrap();
    start_production(&engine, "alice", "workshop", 0, "widget", now).unwrap();
    assert_eq!(quantity(&engine, "alice", "itemA").unwrap(), 0);
}

#[test]
fn collect_before_finish_is_not_ready() {
    let catalog = Catalog::from_json_str(SINGLE_INGREDIENT).unwrap();
    let (_dir, engine) = common::temp_engine_with(catalog);
    let now = common::t0();
    add_item(&engine, "alice", "itemA", 3, now).unwrap();
    let order = start_production(&engine, "alice", "workshop", 0, "widget", now).unwrap();
    assert_eq!(order.record.finish_at, now + Duration::seconds(600));

    let early = now + Duration::seconds(599);
    match collect_production(&engine, "alice", &order.record.id, early) {
        Err(EngineError::NotReady { ready_at }) => assert_eq!(ready_at, order.record.finish_at),
        other => panic!("expected NotReady, got {:?}", other),
    }
    assert_eq!(quantity(&engine, "alice", "widget").unwrap(), 0);
    let orders = list_orders(&engine, "alice", early).unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(
        orders[0].readiness,
        Readiness::Pending {
            ready_at: order.record.finish_at,
            remaining_seconds: 1
        }
    );

    let outcome =
        collect_production(&engine, "alice", &order.record.id, order.record.finish_at).unwrap();
    assert_eq!(outcome.credited, vec![ItemQuantity::new("widget", 1)]);
    assert!(list_orders(&engine, "alice", order.record.finish_at)
        .unwrap()
        .is_empty());
}

#[test]
fn wheat_to_bread_loop() {
    let (_dir, engine) = common::temp_engine();
    let now = common::t0();
    add_item(&engine, "alice", "wheat_seed", 1, now).unwrap();
    let plant = plant_seed(&engine, "alice", "meadow", 0, "wheat_seed", now).unwrap();

    let grown = now + Duration::hours(4);
    assert!(list_plants(&engine, "alice", grown).unwrap()[0]
        .readiness
        .is_ready());
    assert_eq!(
        ready_outputs(&engine, "alice", grown).unwrap(),
        vec![ItemQuantity::new("wheat", 5)]
    );
    harvest_plant(&engine, "alice", &plant.record.id, grown).unwrap();
    assert_eq!(quantity(&engine, "alice", "wheat").unwrap(), 5);

    // the garden slot is free again
    add_item(&engine, "alice", "wheat_seed", 1, grown).unwrap();
    plant_seed(&engine, "alice", "meadow", 0, "wheat_seed", grown).unwrap();

    let order = start_production(&engine, "alice", "bakery", 0, "bread", grown).unwrap();
    assert_eq!(quantity(&engine, "alice", "wheat").unwrap(), 2);
    assert!(matches!(
        start_production(&engine, "alice", "bakery", 0, "bread", grown),
        Err(EngineError::Conflict(_))
    ));
    collect_production(&engine, "alice", &order.record.id, grown + Duration::minutes(30)).unwrap();
    assert_eq!(quantity(&engine, "alice", "bread").unwrap(), 1);
}

#[test]
fn shipped_catalog_loads() {
    let catalog = Catalog::load_json(common::shipped_catalog()).unwrap();
    let counts = catalog.counts();
    assert!(counts.seeds >= 3);
    assert!(counts.chains >= 2);
    assert!(counts.achievements >= 5);
    assert!(catalog.chain("pumpkin_pie").is_ok());
}
