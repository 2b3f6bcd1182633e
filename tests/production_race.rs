/// Concurrency tests: racing starts against inventory that covers only one.
mod common;

use std::sync::Barrier;

use growquest::engine::inventory::{add_item, quantity};
use growquest::engine::timers::{list_orders, start_production};
use growquest::engine::EngineError;

#[test]
fn two_racing_starts_debit_once() {
    for round in 0..20 {
        let (_dir, engine) = common::temp_engine();
        let now = common::t0();
        // bread needs wheat x3
        add_item(&engine, "alice", "wheat", 3, now).unwrap();

        let barrier = Barrier::new(2);
        let results: Vec<Result<_, EngineError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2u32)
                .map(|slot| {
                    let engine = &engine;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        start_production(engine, "alice", "bakery", slot, "bread", now)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("thread panicked"))
                .collect()
        });

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::InsufficientResources { .. })))
            .count();
        assert_eq!(successes, 1, "round {}", round);
        assert_eq!(insufficient, 1, "round {}", round);
        assert_eq!(quantity(&engine, "alice", "wheat").unwrap(), 0);
        assert_eq!(list_orders(&engine, "alice", now).unwrap().len(), 1);
    }
}

#[test]
fn racing_debits_never_go_negative() {
    let (_dir, engine) = common::temp_engine();
    let now = common::t0();
    add_item(&engine, "alice", "wheat", 10, now).unwrap();

    let barrier = Barrier::new(8);
    let successes: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8u32)
            .map(|slot| {
                let engine = &engine;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    start_production(engine, "alice", "bakery", slot, "bread", now).is_ok()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked") as usize)
            .sum()
    });

    assert_eq!(successes, 3);
    assert_eq!(quantity(&engine, "alice", "wheat").unwrap(), 1);
}
