//! # Growquest - Progression and Simulation Engine
//!
//! Growquest is the time-based core of a gamified learning platform. Students earn
//! experience from graded tasks, which feeds a small farm, a virtual pet and a set
//! of achievements.
//!
//! ## Features
//!
//! - **Inventory Ledger**: Per-user item counters with all-or-nothing debits that compose into larger transactions.
//! - **Resource Timers**: Plants, animal production and production chains whose readiness is derived from stored timestamps.
//! - **Pet Vitality**: Hourly decay of hunger, thirst and happiness, care actions and a terminal run-away state.
//! - **Progression**: Per-zone experience, levels and task counters.
//! - **Achievements**: Idempotent threshold unlocks fired from every counter that moves.
//! - **Realtime Fan-out**: Post-commit events pushed to the sessions that joined a user's room.
//!
//! There is no background scheduler. Every operation takes the caller's `now`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use growquest::config::Config;
//! use growquest::engine::{inventory, timers, Engine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let engine = Engine::from_config(&config)?;
//!
//!     let now = Utc::now();
//!     inventory::add_item(&engine, "alice", "wheat", 3, now)?;
//!     let order = timers::start_production(&engine, "alice", "bakery", 0, "bread", now)?;
//!     println!("bread ready: {:?}", order.readiness);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - Store, catalog, ledgers, timers, pet, achievements and realtime hub
//! - [`config`] - Configuration loading and game-rule defaults
//! - [`metrics`] - Process-wide counters
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ Grading / Pet / Timers       │ ← Operations
//! └──────────────────────────────┘
//!          │            │
//! ┌──────────────┐ ┌──────────────┐
//! │ Progression  │→│ Achievements │ ← Counters and unlocks
//! └──────────────┘ └──────────────┘
//!          │
//! ┌──────────────────────────────┐
//! │ Inventory / EngineStore      │ ← sled transactions
//! └──────────────────────────────┘
//!          │ (after commit)
//! ┌──────────────────────────────┐
//! │ RealtimeHub                  │ ← Per-user rooms
//! └──────────────────────────────┘
//! ```

pub mod config;
pub mod engine;
pub mod metrics;
