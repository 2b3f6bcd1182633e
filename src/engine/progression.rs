//! Per-zone experience, level and task-completion bookkeeping.
//!
//! `level` is always recomputed from `experience`; nothing sets it directly.
//! Achievement checks run after the progress write commits and can never undo
//! it.

use chrono::{DateTime, Utc};
use log::info;
use sled::transaction::TransactionalTree;

use crate::engine::achievement::{check_logged, UnlockedAchievement};
use crate::engine::errors::EngineError;
use crate::engine::storage::{keys, tx_get_owned, tx_put, TxResult};
use crate::engine::types::{ConditionType, ExperienceOutcome, ZoneProgress};
use crate::engine::Engine;

/// Level for an experience total: one level per `xp_per_level`, starting at 1.
pub fn level_for(experience: u64, xp_per_level: u64) -> u32 {
    let level = experience / xp_per_level.max(1) + 1;
    u32::try_from(level).unwrap_or(u32::MAX)
}

fn load_in(
    tree: &TransactionalTree,
    user_id: &str,
    zone_id: &str,
    now: DateTime<Utc>,
) -> TxResult<ZoneProgress> {
    let key = keys::progress(user_id, zone_id);
    Ok(tx_get_owned::<ZoneProgress>(tree, &key, user_id, zone_id)?
        .unwrap_or_else(|| ZoneProgress::new(user_id, zone_id, now)))
}

pub(crate) fn add_experience_in(
    tree: &TransactionalTree,
    user_id: &str,
    zone_id: &str,
    amount: u64,
    xp_per_level: u64,
    now: DateTime<Utc>,
) -> TxResult<ExperienceOutcome> {
    let mut progress = load_in(tree, user_id, zone_id, now)?;
    let previous_level = progress.level;
    progress.experience = progress.experience.saturating_add(amount);
    progress.level = level_for(progress.experience, xp_per_level);
    progress.updated_at = now;
    tx_put(tree, &keys::progress(user_id, zone_id), &progress)?;
    Ok(ExperienceOutcome {
        leveled_up: progress.level > previous_level,
        previous_level,
        progress,
    })
}

pub(crate) fn increment_tasks_in(
    tree: &TransactionalTree,
    user_id: &str,
    zone_id: &str,
    now: DateTime<Utc>,
) -> TxResult<ZoneProgress> {
    let mut progress = load_in(tree, user_id, zone_id, now)?;
    progress.tasks_completed = progress.tasks_completed.saturating_add(1);
    progress.updated_at = now;
    tx_put(tree, &keys::progress(user_id, zone_id), &progress)?;
    Ok(progress)
}

/// `xp_earned` against the new total, then `level_reached` when the level moved.
pub(crate) fn check_experience(
    engine: &Engine,
    user_id: &str,
    outcome: &ExperienceOutcome,
    now: DateTime<Utc>,
) -> Vec<UnlockedAchievement> {
    let mut unlocked = check_logged(
        engine,
        user_id,
        ConditionType::XpEarned,
        outcome.progress.experience,
        now,
    );
    if outcome.leveled_up {
        unlocked.extend(check_logged(
            engine,
            user_id,
            ConditionType::LevelReached,
            u64::from(outcome.progress.level),
            now,
        ));
    }
    unlocked
}

/// Award experience in a zone, creating its progress on first touch.
pub fn add_experience(
    engine: &Engine,
    user_id: &str,
    zone_id: &str,
    amount: u64,
    now: DateTime<Utc>,
) -> Result<ExperienceOutcome, EngineError> {
    let xp_per_level = engine.progression_rules.xp_per_level;
    let outcome = engine.store.progress.transaction(|tree| {
        add_experience_in(tree, user_id, zone_id, amount, xp_per_level, now)
    })?;
    engine.store.flush()?;

    if outcome.leveled_up {
        info!(
            "progress: {} reached level {} in {}",
            user_id, outcome.progress.level, zone_id
        );
    }
    engine.notify(user_id, "progress", "updated", &outcome.progress);
    check_experience(engine, user_id, &outcome, now);
    Ok(outcome)
}

/// Count one more completed task in a zone and check `tasks_completed`.
pub fn increment_tasks_completed(
    engine: &Engine,
    user_id: &str,
    zone_id: &str,
    now: DateTime<Utc>,
) -> Result<ZoneProgress, EngineError> {
    let progress = engine
        .store
        .progress
        .transaction(|tree| increment_tasks_in(tree, user_id, zone_id, now))?;
    engine.store.flush()?;

    engine.notify(user_id, "progress", "updated", &progress);
    check_logged(
        engine,
        user_id,
        ConditionType::TasksCompleted,
        u64::from(progress.tasks_completed),
        now,
    );
    Ok(progress)
}

/// Progress in one zone; a zone never touched reads as level 1 with no experience.
pub fn progress(
    engine: &Engine,
    user_id: &str,
    zone_id: &str,
    now: DateTime<Utc>,
) -> Result<ZoneProgress, EngineError> {
    Ok(engine
        .store
        .get_progress(user_id, zone_id)?
        .unwrap_or_else(|| ZoneProgress::new(user_id, zone_id, now)))
}

pub fn list_progress(engine: &Engine, user_id: &str) -> Result<Vec<ZoneProgress>, EngineError> {
    let mut zones = engine.store.list_progress(user_id)?;
    zones.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));
    Ok(zones)
}
