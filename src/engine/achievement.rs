/// Achievement unlock engine.
///
/// Progression and grading call [`check_and_unlock_achievements`] whenever a
/// counter moves. The batch path checks for an existing unlock before
/// inserting, so repeat checks never raise; the direct [`unlock_achievement`]
/// path reports duplicates as `Conflict`.
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::engine::catalog::AchievementDefinition;
use crate::engine::errors::EngineError;
use crate::engine::storage::{keys, tx_abort, tx_get_owned, tx_put, TxResult};
use crate::engine::types::{AchievementUnlock, ConditionType};
use crate::engine::Engine;
use crate::metrics;

/// An unlock joined with its definition; also the `achievement:unlocked` payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UnlockedAchievement {
    pub achievement: AchievementDefinition,
    pub unlocked_at: DateTime<Utc>,
}

/// Listing entry for [`available_achievements`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AchievementStatus {
    pub achievement: AchievementDefinition,
    pub unlocked_at: Option<DateTime<Utc>>,
}

fn announce(engine: &Engine, user_id: &str, unlocked: &UnlockedAchievement) {
    info!(
        "achievement: {} unlocked {} ({})",
        user_id, unlocked.achievement.id, unlocked.achievement.name
    );
    engine.notify(user_id, "achievement", "unlocked", unlocked);
}

/// Unlock every achievement of `condition_type` whose threshold
/// `current_value` meets. Already-unlocked ones are skipped silently.
///
/// Returns only the achievements unlocked by this call.
pub fn check_and_unlock_achievements(
    engine: &Engine,
    user_id: &str,
    condition_type: ConditionType,
    current_value: u64,
    now: DateTime<Utc>,
) -> Result<Vec<UnlockedAchievement>, EngineError> {
    let mut unlocked = Vec::new();
    for definition in engine.catalog.achievements_for(condition_type, current_value) {
        let key = keys::unlock(user_id, &definition.id);
        let inserted = engine.store.unlocks.transaction(|unlocks| -> TxResult<bool> {
            let existing: Option<AchievementUnlock> =
                tx_get_owned(unlocks, &key, user_id, &definition.id)?;
            if existing.is_some() {
                return Ok(false);
            }
            tx_put(unlocks, &key, &AchievementUnlock::new(user_id, &definition.id, now))?;
            Ok(true)
        })?;
        if inserted {
            unlocked.push(UnlockedAchievement {
                achievement: definition.clone(),
                unlocked_at: now,
            });
        }
    }

    if unlocked.is_empty() {
        debug!(
            "achievement: nothing new for {} at {}={}",
            user_id,
            condition_type.as_str(),
            current_value
        );
        return Ok(unlocked);
    }
    engine.store.flush()?;
    metrics::inc_achievements_unlocked(unlocked.len() as u64);
    for achievement in &unlocked {
        announce(engine, user_id, achievement);
    }
    Ok(unlocked)
}

/// Batch check for call sites that must not fail because of achievements.
/// Errors are logged and counted, never returned.
pub(crate) fn check_logged(
    engine: &Engine,
    user_id: &str,
    condition_type: ConditionType,
    current_value: u64,
    now: DateTime<Utc>,
) -> Vec<UnlockedAchievement> {
    match check_and_unlock_achievements(engine, user_id, condition_type, current_value, now) {
        Ok(unlocked) => unlocked,
        Err(e) => {
            warn!(
                "achievement check {} for {} failed: {}",
                condition_type.as_str(),
                user_id,
                e
            );
            metrics::inc_achievement_check_failures();
            Vec::new()
        }
    }
}

/// Caller-facing unlock. A duplicate is a `Conflict`.
pub fn unlock_achievement(
    engine: &Engine,
    user_id: &str,
    achievement_id: &str,
    now: DateTime<Utc>,
) -> Result<UnlockedAchievement, EngineError> {
    let definition = engine.catalog.achievement(achievement_id)?;
    let key = keys::unlock(user_id, achievement_id);
    engine.store.unlocks.transaction(|unlocks| -> TxResult<()> {
        let existing: Option<AchievementUnlock> =
            tx_get_owned(unlocks, &key, user_id, achievement_id)?;
        if existing.is_some() {
            return tx_abort(EngineError::Conflict(format!(
                "achievement {} already unlocked for {}",
                achievement_id, user_id
            )));
        }
        tx_put(unlocks, &key, &AchievementUnlock::new(user_id, achievement_id, now))
    })?;
    engine.store.flush()?;
    metrics::inc_achievements_unlocked(1);

    let unlocked = UnlockedAchievement {
        achievement: definition.clone(),
        unlocked_at: now,
    };
    announce(engine, user_id, &unlocked);
    Ok(unlocked)
}

/// Unlocks the user holds, oldest first.
pub fn unlocked_achievements(
    engine: &Engine,
    user_id: &str,
) -> Result<Vec<UnlockedAchievement>, EngineError> {
    let mut unlocked = Vec::new();
    for unlock in engine.store.list_unlocks(user_id)? {
        match engine.catalog.achievement(&unlock.achievement_id) {
            Ok(definition) => unlocked.push(UnlockedAchievement {
                achievement: definition.clone(),
                unlocked_at: unlock.unlocked_at,
            }),
            Err(_) => debug!(
                "achievement: {} holds retired achievement {}",
                user_id, unlock.achievement_id
            ),
        }
    }
    Ok(unlocked)
}

/// Every achievement the user can see. Hidden ones appear once unlocked.
pub fn available_achievements(
    engine: &Engine,
    user_id: &str,
) -> Result<Vec<AchievementStatus>, EngineError> {
    let mut statuses = Vec::new();
    for definition in engine.catalog.achievements() {
        let unlocked_at = engine
            .store
            .get_unlock(user_id, &definition.id)?
            .map(|u| u.unlocked_at);
        if definition.hidden && unlocked_at.is_none() {
            continue;
        }
        statuses.push(AchievementStatus {
            achievement: definition.clone(),
            unlocked_at,
        });
    }
    Ok(statuses)
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
    fn batch_check_unlocks_once() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        let first =
            check_and_unlock_achievements(&engine, "alice", ConditionType::TasksCompleted, 1, now)
                .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].achievement.id, "first_task");

        let second =
            check_and_unlock_achievements(&engine, "alice", ConditionType::TasksCompleted, 1, now)
                .unwrap();
        assert!(second.is_empty());
        assert_eq!(unlocked_achievements(&engine, "alice").unwrap().len(), 1);
    }

    #[test]
    fn batch_check_unlocks_every_satisfied_threshold() {
        let (_dir, engine) = setup();
        let unlocked = check_and_unlock_achievements(
            &engine,
            "alice",
            ConditionType::XpEarned,
            6000,
            Utc::now(),
        )
        .unwrap();
        let mut ids: Vec<_> = unlocked.iter().map(|u| u.achievement.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["first_steps", "scholar"]);
    }

    #[test]
    fn value_below_threshold_unlocks_nothing() {
        let (_dir, engine) = setup();
        let unlocked =
            check_and_unlock_achievements(&engine, "alice", ConditionType::XpEarned, 99, Utc::now())
                .unwrap();
        assert!(unlocked.is_empty());
    }

    #[test]
    fn direct_unlock_conflicts_on_duplicate() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        unlock_achievement(&engine, "alice", "first_steps", now).unwrap();
        assert!(matches!(
            unlock_achievement(&engine, "alice", "first_steps", now),
            Err(EngineError::Conflict(_))
        ));
        assert!(matches!(
            unlock_achievement(&engine, "alice", "no_such_thing", now),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn hidden_achievements_listed_only_when_unlocked() {
        let (_dir, engine) = setup();
        let visible = available_achievements(&engine, "alice").unwrap();
        assert!(visible.iter().all(|s| s.achievement.id != "honor_roll"));

        unlock_achievement(&engine, "alice", "honor_roll", Utc::now()).unwrap();
        let visible = available_achievements(&engine, "alice").unwrap();
        let honor = visible
            .iter()
            .find(|s| s.achievement.id == "honor_roll")
            .expect("listed after unlock");
        assert!(honor.unlocked_at.is_some());
    }
}
