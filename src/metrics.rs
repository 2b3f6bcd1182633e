//! Process-wide engine counters.
//! Cheap relaxed atomics; read them together with [`snapshot`].
use std::sync::atomic::{AtomicU64, Ordering};

static EVENTS_DELIVERED: AtomicU64 = AtomicU64::new(0);
static DELIVERIES_DROPPED: AtomicU64 = AtomicU64::new(0);
static ACHIEVEMENTS_UNLOCKED: AtomicU64 = AtomicU64::new(0);
static ACHIEVEMENT_CHECK_FAILURES: AtomicU64 = AtomicU64::new(0);
static PETS_RAN_AWAY: AtomicU64 = AtomicU64::new(0);

pub fn inc_events_delivered(count: u64) {
    EVENTS_DELIVERED.fetch_add(count, Ordering::Relaxed);
}

pub fn inc_deliveries_dropped(count: u64) {
    DELIVERIES_DROPPED.fetch_add(count, Ordering::Relaxed);
}

pub fn inc_achievements_unlocked(count: u64) {
    ACHIEVEMENTS_UNLOCKED.fetch_add(count, Ordering::Relaxed);
}

pub fn inc_achievement_check_failures() {
    ACHIEVEMENT_CHECK_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_pets_ran_away() {
    PETS_RAN_AWAY.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub events_delivered: u64,
    pub deliveries_dropped: u64,
    pub achievements_unlocked: u64,
    pub achievement_check_failures: u64,
    pub pets_ran_away: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        events_delivered: EVENTS_DELIVERED.load(Ordering::Relaxed),
        deliveries_dropped: DELIVERIES_DROPPED.load(Ordering::Relaxed),
        achievements_unlocked: ACHIEVEMENTS_UNLOCKED.load(Ordering::Relaxed),
        achievement_check_failures: ACHIEVEMENT_CHECK_FAILURES.load(Ordering::Relaxed),
        pets_ran_away: PETS_RAN_AWAY.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        inc_events_delivered(3);
        inc_achievement_check_failures();
        let after = snapshot();
        assert!(after.events_delivered >= before.events_delivered + 3);
        assert!(after.achievement_check_failures > before.achievement_check_failures);
    }
}
