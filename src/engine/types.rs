use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const INVENTORY_SCHEMA_VERSION: u8 = 1;
pub const TIMER_SCHEMA_VERSION: u8 = 1;
pub const PET_SCHEMA_VERSION: u8 = 1;
pub const PROGRESS_SCHEMA_VERSION: u8 = 1;
pub const UNLOCK_SCHEMA_VERSION: u8 = 1;
pub const SUBMISSION_SCHEMA_VERSION: u8 = 1;

/// Upper bound shared by pet stats and animal happiness.
pub const STAT_CAP: u32 = 100;

/// Longest duration a catalog timer may declare (ten years).
pub const MAX_TIMER_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// An item id paired with a quantity (recipe ingredients, outputs, costs).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemQuantity {
    pub item_id: String,
    pub quantity: u32,
}

impl ItemQuantity {
    pub fn new(item_id: &str, quantity: u32) -> Self {
        Self {
            item_id: item_id.to_string(),
            quantity,
        }
    }
}

// ============================================================================
// Inventory Ledger
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryEntry {
    pub user_id: String,
    pub item_id: String,
    pub quantity: u32,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl InventoryEntry {
    pub fn new(user_id: &str, item_id: &str, quantity: u32, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            quantity,
            updated_at: now,
            schema_version: INVENTORY_SCHEMA_VERSION,
        }
    }
}

// ============================================================================
// Resource timers
// ============================================================================

/// Derived maturity of anything that completes after a fixed duration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Pending {
        ready_at: DateTime<Utc>,
        remaining_seconds: i64,
    },
}

impl Readiness {
    /// Ready once `now - started >= duration`. Zero durations are ready at once.
    pub fn evaluate(started: DateTime<Utc>, duration_seconds: u64, now: DateTime<Utc>) -> Self {
        let duration = Duration::seconds(duration_seconds.min(MAX_TIMER_SECONDS) as i64);
        Self::until(started + duration, now)
    }

    pub fn until(ready_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now >= ready_at {
            Readiness::Ready
        } else {
            Readiness::Pending {
                ready_at,
                remaining_seconds: (ready_at - now).num_seconds(),
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlantInstance {
    pub id: String,
    pub user_id: String,
    pub zone_id: String,
    pub slot_index: u32,
    pub seed_item_id: String,
    pub planted_at: DateTime<Utc>,
    pub watered_at: Option<DateTime<Utc>>,
    /// Display-only flag; watering never changes maturity.
    pub needs_water: bool,
    pub schema_version: u8,
}

impl PlantInstance {
    pub fn new(
        user_id: &str,
        zone_id: &str,
        slot_index: u32,
        seed_item_id: &str,
        planted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            zone_id: zone_id.to_string(),
            slot_index,
            seed_item_id: seed_item_id.to_string(),
            planted_at,
            watered_at: None,
            needs_water: true,
            schema_version: TIMER_SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimalInstance {
    pub id: String,
    pub user_id: String,
    pub animal_id: String,
    pub happiness: u32,
    pub last_fed_at: DateTime<Utc>,
    pub last_collected_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl AnimalInstance {
    pub fn new(user_id: &str, animal_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            animal_id: animal_id.to_string(),
            happiness: STAT_CAP,
            last_fed_at: now,
            last_collected_at: now,
            schema_version: TIMER_SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductionOrder {
    pub id: String,
    pub user_id: String,
    pub zone_id: String,
    pub slot_index: u32,
    pub chain_id: String,
    pub started_at: DateTime<Utc>,
    pub finish_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl ProductionOrder {
    pub fn new(
        user_id: &str,
        zone_id: &str,
        slot_index: u32,
        chain_id: &str,
        duration_seconds: u64,
        started_at: DateTime<Utc>,
    ) -> Self {
        let duration = Duration::seconds(duration_seconds.min(MAX_TIMER_SECONDS) as i64);
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            zone_id: zone_id.to_string(),
            slot_index,
            chain_id: chain_id.to_string(),
            started_at,
            finish_at: started_at + duration,
            schema_version: TIMER_SCHEMA_VERSION,
        }
    }

    pub fn readiness(&self, now: DateTime<Utc>) -> Readiness {
        Readiness::until(self.finish_at, now)
    }
}

/// A timer record together with its readiness at evaluation time.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimerView<T> {
    #[serde(flatten)]
    pub record: T,
    pub readiness: Readiness,
}

pub type PlantView = TimerView<PlantInstance>;
pub type AnimalView = TimerView<AnimalInstance>;
pub type OrderView = TimerView<ProductionOrder>;

/// Outcome of a harvest or collect: what was credited and the record it came from.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CollectOutcome {
    pub source_id: String,
    pub credited: Vec<ItemQuantity>,
}

// ============================================================================
// Pet
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pet {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub pet_type: String,
    /// Stat values as of their own action timestamp. Decay is derived on read.
    pub hunger: u32,
    pub thirst: u32,
    pub happiness: u32,
    pub last_fed_at: DateTime<Utc>,
    pub last_watered_at: DateTime<Utc>,
    pub last_played_at: DateTime<Utc>,
    /// Terminal once set.
    pub ran_away_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl Pet {
    pub fn new(
        user_id: &str,
        name: &str,
        pet_type: &str,
        initial_stat: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            pet_type: pet_type.to_string(),
            hunger: initial_stat,
            thirst: initial_stat,
            happiness: initial_stat,
            last_fed_at: now,
            last_watered_at: now,
            last_played_at: now,
            ran_away_at: None,
            created_at: now,
            schema_version: PET_SCHEMA_VERSION,
        }
    }

    pub fn has_run_away(&self) -> bool {
        self.ran_away_at.is_some()
    }

    pub fn last_interaction(&self) -> DateTime<Utc> {
        self.last_fed_at
            .max(self.last_watered_at)
            .max(self.last_played_at)
    }
}

/// Care actions that restore one stat each.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CareAction {
    Feed,
    Water,
    Play,
}

impl CareAction {
    pub fn event_verb(&self) -> &'static str {
        match self {
            CareAction::Feed => "fed",
            CareAction::Water => "watered",
            CareAction::Play => "played",
        }
    }
}

// ============================================================================
// Progression
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneProgress {
    pub user_id: String,
    pub zone_id: String,
    pub level: u32,
    pub experience: u64,
    pub tasks_completed: u32,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl ZoneProgress {
    pub fn new(user_id: &str, zone_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            zone_id: zone_id.to_string(),
            level: 1,
            experience: 0,
            tasks_completed: 0,
            updated_at: now,
            schema_version: PROGRESS_SCHEMA_VERSION,
        }
    }
}

/// Result of awarding experience to a zone.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExperienceOutcome {
    pub progress: ZoneProgress,
    pub previous_level: u32,
    pub leveled_up: bool,
}

// ============================================================================
// Achievements
// ============================================================================

/// Counter an achievement definition is matched against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    XpEarned,
    LevelReached,
    TasksCompleted,
    PerfectGrade,
    HighAverage,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::XpEarned => "xp_earned",
            ConditionType::LevelReached => "level_reached",
            ConditionType::TasksCompleted => "tasks_completed",
            ConditionType::PerfectGrade => "perfect_grade",
            ConditionType::HighAverage => "high_average",
        }
    }
}

/// Append-only record of an earned achievement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AchievementUnlock {
    pub user_id: String,
    pub achievement_id: String,
    pub unlocked_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl AchievementUnlock {
    pub fn new(user_id: &str, achievement_id: &str, unlocked_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            achievement_id: achievement_id.to_string(),
            unlocked_at,
            schema_version: UNLOCK_SCHEMA_VERSION,
        }
    }
}

// ============================================================================
// Submissions
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Reviewed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub id: String,
    pub user_id: String,
    pub task_id: String,
    pub zone_id: String,
    pub status: SubmissionStatus,
    pub grade: Option<u8>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub schema_version: u8,
}

impl Submission {
    pub fn new(user_id: &str, task_id: &str, zone_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            task_id: task_id.to_string(),
            zone_id: zone_id.to_string(),
            status: SubmissionStatus::Pending,
            grade: None,
            submitted_at: now,
            reviewed_at: None,
            schema_version: SUBMISSION_SCHEMA_VERSION,
        }
    }
}

/// All-time reviewed-submission statistics for one user.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct GradeSummary {
    pub reviewed: u32,
    pub average: f64,
}
