//! Read-only definitions the engine looks up by id: seeds, animals, production
//! chains, pet consumables, gradable tasks and achievements.
//!
//! Catalogs are loaded from a JSON file (see `data/seeds/catalog.json`) or built
//! from [`Catalog::starter`]. The engine never mutates a catalog.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::error;
use serde::{Deserialize, Serialize};

use crate::engine::errors::EngineError;
use crate::engine::types::{ConditionType, ItemQuantity, MAX_TIMER_SECONDS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeedDefinition {
    /// Inventory item consumed when planting.
    pub item_id: String,
    pub name: String,
    pub growth_seconds: u64,
    pub outputs: Vec<ItemQuantity>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimalDefinition {
    pub id: String,
    pub name: String,
    pub production_seconds: u64,
    pub outputs: Vec<ItemQuantity>,
    #[serde(default)]
    pub cost: Vec<ItemQuantity>,
    #[serde(default)]
    pub feed_item: Option<String>,
    #[serde(default = "default_feed_happiness")]
    pub feed_happiness: u32,
}

fn default_feed_happiness() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainDefinition {
    pub id: String,
    pub name: String,
    pub duration_seconds: u64,
    pub ingredients: Vec<ItemQuantity>,
    pub outputs: Vec<ItemQuantity>,
}

/// Per-stat deltas applied when a consumable is used on a pet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumableDefinition {
    pub item_id: String,
    #[serde(default)]
    pub hunger: u32,
    #[serde(default)]
    pub thirst: u32,
    #[serde(default)]
    pub happiness: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDefinition {
    pub id: String,
    pub zone_id: String,
    pub experience: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AchievementDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub condition_type: ConditionType,
    pub condition_value: u64,
    /// Hidden achievements don't show until earned
    #[serde(default)]
    pub hidden: bool,
}

impl AchievementDefinition {
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        condition_type: ConditionType,
        condition_value: u64,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            condition_type,
            condition_value,
            hidden: false,
        }
    }

    pub fn as_hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// On-disk shape of a catalog file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub seeds: Vec<SeedDefinition>,
    #[serde(default)]
    pub animals: Vec<AnimalDefinition>,
    #[serde(default)]
    pub chains: Vec<ChainDefinition>,
    #[serde(default)]
    pub consumables: Vec<ConsumableDefinition>,
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
    #[serde(default)]
    pub achievements: Vec<AchievementDefinition>,
}

/// Indexed, read-only view over a [`CatalogFile`].
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    seeds: HashMap<String, SeedDefinition>,
    animals: HashMap<String, AnimalDefinition>,
    chains: HashMap<String, ChainDefinition>,
    consumables: HashMap<String, ConsumableDefinition>,
    tasks: HashMap<String, TaskDefinition>,
    achievements: Vec<AchievementDefinition>,
}

/// Number of definitions per family, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub seeds: usize,
    pub animals: usize,
    pub chains: usize,
    pub consumables: usize,
    pub tasks: usize,
    pub achievements: usize,
}

impl Catalog {
    /// Validate and index a catalog file.
    pub fn from_file(file: CatalogFile) -> Result<Self, EngineError> {
        validate(&file)?;
        Ok(Self {
            seeds: index(file.seeds, |s| s.item_id.clone()),
            animals: index(file.animals, |a| a.id.clone()),
            chains: index(file.chains, |c| c.id.clone()),
            consumables: index(file.consumables, |c| c.item_id.clone()),
            tasks: index(file.tasks, |t| t.id.clone()),
            achievements: file.achievements,
        })
    }

    /// Load a catalog from a JSON file on disk.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, EngineError> {
        let file: CatalogFile = serde_json::from_str(contents)?;
        Self::from_file(file)
    }

    pub fn seed(&self, item_id: &str) -> Result<&SeedDefinition, EngineError> {
        self.seeds
            .get(item_id)
            .ok_or_else(|| EngineError::NotFound(format!("seed: {}", item_id)))
    }

    pub fn animal(&self, animal_id: &str) -> Result<&AnimalDefinition, EngineError> {
        self.animals
            .get(animal_id)
            .ok_or_else(|| EngineError::NotFound(format!("animal definition: {}", animal_id)))
    }

    pub fn chain(&self, chain_id: &str) -> Result<&ChainDefinition, EngineError> {
        self.chains
            .get(chain_id)
            .ok_or_else(|| EngineError::NotFound(format!("production chain: {}", chain_id)))
    }

    pub fn consumable(&self, item_id: &str) -> Result<&ConsumableDefinition, EngineError> {
        self.consumables
            .get(item_id)
            .ok_or_else(|| EngineError::NotFound(format!("consumable: {}", item_id)))
    }

    pub fn task(&self, task_id: &str) -> Result<&TaskDefinition, EngineError> {
        self.tasks
            .get(task_id)
            .ok_or_else(|| EngineError::NotFound(format!("task: {}", task_id)))
    }

    pub fn achievement(&self, achievement_id: &str) -> Result<&AchievementDefinition, EngineError> {
        self.achievements
            .iter()
            .find(|a| a.id == achievement_id)
            .ok_or_else(|| EngineError::NotFound(format!("achievement: {}", achievement_id)))
    }

    pub fn achievements(&self) -> &[AchievementDefinition] {
        &self.achievements
    }

    /// Definitions of `condition_type` already satisfied by `current_value`.
    pub fn achievements_for(
        &self,
        condition_type: ConditionType,
        current_value: u64,
    ) -> impl Iterator<Item = &AchievementDefinition> {
        self.achievements.iter().filter(move |a| {
            a.condition_type == condition_type && a.condition_value <= current_value
        })
    }

    pub fn counts(&self) -> CatalogCounts {
        CatalogCounts {
            seeds: self.seeds.len(),
            animals: self.animals.len(),
            chains: self.chains.len(),
            consumables: self.consumables.len(),
            tasks: self.tasks.len(),
            achievements: self.achievements.len(),
        }
    }

    /// Small built-in catalog used when no catalog file is configured.
    pub fn starter() -> Self {
        match Self::from_file(starter_file()) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("starter catalog failed validation, using an empty catalog: {}", e);
                Self::default()
            }
        }
    }
}

fn starter_file() -> CatalogFile {
    CatalogFile {
        seeds: vec![
            SeedDefinition {
                item_id: "carrot_seed".to_string(),
                name: "Carrot".to_string(),
                growth_seconds: 2 * 60 * 60,
                outputs: vec![ItemQuantity::new("carrot", 3)],
            },
            SeedDefinition {
                item_id: "wheat_seed".to_string(),
                name: "Wheat".to_string(),
                growth_seconds: 4 * 60 * 60,
                outputs: vec![ItemQuantity::new("wheat", 5)],
            },
            SeedDefinition {
                item_id: "cress_seed".to_string(),
                name: "Cress".to_string(),
                growth_seconds: 0,
                outputs: vec![ItemQuantity::new("cress", 1)],
            },
        ],
        animals: vec![
            AnimalDefinition {
                id: "chicken".to_string(),
                name: "Chicken".to_string(),
                production_seconds: 60 * 60,
                outputs: vec![ItemQuantity::new("egg", 2)],
                cost: vec![ItemQuantity::new("coin", 50)],
                feed_item: Some("wheat".to_string()),
                feed_happiness: 10,
            },
            AnimalDefinition {
                id: "cow".to_string(),
                name: "Cow".to_string(),
                production_seconds: 3 * 60 * 60,
                outputs: vec![ItemQuantity::new("milk", 1)],
                cost: vec![ItemQuantity::new("coin", 200)],
                feed_item: Some("wheat".to_string()),
                feed_happiness: 15,
            },
        ],
        chains: vec![
            ChainDefinition {
                id: "bread".to_string(),
                name: "Bread".to_string(),
                duration_seconds: 30 * 60,
                ingredients: vec![ItemQuantity::new("wheat", 3)],
                outputs: vec![ItemQuantity::new("bread", 1)],
            },
            ChainDefinition {
                id: "cake".to_string(),
                name: "Cake".to_string(),
                duration_seconds: 90 * 60,
                ingredients: vec![
                    ItemQuantity::new("wheat", 2),
                    ItemQuantity::new("egg", 2),
                    ItemQuantity::new("milk", 1),
                ],
                outputs: vec![ItemQuantity::new("cake", 1)],
            },
        ],
        consumables: vec![
            ConsumableDefinition {
                item_id: "pet_snack".to_string(),
                hunger: 15,
                thirst: 0,
                happiness: 5,
            },
            ConsumableDefinition {
                item_id: "cake".to_string(),
                hunger: 40,
                thirst: 0,
                happiness: 25,
            },
        ],
        tasks: vec![
            TaskDefinition {
                id: "fractions_intro".to_string(),
                zone_id: "math".to_string(),
                experience: 400,
            },
            TaskDefinition {
                id: "algebra_basics".to_string(),
                zone_id: "math".to_string(),
                experience: 700,
            },
            TaskDefinition {
                id: "cell_biology".to_string(),
                zone_id: "science".to_string(),
                experience: 500,
            },
        ],
        achievements: vec![
            AchievementDefinition::new(
                "first_steps",
                "First Steps",
                "Earn your first 100 experience",
                ConditionType::XpEarned,
                100,
            ),
            AchievementDefinition::new(
                "scholar",
                "Scholar",
                "Earn 5000 experience in a zone",
                ConditionType::XpEarned,
                5000,
            ),
            AchievementDefinition::new(
                "level_two",
                "Moving Up",
                "Reach level 2 in any zone",
                ConditionType::LevelReached,
                2,
            ),
            AchievementDefinition::new(
                "level_five",
                "Seasoned",
                "Reach level 5 in any zone",
                ConditionType::LevelReached,
                5,
            ),
            AchievementDefinition::new(
                "first_task",
                "Getting Started",
                "Complete your first task",
                ConditionType::TasksCompleted,
                1,
            ),
            AchievementDefinition::new(
                "ten_tasks",
                "Diligent",
                "Complete ten tasks",
                ConditionType::TasksCompleted,
                10,
            ),
            AchievementDefinition::new(
                "perfectionist",
                "Perfectionist",
                "Receive a grade of 90 or more",
                ConditionType::PerfectGrade,
                90,
            ),
            AchievementDefinition::new(
                "honor_roll",
                "Honor Roll",
                "Keep an average grade of 85 or more",
                ConditionType::HighAverage,
                85,
            )
            .as_hidden(),
        ],
    }
}

fn index<T>(items: Vec<T>, key: impl Fn(&T) -> String) -> HashMap<String, T> {
    items.into_iter().map(|item| (key(&item), item)).collect()
}

fn check_unique<'a>(
    family: &str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(EngineError::InvalidInput(format!(
                "duplicate {} id: {}",
                family, id
            )));
        }
    }
    Ok(())
}

fn check_quantities(owner: &str, items: &[ItemQuantity]) -> Result<(), EngineError> {
    if let Some(bad) = items.iter().find(|i| i.quantity == 0) {
        return Err(EngineError::InvalidInput(format!(
            "{}: zero quantity for {}",
            owner, bad.item_id
        )));
    }
    Ok(())
}

fn check_duration(owner: &str, seconds: u64) -> Result<(), EngineError> {
    if seconds > MAX_TIMER_SECONDS {
        return Err(EngineError::InvalidInput(format!(
            "{}: duration {}s exceeds limit",
            owner, seconds
        )));
    }
    Ok(())
}

/// Reject catalogs the engine could not honour.
pub fn validate(file: &CatalogFile) -> Result<(), EngineError> {
    check_unique("seed", file.seeds.iter().map(|s| s.item_id.as_str()))?;
    check_unique("animal", file.animals.iter().map(|a| a.id.as_str()))?;
    check_unique("chain", file.chains.iter().map(|c| c.id.as_str()))?;
    check_unique(
        "consumable",
        file.consumables.iter().map(|c| c.item_id.as_str()),
    )?;
    check_unique("task", file.tasks.iter().map(|t| t.id.as_str()))?;
    check_unique(
        "achievement",
        file.achievements.iter().map(|a| a.id.as_str()),
    )?;

    for seed in &file.seeds {
        check_quantities(&seed.item_id, &seed.outputs)?;
        check_duration(&seed.item_id, seed.growth_seconds)?;
    }
    for animal in &file.animals {
        check_quantities(&animal.id, &animal.outputs)?;
        check_quantities(&animal.id, &animal.cost)?;
        check_duration(&animal.id, animal.production_seconds)?;
    }
    for chain in &file.chains {
        if chain.outputs.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "chain {} has no outputs",
                chain.id
            )));
        }
        check_quantities(&chain.id, &chain.ingredients)?;
        check_quantities(&chain.id, &chain.outputs)?;
        check_duration(&chain.id, chain.duration_seconds)?;
    }
    Ok(())
}
