use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    clamp_turn_delay_secs, decision_timeout, default_critters_per_species, default_height,
    default_initial_food, default_width, DEFAULT_TURN_DELAY_SECS, DRAW, FIGHT_WON_POINTS,
    FOOD_EATEN_POINTS, FOOD_SPAWN_PER_TURN, MAX_CRITTERS, MAX_GRID_SIDE, SENSE_RADIUS,
    SLEEP_TURNS_AFTER_EATING, SURVIVAL_POINTS,
};
use crate::error::ConfigError;
use crate::strategy::SpeciesRegistry;
use crate::world::GridSize;

/// Turn rules shared by every game a process runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleSet {
    pub sleep_turns_after_eating: u32,
    pub food_per_turn: usize,
    pub sense_radius: u32,
    pub decision_budget: Duration,
    pub fight_won_points: i64,
    pub food_eaten_points: i64,
    pub survival_points: i64,
    pub max_turns: Option<u64>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            sleep_turns_after_eating: SLEEP_TURNS_AFTER_EATING,
            food_per_turn: FOOD_SPAWN_PER_TURN,
            sense_radius: SENSE_RADIUS,
            decision_budget: decision_timeout(),
            fight_won_points: FIGHT_WON_POINTS,
            food_eaten_points: FOOD_EATEN_POINTS,
            survival_points: SURVIVAL_POINTS,
            max_turns: None,
        }
    }
}

/// Body of `POST /api/game/new`. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewGameRequest {
    pub width: i32,
    pub height: i32,
    #[serde(rename = "crittersPerSpecies", alias = "critters_per_species")]
    pub critters_per_species: usize,
    #[serde(rename = "initialFood", alias = "initial_food")]
    pub initial_food: usize,
    #[serde(rename = "turnDelay", alias = "turn_delay")]
    pub turn_delay: f64,
    pub species: Vec<String>,
    pub seed: Option<u64>,
    #[serde(rename = "maxTurns", alias = "max_turns")]
    pub max_turns: Option<u64>,
    #[serde(rename = "foodPerTurn", alias = "food_per_turn")]
    pub food_per_turn: Option<usize>,
    #[serde(rename = "senseRadius", alias = "sense_radius")]
    pub sense_radius: Option<u32>,
}

impl Default for NewGameRequest {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            critters_per_species: default_critters_per_species(),
            initial_food: default_initial_food(),
            turn_delay: DEFAULT_TURN_DELAY_SECS,
            species: vec!["Ant".to_string(), "Bird".to_string()],
            seed: None,
            max_turns: None,
            food_per_turn: None,
            sense_radius: None,
        }
    }
}

/// A request that passed validation, with its seed resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct GameConfig {
    pub size: GridSize,
    pub species: Vec<Arc<str>>,
    pub critters_per_species: usize,
    pub initial_food: usize,
    pub turn_delay_secs: f64,
    pub seed: u64,
    pub rules: RuleSet,
}

impl GameConfig {
    /// The effective configuration in request form, as echoed to clients.
    pub fn to_request(&self) -> NewGameRequest {
        NewGameRequest {
            width: self.size.width,
            height: self.size.height,
            critters_per_species: self.critters_per_species,
            initial_food: self.initial_food,
            turn_delay: self.turn_delay_secs,
            species: self.species.iter().map(|s| s.to_string()).collect(),
            seed: Some(self.seed),
            max_turns: self.rules.max_turns,
            food_per_turn: Some(self.rules.food_per_turn),
            sense_radius: Some(self.rules.sense_radius),
        }
    }
}

impl NewGameRequest {
    pub fn validate(
        &self,
        registry: &SpeciesRegistry,
        base_rules: &RuleSet,
    ) -> Result<GameConfig, ConfigError> {
        if self.species.is_empty() {
            return Err(ConfigError::NoSpecies);
        }
        let mut seen = HashSet::new();
        let mut species = Vec::with_capacity(self.species.len());
        for name in &self.species {
            if name.eq_ignore_ascii_case(DRAW) {
                return Err(ConfigError::ReservedSpeciesName(name.clone()));
            }
            let Some(entry) = registry.get(name) else {
                return Err(ConfigError::UnknownSpecies(name.clone()));
            };
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateSpecies(name.clone()));
            }
            species.push(entry.name.clone());
        }

        let side_ok = |side: i32| (1..=MAX_GRID_SIDE).contains(&side);
        if !side_ok(self.width) || !side_ok(self.height) {
            return Err(ConfigError::InvalidDimensions {
                width: self.width,
                height: self.height,
                max: MAX_GRID_SIDE,
            });
        }
        let size = GridSize::new(self.width, self.height);

        if self.critters_per_species == 0 {
            return Err(ConfigError::NoCritters);
        }
        let requested = self.critters_per_species.saturating_mul(species.len());
        if requested > MAX_CRITTERS {
            return Err(ConfigError::CritterLimit {
                requested,
                max: MAX_CRITTERS,
            });
        }
        if requested > size.cell_count() {
            return Err(ConfigError::TooManyCritters {
                requested,
                cells: size.cell_count(),
            });
        }

        if !self.turn_delay.is_finite() {
            return Err(ConfigError::InvalidTurnDelay);
        }

        let mut rules = base_rules.clone();
        if let Some(max_turns) = self.max_turns {
            rules.max_turns = Some(max_turns);
        }
        if let Some(food_per_turn) = self.food_per_turn {
            rules.food_per_turn = food_per_turn;
        }
        if let Some(sense_radius) = self.sense_radius {
            rules.sense_radius = sense_radius;
        }

        Ok(GameConfig {
            size,
            species,
            critters_per_species: self.critters_per_species,
            initial_food: self.initial_food,
            turn_delay_secs: clamp_turn_delay_secs(self.turn_delay),
            seed: self.seed.unwrap_or_else(rand::random::<u64>),
            rules,
        })
    }
}
