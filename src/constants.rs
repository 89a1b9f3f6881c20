use std::time::Duration;

pub const SLEEP_TURNS_AFTER_EATING: u32 = 5;
pub const FOOD_SPAWN_PER_TURN: usize = 2;
pub const SENSE_RADIUS: u32 = 10;
pub const DECISION_TIMEOUT_MS: u64 = 100;

pub const FIGHT_WON_POINTS: i64 = 2;
pub const FOOD_EATEN_POINTS: i64 = 1;
pub const SURVIVAL_POINTS: i64 = 1;

pub const GAME_SIZE: f32 = 1.5;
pub const BASE_WIDTH: i32 = 30;
pub const BASE_HEIGHT: i32 = 25;
pub const BASE_CRITTERS_PER_SPECIES: usize = 15;
pub const BASE_FOOD_COUNT: usize = 25;
pub const MAX_GRID_SIDE: i32 = 512;
/// Every critter owns a worker thread, so the roster is capped per game.
pub const MAX_CRITTERS: usize = 2048;

pub const DEFAULT_TURN_DELAY_SECS: f64 = 0.2;
pub const MIN_TURN_DELAY_SECS: f64 = 0.05;
pub const MAX_TURN_DELAY_SECS: f64 = 2.0;

pub const DRAW: &str = "DRAW";
pub const DEFAULT_SYMBOL: char = '?';
pub const DEFAULT_COLOR: &str = "gray";
pub const MAX_COLOR_LEN: usize = 32;

pub fn default_width() -> i32 {
    scaled(BASE_WIDTH as f32) as i32
}

pub fn default_height() -> i32 {
    scaled(BASE_HEIGHT as f32) as i32
}

pub fn default_critters_per_species() -> usize {
    scaled(BASE_CRITTERS_PER_SPECIES as f32) as usize
}

pub fn default_initial_food() -> usize {
    scaled(BASE_FOOD_COUNT as f32) as usize
}

pub fn decision_timeout() -> Duration {
    Duration::from_millis(DECISION_TIMEOUT_MS)
}

pub fn clamp_turn_delay_secs(secs: f64) -> f64 {
    if !secs.is_finite() {
        return DEFAULT_TURN_DELAY_SECS;
    }
    secs.clamp(MIN_TURN_DELAY_SECS, MAX_TURN_DELAY_SECS)
}

fn scaled(base: f32) -> f32 {
    (base * GAME_SIZE).floor()
}
