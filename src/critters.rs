use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::strategy::{Neighbor, Opponent, Sensing, SpeciesRegistry, Strategy};
use crate::types::{Attack, Direction};

/// Turn order used by the wandering species: clockwise from north.
const COMPASS: [Direction; 4] = [
    Direction::North,
    Direction::East,
    Direction::South,
    Direction::West,
];

pub fn default_registry() -> SpeciesRegistry {
    let mut registry = SpeciesRegistry::new();
    registry.register(
        "Ant",
        "Walks in squares, scratches, eats everything",
        |seed| Box::new(Ant::new(seed)),
    );
    registry.register(
        "Bird",
        "Flies in squares, roars, never eats",
        |seed| Box::new(Bird::new(seed)),
    );
    registry.register(
        "Hippo",
        "Wanders toward food, pounces, always eats",
        |seed| Box::new(Hippo::new(seed)),
    );
    registry.register("Stone", "Never moves, roars when attacked", |_| {
        Box::new(Stone)
    });
    registry
}

/// Heads for food it can see or smell; otherwise walks a wandering square.
#[derive(Debug)]
pub struct Ant {
    rng: StdRng,
    heading: usize,
    wander_steps: u32,
}

impl Ant {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let heading = rng.random_range(0..COMPASS.len());
        Self {
            rng,
            heading,
            wander_steps: 0,
        }
    }
}

impl Strategy for Ant {
    fn decide_move(&mut self, sensing: &Sensing) -> Direction {
        if sensing.direction_to_food != Direction::Center {
            return sensing.direction_to_food;
        }
        if let Some(dir) = sensing.find_neighbor(&COMPASS, |n| *n == Neighbor::Food) {
            return dir;
        }

        self.wander_steps += 1;
        if self.wander_steps >= self.rng.random_range(2..=5) {
            self.wander_steps = 0;
            let turn = if self.rng.random_bool(0.5) { 1 } else { COMPASS.len() - 1 };
            self.heading = (self.heading + turn) % COMPASS.len();
        }
        COMPASS[self.heading]
    }

    fn decide_attack(&mut self, _opponent: &Opponent) -> Attack {
        Attack::Scratch
    }

    fn decide_eat(&mut self) -> bool {
        true
    }

    fn display_symbol(&self) -> char {
        'A'
    }

    fn display_color(&self) -> String {
        "#8B0000".to_string()
    }
}

/// Chases the nearest enemy, else any adjacent critter, else flies on.
#[derive(Debug)]
pub struct Bird {
    rng: StdRng,
    heading: Direction,
    flight_steps: u32,
}

impl Bird {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let heading = COMPASS[rng.random_range(0..COMPASS.len())];
        Self {
            rng,
            heading,
            flight_steps: 0,
        }
    }
}

impl Strategy for Bird {
    fn decide_move(&mut self, sensing: &Sensing) -> Direction {
        if sensing.direction_to_enemy != Direction::Center {
            self.heading = sensing.direction_to_enemy;
            return self.heading;
        }
        let critter = |n: &Neighbor| matches!(n, Neighbor::Critter { .. });
        if let Some(dir) = sensing.find_neighbor(&COMPASS, critter) {
            self.heading = dir;
            return dir;
        }

        self.flight_steps += 1;
        if self.flight_steps >= self.rng.random_range(3..=7) {
            self.flight_steps = 0;
            self.heading = COMPASS[self.rng.random_range(0..COMPASS.len())];
        }
        self.heading
    }

    fn decide_attack(&mut self, _opponent: &Opponent) -> Attack {
        Attack::Roar
    }

    fn decide_eat(&mut self) -> bool {
        false
    }

    fn display_symbol(&self) -> char {
        'B'
    }

    fn display_color(&self) -> String {
        "#1E90FF".to_string()
    }
}

/// Goes for food when it can, and greys out the longer it goes without.
#[derive(Debug)]
pub struct Hippo {
    rng: StdRng,
    hunger: u32,
}

impl Hippo {
    const HUNGRY_AFTER: u32 = 10;

    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            hunger: 0,
        }
    }

    pub fn hunger(&self) -> u32 {
        self.hunger
    }
}

impl Strategy for Hippo {
    fn decide_move(&mut self, sensing: &Sensing) -> Direction {
        self.hunger += 1;
        if sensing.direction_to_food != Direction::Center {
            return sensing.direction_to_food;
        }
        Direction::CARDINALS[self.rng.random_range(0..Direction::CARDINALS.len())]
    }

    fn decide_attack(&mut self, _opponent: &Opponent) -> Attack {
        Attack::Pounce
    }

    fn decide_eat(&mut self) -> bool {
        self.hunger = 0;
        true
    }

    fn display_symbol(&self) -> char {
        'H'
    }

    fn display_color(&self) -> String {
        if self.hunger > Self::HUNGRY_AFTER {
            "#696969".to_string()
        } else {
            "#808080".to_string()
        }
    }
}

#[derive(Debug, Default)]
pub struct Stone;

impl Strategy for Stone {
    fn decide_move(&mut self, _sensing: &Sensing) -> Direction {
        Direction::Center
    }

    fn decide_attack(&mut self, _opponent: &Opponent) -> Attack {
        Attack::Roar
    }

    fn decide_eat(&mut self) -> bool {
        false
    }

    fn display_symbol(&self) -> char {
        'S'
    }

    fn display_color(&self) -> String {
        "#A9A9A9".to_string()
    }
}
