use std::borrow::Cow;
use std::sync::Arc;

use crate::constants::{DEFAULT_COLOR, DEFAULT_SYMBOL, MAX_COLOR_LEN};
use crate::error::StrategyFault;
use crate::types::{Attack, Direction, Position, SpeciesInfo};

/// What one adjacent cell looks like to a critter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Neighbor {
    Empty,
    Food,
    Critter {
        species: Arc<str>,
        symbol: char,
        ally: bool,
    },
}

/// Owned, read-only view handed to `decide_move`. Built from the grid as it
/// stood when the turn began.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sensing {
    pub position: Position,
    /// North, South, East, West.
    pub neighbors: [(Direction, Neighbor); 4],
    pub direction_to_food: Direction,
    pub direction_to_enemy: Direction,
}

impl Sensing {
    pub fn neighbor(&self, dir: Direction) -> Option<&Neighbor> {
        self.neighbors
            .iter()
            .find(|(d, _)| *d == dir)
            .map(|(_, neighbor)| neighbor)
    }

    /// First direction in `order` whose neighbor matches.
    pub fn find_neighbor(
        &self,
        order: &[Direction],
        accept: impl Fn(&Neighbor) -> bool,
    ) -> Option<Direction> {
        order
            .iter()
            .copied()
            .find(|dir| self.neighbor(*dir).is_some_and(&accept))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opponent {
    pub species: Arc<str>,
    pub symbol: char,
}

/// Behavior of one critter. Each critter owns its own instance.
pub trait Strategy: Send {
    fn decide_move(&mut self, sensing: &Sensing) -> Direction;
    fn decide_attack(&mut self, opponent: &Opponent) -> Attack;
    fn decide_eat(&mut self) -> bool;
    fn display_symbol(&self) -> char;
    fn display_color(&self) -> String;
}

/// Stand-in for a strategy that could not be constructed.
#[derive(Debug, Default)]
pub struct FallbackStrategy;

impl Strategy for FallbackStrategy {
    fn decide_move(&mut self, _sensing: &Sensing) -> Direction {
        Direction::Center
    }

    fn decide_attack(&mut self, _opponent: &Opponent) -> Attack {
        Attack::Scratch
    }

    fn decide_eat(&mut self) -> bool {
        false
    }

    fn display_symbol(&self) -> char {
        DEFAULT_SYMBOL
    }

    fn display_color(&self) -> String {
        DEFAULT_COLOR.to_string()
    }
}

pub fn check_symbol(symbol: char) -> Result<char, StrategyFault> {
    if symbol.is_control() || symbol.is_whitespace() {
        return Err(StrategyFault::InvalidReply(format!(
            "symbol {symbol:?} is not printable"
        )));
    }
    Ok(symbol)
}

pub fn check_color(color: String) -> Result<String, StrategyFault> {
    if color.trim().is_empty() {
        return Err(StrategyFault::InvalidReply("empty color".to_string()));
    }
    if color.len() > MAX_COLOR_LEN {
        return Err(StrategyFault::InvalidReply(format!(
            "color is {} bytes, limit is {MAX_COLOR_LEN}",
            color.len()
        )));
    }
    Ok(color)
}

pub type StrategyFactory = Arc<dyn Fn(u64) -> Box<dyn Strategy> + Send + Sync + 'static>;

#[derive(Clone)]
pub struct SpeciesEntry {
    pub name: Arc<str>,
    pub description: Cow<'static, str>,
    pub factory: StrategyFactory,
}

/// Named strategy factories, in registration order.
#[derive(Clone, Default)]
pub struct SpeciesRegistry {
    entries: Vec<SpeciesEntry>,
}

impl std::fmt::Debug for SpeciesRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeciesRegistry")
            .field(
                "species",
                &self.entries.iter().map(|e| &*e.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl SpeciesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a species, replacing any earlier entry with the same name.
    pub fn register<F>(
        &mut self,
        name: impl Into<Arc<str>>,
        description: impl Into<Cow<'static, str>>,
        factory: F,
    ) where
        F: Fn(u64) -> Box<dyn Strategy> + Send + Sync + 'static,
    {
        let entry = SpeciesEntry {
            name: name.into(),
            description: description.into(),
            factory: Arc::new(factory),
        };
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SpeciesEntry> {
        self.entries.iter().find(|e| &*e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn list(&self) -> Vec<SpeciesInfo> {
        self.entries
            .iter()
            .map(|e| SpeciesInfo {
                name: e.name.to_string(),
                description: e.description.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensing_with(neighbors: [Neighbor; 4]) -> Sensing {
        let [n, s, e, w] = neighbors;
        Sensing {
            position: Position { x: 0, y: 0 },
            neighbors: [
                (Direction::North, n),
                (Direction::South, s),
                (Direction::East, e),
                (Direction::West, w),
            ],
            direction_to_food: Direction::Center,
            direction_to_enemy: Direction::Center,
        }
    }

    #[test]
    fn find_neighbor_follows_the_given_order() {
        let sensing = sensing_with([
            Neighbor::Empty,
            Neighbor::Food,
            Neighbor::Empty,
            Neighbor::Food,
        ]);
        let food = |n: &Neighbor| *n == Neighbor::Food;
        assert_eq!(
            sensing.find_neighbor(&Direction::CARDINALS, food),
            Some(Direction::South)
        );
        assert_eq!(
            sensing.find_neighbor(&[Direction::West, Direction::South], food),
            Some(Direction::West)
        );
        assert_eq!(sensing.find_neighbor(&[Direction::North, Direction::Center], food), None);
        assert_eq!(sensing.neighbor(Direction::West), Some(&Neighbor::Food));
        assert_eq!(sensing.neighbor(Direction::Center), None);
    }

    #[test]
    fn display_values_are_validated() {
        assert_eq!(check_symbol('A'), Ok('A'));
        assert!(check_symbol(' ').is_err());
        assert!(check_symbol('\n').is_err());
        assert_eq!(check_color("#8B0000".to_string()), Ok("#8B0000".to_string()));
        assert!(check_color(String::new()).is_err());
        assert!(check_color("x".repeat(MAX_COLOR_LEN + 1)).is_err());
    }

    #[test]
    fn registry_keeps_order_and_replaces_by_name() {
        let mut registry = SpeciesRegistry::new();
        registry.register("Rock", "first", |_| Box::new(FallbackStrategy));
        registry.register("Moss", "second", |_| Box::new(FallbackStrategy));
        registry.register("Rock", "replaced", |_| Box::new(FallbackStrategy));

        let names: Vec<String> = registry.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Rock", "Moss"]);
        assert_eq!(
            registry.get("Rock").map(|e| e.description.as_ref()),
            Some("replaced")
        );
        assert!(!registry.contains("Lichen"));
    }
}
