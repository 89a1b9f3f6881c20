use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    North,
    South,
    East,
    West,
    Center,
}

impl Direction {
    /// The four moving directions, in tie-break order.
    pub const CARDINALS: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub fn offset(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::South => (0, 1),
            Self::East => (1, 0),
            Self::West => (-1, 0),
            Self::Center => (0, 0),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::South => Self::North,
            Self::East => Self::West,
            Self::West => Self::East,
            Self::Center => Self::Center,
        }
    }

}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Attack {
    Roar,
    Scratch,
    Pounce,
}

impl Attack {
    pub const ALL: [Attack; 3] = [Attack::Roar, Attack::Scratch, Attack::Pounce];

    pub fn beats(self, other: Attack) -> bool {
        matches!(
            (self, other),
            (Attack::Roar, Attack::Scratch)
                | (Attack::Scratch, Attack::Pounce)
                | (Attack::Pounce, Attack::Roar)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn as_tuple(self) -> (i32, i32) {
        (self.x, self.y)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CritterId(pub u32);

impl CritterId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for CritterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "critter_{}", self.0)
    }
}

/// Index into the engine's species table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpeciesId(pub u16);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    New,
    Ready,
    Running,
    Paused,
    Ended,
    Halted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Create,
    Move,
    Attack,
    Eat,
    Appearance,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CritterView {
    pub id: CritterId,
    pub species: String,
    pub x: i32,
    pub y: i32,
    pub alive: bool,
    pub color: String,
    pub symbol: char,
    pub score: i64,
    pub sleeping: bool,
    #[serde(rename = "sleepTurnsRemaining")]
    pub sleep_turns_remaining: u32,
    #[serde(rename = "foodEaten")]
    pub food_eaten: u32,
    #[serde(rename = "fightsWon")]
    pub fights_won: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Moved {
        #[serde(rename = "critterId")]
        critter_id: CritterId,
        from: (i32, i32),
        to: (i32, i32),
        direction: Direction,
    },
    Fought {
        x: i32,
        y: i32,
        attacker: CritterId,
        defender: CritterId,
        #[serde(rename = "attackerAttack")]
        attacker_attack: Option<Attack>,
        #[serde(rename = "defenderAttack")]
        defender_attack: Option<Attack>,
        winner: Option<CritterId>,
        loser: Option<CritterId>,
    },
    Bounced {
        #[serde(rename = "critterId")]
        critter_id: CritterId,
        x: i32,
        y: i32,
    },
    Ate {
        #[serde(rename = "critterId")]
        critter_id: CritterId,
        x: i32,
        y: i32,
    },
    Died {
        #[serde(rename = "critterId")]
        critter_id: CritterId,
    },
    StrategyFault {
        #[serde(rename = "critterId")]
        critter_id: CritterId,
        species: String,
        decision: DecisionKind,
        reason: String,
    },
    FoodSpawned {
        count: usize,
    },
    GameEnded {
        winner: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub turn: u64,
    pub phase: GamePhase,
    pub width: i32,
    pub height: i32,
    pub critters: Vec<CritterView>,
    pub food: Vec<(i32, i32)>,
    pub scores: BTreeMap<String, i64>,
    pub alive: BTreeMap<String, usize>,
    pub faults: BTreeMap<String, u64>,
    pub winner: Option<String>,
    pub events: Vec<TurnEvent>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl Snapshot {
    pub fn critter(&self, id: CritterId) -> Option<&CritterView> {
        self.critters.get(id.index()).filter(|view| view.id == id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameStatus {
    pub phase: GamePhase,
    #[serde(rename = "isRunning")]
    pub is_running: bool,
    pub turn: u64,
    pub scores: BTreeMap<String, i64>,
    pub winner: Option<String>,
    /// Set once the game halted on an internal error.
    #[serde(rename = "haltReason", skip_serializing_if = "Option::is_none", default)]
    pub halt_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeciesInfo {
    pub name: String,
    pub description: String,
}
