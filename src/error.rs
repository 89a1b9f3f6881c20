use thiserror::Error;

use crate::types::{CritterId, Position};

/// Rejected new-game parameters. Raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least one species must be selected")]
    NoSpecies,
    #[error("unknown species: {0}")]
    UnknownSpecies(String),
    #[error("species selected twice: {0}")]
    DuplicateSpecies(String),
    #[error("species name {0:?} is reserved")]
    ReservedSpeciesName(String),
    #[error("world dimensions must be between 1 and {max}, got {width}x{height}")]
    InvalidDimensions { width: i32, height: i32, max: i32 },
    #[error("critters per species must be at least 1")]
    NoCritters,
    #[error("{requested} critters do not fit on {cells} cells")]
    TooManyCritters { requested: usize, cells: usize },
    #[error("{requested} critters exceed the limit of {max} per game")]
    CritterLimit { requested: usize, max: usize },
    #[error("turn delay must be a finite number of seconds")]
    InvalidTurnDelay,
}

/// A control command that is not valid in the current game phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("no game created; create one first")]
    NoGame,
    #[error("game is already running")]
    AlreadyRunning,
    #[error("game is not running")]
    NotRunning,
    #[error("game has ended; create a new game")]
    GameEnded,
    #[error("game halted after an internal error; create a new game")]
    Halted,
}

/// Grid state the turn pipeline must never produce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("cell {cell} already holds {occupant} while placing {incoming}")]
    CellOccupied {
        cell: Position,
        occupant: CritterId,
        incoming: CritterId,
    },
    #[error("grid index disagrees with roster for {critter} at {cell}")]
    IndexMismatch { critter: CritterId, cell: Position },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

/// Errors surfaced by the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("simulation halted: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl From<StepError> for ControlError {
    fn from(err: StepError) -> Self {
        match err {
            StepError::Transition(err) => Self::Transition(err),
            StepError::Invariant(err) => Self::Invariant(err),
        }
    }
}

/// Why a strategy decision was replaced with its default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyFault {
    #[error("strategy panicked: {0}")]
    Panicked(String),
    #[error("decision exceeded its time budget")]
    TimedOut,
    #[error("strategy still busy with an earlier decision")]
    Busy,
    #[error("invalid reply: {0}")]
    InvalidReply(String),
    #[error("strategy worker is gone")]
    Disconnected,
}
