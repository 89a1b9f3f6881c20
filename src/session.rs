use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{NewGameRequest, RuleSet};
use crate::constants::{clamp_turn_delay_secs, DEFAULT_TURN_DELAY_SECS};
use crate::engine::GameEngine;
use crate::error::{ConfigError, ControlError, TransitionError};
use crate::strategy::SpeciesRegistry;
use crate::types::{GamePhase, GameStatus, Snapshot, SpeciesInfo};

/// Command surface around at most one game. Replacing a game builds the new
/// engine completely before the old one is dropped.
#[derive(Debug)]
pub struct GameSession {
    registry: SpeciesRegistry,
    rules: RuleSet,
    engine: Option<GameEngine>,
    config: Option<NewGameRequest>,
    latest: Option<Arc<Snapshot>>,
    tick_delay_secs: f64,
}

impl GameSession {
    pub fn new(registry: SpeciesRegistry, rules: RuleSet) -> Self {
        Self {
            registry,
            rules,
            engine: None,
            config: None,
            latest: None,
            tick_delay_secs: DEFAULT_TURN_DELAY_SECS,
        }
    }

    pub fn species(&self) -> Vec<SpeciesInfo> {
        self.registry.list()
    }

    /// Effective configuration of the current game, with its seed.
    pub fn config(&self) -> Option<&NewGameRequest> {
        self.config.as_ref()
    }

    pub fn create_game(&mut self, request: &NewGameRequest) -> Result<Arc<Snapshot>, ControlError> {
        let config = request.validate(&self.registry, &self.rules)?;
        let tick_delay_secs = config.turn_delay_secs;
        let effective = config.to_request();
        let engine = GameEngine::new(config, &self.registry)?;

        self.engine = Some(engine);
        self.config = Some(effective);
        self.tick_delay_secs = tick_delay_secs;
        info!(tick_delay_secs, "game replaced");
        Ok(self.publish()?)
    }

    pub fn start(&mut self) -> Result<(), ControlError> {
        self.engine_mut()?.start()?;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), ControlError> {
        self.engine_mut()?.pause()?;
        Ok(())
    }

    /// Runs one turn and publishes the resulting snapshot. A halted game still
    /// publishes its final state before the error is returned.
    pub fn step(&mut self) -> Result<Arc<Snapshot>, ControlError> {
        let result = self.engine_mut()?.step();
        let snapshot = self.publish()?;
        result.map(|()| snapshot).map_err(ControlError::from)
    }

    pub fn snapshot(&self) -> Result<Arc<Snapshot>, ControlError> {
        self.latest
            .clone()
            .ok_or_else(|| TransitionError::NoGame.into())
    }

    pub fn status(&self) -> GameStatus {
        match &self.engine {
            Some(engine) => engine.status(),
            None => GameStatus {
                phase: GamePhase::New,
                is_running: false,
                turn: 0,
                scores: BTreeMap::new(),
                winner: None,
                halt_reason: None,
            },
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.engine
            .as_ref()
            .map_or(GamePhase::New, GameEngine::phase)
    }

    pub fn is_running(&self) -> bool {
        self.phase() == GamePhase::Running
    }

    /// Clamps to the allowed range and returns the stored value.
    pub fn set_tick_delay(&mut self, secs: f64) -> Result<f64, ConfigError> {
        if !secs.is_finite() {
            return Err(ConfigError::InvalidTurnDelay);
        }
        self.tick_delay_secs = clamp_turn_delay_secs(secs);
        Ok(self.tick_delay_secs)
    }

    pub fn tick_delay(&self) -> Duration {
        Duration::from_secs_f64(self.tick_delay_secs)
    }

    fn engine_mut(&mut self) -> Result<&mut GameEngine, TransitionError> {
        self.engine.as_mut().ok_or(TransitionError::NoGame)
    }

    fn publish(&mut self) -> Result<Arc<Snapshot>, TransitionError> {
        let snapshot = Arc::new(self.engine_mut()?.build_snapshot(true));
        self.latest = Some(snapshot.clone());
        Ok(snapshot)
    }
}
