use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use crate::combat::{resolve_cell, CellResolution, Combatant};
use crate::config::GameConfig;
use crate::constants::{DEFAULT_COLOR, DEFAULT_SYMBOL, DRAW};
use crate::error::{
    ConfigError, ControlError, InvariantViolation, StepError, StrategyFault, TransitionError,
};
use crate::sandbox::{expect_move, Reply, Request, StrategyHost};
use crate::strategy::{check_color, check_symbol, Neighbor, Opponent, Sensing, SpeciesRegistry};
use crate::types::{
    Attack, CritterId, CritterView, DecisionKind, Direction, GamePhase, GameStatus, Position,
    Snapshot, SpeciesId, TurnEvent,
};
use crate::world::{CellContent, Occupant, World};

mod combat_system;
mod feeding_system;
mod movement_system;
mod spawn_system;
mod utils;

use self::utils::{now_rfc3339, strategy_seed};

#[derive(Clone, Debug)]
struct SpeciesState {
    name: Arc<str>,
    score: i64,
    faults: u64,
}

#[derive(Clone, Debug)]
struct CritterInternal {
    id: CritterId,
    species: SpeciesId,
    position: Position,
    alive: bool,
    sleep_turns: u32,
    score: i64,
    food_eaten: u32,
    fights_won: u32,
    faults: u64,
    symbol: char,
    color: String,
}

/// One game: the roster, the grid and the per-turn pipeline. Critter ids are
/// roster indices, and `hosts[i]` runs critter `i`'s strategy.
#[derive(Debug)]
pub struct GameEngine {
    pub config: GameConfig,
    created_at: String,
    phase: GamePhase,
    turn: u64,
    world: World,
    rng: StdRng,
    species: Vec<SpeciesState>,
    critters: Vec<CritterInternal>,
    hosts: Vec<StrategyHost>,
    events: Vec<TurnEvent>,
    winner: Option<String>,
    halt_reason: Option<InvariantViolation>,
}

impl GameEngine {
    /// Places `critters_per_species` of each species on random cells, then the
    /// initial food on cells left empty.
    pub fn new(config: GameConfig, registry: &SpeciesRegistry) -> Result<Self, ControlError> {
        let mut engine = Self::empty(config, registry)?;
        let per_species = engine.config.critters_per_species;
        let requested = per_species * engine.species.len();
        let cells = engine.world.pick_free_cells(&mut engine.rng, requested);
        if cells.len() < requested {
            return Err(ConfigError::TooManyCritters {
                requested,
                cells: engine.world.size().cell_count(),
            }
            .into());
        }
        let placements: Vec<(SpeciesId, Position)> = cells
            .into_iter()
            .enumerate()
            .map(|(offset, pos)| (SpeciesId((offset / per_species) as u16), pos))
            .collect();
        engine.spawn_critters(registry, &placements)?;
        engine.spawn_food(engine.config.initial_food);
        engine.finish_setup();
        Ok(engine)
    }

    /// Builds a game with explicit starting cells. Species names must be part
    /// of `config.species`; no random food is placed.
    pub fn from_layout(
        config: GameConfig,
        registry: &SpeciesRegistry,
        critters: &[(&str, Position)],
        food: &[Position],
    ) -> Result<Self, ControlError> {
        let mut engine = Self::empty(config, registry)?;
        let size = engine.world.size();
        let mut placements = Vec::with_capacity(critters.len());
        for (name, pos) in critters {
            let Some(idx) = engine.species.iter().position(|s| &*s.name == *name) else {
                return Err(ConfigError::UnknownSpecies((*name).to_string()).into());
            };
            placements.push((SpeciesId(idx as u16), size.wrap(pos.x, pos.y)));
        }
        engine.spawn_critters(registry, &placements)?;
        for pos in food {
            engine.world.add_food(size.wrap(pos.x, pos.y));
        }
        engine.finish_setup();
        Ok(engine)
    }

    fn empty(config: GameConfig, registry: &SpeciesRegistry) -> Result<Self, ControlError> {
        let mut species = Vec::with_capacity(config.species.len());
        for name in &config.species {
            let Some(entry) = registry.get(name) else {
                return Err(ConfigError::UnknownSpecies(name.to_string()).into());
            };
            species.push(SpeciesState {
                name: entry.name.clone(),
                score: 0,
                faults: 0,
            });
        }
        Ok(Self {
            created_at: now_rfc3339(),
            phase: GamePhase::New,
            turn: 0,
            world: World::new(config.size),
            rng: StdRng::seed_from_u64(config.seed),
            species,
            critters: Vec::new(),
            hosts: Vec::new(),
            events: Vec::new(),
            winner: None,
            halt_reason: None,
            config,
        })
    }

    fn finish_setup(&mut self) {
        self.refresh_displays();
        self.phase = GamePhase::Ready;
        info!(
            seed = self.config.seed,
            width = self.config.size.width,
            height = self.config.size.height,
            critters = self.critters.len(),
            food = self.world.food_count(),
            "game created"
        );
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn is_ended(&self) -> bool {
        self.phase == GamePhase::Ended
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        match self.phase {
            GamePhase::Ready | GamePhase::Paused => {
                self.phase = GamePhase::Running;
                info!(turn = self.turn, "game started");
                Ok(())
            }
            GamePhase::Running => Err(TransitionError::AlreadyRunning),
            other => Err(Self::rejected(other)),
        }
    }

    pub fn pause(&mut self) -> Result<(), TransitionError> {
        match self.phase {
            GamePhase::Running => {
                self.phase = GamePhase::Paused;
                info!(turn = self.turn, "game paused");
                Ok(())
            }
            GamePhase::Ready | GamePhase::Paused => Err(TransitionError::NotRunning),
            other => Err(Self::rejected(other)),
        }
    }

    fn rejected(phase: GamePhase) -> TransitionError {
        match phase {
            GamePhase::Ended => TransitionError::GameEnded,
            GamePhase::Halted => TransitionError::Halted,
            _ => TransitionError::NoGame,
        }
    }

    /// Resolves one turn. Strategy faults never surface here; an invariant
    /// violation halts the game and is returned.
    pub fn step(&mut self) -> Result<(), StepError> {
        match self.phase {
            GamePhase::Ready | GamePhase::Running | GamePhase::Paused => {}
            other => return Err(Self::rejected(other).into()),
        }
        self.turn += 1;

        let asleep = self.apply_sleep();
        let moves = self.collect_moves(&asleep);
        if let Err(violation) = self.execute_moves(&moves, &asleep) {
            return Err(self.halt(violation).into());
        }
        self.process_eating(&asleep);
        self.spawn_food(self.config.rules.food_per_turn);
        self.accrue_survival();
        self.refresh_displays();
        self.check_end();
        if let Err(violation) = self.verify_index() {
            return Err(self.halt(violation).into());
        }

        debug!(
            turn = self.turn,
            alive = self.critters.iter().filter(|c| c.alive).count(),
            food = self.world.food_count(),
            "turn resolved"
        );
        Ok(())
    }

    fn halt(&mut self, violation: InvariantViolation) -> InvariantViolation {
        error!(turn = self.turn, error = %violation, "invariant violated, halting game");
        self.phase = GamePhase::Halted;
        self.halt_reason = Some(violation.clone());
        violation
    }

    fn record_fault(&mut self, critter: CritterId, decision: DecisionKind, fault: StrategyFault) {
        let Some(state) = self.critters.get_mut(critter.index()) else {
            return;
        };
        state.faults += 1;
        let species = &mut self.species[state.species.0 as usize];
        species.faults += 1;
        warn!(
            critter = %critter,
            species = %species.name,
            decision = ?decision,
            reason = %fault,
            "strategy fault"
        );
        self.events.push(TurnEvent::StrategyFault {
            critter_id: critter,
            species: species.name.to_string(),
            decision,
            reason: fault.to_string(),
        });
    }

    /// Re-reads symbol and color from every living critter.
    fn refresh_displays(&mut self) {
        let mut faults = Vec::new();
        let mut tickets = Vec::new();
        for idx in 0..self.critters.len() {
            if !self.critters[idx].alive {
                continue;
            }
            match self.hosts[idx].dispatch(Request::Appearance) {
                Ok(ticket) => tickets.push((idx, ticket)),
                Err(fault) => {
                    self.critters[idx].symbol = DEFAULT_SYMBOL;
                    faults.push((self.critters[idx].id, fault));
                }
            }
        }

        let deadline = Instant::now() + self.config.rules.decision_budget;
        for (idx, ticket) in tickets {
            let id = self.critters[idx].id;
            match self.hosts[idx].collect(ticket, deadline) {
                Ok(Reply::Appearance { symbol, color }) => {
                    match check_symbol(symbol) {
                        Ok(symbol) => self.critters[idx].symbol = symbol,
                        Err(fault) => {
                            self.critters[idx].symbol = DEFAULT_SYMBOL;
                            faults.push((id, fault));
                        }
                    }
                    match check_color(color) {
                        Ok(color) => self.critters[idx].color = color,
                        Err(fault) => faults.push((id, fault)),
                    }
                }
                Ok(other) => {
                    self.critters[idx].symbol = DEFAULT_SYMBOL;
                    faults.push((
                        id,
                        StrategyFault::InvalidReply(format!("unexpected reply {other:?}")),
                    ));
                }
                Err(fault) => {
                    self.critters[idx].symbol = DEFAULT_SYMBOL;
                    faults.push((id, fault));
                }
            }
        }

        faults.sort_by_key(|(id, _)| *id);
        for (id, fault) in faults {
            self.record_fault(id, DecisionKind::Appearance, fault);
        }
    }

    fn check_end(&mut self) {
        let alive = self.alive_per_species();
        let living: Vec<usize> = (0..alive.len()).filter(|idx| alive[*idx] > 0).collect();
        let out_of_turns = self
            .config
            .rules
            .max_turns
            .is_some_and(|max| self.turn >= max);

        let winner = match living.as_slice() {
            [] => Some(DRAW.to_string()),
            [only] => Some(self.species[*only].name.to_string()),
            _ if out_of_turns => Some(self.leading_species()),
            _ => None,
        };

        if let Some(winner) = winner {
            info!(turn = self.turn, winner = %winner, "game ended");
            self.phase = GamePhase::Ended;
            self.events.push(TurnEvent::GameEnded {
                winner: winner.clone(),
            });
            self.winner = Some(winner);
        }
    }

    fn leading_species(&self) -> String {
        let Some(best) = self.species.iter().map(|s| s.score).max() else {
            return DRAW.to_string();
        };
        let mut leaders = self.species.iter().filter(|s| s.score == best);
        match (leaders.next(), leaders.next()) {
            (Some(leader), None) => leader.name.to_string(),
            _ => DRAW.to_string(),
        }
    }

    fn alive_per_species(&self) -> Vec<usize> {
        let mut alive = vec![0usize; self.species.len()];
        for critter in self.critters.iter().filter(|c| c.alive) {
            alive[critter.species.0 as usize] += 1;
        }
        alive
    }

    /// The grid index must hold exactly the living roster.
    fn verify_index(&self) -> Result<(), InvariantViolation> {
        let mut living = 0usize;
        for critter in self.critters.iter().filter(|c| c.alive) {
            living += 1;
            match self.world.occupant_at(critter.position) {
                Some(occupant) if occupant.critter == critter.id => {}
                _ => {
                    return Err(InvariantViolation::IndexMismatch {
                        critter: critter.id,
                        cell: critter.position,
                    })
                }
            }
        }
        if self.world.occupant_count() != living {
            for (cell, occupant) in self.world.occupants() {
                let indexed = self
                    .critters
                    .get(occupant.critter.index())
                    .is_some_and(|c| c.alive && c.position == cell);
                if !indexed {
                    return Err(InvariantViolation::IndexMismatch {
                        critter: occupant.critter,
                        cell,
                    });
                }
            }
        }
        Ok(())
    }

    fn species_map<T>(&self, value: impl Fn(usize, &SpeciesState) -> T) -> BTreeMap<String, T> {
        self.species
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.name.to_string(), value(idx, s)))
            .collect()
    }

    pub fn scores(&self) -> BTreeMap<String, i64> {
        self.species_map(|_, s| s.score)
    }

    pub fn status(&self) -> GameStatus {
        GameStatus {
            phase: self.phase,
            is_running: self.phase == GamePhase::Running,
            turn: self.turn,
            scores: self.scores(),
            winner: self.winner.clone(),
            halt_reason: self.halt_reason.as_ref().map(ToString::to_string),
        }
    }

    /// Copies the current state. With `include_events` the pending turn events
    /// are moved into the snapshot.
    pub fn build_snapshot(&mut self, include_events: bool) -> Snapshot {
        let alive = self.alive_per_species();
        Snapshot {
            turn: self.turn,
            phase: self.phase,
            width: self.config.size.width,
            height: self.config.size.height,
            critters: self
                .critters
                .iter()
                .map(|c| CritterView {
                    id: c.id,
                    species: self.species[c.species.0 as usize].name.to_string(),
                    x: c.position.x,
                    y: c.position.y,
                    alive: c.alive,
                    color: c.color.clone(),
                    symbol: c.symbol,
                    score: c.score,
                    sleeping: c.alive && c.sleep_turns > 0,
                    sleep_turns_remaining: c.sleep_turns,
                    food_eaten: c.food_eaten,
                    fights_won: c.fights_won,
                })
                .collect(),
            food: self
                .world
                .food_positions()
                .into_iter()
                .map(Position::as_tuple)
                .collect(),
            scores: self.scores(),
            alive: self.species_map(|idx, _| alive[idx]),
            faults: self.species_map(|_, s| s.faults),
            winner: self.winner.clone(),
            events: if include_events {
                std::mem::take(&mut self.events)
            } else {
                Vec::new()
            },
            created_at: self.created_at.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::{NewGameRequest, RuleSet};
    use crate::engine::GameEngine;
    use crate::error::{StepError, TransitionError};
    use crate::strategy::{Opponent, Sensing, SpeciesRegistry, Strategy};
    use crate::types::{Attack, CritterId, DecisionKind, Direction, GamePhase, Position, TurnEvent};

    #[derive(Clone)]
    struct Scripted {
        step: Direction,
        attack: Attack,
        eats: bool,
        panics: bool,
        forage: bool,
    }

    impl Strategy for Scripted {
        fn decide_move(&mut self, sensing: &Sensing) -> Direction {
            if self.panics {
                panic!("move blew up");
            }
            if self.forage {
                return sensing.direction_to_food;
            }
            self.step
        }

        fn decide_attack(&mut self, _opponent: &Opponent) -> Attack {
            self.attack
        }

        fn decide_eat(&mut self) -> bool {
            self.eats
        }

        fn display_symbol(&self) -> char {
            if self.panics {
                panic!("symbol blew up");
            }
            '*'
        }

        fn display_color(&self) -> String {
            "white".to_string()
        }
    }

    fn scripted(step: Direction, attack: Attack) -> Scripted {
        Scripted {
            step,
            attack,
            eats: false,
            panics: false,
            forage: false,
        }
    }

    fn registry(species: &[(&'static str, Scripted)]) -> SpeciesRegistry {
        let mut registry = SpeciesRegistry::new();
        for (name, strategy) in species {
            let strategy = strategy.clone();
            registry.register(*name, "test species", move |_| Box::new(strategy.clone()));
        }
        registry
    }

    fn engine(
        width: i32,
        height: i32,
        species: &[(&'static str, Scripted)],
        critters: &[(&str, Position)],
        food: &[Position],
    ) -> GameEngine {
        let registry = registry(species);
        let request = NewGameRequest {
            width,
            height,
            species: species.iter().map(|(name, _)| name.to_string()).collect(),
            critters_per_species: 1,
            initial_food: 0,
            food_per_turn: Some(0),
            seed: Some(1),
            ..NewGameRequest::default()
        };
        let rules = RuleSet {
            decision_budget: Duration::from_secs(2),
            ..RuleSet::default()
        };
        let config = request.validate(&registry, &rules).expect("valid config");
        GameEngine::from_layout(config, &registry, critters, food).expect("layout fits")
    }

    fn pos(x: i32, y: i32) -> Position {
        Position { x, y }
    }

    #[test]
    fn four_by_four_fight_ends_the_game() {
        let mut engine = engine(
            4,
            4,
            &[
                ("A", scripted(Direction::South, Attack::Roar)),
                ("B", scripted(Direction::Center, Attack::Scratch)),
            ],
            &[("A", pos(0, 0)), ("B", pos(0, 1))],
            &[],
        );
        engine.step().expect("step succeeds");
        let snapshot = engine.build_snapshot(true);

        let a = snapshot.critter(CritterId(0)).expect("A exists");
        let b = snapshot.critter(CritterId(1)).expect("B exists");
        assert_eq!((a.x, a.y), (0, 1));
        assert!(a.alive);
        assert!(!b.alive);
        assert_eq!(a.score, 3);
        assert_eq!(snapshot.scores["A"], 3);
        assert_eq!(snapshot.phase, GamePhase::Ended);
        assert_eq!(snapshot.winner.as_deref(), Some("A"));
        assert!(snapshot.events.iter().any(|e| matches!(
            e,
            TurnEvent::Fought {
                winner: Some(CritterId(0)),
                loser: Some(CritterId(1)),
                ..
            }
        )));
        assert_eq!(engine.step(), Err(StepError::Transition(TransitionError::GameEnded)));
    }

    #[test]
    fn moving_off_the_edge_wraps() {
        let mut engine = engine(
            3,
            3,
            &[
                ("Walker", scripted(Direction::North, Attack::Roar)),
                ("Rock", scripted(Direction::Center, Attack::Roar)),
            ],
            &[("Walker", pos(1, 0)), ("Rock", pos(0, 0))],
            &[],
        );
        engine.step().expect("step succeeds");
        let snapshot = engine.build_snapshot(false);
        let walker = snapshot.critter(CritterId(0)).expect("walker exists");
        assert_eq!((walker.x, walker.y), (1, 2));
    }

    #[test]
    fn survival_points_accrue_per_living_member() {
        let mut engine = engine(
            8,
            8,
            &[
                ("Rock", scripted(Direction::Center, Attack::Roar)),
                ("Moss", scripted(Direction::Center, Attack::Roar)),
            ],
            &[("Rock", pos(0, 0)), ("Rock", pos(2, 2)), ("Rock", pos(4, 4)), ("Moss", pos(6, 6))],
            &[],
        );
        engine.step().expect("step succeeds");
        engine.step().expect("step succeeds");
        let scores = engine.scores();
        assert_eq!(scores["Rock"], 6);
        assert_eq!(scores["Moss"], 2);
        assert_eq!(engine.phase(), GamePhase::Ready);
    }

    #[test]
    fn eating_sleeps_five_turns_then_acts_on_the_sixth() {
        let eater = Scripted {
            eats: true,
            ..scripted(Direction::East, Attack::Roar)
        };
        let mut engine = engine(
            10,
            1,
            &[("Eater", eater), ("Rock", scripted(Direction::Center, Attack::Roar))],
            &[("Eater", pos(0, 0)), ("Rock", pos(8, 0))],
            &[pos(1, 0)],
        );

        engine.step().expect("eating step");
        let snapshot = engine.build_snapshot(true);
        let view = snapshot.critter(CritterId(0)).expect("eater exists");
        assert_eq!(view.x, 1);
        assert_eq!(view.sleep_turns_remaining, 5);
        assert!(view.sleeping);
        assert_eq!(view.food_eaten, 1);
        assert_eq!(view.score, 2);
        assert!(snapshot.food.is_empty());

        for _ in 0..5 {
            engine.step().expect("sleeping step");
            let view = engine.build_snapshot(false).critters[0].clone();
            assert_eq!(view.x, 1);
        }
        assert!(!engine.build_snapshot(false).critters[0].sleeping);

        engine.step().expect("waking step");
        assert_eq!(engine.build_snapshot(false).critters[0].x, 2);
    }

    #[test]
    fn sleeping_critter_loses_to_an_attacker() {
        let eater = Scripted {
            eats: true,
            ..scripted(Direction::Center, Attack::Roar)
        };
        let mut engine = engine(
            6,
            1,
            &[("Sleeper", eater), ("Hunter", scripted(Direction::West, Attack::Scratch))],
            &[("Sleeper", pos(0, 0)), ("Hunter", pos(3, 0))],
            &[pos(0, 0)],
        );
        // Turn 1 the sleeper eats; the hunter reaches it on turn 3.
        for _ in 0..3 {
            engine.step().expect("step succeeds");
        }
        let snapshot = engine.build_snapshot(true);
        assert!(!snapshot.critters[0].alive);
        assert_eq!(snapshot.winner.as_deref(), Some("Hunter"));
        assert!(snapshot.events.iter().any(|e| matches!(
            e,
            TurnEvent::Fought {
                attacker_attack: None,
                defender_attack: Some(Attack::Scratch),
                ..
            }
        )));
    }

    #[test]
    fn tie_bounces_the_mover_back() {
        let mut engine = engine(
            5,
            5,
            &[
                ("A", scripted(Direction::East, Attack::Pounce)),
                ("B", scripted(Direction::Center, Attack::Pounce)),
            ],
            &[("A", pos(0, 0)), ("B", pos(1, 0))],
            &[],
        );
        engine.step().expect("step succeeds");
        let snapshot = engine.build_snapshot(true);
        assert_eq!((snapshot.critters[0].x, snapshot.critters[0].y), (0, 0));
        assert_eq!((snapshot.critters[1].x, snapshot.critters[1].y), (1, 0));
        assert!(snapshot.critters.iter().all(|c| c.alive));
        assert!(snapshot
            .events
            .iter()
            .any(|e| matches!(e, TurnEvent::Bounced { critter_id: CritterId(0), .. })));
    }

    #[test]
    fn bounce_into_an_occupied_start_cell_fights_again() {
        let mut engine = engine(
            5,
            5,
            &[
                ("A", scripted(Direction::East, Attack::Pounce)),
                ("B", scripted(Direction::Center, Attack::Pounce)),
                ("C", scripted(Direction::North, Attack::Pounce)),
            ],
            &[("A", pos(0, 0)), ("B", pos(1, 0)), ("C", pos(0, 1))],
            &[],
        );
        engine.step().expect("step succeeds");
        let snapshot = engine.build_snapshot(true);

        let resolution: Vec<String> = snapshot
            .events
            .iter()
            .filter_map(|event| match event {
                TurnEvent::Fought { x, y, winner, .. } => {
                    Some(format!("fought ({x}, {y}) winner={winner:?}"))
                }
                TurnEvent::Bounced { critter_id, x, y } => {
                    Some(format!("bounced {critter_id} ({x}, {y})"))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            resolution,
            vec![
                "fought (1, 0) winner=None",
                "bounced critter_0 (0, 0)",
                "fought (0, 0) winner=None",
                "bounced critter_2 (0, 1)",
            ]
        );

        let cells: Vec<(i32, i32)> = snapshot.critters.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(cells, vec![(0, 0), (1, 0), (0, 1)]);
        assert!(snapshot.critters.iter().all(|c| c.alive));
        assert_eq!(engine.phase(), GamePhase::Ready);
    }

    #[test]
    fn swapping_into_each_others_cells_is_allowed() {
        let mut engine = engine(
            5,
            1,
            &[
                ("A", scripted(Direction::East, Attack::Roar)),
                ("B", scripted(Direction::West, Attack::Roar)),
            ],
            &[("A", pos(0, 0)), ("B", pos(1, 0))],
            &[],
        );
        engine.step().expect("step succeeds");
        let snapshot = engine.build_snapshot(false);
        assert_eq!(snapshot.critters[0].x, 1);
        assert_eq!(snapshot.critters[1].x, 0);
    }

    #[test]
    fn same_species_never_fight_and_the_higher_id_bounces() {
        let forager = Scripted {
            forage: true,
            eats: true,
            ..scripted(Direction::Center, Attack::Roar)
        };
        let mut engine = engine(
            5,
            5,
            &[("Ant", forager), ("Other", scripted(Direction::Center, Attack::Roar))],
            &[("Ant", pos(0, 0)), ("Ant", pos(2, 0)), ("Other", pos(4, 4))],
            &[pos(1, 0)],
        );
        engine.step().expect("step succeeds");
        let snapshot = engine.build_snapshot(true);
        assert_eq!((snapshot.critters[0].x, snapshot.critters[0].y), (1, 0));
        assert_eq!((snapshot.critters[1].x, snapshot.critters[1].y), (2, 0));
        assert!(snapshot.critters.iter().all(|c| c.alive));
        assert_eq!(snapshot.critters[0].food_eaten, 1);
        assert!(!snapshot
            .events
            .iter()
            .any(|e| matches!(e, TurnEvent::Fought { .. })));
        assert!(snapshot
            .events
            .iter()
            .any(|e| matches!(e, TurnEvent::Bounced { critter_id: CritterId(1), .. })));
    }

    #[test]
    fn panicking_strategy_never_stops_the_engine() {
        let broken = Scripted {
            panics: true,
            ..scripted(Direction::East, Attack::Roar)
        };
        let mut engine = engine(
            20,
            20,
            &[("Broken", broken), ("Rock", scripted(Direction::Center, Attack::Roar))],
            &[("Broken", pos(0, 0)), ("Rock", pos(10, 10))],
            &[],
        );
        for _ in 0..1000 {
            engine.step().expect("faults are contained");
        }
        let snapshot = engine.build_snapshot(false);
        assert_eq!(snapshot.turn, 1000);
        assert_eq!(snapshot.phase, GamePhase::Ready);
        assert_eq!((snapshot.critters[0].x, snapshot.critters[0].y), (0, 0));
        assert_eq!(snapshot.critters[0].symbol, '?');
        // One move and one display fault per turn, plus the display read at setup.
        assert_eq!(snapshot.faults["Broken"], 2001);
        assert_eq!(snapshot.faults["Rock"], 0);
        assert_eq!(snapshot.scores["Rock"], 1000);
    }

    #[test]
    fn fault_events_name_the_decision() {
        let broken = Scripted {
            panics: true,
            ..scripted(Direction::East, Attack::Roar)
        };
        let mut engine = engine(
            6,
            6,
            &[("Broken", broken), ("Rock", scripted(Direction::Center, Attack::Roar))],
            &[("Broken", pos(0, 0)), ("Rock", pos(3, 3))],
            &[],
        );
        engine.build_snapshot(true);
        engine.step().expect("step succeeds");
        let decisions: Vec<DecisionKind> = engine
            .build_snapshot(true)
            .events
            .into_iter()
            .filter_map(|e| match e {
                TurnEvent::StrategyFault { decision, .. } => Some(decision),
                _ => None,
            })
            .collect();
        assert_eq!(decisions, vec![DecisionKind::Move, DecisionKind::Appearance]);
    }

    #[test]
    fn max_turns_ends_with_highest_score() {
        let registry = registry(&[
            ("Rock", scripted(Direction::Center, Attack::Roar)),
            ("Moss", scripted(Direction::Center, Attack::Roar)),
        ]);
        let request = NewGameRequest {
            width: 10,
            height: 10,
            species: vec!["Rock".into(), "Moss".into()],
            critters_per_species: 1,
            initial_food: 0,
            food_per_turn: Some(0),
            max_turns: Some(3),
            seed: Some(5),
            ..NewGameRequest::default()
        };
        let config = request.validate(&registry, &RuleSet::default()).expect("valid");
        let mut engine = GameEngine::from_layout(
            config,
            &registry,
            &[("Rock", pos(0, 0)), ("Rock", pos(5, 5)), ("Moss", pos(2, 7))],
            &[],
        )
        .expect("layout fits");
        for _ in 0..3 {
            engine.step().expect("step succeeds");
        }
        assert_eq!(engine.phase(), GamePhase::Ended);
        assert_eq!(engine.winner(), Some("Rock"));
    }

    #[test]
    fn equal_attacks_tie_and_the_game_continues() {
        let mut engine = engine(
            4,
            4,
            &[
                ("A", scripted(Direction::South, Attack::Roar)),
                ("B", scripted(Direction::Center, Attack::Roar)),
            ],
            &[("A", pos(0, 0)), ("B", pos(0, 1))],
            &[],
        );
        engine.step().expect("step succeeds");
        assert_eq!(engine.phase(), GamePhase::Ready);
        assert_eq!(engine.winner(), None);
    }

    #[test]
    fn phase_transitions_are_checked() {
        let mut engine = engine(
            4,
            4,
            &[
                ("A", scripted(Direction::Center, Attack::Roar)),
                ("B", scripted(Direction::Center, Attack::Roar)),
            ],
            &[("A", pos(0, 0)), ("B", pos(2, 2))],
            &[],
        );
        assert_eq!(engine.phase(), GamePhase::Ready);
        assert_eq!(engine.pause(), Err(TransitionError::NotRunning));
        engine.start().expect("start from ready");
        assert_eq!(engine.start(), Err(TransitionError::AlreadyRunning));
        engine.step().expect("step while running");
        assert_eq!(engine.phase(), GamePhase::Running);
        engine.pause().expect("pause while running");
        engine.step().expect("step while paused");
        assert_eq!(engine.phase(), GamePhase::Paused);
        assert!(!engine.status().is_running);
    }

    #[test]
    fn seeded_games_replay_identically() {
        let registry = crate::critters::default_registry();
        let request = NewGameRequest {
            width: 20,
            height: 15,
            critters_per_species: 6,
            initial_food: 10,
            species: vec!["Ant".into(), "Bird".into(), "Hippo".into()],
            seed: Some(2024),
            ..NewGameRequest::default()
        };
        let run = || {
            let rules = RuleSet {
                decision_budget: Duration::from_secs(2),
                ..RuleSet::default()
            };
            let config = request.validate(&registry, &rules).expect("valid");
            let mut engine = GameEngine::new(config, &registry).expect("engine builds");
            for _ in 0..40 {
                if engine.is_ended() {
                    break;
                }
                engine.step().expect("step succeeds");
            }
            let mut snapshot = engine.build_snapshot(false);
            snapshot.created_at.clear();
            snapshot
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn snapshot_drains_events_once() {
        let mut engine = engine(
            4,
            4,
            &[
                ("A", scripted(Direction::East, Attack::Roar)),
                ("B", scripted(Direction::Center, Attack::Roar)),
            ],
            &[("A", pos(0, 0)), ("B", pos(2, 2))],
            &[],
        );
        engine.step().expect("step succeeds");
        let first = engine.build_snapshot(true);
        let second = engine.build_snapshot(true);
        assert!(!first.events.is_empty());
        assert!(second.events.is_empty());
    }
}
