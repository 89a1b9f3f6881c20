use super::*;

impl GameEngine {
    /// Creates one critter per placement, in order, each with its own worker.
    /// Construction faults leave the critter on the fallback strategy.
    pub(super) fn spawn_critters(
        &mut self,
        registry: &SpeciesRegistry,
        placements: &[(SpeciesId, Position)],
    ) -> Result<(), ControlError> {
        let budget = self.config.rules.decision_budget;
        for (species, position) in placements {
            let name = &self.species[species.0 as usize].name;
            let Some(entry) = registry.get(name) else {
                return Err(ConfigError::UnknownSpecies(name.to_string()).into());
            };
            let id = CritterId(self.critters.len() as u32);
            self.world.place_critter(
                *position,
                Occupant {
                    critter: id,
                    species: *species,
                },
            )?;
            self.hosts.push(StrategyHost::spawn(
                id,
                entry.factory.clone(),
                strategy_seed(self.config.seed, id),
                budget,
            ));
            self.critters.push(CritterInternal {
                id,
                species: *species,
                position: *position,
                alive: true,
                sleep_turns: 0,
                score: 0,
                food_eaten: 0,
                fights_won: 0,
                faults: 0,
                symbol: DEFAULT_SYMBOL,
                color: DEFAULT_COLOR.to_string(),
            });
        }

        let deadline = Instant::now() + budget;
        let mut faults = Vec::new();
        for host in &mut self.hosts {
            if let Err(fault) = host.await_ready(deadline) {
                faults.push((host.critter(), fault));
            }
        }
        for (id, fault) in faults {
            self.record_fault(id, DecisionKind::Create, fault);
        }
        Ok(())
    }

    pub(super) fn spawn_food(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let placed = self.world.spawn_food(count, &mut self.rng);
        if placed > 0 {
            self.events.push(TurnEvent::FoodSpawned { count: placed });
        }
    }
}
