use super::*;

impl GameEngine {
    /// Offers food to every living critter that was awake this turn and now
    /// stands on a food cell.
    pub(super) fn process_eating(&mut self, asleep: &[bool]) {
        let rules = &self.config.rules;
        let (points, sleep_turns) = (rules.food_eaten_points, rules.sleep_turns_after_eating);

        for idx in 0..self.critters.len() {
            let (id, position) = {
                let critter = &self.critters[idx];
                if !critter.alive || asleep[idx] {
                    continue;
                }
                (critter.id, critter.position)
            };
            if !self.world.has_food_at(position) {
                continue;
            }
            match self.hosts[idx].decide_eat() {
                Ok(true) => {}
                Ok(false) => continue,
                Err(fault) => {
                    self.record_fault(id, DecisionKind::Eat, fault);
                    continue;
                }
            }

            self.world.remove_food(position);
            let critter = &mut self.critters[idx];
            critter.sleep_turns = sleep_turns;
            critter.food_eaten += 1;
            critter.score += points;
            self.species[critter.species.0 as usize].score += points;
            self.events.push(TurnEvent::Ate {
                critter_id: id,
                x: position.x,
                y: position.y,
            });
        }
    }

    pub(super) fn accrue_survival(&mut self) {
        let points = self.config.rules.survival_points;
        for critter in self.critters.iter_mut().filter(|c| c.alive) {
            critter.score += points;
            self.species[critter.species.0 as usize].score += points;
        }
    }
}
