use super::*;

impl GameEngine {
    /// Marks who sleeps through this turn and counts their sleep down.
    pub(super) fn apply_sleep(&mut self) -> Vec<bool> {
        self.critters
            .iter_mut()
            .map(|critter| {
                if critter.alive && critter.sleep_turns > 0 {
                    critter.sleep_turns -= 1;
                    true
                } else {
                    false
                }
            })
            .collect()
    }

    pub(super) fn sensing_for(&self, critter: &CritterInternal) -> Sensing {
        let radius = self.config.rules.sense_radius;
        let neighbors = self
            .world
            .neighbors_of(critter.position)
            .map(|(dir, content)| (dir, self.neighbor_view(content, critter.species)));
        Sensing {
            position: critter.position,
            neighbors,
            direction_to_food: self.world.nearest_food_direction(critter.position, radius),
            direction_to_enemy: self.world.nearest_enemy_direction(
                critter.position,
                critter.species,
                radius,
            ),
        }
    }

    fn neighbor_view(&self, content: CellContent, own: SpeciesId) -> Neighbor {
        match content {
            CellContent::Empty => Neighbor::Empty,
            CellContent::Food => Neighbor::Food,
            CellContent::Critter(occupant) => Neighbor::Critter {
                species: self.species[occupant.species.0 as usize].name.clone(),
                symbol: self.critters[occupant.critter.index()].symbol,
                ally: occupant.species == own,
            },
        }
    }

    /// Asks every living, awake critter for a move. All sensing views come from
    /// the grid as it stood before anyone moved, and every request shares one
    /// deadline.
    pub(super) fn collect_moves(&mut self, asleep: &[bool]) -> Vec<Direction> {
        let mut moves = vec![Direction::Center; self.critters.len()];
        let mut faults = Vec::new();
        let mut tickets = Vec::new();

        for idx in 0..self.critters.len() {
            if !self.critters[idx].alive || asleep[idx] {
                continue;
            }
            let sensing = self.sensing_for(&self.critters[idx]);
            match self.hosts[idx].dispatch(Request::Move(sensing)) {
                Ok(ticket) => tickets.push((idx, ticket)),
                Err(fault) => faults.push((self.critters[idx].id, fault)),
            }
        }

        let deadline = Instant::now() + self.config.rules.decision_budget;
        for (idx, ticket) in tickets {
            match expect_move(self.hosts[idx].collect(ticket, deadline)) {
                Ok(dir) => moves[idx] = dir,
                Err(fault) => faults.push((self.critters[idx].id, fault)),
            }
        }

        faults.sort_by_key(|(id, _)| *id);
        for (id, fault) in faults {
            self.record_fault(id, DecisionKind::Move, fault);
        }
        moves
    }

    /// Lifts every living critter off the index, moves it to its wrapped
    /// target and hands the resulting cell groups to fight resolution.
    pub(super) fn execute_moves(
        &mut self,
        moves: &[Direction],
        asleep: &[bool],
    ) -> Result<(), InvariantViolation> {
        let size = self.world.size();
        let starts: Vec<Position> = self.critters.iter().map(|c| c.position).collect();
        let mut cells: BTreeMap<Position, Vec<CritterId>> = BTreeMap::new();

        for critter in self.critters.iter_mut().filter(|c| c.alive) {
            if self.world.remove_critter(critter.position, critter.id).is_none() {
                return Err(InvariantViolation::IndexMismatch {
                    critter: critter.id,
                    cell: critter.position,
                });
            }
            let dir = moves[critter.id.index()];
            let target = size.step(critter.position, dir);
            if target != critter.position {
                self.events.push(TurnEvent::Moved {
                    critter_id: critter.id,
                    from: critter.position.as_tuple(),
                    to: target.as_tuple(),
                    direction: dir,
                });
            }
            critter.position = target;
            cells.entry(target).or_default().push(critter.id);
        }

        self.resolve_contests(cells, &starts, asleep)
    }
}
