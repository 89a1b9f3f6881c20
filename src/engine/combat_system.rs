use super::*;

impl GameEngine {
    /// Fights out every cell holding more than one critter. When several
    /// survive, the one that started the turn there keeps the cell (else the
    /// lowest id) and the rest go back to where they started, which may open a
    /// new contest. A critter is sent back at most once per turn.
    pub(super) fn resolve_contests(
        &mut self,
        mut cells: BTreeMap<Position, Vec<CritterId>>,
        starts: &[Position],
        asleep: &[bool],
    ) -> Result<(), InvariantViolation> {
        let mut bounced = vec![false; self.critters.len()];
        let mut contested: BTreeSet<Position> = cells
            .iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(cell, _)| *cell)
            .collect();

        while let Some(cell) = contested.pop_first() {
            let members = cells.get(&cell).cloned().unwrap_or_default();
            if members.len() < 2 {
                continue;
            }
            let resolution = self.fight_in_cell(cell, &members, asleep);
            let Some(&lowest) = resolution.survivors.first() else {
                cells.remove(&cell);
                continue;
            };
            let keeper = resolution
                .survivors
                .iter()
                .copied()
                .find(|id| starts[id.index()] == cell)
                .unwrap_or(lowest);
            cells.insert(cell, vec![keeper]);

            for id in resolution.survivors.into_iter().filter(|id| *id != keeper) {
                if bounced[id.index()] {
                    return Err(InvariantViolation::CellOccupied {
                        cell,
                        occupant: keeper,
                        incoming: id,
                    });
                }
                bounced[id.index()] = true;
                let home = starts[id.index()];
                self.critters[id.index()].position = home;
                self.events.push(TurnEvent::Bounced {
                    critter_id: id,
                    x: home.x,
                    y: home.y,
                });
                let occupants = cells.entry(home).or_default();
                occupants.push(id);
                if occupants.len() > 1 {
                    contested.insert(home);
                }
            }
        }

        for (cell, members) in cells {
            for id in members {
                let species = self.critters[id.index()].species;
                self.world.place_critter(
                    cell,
                    Occupant {
                        critter: id,
                        species,
                    },
                )?;
            }
        }
        Ok(())
    }

    fn fight_in_cell(
        &mut self,
        cell: Position,
        members: &[CritterId],
        asleep: &[bool],
    ) -> CellResolution {
        let combatants: Vec<Combatant> = members
            .iter()
            .map(|id| Combatant {
                id: *id,
                species: self.critters[id.index()].species,
                asleep: asleep[id.index()],
            })
            .collect();

        let mut faults = Vec::new();
        let resolution = {
            let hosts = &mut self.hosts;
            let critters = &self.critters;
            let species = &self.species;
            resolve_cell(&combatants, |me, other| {
                let opponent = Opponent {
                    species: species[other.species.0 as usize].name.clone(),
                    symbol: critters[other.id.index()].symbol,
                };
                hosts[me.id.index()]
                    .decide_attack(opponent)
                    .unwrap_or_else(|fault| {
                        faults.push((me.id, fault));
                        Attack::Scratch
                    })
            })
        };
        for (id, fault) in faults {
            self.record_fault(id, DecisionKind::Attack, fault);
        }

        let points = self.config.rules.fight_won_points;
        for encounter in &resolution.encounters {
            self.events.push(TurnEvent::Fought {
                x: cell.x,
                y: cell.y,
                attacker: encounter.first,
                defender: encounter.second,
                attacker_attack: encounter.first_attack,
                defender_attack: encounter.second_attack,
                winner: encounter.winner,
                loser: encounter.loser,
            });
            if let Some(winner) = encounter.winner {
                let critter = &mut self.critters[winner.index()];
                critter.score += points;
                critter.fights_won += 1;
                self.species[critter.species.0 as usize].score += points;
            }
            if let Some(loser) = encounter.loser {
                self.critters[loser.index()].alive = false;
                self.events.push(TurnEvent::Died { critter_id: loser });
            }
        }
        debug!(
            x = cell.x,
            y = cell.y,
            fights = resolution.encounters.len(),
            survivors = resolution.survivors.len(),
            "contested cell resolved"
        );
        resolution
    }
}
