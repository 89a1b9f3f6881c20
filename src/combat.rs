use std::collections::HashSet;

use crate::types::{Attack, CritterId, SpeciesId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Combatant {
    pub id: CritterId,
    pub species: SpeciesId,
    pub asleep: bool,
}

/// One fight inside a contested cell. `first` is always the lower id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Encounter {
    pub first: CritterId,
    pub second: CritterId,
    pub first_attack: Option<Attack>,
    pub second_attack: Option<Attack>,
    pub winner: Option<CritterId>,
    pub loser: Option<CritterId>,
}

impl Encounter {
    pub fn is_tie(&self) -> bool {
        self.winner.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellResolution {
    pub encounters: Vec<Encounter>,
    /// Ascending by id.
    pub survivors: Vec<CritterId>,
}

impl CellResolution {
    pub fn losers(&self) -> impl Iterator<Item = CritterId> + '_ {
        self.encounters.iter().filter_map(|encounter| encounter.loser)
    }
}

/// Settles every fight among critters sharing a cell. `choose_attack` is called
/// as `(attacker, opponent)` for each awake side of a fight, never for a sleeper.
pub fn resolve_cell(
    combatants: &[Combatant],
    mut choose_attack: impl FnMut(&Combatant, &Combatant) -> Attack,
) -> CellResolution {
    let mut order: Vec<Combatant> = combatants.to_vec();
    order.sort_by_key(|c| c.id);
    order.dedup_by_key(|c| c.id);

    let mut alive = vec![true; order.len()];
    let mut fought: HashSet<(usize, usize)> = HashSet::new();
    let mut encounters = Vec::new();

    loop {
        let Some((i, j)) = next_pairing(&order, &alive, &fought) else {
            break;
        };
        fought.insert((i, j));

        let (a, b) = (order[i], order[j]);
        let a_attack = (!a.asleep).then(|| choose_attack(&a, &b));
        let b_attack = (!b.asleep).then(|| choose_attack(&b, &a));

        let outcome = match (a_attack, b_attack) {
            (Some(x), Some(y)) if x.beats(y) => Some((i, j)),
            (Some(x), Some(y)) if y.beats(x) => Some((j, i)),
            (Some(_), None) => Some((i, j)),
            (None, Some(_)) => Some((j, i)),
            _ => None,
        };

        let (winner, loser) = match outcome {
            Some((w, l)) => {
                alive[l] = false;
                (Some(order[w].id), Some(order[l].id))
            }
            None => (None, None),
        };

        encounters.push(Encounter {
            first: a.id,
            second: b.id,
            first_attack: a_attack,
            second_attack: b_attack,
            winner,
            loser,
        });
    }

    let survivors = order
        .iter()
        .zip(&alive)
        .filter(|(_, alive)| **alive)
        .map(|(c, _)| c.id)
        .collect();

    CellResolution {
        encounters,
        survivors,
    }
}

fn next_pairing(
    order: &[Combatant],
    alive: &[bool],
    fought: &HashSet<(usize, usize)>,
) -> Option<(usize, usize)> {
    for i in 0..order.len() {
        if !alive[i] {
            continue;
        }
        // A lower-index candidate would already have claimed `i`.
        let opponent = (i + 1..order.len()).find(|&j| {
            alive[j] && order[j].species != order[i].species && !fought.contains(&(i, j))
        });
        if let Some(j) = opponent {
            return Some((i, j));
        }
    }
    None
}
