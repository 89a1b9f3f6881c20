use rand::Rng;

use crate::error::InvariantViolation;
use crate::types::{CritterId, Direction, Position, SpeciesId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridSize {
    pub width: i32,
    pub height: i32,
}

impl GridSize {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn cell_count(self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize)
    }

    pub fn wrap(self, x: i32, y: i32) -> Position {
        Position {
            x: x.rem_euclid(self.width),
            y: y.rem_euclid(self.height),
        }
    }

    pub fn step(self, pos: Position, dir: Direction) -> Position {
        let (dx, dy) = dir.offset();
        self.wrap(pos.x + dx, pos.y + dy)
    }

    pub fn index_of(self, pos: Position) -> usize {
        let pos = self.wrap(pos.x, pos.y);
        (pos.y * self.width + pos.x) as usize
    }

    pub fn position_of(self, index: usize) -> Position {
        let index = index as i32;
        Position {
            x: index % self.width,
            y: index / self.width,
        }
    }

    /// Shortest signed offset from `from` to `to` on the torus.
    pub fn delta(self, from: Position, to: Position) -> (i32, i32) {
        (
            axis_delta(from.x, to.x, self.width),
            axis_delta(from.y, to.y, self.height),
        )
    }

    pub fn distance(self, a: Position, b: Position) -> u32 {
        let (dx, dy) = self.delta(a, b);
        dx.unsigned_abs() + dy.unsigned_abs()
    }

    fn offset_range_x(self) -> (i32, i32) {
        (-(self.width - 1) / 2, self.width / 2)
    }

    fn offset_range_y(self) -> (i32, i32) {
        (-(self.height - 1) / 2, self.height / 2)
    }
}

/// An exact half-turn resolves to the positive offset.
pub fn axis_delta(from: i32, to: i32, size: i32) -> i32 {
    let d = (to - from).rem_euclid(size);
    if d > size / 2 {
        d - size
    } else {
        d
    }
}

pub fn direction_toward(dx: i32, dy: i32) -> Direction {
    if dx == 0 && dy == 0 {
        return Direction::Center;
    }
    if dx.abs() >= dy.abs() {
        if dx > 0 {
            Direction::East
        } else {
            Direction::West
        }
    } else if dy > 0 {
        Direction::South
    } else {
        Direction::North
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Occupant {
    pub critter: CritterId,
    pub species: SpeciesId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellContent {
    Empty,
    Food,
    Critter(Occupant),
}

/// Authoritative occupancy and food layers. Knows nothing about turns or scores.
#[derive(Clone, Debug)]
pub struct World {
    size: GridSize,
    cells: Vec<Option<Occupant>>,
    food: Vec<bool>,
    food_count: usize,
    occupant_count: usize,
}

impl World {
    pub fn new(size: GridSize) -> Self {
        let count = size.cell_count();
        Self {
            size,
            cells: vec![None; count],
            food: vec![false; count],
            food_count: 0,
            occupant_count: 0,
        }
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn food_count(&self) -> usize {
        self.food_count
    }

    pub fn occupant_count(&self) -> usize {
        self.occupant_count
    }

    pub fn occupant_at(&self, pos: Position) -> Option<Occupant> {
        self.cells[self.size.index_of(pos)]
    }

    pub fn has_food_at(&self, pos: Position) -> bool {
        self.food[self.size.index_of(pos)]
    }

    pub fn content_at(&self, pos: Position) -> CellContent {
        match self.occupant_at(pos) {
            Some(occupant) => CellContent::Critter(occupant),
            None if self.has_food_at(pos) => CellContent::Food,
            None => CellContent::Empty,
        }
    }

    pub fn add_food(&mut self, pos: Position) -> bool {
        let idx = self.size.index_of(pos);
        if self.food[idx] {
            return false;
        }
        self.food[idx] = true;
        self.food_count += 1;
        true
    }

    pub fn remove_food(&mut self, pos: Position) -> bool {
        let idx = self.size.index_of(pos);
        if !self.food[idx] {
            return false;
        }
        self.food[idx] = false;
        self.food_count -= 1;
        true
    }

    /// Food cells in row-major order.
    pub fn food_positions(&self) -> Vec<Position> {
        self.food
            .iter()
            .enumerate()
            .filter(|(_, has_food)| **has_food)
            .map(|(idx, _)| self.size.position_of(idx))
            .collect()
    }

    pub fn place_critter(
        &mut self,
        pos: Position,
        occupant: Occupant,
    ) -> Result<(), InvariantViolation> {
        let idx = self.size.index_of(pos);
        if let Some(existing) = self.cells[idx] {
            return Err(InvariantViolation::CellOccupied {
                cell: self.size.position_of(idx),
                occupant: existing.critter,
                incoming: occupant.critter,
            });
        }
        self.cells[idx] = Some(occupant);
        self.occupant_count += 1;
        Ok(())
    }

    /// Clears `pos` only if `critter` is the one indexed there.
    pub fn remove_critter(&mut self, pos: Position, critter: CritterId) -> Option<Occupant> {
        let idx = self.size.index_of(pos);
        match self.cells[idx] {
            Some(occupant) if occupant.critter == critter => {
                self.cells[idx] = None;
                self.occupant_count -= 1;
                Some(occupant)
            }
            _ => None,
        }
    }

    pub fn move_critter(
        &mut self,
        from: Position,
        to: Position,
        critter: CritterId,
    ) -> Result<(), InvariantViolation> {
        if self.size.index_of(from) == self.size.index_of(to) {
            return match self.occupant_at(from) {
                Some(occupant) if occupant.critter == critter => Ok(()),
                _ => Err(InvariantViolation::IndexMismatch {
                    critter,
                    cell: self.size.wrap(from.x, from.y),
                }),
            };
        }
        if let Some(existing) = self.occupant_at(to) {
            return Err(InvariantViolation::CellOccupied {
                cell: self.size.wrap(to.x, to.y),
                occupant: existing.critter,
                incoming: critter,
            });
        }
        let Some(occupant) = self.remove_critter(from, critter) else {
            return Err(InvariantViolation::IndexMismatch {
                critter,
                cell: self.size.wrap(from.x, from.y),
            });
        };
        self.place_critter(to, occupant)
    }

    pub fn neighbors_of(&self, pos: Position) -> [(Direction, CellContent); 4] {
        Direction::CARDINALS.map(|dir| (dir, self.content_at(self.size.step(pos, dir))))
    }

    pub fn nearest_food_direction(&self, pos: Position, radius: u32) -> Direction {
        self.nearest_direction(pos, radius, |idx| self.food[idx])
    }

    pub fn nearest_enemy_direction(
        &self,
        pos: Position,
        own_species: SpeciesId,
        radius: u32,
    ) -> Direction {
        self.nearest_direction(pos, radius, |idx| {
            self.cells[idx].is_some_and(|occupant| occupant.species != own_species)
        })
    }

    /// Scans rings of growing toroidal Manhattan distance around `pos`, excluding
    /// `pos` itself. Every cell is visited once at its canonical offset, and among
    /// matches on the closest ring the smallest direction in enum order wins.
    fn nearest_direction(
        &self,
        pos: Position,
        radius: u32,
        matches: impl Fn(usize) -> bool,
    ) -> Direction {
        let (min_dx, max_dx) = self.size.offset_range_x();
        let (min_dy, max_dy) = self.size.offset_range_y();
        let farthest = (max_dx + max_dy) as u32;

        for d in 1..=radius.min(farthest) as i32 {
            let mut best: Option<Direction> = None;
            for dx in (-d).max(min_dx)..=d.min(max_dx) {
                let rest = d - dx.abs();
                let candidates = if rest == 0 { [0, 0] } else { [rest, -rest] };
                for dy in candidates {
                    if dy < min_dy || dy > max_dy {
                        continue;
                    }
                    let target = self.size.wrap(pos.x + dx, pos.y + dy);
                    if !matches(self.size.index_of(target)) {
                        continue;
                    }
                    let dir = direction_toward(dx, dy);
                    best = Some(best.map_or(dir, |current| current.min(dir)));
                }
            }
            if let Some(dir) = best {
                return dir;
            }
        }
        Direction::Center
    }

    /// Picks up to `count` distinct cells accepted by `accept`, uniformly at random.
    pub fn pick_cells<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: usize,
        accept: impl Fn(usize) -> bool,
    ) -> Vec<Position> {
        let mut candidates: Vec<usize> = (0..self.cells.len()).filter(|idx| accept(*idx)).collect();
        let take = count.min(candidates.len());
        for i in 0..take {
            let j = rng.random_range(i..candidates.len());
            candidates.swap(i, j);
        }
        candidates
            .into_iter()
            .take(take)
            .map(|idx| self.size.position_of(idx))
            .collect()
    }

    pub fn pick_free_cells<R: Rng + ?Sized>(&self, rng: &mut R, count: usize) -> Vec<Position> {
        self.pick_cells(rng, count, |idx| self.cells[idx].is_none() && !self.food[idx])
    }

    /// Places food on up to `count` cells holding neither food nor a critter.
    /// Returns how many were placed; a full grid places none.
    pub fn spawn_food<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) -> usize {
        let cells = self.pick_free_cells(rng, count);
        for pos in &cells {
            self.add_food(*pos);
        }
        cells.len()
    }

    /// Every indexed occupant with its cell, row-major.
    pub fn occupants(&self) -> impl Iterator<Item = (Position, Occupant)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(idx, cell)| cell.map(|occupant| (self.size.position_of(idx), occupant)))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn occupant(id: u32, species: u16) -> Occupant {
        Occupant {
            critter: CritterId(id),
            species: SpeciesId(species),
        }
    }

    #[test]
    fn moving_off_an_edge_wraps_around() {
        let size = GridSize::new(5, 4);
        assert_eq!(
            size.step(Position { x: 2, y: 0 }, Direction::North),
            Position { x: 2, y: 3 }
        );
        assert_eq!(
            size.step(Position { x: 4, y: 1 }, Direction::East),
            Position { x: 0, y: 1 }
        );
        assert_eq!(
            size.step(Position { x: 0, y: 1 }, Direction::West),
            Position { x: 4, y: 1 }
        );
        assert_eq!(
            size.step(Position { x: 3, y: 3 }, Direction::South),
            Position { x: 3, y: 0 }
        );
        assert_eq!(
            size.step(Position { x: 3, y: 3 }, Direction::Center),
            Position { x: 3, y: 3 }
        );
    }

    proptest! {
        #[test]
        fn stepping_back_returns_to_start(
            width in 1..40i32,
            height in 1..40i32,
            x in -100..100i32,
            y in -100..100i32,
            dir_idx in 0..4usize,
        ) {
            let size = GridSize::new(width, height);
            let start = size.wrap(x, y);
            let dir = Direction::CARDINALS[dir_idx];
            let back = size.step(size.step(start, dir), dir.opposite());
            prop_assert_eq!(back, start);
            prop_assert!(start.x >= 0 && start.x < width);
            prop_assert!(start.y >= 0 && start.y < height);
        }

        #[test]
        fn toroidal_distance_is_symmetric_and_bounded(
            width in 1..30i32,
            height in 1..30i32,
            ax in 0..30i32, ay in 0..30i32, bx in 0..30i32, by in 0..30i32,
        ) {
            let size = GridSize::new(width, height);
            let a = size.wrap(ax, ay);
            let b = size.wrap(bx, by);
            prop_assert_eq!(size.distance(a, b), size.distance(b, a));
            prop_assert!(size.distance(a, b) <= (width / 2 + height / 2) as u32);
        }
    }

    #[test]
    fn axis_delta_prefers_short_way_round() {
        assert_eq!(axis_delta(0, 9, 10), -1);
        assert_eq!(axis_delta(9, 0, 10), 1);
        assert_eq!(axis_delta(0, 5, 10), 5);
        assert_eq!(axis_delta(5, 0, 10), 5);
        assert_eq!(axis_delta(2, 2, 10), 0);
    }

    #[test]
    fn neighbors_report_critters_over_food() {
        let mut world = World::new(GridSize::new(4, 4));
        let center = Position { x: 0, y: 0 };
        world.place_critter(Position { x: 0, y: 3 }, occupant(1, 0)).expect("free cell");
        world.add_food(Position { x: 0, y: 3 });
        world.add_food(Position { x: 1, y: 0 });

        let neighbors = world.neighbors_of(center);
        assert_eq!(neighbors[0], (Direction::North, CellContent::Critter(occupant(1, 0))));
        assert_eq!(neighbors[1], (Direction::South, CellContent::Empty));
        assert_eq!(neighbors[2], (Direction::East, CellContent::Food));
        assert_eq!(neighbors[3], (Direction::West, CellContent::Empty));
    }

    #[test]
    fn nearest_food_uses_wrapped_distance() {
        let mut world = World::new(GridSize::new(20, 20));
        world.add_food(Position { x: 18, y: 0 });
        world.add_food(Position { x: 5, y: 0 });
        assert_eq!(
            world.nearest_food_direction(Position { x: 0, y: 0 }, 10),
            Direction::West
        );
    }

    #[test]
    fn nearest_food_ties_break_by_direction_order() {
        let mut world = World::new(GridSize::new(20, 20));
        let origin = Position { x: 10, y: 10 };
        world.add_food(Position { x: 13, y: 10 });
        world.add_food(Position { x: 10, y: 7 });
        world.add_food(Position { x: 10, y: 13 });
        assert_eq!(world.nearest_food_direction(origin, 10), Direction::North);

        world.remove_food(Position { x: 10, y: 7 });
        assert_eq!(world.nearest_food_direction(origin, 10), Direction::South);
    }

    #[test]
    fn diagonal_target_resolves_horizontally() {
        let mut world = World::new(GridSize::new(20, 20));
        world.add_food(Position { x: 12, y: 8 });
        assert_eq!(
            world.nearest_food_direction(Position { x: 10, y: 10 }, 10),
            Direction::East
        );
    }

    #[test]
    fn targets_beyond_radius_or_on_own_cell_are_ignored() {
        let mut world = World::new(GridSize::new(40, 40));
        let origin = Position { x: 0, y: 0 };
        world.add_food(origin);
        world.add_food(Position { x: 11, y: 0 });
        assert_eq!(world.nearest_food_direction(origin, 10), Direction::Center);
        assert_eq!(world.nearest_food_direction(origin, 11), Direction::East);
    }

    #[test]
    fn nearest_enemy_skips_own_species() {
        let mut world = World::new(GridSize::new(10, 10));
        let origin = Position { x: 5, y: 5 };
        world.place_critter(origin, occupant(0, 0)).expect("free cell");
        world.place_critter(Position { x: 5, y: 4 }, occupant(1, 0)).expect("free cell");
        world.place_critter(Position { x: 7, y: 5 }, occupant(2, 1)).expect("free cell");
        assert_eq!(
            world.nearest_enemy_direction(origin, SpeciesId(0), 10),
            Direction::East
        );
        assert_eq!(
            world.nearest_enemy_direction(origin, SpeciesId(1), 10),
            Direction::North
        );
    }

    #[test]
    fn tiny_world_scan_terminates_without_targets() {
        let world = World::new(GridSize::new(1, 1));
        assert_eq!(
            world.nearest_food_direction(Position { x: 0, y: 0 }, 10),
            Direction::Center
        );
    }

    #[test]
    fn placing_on_occupied_cell_is_rejected() {
        let mut world = World::new(GridSize::new(3, 3));
        let cell = Position { x: 1, y: 1 };
        world.place_critter(cell, occupant(0, 0)).expect("free cell");
        let err = world.place_critter(cell, occupant(1, 1)).unwrap_err();
        assert_eq!(
            err,
            InvariantViolation::CellOccupied {
                cell,
                occupant: CritterId(0),
                incoming: CritterId(1),
            }
        );
        assert_eq!(world.occupant_count(), 1);
    }

    #[test]
    fn move_critter_updates_index() {
        let mut world = World::new(GridSize::new(3, 3));
        let from = Position { x: 0, y: 0 };
        let to = Position { x: 2, y: 0 };
        world.place_critter(from, occupant(4, 0)).expect("free cell");
        world.move_critter(from, to, CritterId(4)).expect("move succeeds");
        assert_eq!(world.occupant_at(from), None);
        assert_eq!(world.occupant_at(to), Some(occupant(4, 0)));

        let err = world.move_critter(from, to, CritterId(4)).unwrap_err();
        assert!(matches!(err, InvariantViolation::CellOccupied { .. }));
        let err = world.move_critter(from, Position { x: 1, y: 1 }, CritterId(4)).unwrap_err();
        assert!(matches!(err, InvariantViolation::IndexMismatch { .. }));
    }

    #[test]
    fn spawn_food_avoids_critters_and_skips_when_full() {
        let mut world = World::new(GridSize::new(2, 2));
        let mut rng = StdRng::seed_from_u64(7);
        world.place_critter(Position { x: 0, y: 0 }, occupant(0, 0)).expect("free cell");

        assert_eq!(world.spawn_food(10, &mut rng), 3);
        assert!(!world.has_food_at(Position { x: 0, y: 0 }));
        assert_eq!(world.food_count(), 3);

        assert_eq!(world.spawn_food(2, &mut rng), 0);
        assert_eq!(world.food_count(), 3);
    }

    #[test]
    fn food_positions_are_row_major() {
        let mut world = World::new(GridSize::new(3, 2));
        world.add_food(Position { x: 2, y: 1 });
        world.add_food(Position { x: 1, y: 0 });
        assert_eq!(
            world.food_positions(),
            vec![Position { x: 1, y: 0 }, Position { x: 2, y: 1 }]
        );
    }
}
