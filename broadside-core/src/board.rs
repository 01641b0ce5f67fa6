//! Player boards.

use crate::coord::{Coord, Orientation, GRID_SIZE};
use crate::error::GameError;
use crate::fleet::{PlacedShip, ShipSpec};
use serde::{Deserialize, Serialize};

/// State of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cell {
    Empty,
    Ship,
    Hit,
    Miss,
    Sunk,
}

impl Cell {
    /// Whether this cell has already been fired at.
    pub fn is_targeted(self) -> bool {
        matches!(self, Cell::Hit | Cell::Miss | Cell::Sunk)
    }

    fn symbol(self, redact: bool) -> char {
        match self {
            Cell::Empty | Cell::Ship if redact => '?',
            Cell::Empty => '.',
            Cell::Ship => 'S',
            Cell::Hit => 'X',
            Cell::Miss => 'o',
            Cell::Sunk => '#',
        }
    }
}

/// Result of firing at a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Miss,
    Hit,
    /// The shot completed a ship; carries its name.
    Sunk(String),
}

/// A player's board: the fleet still to place, the ships placed so far and
/// the state of every cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    fleet: Vec<ShipSpec>,
    ships: Vec<PlacedShip>,
    cells: Vec<Cell>,
}

impl Board {
    /// Creates an empty board that expects `fleet` to be placed in order.
    pub fn new(fleet: Vec<ShipSpec>) -> Self {
        Self {
            fleet,
            ships: Vec::new(),
            cells: vec![Cell::Empty; GRID_SIZE as usize * GRID_SIZE as usize],
        }
    }

    pub fn cell(&self, coord: Coord) -> Cell {
        self.cells[coord.index()]
    }

    pub fn ships(&self) -> &[PlacedShip] {
        &self.ships
    }

    /// The next ship to be placed, if any remain.
    pub fn next_ship(&self) -> Option<&ShipSpec> {
        self.fleet.get(self.ships.len())
    }

    /// Number of ships still to be placed.
    pub fn unplaced(&self) -> usize {
        self.fleet.len() - self.ships.len()
    }

    pub fn is_complete(&self) -> bool {
        self.ships.len() == self.fleet.len()
    }

    /// Places the next ship of the fleet. On error the board is unchanged.
    pub fn place_next(
        &mut self,
        origin: Coord,
        orientation: Orientation,
    ) -> Result<&PlacedShip, GameError> {
        let spec = self
            .next_ship()
            .cloned()
            .ok_or_else(|| GameError::invalid_placement("all ships are already placed"))?;

        let ship = PlacedShip::new(spec, origin, orientation)?;
        if let Some(existing) = self.ships.iter().find(|s| s.overlaps(&ship)) {
            return Err(GameError::invalid_placement(format!(
                "{} at {} {} overlaps the {}",
                ship.name(),
                origin,
                orientation,
                existing.name()
            )));
        }

        for coord in ship.cells() {
            self.cells[coord.index()] = Cell::Ship;
        }
        self.ships.push(ship);
        Ok(&self.ships[self.ships.len() - 1])
    }

    /// Fires at `coord`.
    ///
    /// A cell can only be fired at once; a repeat returns `AlreadyFired`
    /// and leaves the board untouched.
    pub fn fire(&mut self, coord: Coord) -> Result<FireOutcome, GameError> {
        let idx = coord.index();
        match self.cells[idx] {
            cell if cell.is_targeted() => Err(GameError::AlreadyFired {
                coord: coord.to_string(),
            }),
            Cell::Empty => {
                self.cells[idx] = Cell::Miss;
                Ok(FireOutcome::Miss)
            }
            _ => {
                self.cells[idx] = Cell::Hit;
                let Some(ship) = self.ships.iter().find(|s| s.occupies(coord)) else {
                    return Ok(FireOutcome::Hit);
                };
                if ship.cells().iter().all(|c| self.cells[c.index()] == Cell::Hit) {
                    for c in ship.cells() {
                        self.cells[c.index()] = Cell::Sunk;
                    }
                    return Ok(FireOutcome::Sunk(ship.name().to_string()));
                }
                Ok(FireOutcome::Hit)
            }
        }
    }

    pub fn is_sunk(&self, ship: &PlacedShip) -> bool {
        ship.cells().iter().all(|c| self.cell(*c) == Cell::Sunk)
    }

    /// Ships placed and not yet sunk.
    pub fn ships_afloat(&self) -> usize {
        self.ships.iter().filter(|s| !self.is_sunk(s)).count()
    }

    /// True once the full fleet is placed and every ship is sunk.
    pub fn all_sunk(&self) -> bool {
        self.is_complete() && !self.ships.is_empty() && self.ships_afloat() == 0
    }

    /// Renders the board. With `redact`, cells not yet fired at are shown as
    /// unknown so ship positions are hidden.
    pub fn view(&self, redact: bool) -> BoardView {
        let rows = self
            .cells
            .chunks(GRID_SIZE as usize)
            .map(|row| row.iter().map(|c| c.symbol(redact)).collect())
            .collect();
        BoardView {
            rows,
            ships_afloat: self.ships_afloat(),
        }
    }
}

/// A serializable snapshot of a board.
///
/// Rows run 1 to 10, columns A to J. Symbols: `.` empty, `S` ship, `X` hit,
/// `o` miss, `#` sunk, `?` unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardView {
    pub rows: Vec<String>,
    pub ships_afloat: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::classic_fleet;
    use proptest::prelude::*;

    fn at(s: &str) -> Coord {
        s.parse().unwrap()
    }

    fn placed_classic() -> Board {
        let mut board = Board::new(classic_fleet());
        for (origin, orientation) in [
            ("A1", Orientation::Horizontal),
            ("A2", Orientation::Horizontal),
            ("A3", Orientation::Horizontal),
            ("A4", Orientation::Horizontal),
            ("J1", Orientation::Vertical),
        ] {
            board.place_next(at(origin), orientation).unwrap();
        }
        board
    }

    #[test]
    fn test_place_in_fleet_order() {
        let mut board = Board::new(classic_fleet());
        assert_eq!(board.next_ship().unwrap().name, "Carrier");

        let ship = board.place_next(at("B2"), Orientation::Horizontal).unwrap();
        assert_eq!(ship.name(), "Carrier");
        assert_eq!(board.next_ship().unwrap().name, "Battleship");
        assert_eq!(board.unplaced(), 4);
        assert_eq!(board.cell(at("F2")), Cell::Ship);
        assert_eq!(board.cell(at("G2")), Cell::Empty);
    }

    #[test]
    fn test_overlap_rejected_without_mutation() {
        let mut board = Board::new(classic_fleet());
        board.place_next(at("C1"), Orientation::Vertical).unwrap();
        let before = board.clone();

        let err = board.place_next(at("A3"), Orientation::Horizontal).unwrap_err();
        assert!(err.to_string().contains("Carrier"));
        assert_eq!(board, before);
    }

    #[test]
    fn test_place_after_complete() {
        let mut board = placed_classic();
        assert!(board.is_complete());
        assert!(board.next_ship().is_none());
        assert!(board.place_next(at("E7"), Orientation::Vertical).is_err());
    }

    #[test]
    fn test_fire_hit_miss_sunk() {
        let mut board = placed_classic();

        assert_eq!(board.fire(at("E9")).unwrap(), FireOutcome::Miss);
        assert_eq!(board.fire(at("J1")).unwrap(), FireOutcome::Hit);
        assert_eq!(
            board.fire(at("J2")).unwrap(),
            FireOutcome::Sunk("Destroyer".to_string())
        );
        assert_eq!(board.cell(at("J1")), Cell::Sunk);
        assert_eq!(board.ships_afloat(), 4);
        assert!(!board.all_sunk());
    }

    #[test]
    fn test_fire_twice_rejected() {
        let mut board = placed_classic();
        board.fire(at("A1")).unwrap();
        let once = board.clone();

        let err = board.fire(at("A1")).unwrap_err();
        assert_eq!(err.error_code(), "ALREADY_FIRED");
        assert_eq!(board, once);
    }

    #[test]
    fn test_all_sunk() {
        let mut board = placed_classic();
        let targets: Vec<Coord> = board.ships().iter().flat_map(|s| s.cells().to_vec()).collect();
        for coord in targets {
            board.fire(coord).unwrap();
        }
        assert!(board.all_sunk());
        assert_eq!(board.ships_afloat(), 0);
    }

    #[test]
    fn test_empty_board_is_not_sunk() {
        let board = Board::new(classic_fleet());
        assert!(!board.all_sunk());
    }

    #[test]
    fn test_view_redaction() {
        let mut board = placed_classic();
        board.fire(at("A1")).unwrap();
        board.fire(at("A10")).unwrap();

        let full = board.view(false);
        assert_eq!(full.rows.len(), 10);
        assert_eq!(full.rows[0], "XSSSS....S");
        assert_eq!(full.rows[9], "o.........");

        let redacted = board.view(true);
        assert_eq!(redacted.rows[0], "X?????????");
        assert_eq!(redacted.rows[9], "o?????????");
        assert!(!redacted.rows.iter().any(|r| r.contains('S')));
        assert_eq!(redacted.ships_afloat, 5);
    }

    /// Every subset of hits on a three-cell ship: sunk exactly when all
    /// three cells are hit, regardless of surrounding misses.
    #[test]
    fn test_sunk_iff_all_cells_hit_exhaustive() {
        let cells = [at("D4"), at("E4"), at("F4")];
        let misses = [at("C4"), at("G4"), at("D5")];

        for hit_mask in 0u8..8 {
            for miss_mask in 0u8..8 {
                let mut board = Board::new(vec![ShipSpec::new("Cruiser", 3)]);
                board.place_next(cells[0], Orientation::Horizontal).unwrap();

                for (i, coord) in misses.iter().enumerate() {
                    if miss_mask & (1 << i) != 0 {
                        board.fire(*coord).unwrap();
                    }
                }
                let mut last = None;
                for (i, coord) in cells.iter().enumerate() {
                    if hit_mask & (1 << i) != 0 {
                        last = Some(board.fire(*coord).unwrap());
                    }
                }

                let all_hit = hit_mask == 0b111;
                assert_eq!(board.all_sunk(), all_hit, "hits {:03b}", hit_mask);
                assert_eq!(
                    matches!(last, Some(FireOutcome::Sunk(_))),
                    all_hit,
                    "hits {:03b}",
                    hit_mask
                );
                for coord in cells {
                    assert_eq!(board.cell(coord) == Cell::Sunk, all_hit);
                }
            }
        }
    }

    fn arb_coord() -> impl Strategy<Value = Coord> {
        (0..GRID_SIZE, 0..GRID_SIZE).prop_map(|(col, row)| Coord { col, row })
    }

    fn arb_orientation() -> impl Strategy<Value = Orientation> {
        prop_oneof![Just(Orientation::Horizontal), Just(Orientation::Vertical)]
    }

    proptest! {
        #[test]
        fn prop_placements_stay_valid(
            attempts in prop::collection::vec((arb_coord(), arb_orientation()), 1..40)
        ) {
            let mut board = Board::new(classic_fleet());
            for (origin, orientation) in attempts {
                let before = board.clone();
                if board.place_next(origin, orientation).is_err() {
                    prop_assert_eq!(&board, &before);
                }
            }

            let ships = board.ships();
            for (i, a) in ships.iter().enumerate() {
                prop_assert_eq!(a.cells().len(), a.spec().length as usize);
                for b in &ships[i + 1..] {
                    prop_assert!(!a.overlaps(b));
                }
            }
            let ship_cells = Coord::all().filter(|c| board.cell(*c) == Cell::Ship).count();
            let expected: usize = ships.iter().map(|s| s.cells().len()).sum();
            prop_assert_eq!(ship_cells, expected);
        }

        #[test]
        fn prop_fire_is_idempotent(shots in prop::collection::vec(arb_coord(), 1..60), repeat in arb_coord()) {
            let mut board = placed_classic();
            for coord in shots {
                let _ = board.fire(coord);
            }

            let _ = board.fire(repeat);
            let once = board.clone();
            prop_assert!(board.fire(repeat).is_err());
            prop_assert_eq!(board, once);
        }
    }
}
