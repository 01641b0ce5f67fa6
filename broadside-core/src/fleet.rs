//! Fleet definitions and placed ships.

use crate::coord::{Coord, Orientation, GRID_SIZE};
use crate::error::GameError;
use serde::{Deserialize, Serialize};

/// A ship class: name and number of cells.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShipSpec {
    pub name: String,
    pub length: u8,
}

impl ShipSpec {
    pub fn new(name: impl Into<String>, length: u8) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

/// Carrier 5, Battleship 4, Cruiser 3, Submarine 3, Destroyer 2.
pub fn classic_fleet() -> Vec<ShipSpec> {
    vec![
        ShipSpec::new("Carrier", 5),
        ShipSpec::new("Battleship", 4),
        ShipSpec::new("Cruiser", 3),
        ShipSpec::new("Submarine", 3),
        ShipSpec::new("Destroyer", 2),
    ]
}

/// Checks that a fleet is non-empty and every ship fits on the grid.
pub fn validate_fleet(fleet: &[ShipSpec]) -> Result<(), GameError> {
    if fleet.is_empty() {
        return Err(GameError::InvalidFleet {
            reason: "fleet must contain at least one ship".to_string(),
        });
    }
    for ship in fleet {
        if ship.length == 0 || ship.length > GRID_SIZE {
            return Err(GameError::InvalidFleet {
                reason: format!(
                    "{} has length {}, must be 1..={}",
                    ship.name, ship.length, GRID_SIZE
                ),
            });
        }
        if ship.name.trim().is_empty() {
            return Err(GameError::InvalidFleet {
                reason: "ship names must not be empty".to_string(),
            });
        }
    }
    let total: usize = fleet.iter().map(|s| s.length as usize).sum();
    if total > (GRID_SIZE as usize * GRID_SIZE as usize) {
        return Err(GameError::InvalidFleet {
            reason: format!("fleet occupies {} cells, more than the grid", total),
        });
    }
    Ok(())
}

/// A ship on a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedShip {
    spec: ShipSpec,
    origin: Coord,
    orientation: Orientation,
    cells: Vec<Coord>,
}

impl PlacedShip {
    /// Lays `spec` out from `origin`. Fails if any cell falls off the grid.
    pub fn new(spec: ShipSpec, origin: Coord, orientation: Orientation) -> Result<Self, GameError> {
        let cells = (0..spec.length)
            .map(|i| origin.step(orientation, i))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                GameError::invalid_placement(format!(
                    "{} ({} cells) at {} {} extends past the edge of the board",
                    spec.name, spec.length, origin, orientation
                ))
            })?;

        Ok(Self {
            spec,
            origin,
            orientation,
            cells,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ShipSpec {
        &self.spec
    }

    pub fn origin(&self) -> Coord {
        self.origin
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn cells(&self) -> &[Coord] {
        &self.cells
    }

    pub fn occupies(&self, coord: Coord) -> bool {
        self.cells.contains(&coord)
    }

    pub fn overlaps(&self, other: &PlacedShip) -> bool {
        self.cells.iter().any(|c| other.occupies(*c))
    }
}
