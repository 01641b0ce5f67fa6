//! Grid coordinates.
//!
//! Coordinates are written as a column letter followed by a row number,
//! `A1` through `J10`, case-insensitive. Internally both axes are
//! zero-based.

use crate::error::GameError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width and height of the board.
pub const GRID_SIZE: u8 = 10;

/// A cell on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub col: u8,
    pub row: u8,
}

impl Coord {
    /// Returns the coordinate if it lies on the grid.
    pub fn new(col: u8, row: u8) -> Option<Self> {
        (col < GRID_SIZE && row < GRID_SIZE).then_some(Self { col, row })
    }

    /// Steps `distance` cells along `orientation`, or `None` past the edge.
    pub fn step(self, orientation: Orientation, distance: u8) -> Option<Self> {
        match orientation {
            Orientation::Horizontal => Self::new(self.col.checked_add(distance)?, self.row),
            Orientation::Vertical => Self::new(self.col, self.row.checked_add(distance)?),
        }
    }

    pub(crate) fn index(self) -> usize {
        self.row as usize * GRID_SIZE as usize + self.col as usize
    }

    /// Every cell on the grid in row-major order.
    pub fn all() -> impl Iterator<Item = Coord> {
        (0..GRID_SIZE).flat_map(|row| (0..GRID_SIZE).map(move |col| Coord { col, row }))
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'A' + self.col) as char, self.row + 1)
    }
}

impl FromStr for Coord {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let letter = chars
            .next()
            .filter(char::is_ascii_alphabetic)
            .ok_or_else(|| GameError::malformed(trimmed))?
            .to_ascii_uppercase();

        let digits = chars.as_str();
        if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(GameError::malformed(trimmed));
        }
        let row: u8 = digits.parse().map_err(|_| GameError::malformed(trimmed))?;
        if row == 0 {
            return Err(GameError::malformed(trimmed));
        }

        Coord::new(letter as u8 - b'A', row - 1).ok_or_else(|| GameError::malformed(trimmed))
    }
}

/// Direction a ship extends from its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Along the columns, A towards J.
    Horizontal,
    /// Along the rows, 1 towards 10.
    Vertical,
}

impl FromStr for Orientation {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "H" | "HORIZONTAL" => Ok(Orientation::Horizontal),
            "V" | "VERTICAL" => Ok(Orientation::Vertical),
            _ => Err(GameError::invalid_placement(format!(
                "orientation must be H or V, got '{}'",
                s.trim()
            ))),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Horizontal => f.write_str("H"),
            Orientation::Vertical => f.write_str("V"),
        }
    }
}

/// Parses a PLACE payload: `<coord> <H|V>` or `<coord><H|V>`.
pub fn parse_placement(input: &str) -> Result<(Coord, Orientation), GameError> {
    let trimmed = input.trim();
    let (coord, orientation) = match trimmed.split_once(char::is_whitespace) {
        Some((coord, orientation)) => (coord, orientation.trim()),
        None => {
            // Compact form: the orientation is the trailing letter.
            let split = trimmed
                .char_indices()
                .last()
                .filter(|(i, c)| *i > 0 && c.is_ascii_alphabetic())
                .map(|(i, _)| i)
                .ok_or_else(|| {
                    GameError::invalid_placement(format!(
                        "expected '<coord> <H|V>', got '{}'",
                        trimmed
                    ))
                })?;
            trimmed.split_at(split)
        }
    };

    Ok((coord.parse()?, orientation.parse()?))
}
