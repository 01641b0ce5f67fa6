//! # broadside-core
//!
//! Game engine for broadside.
//!
//! This crate provides:
//! - Grid coordinates and placement parsing
//! - Fleet definitions
//! - Boards with hit/miss/sunk tracking and redacted views
//! - The match state machine: placement, turns, timeouts, forfeits and
//!   reconnection

pub mod board;
pub mod coord;
pub mod error;
pub mod fleet;
pub mod game;

pub use board::{Board, BoardView, Cell, FireOutcome};
pub use coord::{parse_placement, Coord, Orientation, GRID_SIZE};
pub use error::GameError;
pub use fleet::{classic_fleet, validate_fleet, PlacedShip, ShipSpec};
pub use game::{
    FinishReason, HandleId, Match, MatchConfig, MatchEvent, MatchOutcome, Phase, ShotReport,
};
