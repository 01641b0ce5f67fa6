//! Game error types.

use thiserror::Error;

/// Errors from board and match operations.
///
/// None of these mutate state: a rejected operation leaves the board, turn
/// pointer and move sequence exactly as they were.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("invalid placement: {reason}")]
    InvalidPlacement { reason: String },

    #[error("not your turn")]
    NotYourTurn,

    #[error("already fired at {coord}")]
    AlreadyFired { coord: String },

    #[error("malformed coordinate '{input}': expected a column A-J and row 1-10, e.g. B5")]
    MalformedCoordinate { input: String },

    #[error("not allowed during {phase}")]
    WrongPhase { phase: &'static str },

    #[error("you are not a player in the current match")]
    NotAPlayer,

    #[error("match is paused while a player reconnects")]
    MatchPaused,

    #[error("reconnection token not recognised")]
    InvalidToken,

    #[error("invalid fleet: {reason}")]
    InvalidFleet { reason: String },
}

impl GameError {
    pub fn invalid_placement(reason: impl Into<String>) -> Self {
        GameError::InvalidPlacement {
            reason: reason.into(),
        }
    }

    pub fn malformed(input: impl Into<String>) -> Self {
        GameError::MalformedCoordinate {
            input: input.into(),
        }
    }

    /// Returns an error code suitable for protocol responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            GameError::InvalidPlacement { .. } => "INVALID_PLACEMENT",
            GameError::NotYourTurn => "NOT_YOUR_TURN",
            GameError::AlreadyFired { .. } => "ALREADY_FIRED",
            GameError::MalformedCoordinate { .. } => "MALFORMED_COORDINATE",
            GameError::WrongPhase { .. } => "WRONG_PHASE",
            GameError::NotAPlayer => "NOT_A_PLAYER",
            GameError::MatchPaused => "MATCH_PAUSED",
            GameError::InvalidToken => "INVALID_TOKEN",
            GameError::InvalidFleet { .. } => "BAD_REQUEST",
        }
    }
}
