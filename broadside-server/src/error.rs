//! Server error types.

use crate::lobby::LobbyError;
use broadside_core::GameError;
use broadside_protocol::{CommandError, ErrorCode};
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] broadside_protocol::ProtocolError),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Converts to protocol error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServerError::Io(_) => ErrorCode::InternalError,
            ServerError::Protocol(e) => e.error_code(),
            ServerError::Game(e) => match e.error_code() {
                "INVALID_PLACEMENT" => ErrorCode::InvalidPlacement,
                "NOT_YOUR_TURN" => ErrorCode::NotYourTurn,
                "ALREADY_FIRED" => ErrorCode::AlreadyFired,
                "MALFORMED_COORDINATE" => ErrorCode::MalformedCoordinate,
                "WRONG_PHASE" => ErrorCode::WrongPhase,
                "NOT_A_PLAYER" => ErrorCode::NotAPlayer,
                "MATCH_PAUSED" => ErrorCode::MatchPaused,
                "INVALID_TOKEN" => ErrorCode::InvalidToken,
                "BAD_REQUEST" => ErrorCode::BadRequest,
                _ => ErrorCode::InternalError,
            },
            ServerError::Lobby(e) => e.error_code(),
            ServerError::Command(e) => e.error_code(),
            ServerError::Json(_) => ErrorCode::BadRequest,
            ServerError::InvalidRequest(_) => ErrorCode::BadRequest,
            ServerError::RateLimited => ErrorCode::RateLimited,
            ServerError::ShuttingDown => ErrorCode::InternalError,
        }
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.error_code().is_retryable()
    }
}
