//! Protocol error types and error codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol-level errors that can occur during framing or payload handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("length mismatch: header declares {declared} payload bytes, {available} present")]
    LengthMismatch { declared: usize, available: usize },

    #[error("frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,
}

impl ProtocolError {
    /// Frame structure did not match its header.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            ProtocolError::LengthMismatch { .. }
                | ProtocolError::FrameTooShort { .. }
                | ProtocolError::UnknownPacketType(_)
                | ProtocolError::InvalidUtf8
        )
    }

    /// Errors a peer earns a strike for rather than an immediate disconnect.
    pub fn is_recoverable(&self) -> bool {
        self.is_malformed() || matches!(self, ProtocolError::ChecksumMismatch { .. })
    }

    /// Returns the code reported to the peer.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProtocolError::ChecksumMismatch { .. } => ErrorCode::BadChecksum,
            ProtocolError::FrameTooLarge { .. } => ErrorCode::MalformedFrame,
            ProtocolError::Json(_) => ErrorCode::BadRequest,
            ProtocolError::Io(_) => ErrorCode::InternalError,
            _ => ErrorCode::MalformedFrame,
        }
    }
}

/// Stable error codes carried in ERROR packets.
///
/// These codes are part of the protocol contract and must remain stable
/// across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Protocol errors
    BadChecksum,
    MalformedFrame,
    BadRequest,
    UnknownCommand,

    // Game-rule errors
    InvalidPlacement,
    NotYourTurn,
    AlreadyFired,
    MalformedCoordinate,
    WrongPhase,
    NotAPlayer,
    MatchPaused,
    InvalidToken,

    // Resource errors
    CapacityExceeded,
    RateLimited,

    // System errors
    InternalError,
}

impl ErrorCode {
    /// Returns whether the same request may succeed later unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimited | ErrorCode::MatchPaused | ErrorCode::InternalError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::BadChecksum => write!(f, "BAD_CHECKSUM"),
            ErrorCode::MalformedFrame => write!(f, "MALFORMED_FRAME"),
            ErrorCode::BadRequest => write!(f, "BAD_REQUEST"),
            ErrorCode::UnknownCommand => write!(f, "UNKNOWN_COMMAND"),
            ErrorCode::InvalidPlacement => write!(f, "INVALID_PLACEMENT"),
            ErrorCode::NotYourTurn => write!(f, "NOT_YOUR_TURN"),
            ErrorCode::AlreadyFired => write!(f, "ALREADY_FIRED"),
            ErrorCode::MalformedCoordinate => write!(f, "MALFORMED_COORDINATE"),
            ErrorCode::WrongPhase => write!(f, "WRONG_PHASE"),
            ErrorCode::NotAPlayer => write!(f, "NOT_A_PLAYER"),
            ErrorCode::MatchPaused => write!(f, "MATCH_PAUSED"),
            ErrorCode::InvalidToken => write!(f, "INVALID_TOKEN"),
            ErrorCode::CapacityExceeded => write!(f, "CAPACITY_EXCEEDED"),
            ErrorCode::RateLimited => write!(f, "RATE_LIMITED"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_retryable() {
        assert!(ErrorCode::RateLimited.is_retryable());
        assert!(ErrorCode::MatchPaused.is_retryable());

        assert!(!ErrorCode::NotYourTurn.is_retryable());
        assert!(!ErrorCode::AlreadyFired.is_retryable());
        assert!(!ErrorCode::CapacityExceeded.is_retryable());
    }

    #[test]
    fn test_error_code_display_matches_serde() {
        for code in [
            ErrorCode::BadChecksum,
            ErrorCode::MalformedFrame,
            ErrorCode::UnknownCommand,
            ErrorCode::InvalidPlacement,
            ErrorCode::NotYourTurn,
            ErrorCode::AlreadyFired,
            ErrorCode::MalformedCoordinate,
            ErrorCode::WrongPhase,
            ErrorCode::NotAPlayer,
            ErrorCode::MatchPaused,
            ErrorCode::InvalidToken,
            ErrorCode::CapacityExceeded,
            ErrorCode::RateLimited,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code));
        }
    }

    #[test]
    fn test_protocol_error_classification() {
        let err = ProtocolError::ChecksumMismatch {
            expected: 0xAB,
            actual: 0xCD,
        };
        assert!(err.is_recoverable());
        assert!(!err.is_malformed());
        assert_eq!(err.error_code(), ErrorCode::BadChecksum);
        assert!(err.to_string().contains("0xab"));

        let err = ProtocolError::UnknownPacketType(77);
        assert!(err.is_malformed());
        assert_eq!(err.error_code(), ErrorCode::MalformedFrame);

        let err = ProtocolError::FrameTooLarge { size: 9000, max: 4096 };
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("9000"));
    }
}
