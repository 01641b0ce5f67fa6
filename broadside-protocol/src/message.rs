//! Chat commands and JSON payload bodies.

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Slash commands accepted in CHAT payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Status,
    Chat(String),
    Rejoin(String),
}

impl Command {
    /// Name as typed by the user, without the slash.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Quit => "quit",
            Command::Status => "status",
            Command::Chat(_) => "chat",
            Command::Rejoin(_) => "rejoin",
        }
    }
}

/// A CHAT payload: either text to broadcast or a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLine {
    Say(String),
    Command(Command),
}

/// Errors from parsing a chat line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command: /{0}")]
    Unknown(String),

    #[error("/{0} requires an argument")]
    MissingArgument(&'static str),
}

impl CommandError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CommandError::Unknown(_) => ErrorCode::UnknownCommand,
            CommandError::MissingArgument(_) => ErrorCode::BadRequest,
        }
    }
}

impl ChatLine {
    /// Parses a CHAT payload. Lines beginning with `/` (after leading
    /// whitespace) are commands; command names are case-insensitive. Plain
    /// text is kept byte for byte.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let Some(rest) = text.trim_start().strip_prefix('/') else {
            return Ok(ChatLine::Say(text.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg),
            None => (rest.trim_end(), ""),
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "help" => Command::Help,
            "quit" => Command::Quit,
            "status" => Command::Status,
            "chat" => {
                if arg.trim().is_empty() {
                    return Err(CommandError::MissingArgument("chat"));
                }
                Command::Chat(arg.to_string())
            }
            "rejoin" => {
                let token = arg.trim();
                if token.is_empty() {
                    return Err(CommandError::MissingArgument("rejoin"));
                }
                Command::Rejoin(token.to_string())
            }
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(ChatLine::Command(command))
    }
}

/// ERROR packet body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// CHAT packet body sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBody {
    /// Sender handle label.
    pub from: String,
    pub text: String,
}

/// Outcome of a single shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotOutcome {
    Hit,
    Miss,
    Sunk,
}

/// RESULT packet body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultBody {
    pub shooter: String,
    pub target: String,
    pub coord: String,
    pub outcome: ShotOutcome,
    /// Name of the ship that was sunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ship: Option<String>,
    /// Match move sequence this shot was recorded under.
    #[serde(rename = "move")]
    pub move_seq: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_chat() {
        assert_eq!(
            ChatLine::parse("good luck").unwrap(),
            ChatLine::Say("good luck".to_string())
        );
    }

    #[test]
    fn test_plain_text_is_kept_verbatim() {
        assert_eq!(
            ChatLine::parse("  ~~  <o)  ~~  ").unwrap(),
            ChatLine::Say("  ~~  <o)  ~~  ".to_string())
        );
        assert_eq!(
            ChatLine::parse("a\tb ").unwrap(),
            ChatLine::Say("a\tb ".to_string())
        );
        assert_eq!(
            ChatLine::parse("   ").unwrap(),
            ChatLine::Say("   ".to_string())
        );
        assert_eq!(
            ChatLine::parse("/chat  two  spaces ").unwrap(),
            ChatLine::Command(Command::Chat(" two  spaces ".to_string()))
        );
        assert_eq!(
            ChatLine::parse("  /status  ").unwrap(),
            ChatLine::Command(Command::Status)
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            ChatLine::parse("/help").unwrap(),
            ChatLine::Command(Command::Help)
        );
        assert_eq!(
            ChatLine::parse("/QUIT").unwrap(),
            ChatLine::Command(Command::Quit)
        );
        assert_eq!(
            ChatLine::parse("/status").unwrap(),
            ChatLine::Command(Command::Status)
        );
        assert_eq!(
            ChatLine::parse("/chat hello there").unwrap(),
            ChatLine::Command(Command::Chat("hello there".to_string()))
        );
        assert_eq!(
            ChatLine::parse("/rejoin 3f2a").unwrap(),
            ChatLine::Command(Command::Rejoin("3f2a".to_string()))
        );
    }

    #[test]
    fn test_parse_command_errors() {
        assert_eq!(
            ChatLine::parse("/dance").unwrap_err(),
            CommandError::Unknown("dance".to_string())
        );
        assert_eq!(
            ChatLine::parse("/rejoin").unwrap_err(),
            CommandError::MissingArgument("rejoin")
        );
        assert_eq!(
            ChatLine::parse("/chat   ").unwrap_err().error_code(),
            ErrorCode::BadRequest
        );
        assert_eq!(
            ChatLine::parse("/x").unwrap_err().error_code(),
            ErrorCode::UnknownCommand
        );
    }

    #[test]
    fn test_result_body_wire_shape() {
        let body = ResultBody {
            shooter: "#1".to_string(),
            target: "#2".to_string(),
            coord: "B1".to_string(),
            outcome: ShotOutcome::Sunk,
            ship: Some("Destroyer".to_string()),
            move_seq: 7,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["outcome"], "sunk");
        assert_eq!(json["move"], 7);
        assert_eq!(json["ship"], "Destroyer");

        let miss = ResultBody {
            outcome: ShotOutcome::Miss,
            ship: None,
            ..body
        };
        let json = serde_json::to_value(&miss).unwrap();
        assert!(json.get("ship").is_none());
    }

    #[test]
    fn test_error_body() {
        let body = ErrorBody::new(ErrorCode::NotYourTurn, "wait for your turn");
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"NOT_YOUR_TURN\""));
        let parsed: ErrorBody = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, body);
    }
}
