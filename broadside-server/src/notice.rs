//! STATUS packet bodies.

use crate::broadcast::Outbound;
use crate::lobby::{QueueStatus, Role};
use broadside_core::{BoardView, FinishReason, HandleId, Match, MatchOutcome, ShipSpec};
use broadside_protocol::PacketType;
use serde::{Deserialize, Serialize};

/// Commands listed by `/help`.
pub const HELP_COMMANDS: &[&str] = &[
    "/help - list commands",
    "/status - show your role and queue position",
    "/chat <message> - send a message to everyone",
    "/rejoin <token> - take back your seat after a disconnect",
    "/quit - leave (forfeits if you are playing)",
];

/// One board as seen by the recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardNotice {
    pub owner: String,
    pub view: BoardView,
}

/// A STATUS payload. Serialized with a `type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Status {
    Welcome {
        handle: String,
        role: String,
        position: Option<usize>,
        games_to_wait: Option<usize>,
        queued: usize,
    },
    Queue {
        role: String,
        position: Option<usize>,
        games_to_wait: Option<usize>,
        queued: usize,
    },
    /// Seconds until the next match starts.
    Countdown {
        seconds: u64,
    },
    Promoted {
        slot: usize,
        token: String,
        opponent: String,
        fleet: Vec<ShipSpec>,
    },
    Placed {
        ship: String,
        coord: String,
        orientation: String,
        remaining: usize,
        next: Option<String>,
    },
    MatchStarted {
        players: [String; 2],
        first: String,
    },
    Turn {
        player: String,
        timeout_secs: u64,
    },
    TurnSkipped {
        player: String,
        skipped: u32,
    },
    Boards {
        boards: Vec<BoardNotice>,
    },
    PlayerDisconnected {
        player: String,
        grace_secs: u64,
    },
    PlayerRejoined {
        player: String,
    },
    Rejoined {
        slot: usize,
        phase: String,
        your_turn: bool,
        #[serde(rename = "move")]
        move_seq: u64,
    },
    Finished {
        winner: Option<String>,
        loser: Option<String>,
        reason: FinishReason,
        moves: u64,
    },
    Help {
        commands: Vec<String>,
    },
}

impl Status {
    pub fn welcome(handle: HandleId, role: Role, queue: QueueStatus) -> Self {
        Status::Welcome {
            handle: handle.to_string(),
            role: role.name().to_string(),
            position: queue.position,
            games_to_wait: queue.games_to_wait,
            queued: queue.queued,
        }
    }

    pub fn queue(role: Role, queue: QueueStatus) -> Self {
        Status::Queue {
            role: role.name().to_string(),
            position: queue.position,
            games_to_wait: queue.games_to_wait,
            queued: queue.queued,
        }
    }

    pub fn help() -> Self {
        Status::Help {
            commands: HELP_COMMANDS.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Both boards of `game` as `viewer` may see them. Players get the
    /// opponent's board redacted; everyone else sees both in full.
    pub fn boards(game: &Match, viewer: Option<usize>) -> Self {
        let boards = (0..2)
            .map(|slot| BoardNotice {
                owner: game.handle(slot).to_string(),
                view: game.board_view(slot, viewer),
            })
            .collect();
        Status::Boards { boards }
    }

    pub fn finished(game: &Match, outcome: &MatchOutcome) -> Self {
        Status::Finished {
            winner: outcome.winner.map(|s| game.handle(s).to_string()),
            loser: outcome.loser.map(|s| game.handle(s).to_string()),
            reason: outcome.reason,
            moves: game.move_seq(),
        }
    }

    /// Wraps the notice in a STATUS packet.
    pub fn to_outbound(&self) -> Result<Outbound, serde_json::Error> {
        Outbound::json(PacketType::Status, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadside_core::{MatchConfig, Orientation};
    use std::time::Instant;

    fn one_ship_match() -> Match {
        let config = MatchConfig {
            fleet: vec![ShipSpec::new("Dinghy", 1)],
            ..MatchConfig::default()
        };
        let now = Instant::now();
        let mut game = Match::new(config, [HandleId(1), HandleId(2)], now);
        game.place(HandleId(1), "A1".parse().unwrap(), Orientation::Horizontal, now)
            .unwrap();
        game.place(HandleId(2), "B1".parse().unwrap(), Orientation::Horizontal, now)
            .unwrap();
        game
    }

    #[test]
    fn test_tagged_json() {
        let json = serde_json::to_value(Status::help()).unwrap();
        assert_eq!(json["type"], "help");
        assert_eq!(json["commands"].as_array().unwrap().len(), HELP_COMMANDS.len());

        let json = serde_json::to_value(Status::PlayerDisconnected {
            player: "player-2".into(),
            grace_secs: 30,
        })
        .unwrap();
        assert_eq!(json["type"], "player_disconnected");
        assert_eq!(json["grace_secs"], 30);

        let json = serde_json::to_value(Status::Countdown { seconds: 5 }).unwrap();
        assert_eq!(json["type"], "countdown");
        assert_eq!(json["seconds"], 5);
    }

    #[test]
    fn test_queue_notice() {
        let queue = QueueStatus {
            position: Some(3),
            games_to_wait: Some(1),
            queued: 4,
        };
        let json = serde_json::to_value(Status::queue(Role::Spectator, queue)).unwrap();
        assert_eq!(json["type"], "queue");
        assert_eq!(json["role"], "spectator");
        assert_eq!(json["games_to_wait"], 1);
    }

    #[test]
    fn test_boards_redacted_for_opponent_only() {
        let game = one_ship_match();

        let Status::Boards { boards } = Status::boards(&game, Some(0)) else {
            panic!("expected boards");
        };
        assert_eq!(boards[0].owner, "player-1");
        assert!(boards[0].view.rows[0].starts_with('S'));
        assert!(!boards[1].view.rows[0].contains('S'));

        let Status::Boards { boards } = Status::boards(&game, None) else {
            panic!("expected boards");
        };
        assert!(boards[1].view.rows[0].contains('S'));
    }

    #[test]
    fn test_finished_names_players() {
        let mut game = one_ship_match();
        let events = game
            .fire(HandleId(1), "B1".parse().unwrap(), 1, Instant::now())
            .unwrap();
        let outcome = *game.outcome().unwrap();
        assert!(!events.is_empty());

        let json = serde_json::to_value(Status::finished(&game, &outcome)).unwrap();
        assert_eq!(json["type"], "finished");
        assert_eq!(json["winner"], "player-1");
        assert_eq!(json["loser"], "player-2");
        assert_eq!(json["reason"], "fleet_destroyed");
        assert_eq!(json["moves"], 1);
    }

    #[test]
    fn test_to_outbound_is_status_packet() {
        let packet = Status::help().to_outbound().unwrap();
        assert_eq!(packet.packet_type, PacketType::Status);
        let decoded: Status = serde_json::from_slice(&packet.payload).unwrap();
        assert_eq!(decoded, Status::help());
    }
}
