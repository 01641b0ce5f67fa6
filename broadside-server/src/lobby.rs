//! Admission, queueing and role assignment.

use broadside_core::{FinishReason, HandleId};
use broadside_protocol::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// What a connection is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Queued with no match running.
    Pending,
    /// Queued while a match is running.
    Spectator,
    /// Bound to a match slot.
    Player(usize),
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Pending => "pending",
            Role::Spectator => "spectator",
            Role::Player(_) => "player",
        }
    }

    pub fn slot(self) -> Option<usize> {
        match self {
            Role::Player(slot) => Some(slot),
            _ => None,
        }
    }
}

/// How the players of the next match are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionPolicy {
    /// Longest-waiting connections play next; finished players rejoin the back.
    #[default]
    Fifo,
    /// The winner goes to the front of the queue and plays again.
    WinnerStays,
}

impl std::str::FromStr for PromotionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fifo" => Ok(PromotionPolicy::Fifo),
            "winner_stays" => Ok(PromotionPolicy::WinnerStays),
            other => Err(format!("unknown promotion policy '{}'", other)),
        }
    }
}

/// Queue position report for `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// 1-based position, `None` for players.
    pub position: Option<usize>,
    /// Matches that must finish before this handle plays.
    pub games_to_wait: Option<usize>,
    /// Handles waiting in total.
    pub queued: usize,
}

/// Lobby errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("server is full ({max} connections)")]
    CapacityExceeded { max: usize },

    #[error("unknown handle {0}")]
    UnknownHandle(HandleId),
}

impl LobbyError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            LobbyError::CapacityExceeded { .. } => ErrorCode::CapacityExceeded,
            LobbyError::UnknownHandle(_) => ErrorCode::InternalError,
        }
    }
}

/// Roster of connected handles with their roles and the waiting queue.
///
/// A handle is in exactly one of: the queue (Pending or Spectator), or a
/// match slot (Player).
#[derive(Debug)]
pub struct Lobby {
    max_connections: usize,
    policy: PromotionPolicy,
    next_id: u64,
    roles: HashMap<HandleId, Role>,
    queue: VecDeque<HandleId>,
    match_active: bool,
}

impl Lobby {
    pub fn new(max_connections: usize, policy: PromotionPolicy) -> Self {
        Self {
            max_connections,
            policy,
            next_id: 1,
            roles: HashMap::new(),
            queue: VecDeque::new(),
            match_active: false,
        }
    }

    fn queued_role(&self) -> Role {
        if self.match_active {
            Role::Spectator
        } else {
            Role::Pending
        }
    }

    /// Admits a new connection at the back of the queue.
    pub fn accept(&mut self) -> Result<HandleId, LobbyError> {
        if self.roles.len() >= self.max_connections {
            return Err(LobbyError::CapacityExceeded {
                max: self.max_connections,
            });
        }

        let handle = HandleId(self.next_id);
        self.next_id += 1;
        self.roles.insert(handle, self.queued_role());
        self.queue.push_back(handle);
        Ok(handle)
    }

    /// Forgets a closed connection. Returns the role it held.
    pub fn remove(&mut self, handle: HandleId) -> Option<Role> {
        let role = self.roles.remove(&handle)?;
        self.queue.retain(|h| *h != handle);
        Some(role)
    }

    pub fn role(&self, handle: HandleId) -> Option<Role> {
        self.roles.get(&handle).copied()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn is_match_active(&self) -> bool {
        self.match_active
    }

    pub fn policy(&self) -> PromotionPolicy {
        self.policy
    }

    /// Connected handles in admission order.
    pub fn handles(&self) -> Vec<HandleId> {
        let mut handles: Vec<HandleId> = self.roles.keys().copied().collect();
        handles.sort();
        handles
    }

    /// Waiting handles, front first.
    pub fn queue(&self) -> impl Iterator<Item = HandleId> + '_ {
        self.queue.iter().copied()
    }

    /// True when no match is running and two handles are waiting.
    pub fn ready_to_promote(&self) -> bool {
        !self.match_active && self.queue.len() >= 2
    }

    /// Pops the two longest-waiting handles and makes them players.
    ///
    /// Returns `None` while a match is active or fewer than two are waiting.
    pub fn promote_next_players(&mut self) -> Option<[HandleId; 2]> {
        if !self.ready_to_promote() {
            return None;
        }

        let first = self.queue.pop_front()?;
        let second = self.queue.pop_front()?;
        self.roles.insert(first, Role::Player(0));
        self.roles.insert(second, Role::Player(1));
        self.match_active = true;

        for handle in &self.queue {
            self.roles.insert(*handle, Role::Spectator);
        }

        tracing::info!("Promoted {} and {} to players", first, second);
        Some([first, second])
    }

    /// Binds a queued handle to a match slot after `/rejoin`.
    pub fn bind_player(&mut self, handle: HandleId, slot: usize) -> Result<(), LobbyError> {
        let role = self
            .roles
            .get_mut(&handle)
            .ok_or(LobbyError::UnknownHandle(handle))?;
        *role = Role::Player(slot);
        self.queue.retain(|h| *h != handle);
        Ok(())
    }

    /// Returns a former player to the back of the queue. Returns false if
    /// its connection has already closed.
    pub fn demote(&mut self, handle: HandleId, reason: FinishReason) -> bool {
        let requeued = self.requeue(handle, false);
        if requeued {
            tracing::debug!("{} back in the queue ({:?})", handle, reason);
        }
        requeued
    }

    fn requeue(&mut self, handle: HandleId, front: bool) -> bool {
        let role = self.queued_role();
        let Some(current) = self.roles.get_mut(&handle) else {
            return false;
        };
        *current = role;
        self.queue.retain(|h| *h != handle);
        if front {
            self.queue.push_front(handle);
        } else {
            self.queue.push_back(handle);
        }
        true
    }

    /// Ends the active match and requeues its players per the promotion
    /// policy. Players whose connections closed are dropped.
    pub fn end_match(
        &mut self,
        players: [HandleId; 2],
        winner: Option<HandleId>,
        reason: FinishReason,
    ) {
        self.match_active = false;

        let stays = match self.policy {
            PromotionPolicy::WinnerStays => winner,
            PromotionPolicy::Fifo => None,
        };
        for handle in players.into_iter().filter(|h| Some(*h) != stays) {
            self.demote(handle, reason);
        }
        if let Some(winner) = stays {
            self.requeue(winner, true);
        }

        for handle in &self.queue {
            self.roles.insert(*handle, Role::Pending);
        }
    }

    /// Queue position of `handle`.
    pub fn status(&self, handle: HandleId) -> Result<QueueStatus, LobbyError> {
        if !self.roles.contains_key(&handle) {
            return Err(LobbyError::UnknownHandle(handle));
        }
        let position = self
            .queue
            .iter()
            .position(|h| *h == handle)
            .map(|idx| idx + 1);
        Ok(QueueStatus {
            position,
            games_to_wait: position.map(|p| (p - 1) / 2),
            queued: self.queue.len(),
        })
    }
}
