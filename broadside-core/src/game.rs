//! Match state machine.
//!
//! A [`Match`] binds two player slots to boards and drives them through
//! `Placement -> Active -> (Resolving -> Active)* -> Finished`. Every
//! operation takes the current time explicitly so deadlines are checked by
//! the caller's sweep rather than by timers owned here.

use crate::board::{Board, BoardView, FireOutcome};
use crate::coord::{Coord, Orientation};
use crate::error::GameError;
use crate::fleet::{classic_fleet, ShipSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Server-side identity of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player-{}", self.0)
    }
}

/// Rules and timing for a match.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub fleet: Vec<ShipSpec>,
    pub turn_timeout: Duration,
    pub placement_timeout: Duration,
    pub reconnect_grace: Duration,
    pub max_skipped_turns: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            fleet: classic_fleet(),
            turn_timeout: Duration::from_secs(30),
            placement_timeout: Duration::from_secs(120),
            reconnect_grace: Duration::from_secs(30),
            max_skipped_turns: 2,
        }
    }
}

/// Match phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Placement,
    Active,
    /// A shot is being applied. Never observed between operations.
    Resolving,
    Finished,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Placement => "placement",
            Phase::Active => "active",
            Phase::Resolving => "resolving",
            Phase::Finished => "finished",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    FleetDestroyed,
    TurnTimeouts,
    PlacementTimeout,
    Disconnected,
    Quit,
    Abandoned,
}

impl FinishReason {
    /// Whether the match ended without a fleet being destroyed.
    pub fn is_forfeit(self) -> bool {
        !matches!(self, FinishReason::FleetDestroyed)
    }
}

/// Final result of a match. `winner` and `loser` are slot indices; both are
/// `None` when the match was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub winner: Option<usize>,
    pub loser: Option<usize>,
    pub reason: FinishReason,
}

/// A resolved shot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShotReport {
    pub shooter: usize,
    pub target: usize,
    pub coord: Coord,
    pub outcome: FireOutcome,
    pub move_seq: u64,
}

/// State transitions emitted by match operations, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    ShipPlaced {
        slot: usize,
        ship: String,
        origin: Coord,
        orientation: Orientation,
        remaining: usize,
    },
    MatchStarted {
        first: usize,
    },
    ShotResolved(ShotReport),
    /// The shooter resent its last accepted shot; only the shooter should
    /// see this.
    ShotReplayed(ShotReport),
    TurnChanged {
        slot: usize,
        timeout: Duration,
    },
    TurnSkipped {
        slot: usize,
        skipped: u32,
    },
    PlayerDisconnected {
        slot: usize,
        grace: Duration,
    },
    PlayerRejoined {
        slot: usize,
    },
    Finished(MatchOutcome),
}

#[derive(Debug, Clone)]
struct LastFire {
    client_seq: u32,
    report: ShotReport,
}

#[derive(Debug)]
struct Slot {
    handle: HandleId,
    token: Uuid,
    board: Board,
    /// Grace deadline while the slot's connection is gone.
    disconnected_until: Option<Instant>,
    skipped: u32,
    last_fire: Option<LastFire>,
}

impl Slot {
    fn new(handle: HandleId, fleet: &[ShipSpec]) -> Self {
        Self {
            handle,
            token: Uuid::new_v4(),
            board: Board::new(fleet.to_vec()),
            disconnected_until: None,
            skipped: 0,
            last_fire: None,
        }
    }
}

fn opponent(slot: usize) -> usize {
    1 - slot
}

/// One match between two players.
#[derive(Debug)]
pub struct Match {
    config: MatchConfig,
    slots: [Slot; 2],
    phase: Phase,
    turn: usize,
    move_seq: u64,
    deadline: Option<Instant>,
    /// Turn time left to a player who cannot fire while the opponent is away.
    suspended: Option<Duration>,
    outcome: Option<MatchOutcome>,
}

impl Match {
    /// Starts a match in the placement phase. Slot 0 moves first.
    pub fn new(config: MatchConfig, players: [HandleId; 2], now: Instant) -> Self {
        let slots = [
            Slot::new(players[0], &config.fleet),
            Slot::new(players[1], &config.fleet),
        ];
        let deadline = Some(now + config.placement_timeout);
        tracing::info!(
            "Match created: {} vs {}, placement closes in {:?}",
            players[0],
            players[1],
            config.placement_timeout
        );
        Self {
            config,
            slots,
            phase: Phase::Placement,
            turn: 0,
            move_seq: 0,
            deadline,
            suspended: None,
            outcome: None,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Slot whose turn it is, while the match is active.
    pub fn turn(&self) -> Option<usize> {
        (self.phase == Phase::Active).then_some(self.turn)
    }

    pub fn move_seq(&self) -> u64 {
        self.move_seq
    }

    /// The running placement or turn deadline. `None` while the current
    /// player is held up by a disconnected opponent.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// True while either slot is waiting for its player to reconnect.
    pub fn is_paused(&self) -> bool {
        self.slots.iter().any(|s| s.disconnected_until.is_some())
    }

    pub fn players(&self) -> [HandleId; 2] {
        [self.slots[0].handle, self.slots[1].handle]
    }

    pub fn handle(&self, slot: usize) -> HandleId {
        self.slots[slot].handle
    }

    pub fn token(&self, slot: usize) -> Uuid {
        self.slots[slot].token
    }

    pub fn slot_of(&self, handle: HandleId) -> Option<usize> {
        self.slots.iter().position(|s| s.handle == handle)
    }

    pub fn is_connected(&self, slot: usize) -> bool {
        self.slots[slot].disconnected_until.is_none()
    }

    pub fn board(&self, slot: usize) -> &Board {
        &self.slots[slot].board
    }

    pub fn skipped_turns(&self, slot: usize) -> u32 {
        self.slots[slot].skipped
    }

    /// Renders `slot`'s board for `viewer`. The opponent of `slot` sees only
    /// cells that have been fired at; everyone else sees the full board.
    pub fn board_view(&self, slot: usize, viewer: Option<usize>) -> BoardView {
        let redact = viewer == Some(opponent(slot));
        self.slots[slot].board.view(redact)
    }

    fn require_slot(&self, handle: HandleId) -> Result<usize, GameError> {
        self.slot_of(handle).ok_or(GameError::NotAPlayer)
    }

    /// The player to move is connected but cannot fire because the
    /// opponent is away.
    fn turn_blocked(&self) -> bool {
        self.phase == Phase::Active && self.is_connected(self.turn) && self.is_paused()
    }

    /// Freezes the turn clock while the player to move is blocked and
    /// resumes it with the time that was left once they are not.
    ///
    /// A player who drops on their own turn keeps losing time, so
    /// reconnecting never buys a fresh turn.
    fn sync_turn_clock(&mut self, now: Instant) {
        if self.phase != Phase::Active {
            return;
        }
        if self.turn_blocked() {
            if let Some(deadline) = self.deadline.take() {
                self.suspended = Some(deadline.saturating_duration_since(now));
            }
        } else if let Some(left) = self.suspended.take() {
            self.deadline = Some(now + left);
        }
    }

    fn start_turn(&mut self, slot: usize, now: Instant) {
        self.turn = slot;
        self.suspended = None;
        self.deadline = Some(now + self.config.turn_timeout);
        self.sync_turn_clock(now);
    }

    /// Places the next ship of `handle`'s fleet.
    pub fn place(
        &mut self,
        handle: HandleId,
        origin: Coord,
        orientation: Orientation,
        now: Instant,
    ) -> Result<Vec<MatchEvent>, GameError> {
        let slot = self.require_slot(handle)?;
        if self.phase != Phase::Placement {
            return Err(GameError::WrongPhase {
                phase: self.phase.as_str(),
            });
        }

        let board = &mut self.slots[slot].board;
        let ship = board.place_next(origin, orientation)?.name().to_string();
        let remaining = board.unplaced();
        tracing::debug!(
            "{} placed {} at {} {}, {} remaining",
            handle,
            ship,
            origin,
            orientation,
            remaining
        );

        let mut events = vec![MatchEvent::ShipPlaced {
            slot,
            ship,
            origin,
            orientation,
            remaining,
        }];

        if self.slots.iter().all(|s| s.board.is_complete()) {
            self.phase = Phase::Active;
            self.start_turn(0, now);
            tracing::info!(
                "Match started: {} moves first",
                self.slots[self.turn].handle
            );
            events.push(MatchEvent::MatchStarted { first: self.turn });
            events.push(MatchEvent::TurnChanged {
                slot: self.turn,
                timeout: self.config.turn_timeout,
            });
        }

        Ok(events)
    }

    /// Fires at the opponent's board on behalf of `handle`.
    ///
    /// `client_seq` is the sequence number of the packet carrying the shot.
    /// Resending the last accepted shot with the same sequence number and
    /// coordinate yields `ShotReplayed` and changes nothing.
    pub fn fire(
        &mut self,
        handle: HandleId,
        coord: Coord,
        client_seq: u32,
        now: Instant,
    ) -> Result<Vec<MatchEvent>, GameError> {
        let slot = self.require_slot(handle)?;

        if let Some(last) = &self.slots[slot].last_fire {
            if last.client_seq == client_seq && last.report.coord == coord {
                tracing::debug!("{} replayed move {}", handle, last.report.move_seq);
                return Ok(vec![MatchEvent::ShotReplayed(last.report.clone())]);
            }
        }

        if self.phase != Phase::Active {
            return Err(GameError::WrongPhase {
                phase: self.phase.as_str(),
            });
        }
        if self.is_paused() {
            return Err(GameError::MatchPaused);
        }
        if self.turn != slot {
            return Err(GameError::NotYourTurn);
        }

        let target = opponent(slot);
        self.phase = Phase::Resolving;
        let outcome = match self.slots[target].board.fire(coord) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.phase = Phase::Active;
                return Err(e);
            }
        };

        self.move_seq += 1;
        let report = ShotReport {
            shooter: slot,
            target,
            coord,
            outcome,
            move_seq: self.move_seq,
        };
        tracing::debug!(
            "Move {}: {} fired at {} -> {:?}",
            report.move_seq,
            handle,
            coord,
            report.outcome
        );

        let shooter = &mut self.slots[slot];
        shooter.skipped = 0;
        shooter.last_fire = Some(LastFire {
            client_seq,
            report: report.clone(),
        });

        let mut events = vec![MatchEvent::ShotResolved(report)];
        if self.slots[target].board.all_sunk() {
            events.push(self.finish(Some(slot), FinishReason::FleetDestroyed));
        } else {
            self.phase = Phase::Active;
            self.start_turn(target, now);
            events.push(MatchEvent::TurnChanged {
                slot: target,
                timeout: self.config.turn_timeout,
            });
        }
        Ok(events)
    }

    /// Forfeits the match on behalf of `handle`.
    pub fn forfeit(&mut self, handle: HandleId) -> Result<Vec<MatchEvent>, GameError> {
        let slot = self.require_slot(handle)?;
        if self.is_finished() {
            return Err(GameError::WrongPhase {
                phase: self.phase.as_str(),
            });
        }
        Ok(vec![self.finish(Some(opponent(slot)), FinishReason::Quit)])
    }

    /// Marks `handle`'s slot as disconnected for the grace window. The
    /// opponent's turn clock stops while they wait; the absent player's own
    /// clock keeps running.
    pub fn disconnect(&mut self, handle: HandleId, now: Instant) -> Vec<MatchEvent> {
        let Some(slot) = self.slot_of(handle) else {
            return Vec::new();
        };
        if self.is_finished() || !self.is_connected(slot) {
            return Vec::new();
        }

        let grace = self.config.reconnect_grace;
        self.slots[slot].disconnected_until = Some(now + grace);
        self.sync_turn_clock(now);
        tracing::info!(
            "{} disconnected from slot {}, holding for {:?}",
            handle,
            slot,
            grace
        );
        vec![MatchEvent::PlayerDisconnected { slot, grace }]
    }

    /// Binds `handle` to the disconnected slot owning `token`.
    ///
    /// Board, turn pointer, move sequence and the turn clock carry over; a
    /// frozen clock resumes with the time it had left.
    pub fn rejoin(
        &mut self,
        token: &str,
        handle: HandleId,
        now: Instant,
    ) -> Result<(usize, Vec<MatchEvent>), GameError> {
        let token = Uuid::parse_str(token.trim()).map_err(|_| GameError::InvalidToken)?;
        let slot = self
            .slots
            .iter()
            .position(|s| s.token == token)
            .ok_or(GameError::InvalidToken)?;
        if self.is_finished() || self.is_connected(slot) {
            return Err(GameError::InvalidToken);
        }

        let previous = self.slots[slot].handle;
        self.slots[slot].handle = handle;
        self.slots[slot].disconnected_until = None;
        self.sync_turn_clock(now);
        tracing::info!("{} rejoined slot {} (was {})", handle, slot, previous);

        Ok((slot, vec![MatchEvent::PlayerRejoined { slot }]))
    }

    /// Applies every deadline that has passed at `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<MatchEvent> {
        if self.is_finished() {
            return Vec::new();
        }

        let expired: Vec<usize> = (0..2)
            .filter(|&i| self.slots[i].disconnected_until.is_some_and(|d| now >= d))
            .collect();
        match expired.as_slice() {
            [] => {}
            [slot] => {
                return vec![self.finish(Some(opponent(*slot)), FinishReason::Disconnected)];
            }
            _ => return vec![self.finish(None, FinishReason::Abandoned)],
        }

        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return Vec::new(),
        }

        match self.phase {
            Phase::Placement => {
                let unfinished: Vec<usize> = (0..2)
                    .filter(|&i| !self.slots[i].board.is_complete())
                    .collect();
                match unfinished.as_slice() {
                    [slot] => {
                        vec![self.finish(Some(opponent(*slot)), FinishReason::PlacementTimeout)]
                    }
                    _ => vec![self.finish(None, FinishReason::Abandoned)],
                }
            }
            Phase::Active => {
                let slot = self.turn;
                self.slots[slot].skipped += 1;
                let skipped = self.slots[slot].skipped;
                tracing::info!(
                    "{} ran out of time ({} consecutive)",
                    self.slots[slot].handle,
                    skipped
                );

                let mut events = vec![MatchEvent::TurnSkipped { slot, skipped }];
                if skipped >= self.config.max_skipped_turns {
                    events.push(self.finish(Some(opponent(slot)), FinishReason::TurnTimeouts));
                } else {
                    self.start_turn(opponent(slot), now);
                    events.push(MatchEvent::TurnChanged {
                        slot: self.turn,
                        timeout: self.config.turn_timeout,
                    });
                }
                events
            }
            Phase::Resolving | Phase::Finished => Vec::new(),
        }
    }

    fn finish(&mut self, winner: Option<usize>, reason: FinishReason) -> MatchEvent {
        let outcome = MatchOutcome {
            winner,
            loser: winner.map(opponent),
            reason,
        };
        self.phase = Phase::Finished;
        self.deadline = None;
        self.suspended = None;
        self.outcome = Some(outcome);

        match winner {
            Some(w) => tracing::info!(
                "Match finished: {} wins ({:?}) after {} moves",
                self.slots[w].handle,
                reason,
                self.move_seq
            ),
            None => tracing::info!("Match finished without a winner ({:?})", reason),
        }
        MatchEvent::Finished(outcome)
    }
}
