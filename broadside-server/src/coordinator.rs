//! Game coordinator.
//!
//! A single task owns the lobby and the active match. Connection handlers
//! send it [`ClientEvent`]s over an mpsc channel and it applies them in
//! order. A fixed sweep checks match deadlines and runs the countdown before
//! each match. Resulting packets go into the [`BroadcastHub`].

use crate::broadcast::{BroadcastHub, Outbound, Outbox};
use crate::error::ServerError;
use crate::lobby::{Lobby, LobbyError, PromotionPolicy, Role};
use crate::notice::Status;
use broadside_core::{
    Coord, FireOutcome, GameError, HandleId, Match, MatchConfig, MatchEvent, Orientation,
    ShotReport,
};
use broadside_protocol::{ChatBody, Command, PacketType, ResultBody, ShotOutcome};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Requests from connection handlers.
#[derive(Debug)]
pub enum ClientEvent {
    /// A new transport wants a handle.
    Admit {
        addr: SocketAddr,
        outbox: Arc<Outbox>,
        reply: oneshot::Sender<Result<HandleId, LobbyError>>,
    },
    Place {
        handle: HandleId,
        origin: Coord,
        orientation: Orientation,
    },
    Fire {
        handle: HandleId,
        coord: Coord,
        /// Sequence number of the FIRE packet.
        seq: u32,
    },
    Chat {
        handle: HandleId,
        text: String,
    },
    Command {
        handle: HandleId,
        command: Command,
    },
    /// QUIT packet or `/quit`. The connection closes right after.
    Quit {
        handle: HandleId,
    },
    /// The transport closed.
    Disconnected {
        handle: HandleId,
    },
}

impl ClientEvent {
    fn handle(&self) -> Option<HandleId> {
        match self {
            ClientEvent::Admit { .. } => None,
            ClientEvent::Place { handle, .. }
            | ClientEvent::Fire { handle, .. }
            | ClientEvent::Chat { handle, .. }
            | ClientEvent::Command { handle, .. }
            | ClientEvent::Quit { handle }
            | ClientEvent::Disconnected { handle } => Some(*handle),
        }
    }
}

/// Owner of all game state.
pub struct Coordinator {
    lobby: Lobby,
    current: Option<Match>,
    hub: Arc<BroadcastHub>,
    match_config: MatchConfig,
    sweep_interval: Duration,
    start_countdown: Duration,
    /// When the next match starts, once two players are waiting.
    starting_at: Option<Instant>,
    /// Last countdown second announced.
    announced: Option<u64>,
}

impl Coordinator {
    pub fn new(
        hub: Arc<BroadcastHub>,
        match_config: MatchConfig,
        max_connections: usize,
        policy: PromotionPolicy,
        sweep_interval: Duration,
        start_countdown: Duration,
    ) -> Self {
        Self {
            lobby: Lobby::new(max_connections, policy),
            current: None,
            hub,
            match_config,
            sweep_interval,
            start_countdown,
            starting_at: None,
            announced: None,
        }
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub fn current_match(&self) -> Option<&Match> {
        self.current.as_ref()
    }

    /// Processes events and deadline sweeps until shutdown or until every
    /// sender is gone.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ClientEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event, Instant::now()),
                        None => break,
                    }
                }
                _ = sweep.tick() => {
                    self.sweep(Instant::now());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Coordinator shutting down");
                    break;
                }
            }
        }
    }

    /// Applies one client event.
    pub fn handle_event(&mut self, event: ClientEvent, now: Instant) {
        let handle = event.handle();
        let result = match event {
            ClientEvent::Admit {
                addr,
                outbox,
                reply,
            } => {
                let admitted = self.admit(addr, outbox, now);
                if let Err(Ok(handle)) = reply.send(admitted) {
                    // The handler gave up waiting; undo the admission.
                    self.leave(handle, now);
                }
                Ok(())
            }
            ClientEvent::Place {
                handle,
                origin,
                orientation,
            } => self.place(handle, origin, orientation, now),
            ClientEvent::Fire { handle, coord, seq } => self.fire(handle, coord, seq, now),
            ClientEvent::Chat { handle, text } => {
                self.chat(handle, text);
                Ok(())
            }
            ClientEvent::Command { handle, command } => self.command(handle, command, now),
            ClientEvent::Quit { handle } => {
                self.quit(handle, now);
                Ok(())
            }
            ClientEvent::Disconnected { handle } => {
                self.leave(handle, now);
                Ok(())
            }
        };

        if let (Err(e), Some(handle)) = (result, handle) {
            tracing::debug!("{} request rejected: {}", handle, e);
            self.hub
                .send(handle, Outbound::error(e.error_code(), e.to_string()));
        }
    }

    /// Applies every deadline that has passed, or advances the countdown
    /// while no match is running.
    pub fn sweep(&mut self, now: Instant) {
        let events = match self.current.as_mut() {
            Some(game) => game.tick(now),
            None => {
                self.try_start_match(now);
                return;
            }
        };
        self.dispatch(events, now);
    }

    fn admit(
        &mut self,
        addr: SocketAddr,
        outbox: Arc<Outbox>,
        now: Instant,
    ) -> Result<HandleId, LobbyError> {
        let handle = match self.lobby.accept() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Rejected {}: {}", addr, e);
                return Err(e);
            }
        };
        self.hub.register(handle, outbox);
        tracing::info!(
            "Admitted {} as {} ({} connected)",
            addr,
            handle,
            self.lobby.len()
        );

        if let (Some(role), Ok(queue)) = (self.lobby.role(handle), self.lobby.status(handle)) {
            self.send_status(handle, &Status::welcome(handle, role, queue));
        }
        if let Some(game) = &self.current {
            self.send_status(handle, &Status::boards(game, None));
        }

        self.broadcast_queue();
        self.try_start_match(now);
        Ok(handle)
    }

    fn place(
        &mut self,
        handle: HandleId,
        origin: Coord,
        orientation: Orientation,
        now: Instant,
    ) -> Result<(), ServerError> {
        let game = self.current.as_mut().ok_or(GameError::NotAPlayer)?;
        let events = game.place(handle, origin, orientation, now)?;
        self.dispatch(events, now);
        Ok(())
    }

    fn fire(
        &mut self,
        handle: HandleId,
        coord: Coord,
        seq: u32,
        now: Instant,
    ) -> Result<(), ServerError> {
        let game = self.current.as_mut().ok_or(GameError::NotAPlayer)?;
        let events = game.fire(handle, coord, seq, now)?;
        self.dispatch(events, now);
        Ok(())
    }

    fn chat(&self, handle: HandleId, text: String) {
        if text.trim().is_empty() {
            return;
        }
        let body = ChatBody {
            from: handle.to_string(),
            text,
        };
        match Outbound::json(PacketType::Chat, &body) {
            Ok(packet) => self.hub.broadcast(&packet),
            Err(e) => tracing::error!("Failed to encode chat from {}: {}", handle, e),
        }
    }

    fn command(
        &mut self,
        handle: HandleId,
        command: Command,
        now: Instant,
    ) -> Result<(), ServerError> {
        match command {
            Command::Help => self.send_status(handle, &Status::help()),
            Command::Status => {
                let role = self
                    .lobby
                    .role(handle)
                    .ok_or(LobbyError::UnknownHandle(handle))?;
                let queue = self.lobby.status(handle)?;
                self.send_status(handle, &Status::queue(role, queue));
            }
            Command::Chat(text) => self.chat(handle, text),
            Command::Rejoin(token) => self.rejoin(handle, &token, now)?,
            Command::Quit => self.quit(handle, now),
        }
        Ok(())
    }

    fn rejoin(&mut self, handle: HandleId, token: &str, now: Instant) -> Result<(), ServerError> {
        if matches!(self.lobby.role(handle), Some(Role::Player(_)) | None) {
            return Err(GameError::InvalidToken.into());
        }
        let game = self.current.as_mut().ok_or(GameError::InvalidToken)?;
        let (slot, events) = game.rejoin(token, handle, now)?;
        self.lobby.bind_player(handle, slot)?;

        if let Some(game) = &self.current {
            let rejoined = Status::Rejoined {
                slot,
                phase: game.phase().as_str().to_string(),
                your_turn: game.turn() == Some(slot),
                move_seq: game.move_seq(),
            };
            self.send_status(handle, &rejoined);
            self.send_status(handle, &Status::boards(game, Some(slot)));
        }
        self.dispatch(events, now);
        self.broadcast_queue();
        Ok(())
    }

    /// A deliberate exit: forfeit if playing, then leave.
    fn quit(&mut self, handle: HandleId, now: Instant) {
        let Some(role) = self.lobby.remove(handle) else {
            return;
        };
        tracing::info!("{} quit ({})", handle, role.name());

        if let Role::Player(_) = role {
            let forfeit = self
                .current
                .as_mut()
                .filter(|game| !game.is_finished())
                .map(|game| game.forfeit(handle));
            match forfeit {
                Some(Ok(events)) => self.dispatch(events, now),
                Some(Err(e)) => tracing::warn!("{} could not forfeit: {}", handle, e),
                None => {}
            }
        }

        self.hub.unregister(handle);
        self.broadcast_queue();
    }

    /// The transport closed. A player's slot is held for the grace window.
    fn leave(&mut self, handle: HandleId, now: Instant) {
        let role = self.lobby.remove(handle);
        self.hub.unregister(handle);
        let Some(role) = role else {
            return;
        };
        tracing::info!("{} left ({})", handle, role.name());

        if let Role::Player(_) = role {
            if let Some(game) = self.current.as_mut() {
                let events = game.disconnect(handle, now);
                self.dispatch(events, now);
            }
        }
        self.broadcast_queue();
    }

    /// Starts the next match once the countdown has run out.
    fn try_start_match(&mut self, now: Instant) {
        if !self.lobby.ready_to_promote() {
            if self.starting_at.take().is_some() {
                tracing::info!("Match countdown cancelled, waiting for players");
            }
            self.announced = None;
            return;
        }

        let countdown = self.start_countdown;
        let starts_at = *self.starting_at.get_or_insert(now + countdown);
        if now < starts_at {
            let seconds = (starts_at - now).as_secs_f64().ceil() as u64;
            if self.announced != Some(seconds) {
                if self.announced.is_none() {
                    tracing::info!("Next match starts in {}s", seconds);
                }
                self.announced = Some(seconds);
                self.broadcast_status(&Status::Countdown { seconds });
            }
            return;
        }

        self.starting_at = None;
        self.announced = None;
        self.start_match(now);
    }

    fn start_match(&mut self, now: Instant) {
        let Some(players) = self.lobby.promote_next_players() else {
            return;
        };
        let game = Match::new(self.match_config.clone(), players, now);
        tracing::info!("Match starting: {} vs {}", players[0], players[1]);

        for slot in 0..2 {
            let promoted = Status::Promoted {
                slot,
                token: game.token(slot).to_string(),
                opponent: players[1 - slot].to_string(),
                fleet: game.config().fleet.clone(),
            };
            self.send_status(players[slot], &promoted);
        }
        self.current = Some(game);
        self.send_boards();
        self.broadcast_queue();
    }

    fn finish_match(&mut self, now: Instant) {
        let Some(game) = self.current.take() else {
            return;
        };
        let Some(outcome) = game.outcome().copied() else {
            return;
        };
        let winner = outcome.winner.map(|slot| game.handle(slot));
        self.lobby.end_match(game.players(), winner, outcome.reason);

        self.broadcast_queue();
        self.try_start_match(now);
    }

    fn dispatch(&mut self, events: Vec<MatchEvent>, now: Instant) {
        for event in events {
            if let Some(game) = &self.current {
                self.announce(game, &event);
            }
            if let MatchEvent::Finished(_) = event {
                self.finish_match(now);
            }
        }
    }

    fn announce(&self, game: &Match, event: &MatchEvent) {
        match event {
            MatchEvent::ShipPlaced {
                slot,
                ship,
                origin,
                orientation,
                remaining,
            } => {
                let placed = Status::Placed {
                    ship: ship.clone(),
                    coord: origin.to_string(),
                    orientation: orientation.to_string(),
                    remaining: *remaining,
                    next: game.board(*slot).next_ship().map(|s| s.name.clone()),
                };
                self.send_status(game.handle(*slot), &placed);
                self.send_boards_for(game);
            }
            MatchEvent::MatchStarted { first } => {
                let started = Status::MatchStarted {
                    players: [game.handle(0).to_string(), game.handle(1).to_string()],
                    first: game.handle(*first).to_string(),
                };
                self.broadcast_status(&started);
            }
            MatchEvent::ShotResolved(report) => {
                match Outbound::json(PacketType::Result, &result_body(game, report)) {
                    Ok(packet) => self.hub.broadcast(&packet),
                    Err(e) => tracing::error!("Failed to encode result: {}", e),
                }
                self.send_boards_for(game);
            }
            MatchEvent::ShotReplayed(report) => {
                match Outbound::json(PacketType::Result, &result_body(game, report)) {
                    Ok(packet) => {
                        self.hub.send(game.handle(report.shooter), packet);
                    }
                    Err(e) => tracing::error!("Failed to encode result: {}", e),
                }
            }
            MatchEvent::TurnChanged { slot, timeout } => {
                self.broadcast_status(&Status::Turn {
                    player: game.handle(*slot).to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
            MatchEvent::TurnSkipped { slot, skipped } => {
                self.broadcast_status(&Status::TurnSkipped {
                    player: game.handle(*slot).to_string(),
                    skipped: *skipped,
                });
            }
            MatchEvent::PlayerDisconnected { slot, grace } => {
                self.broadcast_status(&Status::PlayerDisconnected {
                    player: game.handle(*slot).to_string(),
                    grace_secs: grace.as_secs(),
                });
            }
            MatchEvent::PlayerRejoined { slot } => {
                self.broadcast_status(&Status::PlayerRejoined {
                    player: game.handle(*slot).to_string(),
                });
            }
            MatchEvent::Finished(outcome) => {
                tracing::info!(
                    "Match finished: {:?}, winner {}",
                    outcome.reason,
                    outcome
                        .winner
                        .map(|s| game.handle(s).to_string())
                        .unwrap_or_else(|| "none".to_string())
                );
                self.send_boards_unredacted(game);
                self.broadcast_status(&Status::finished(game, outcome));
            }
        }
    }

    fn send_status(&self, handle: HandleId, status: &Status) {
        match status.to_outbound() {
            Ok(packet) => {
                self.hub.send(handle, packet);
            }
            Err(e) => tracing::error!("Failed to encode status for {}: {}", handle, e),
        }
    }

    fn broadcast_status(&self, status: &Status) {
        match status.to_outbound() {
            Ok(packet) => self.hub.broadcast(&packet),
            Err(e) => tracing::error!("Failed to encode status: {}", e),
        }
    }

    /// Queue position to everyone waiting.
    fn broadcast_queue(&self) {
        for handle in self.lobby.queue() {
            if let (Some(role), Ok(queue)) = (self.lobby.role(handle), self.lobby.status(handle)) {
                self.send_status(handle, &Status::queue(role, queue));
            }
        }
    }

    fn send_boards(&self) {
        if let Some(game) = &self.current {
            self.send_boards_for(game);
        }
    }

    /// Boards to every connection, redacted per recipient.
    fn send_boards_for(&self, game: &Match) {
        self.hub.broadcast_with(|handle| {
            let viewer = match self.lobby.role(handle) {
                Some(Role::Player(slot)) => Some(slot),
                Some(_) => None,
                None => return None,
            };
            Status::boards(game, viewer).to_outbound().ok()
        });
    }

    /// Final boards in full for everyone.
    fn send_boards_unredacted(&self, game: &Match) {
        self.broadcast_status(&Status::boards(game, None));
    }
}

fn result_body(game: &Match, report: &ShotReport) -> ResultBody {
    let (outcome, ship) = match &report.outcome {
        FireOutcome::Miss => (ShotOutcome::Miss, None),
        FireOutcome::Hit => (ShotOutcome::Hit, None),
        FireOutcome::Sunk(name) => (ShotOutcome::Sunk, Some(name.clone())),
    };
    ResultBody {
        shooter: game.handle(report.shooter).to_string(),
        target: game.handle(report.target).to_string(),
        coord: report.coord.to_string(),
        outcome,
        ship,
        move_seq: report.move_seq,
    }
}
