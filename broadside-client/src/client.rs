//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use broadside_protocol::{ChatBody, ErrorBody, Packet, PacketType, ResultBody};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A decoded packet from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Result(ResultBody),
    Chat(ChatBody),
    /// STATUS notice; the `type` field tells them apart.
    Status(Value),
    Error(ErrorBody),
    Pong(Bytes),
    /// A packet type the server should never send.
    Unexpected(Packet),
}

impl ServerMessage {
    pub fn from_packet(packet: Packet) -> Result<Self, ClientError> {
        Ok(match packet.packet_type {
            PacketType::Result => ServerMessage::Result(packet.json()?),
            PacketType::Chat => ServerMessage::Chat(packet.json()?),
            PacketType::Status => ServerMessage::Status(packet.json()?),
            PacketType::Error => ServerMessage::Error(packet.json()?),
            PacketType::Pong => ServerMessage::Pong(packet.payload),
            _ => ServerMessage::Unexpected(packet),
        })
    }

    /// The `type` of a STATUS notice.
    pub fn status_type(&self) -> Option<&str> {
        match self {
            ServerMessage::Status(value) => value["type"].as_str(),
            _ => None,
        }
    }

    pub fn is_status(&self, kind: &str) -> bool {
        self.status_type() == Some(kind)
    }
}

/// High-level client for broadside.
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
        }
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    // =========================================================================
    // Game actions
    // =========================================================================

    /// Places the next ship, e.g. `"A1 H"` or `"c3v"`.
    pub async fn place(&self, placement: &str) -> Result<u32, ClientError> {
        self.conn.send(PacketType::Place, placement.to_string()).await
    }

    /// Fires at a coordinate. Returns the packet sequence number.
    pub async fn fire(&self, coord: &str) -> Result<u32, ClientError> {
        self.conn.send(PacketType::Fire, coord.to_string()).await
    }

    /// Resends a shot under the sequence number it was first sent with.
    pub async fn refire(&self, sequence: u32, coord: &str) -> Result<(), ClientError> {
        self.conn
            .send_with_sequence(sequence, PacketType::Fire, coord.to_string())
            .await
    }

    /// Sends a chat line; lines starting with `/` are commands.
    pub async fn chat(&self, line: &str) -> Result<u32, ClientError> {
        self.conn.send(PacketType::Chat, line.to_string()).await
    }

    /// Asks for role and queue position.
    pub async fn status(&self) -> Result<u32, ClientError> {
        self.conn.send(PacketType::Status, Bytes::new()).await
    }

    /// Claims a held slot after reconnecting.
    pub async fn rejoin(&self, token: &str) -> Result<u32, ClientError> {
        self.chat(&format!("/rejoin {}", token)).await
    }

    pub async fn ping(&self, payload: &str) -> Result<u32, ClientError> {
        self.conn.send(PacketType::Ping, payload.to_string()).await
    }

    /// Leaves the server, forfeiting any match in progress.
    pub async fn quit(&self) -> Result<u32, ClientError> {
        self.conn.send(PacketType::Quit, Bytes::new()).await
    }

    // =========================================================================
    // Receiving
    // =========================================================================

    /// Receives and decodes the next packet.
    pub async fn next_message(&self) -> Result<ServerMessage, ClientError> {
        ServerMessage::from_packet(self.conn.recv().await?)
    }

    /// Skips messages until one satisfies `matches`, giving up after `timeout`.
    pub async fn wait_for<F>(&self, timeout: Duration, mut matches: F) -> Result<ServerMessage, ClientError>
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::Timeout);
            }
            let packet = self.conn.recv_timeout(remaining).await?;
            let message = ServerMessage::from_packet(packet)?;
            if matches(&message) {
                return Ok(message);
            }
            tracing::debug!("Skipping {:?}", message);
        }
    }

    /// Waits for a STATUS notice of the given `type`.
    pub async fn wait_status(&self, kind: &str) -> Result<Value, ClientError> {
        let timeout = self.conn.config().recv_timeout;
        match self.wait_for(timeout, |m| m.is_status(kind)).await? {
            ServerMessage::Status(value) => Ok(value),
            _ => Err(ClientError::Timeout),
        }
    }

    /// Waits for the next RESULT.
    pub async fn wait_result(&self) -> Result<ResultBody, ClientError> {
        let timeout = self.conn.config().recv_timeout;
        match self
            .wait_for(timeout, |m| matches!(m, ServerMessage::Result(_)))
            .await?
        {
            ServerMessage::Result(body) => Ok(body),
            _ => Err(ClientError::Timeout),
        }
    }

    /// Waits for the next ERROR.
    pub async fn wait_error(&self) -> Result<ErrorBody, ClientError> {
        let timeout = self.conn.config().recv_timeout;
        match self
            .wait_for(timeout, |m| matches!(m, ServerMessage::Error(_)))
            .await?
        {
            ServerMessage::Error(body) => Ok(body),
            _ => Err(ClientError::Timeout),
        }
    }

    /// Collects messages until the server stays quiet for `quiet`.
    pub async fn drain(&self, quiet: Duration) -> Result<Vec<ServerMessage>, ClientError> {
        let mut messages = Vec::new();
        loop {
            match self.conn.recv_timeout(quiet).await {
                Ok(packet) => messages.push(ServerMessage::from_packet(packet)?),
                Err(ClientError::Timeout) => return Ok(messages),
                Err(e) => return Err(e),
            }
        }
    }
}
