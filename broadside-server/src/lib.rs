//! # broadside-server
//!
//! TCP server for broadside.
//!
//! This crate provides:
//! - TCP connection handling with a per-connection reader and writer task
//! - Token-bucket rate limiting and checksum strike counting
//! - Admission, queueing and player/spectator roles
//! - A coordinator task that owns the active match
//! - Role-filtered fan-out to bounded per-connection outboxes

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod lobby;
pub mod notice;
pub mod rate_limit;
pub mod server;
pub mod session;

pub use broadcast::{BroadcastHub, Outbound, Outbox};
pub use config::{Config, ConfigError, GameConfig, LimitsConfig, NetworkConfig, ProtocolConfig};
pub use coordinator::{ClientEvent, Coordinator};
pub use error::ServerError;
pub use lobby::{Lobby, LobbyError, PromotionPolicy, QueueStatus, Role};
pub use notice::Status;
pub use rate_limit::{RateDecision, TokenBucket};
pub use server::{Server, ServerConfig, ServerStats};
pub use session::Session;
