//! # broadside-client
//!
//! Client library for broadside.
//!
//! This crate provides:
//! - Async TCP connection speaking the framed wire protocol
//! - Helpers for placement, firing, chat and slash commands
//! - Typed decoding of server messages

pub mod client;
pub mod connection;
pub mod error;

pub use client::{Client, ServerMessage};
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
