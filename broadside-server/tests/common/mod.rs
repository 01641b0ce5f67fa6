#![allow(dead_code)]

use broadside_client::{Client, ConnectionConfig, ServerMessage};
use broadside_core::{MatchConfig, ShipSpec};
use broadside_server::{Server, ServerConfig};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Server settings for tests: fast sweeps, no practical rate limit.
pub fn test_config(fleet: Vec<ShipSpec>) -> ServerConfig {
    let mut config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_rate_limit(1000.0)
        .with_match_config(MatchConfig {
            fleet,
            ..MatchConfig::default()
        });
    config.sweep_interval = Duration::from_millis(20);
    config.start_countdown = Duration::ZERO;
    config
}

pub fn dinghy() -> Vec<ShipSpec> {
    vec![ShipSpec::new("Dinghy", 1)]
}

pub fn sloop() -> Vec<ShipSpec> {
    vec![ShipSpec::new("Sloop", 2)]
}

pub async fn start(config: ServerConfig) -> (Arc<Server>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(Server::new(config));
    let serving = server.clone();
    tokio::spawn(async move { serving.serve(listener).await });
    (server, addr)
}

/// A connected client and the handle label the server gave it.
pub struct Peer {
    pub client: Client,
    pub name: String,
}

pub async fn join(addr: SocketAddr) -> Peer {
    let client = Client::new(ConnectionConfig::new(addr));
    client.connect().await.unwrap();
    let welcome = client.wait_status("welcome").await.unwrap();
    let name = welcome["handle"].as_str().unwrap().to_string();
    Peer { client, name }
}

/// Two players seated and past placement. Returns them with the second
/// player's reconnection token.
pub async fn seated_pair(addr: SocketAddr, a_ship: &str, b_ship: &str) -> (Peer, Peer, String) {
    let a = join(addr).await;
    let b = join(addr).await;
    a.client.wait_status("promoted").await.unwrap();
    let promoted = b.client.wait_status("promoted").await.unwrap();
    let token = promoted["token"].as_str().unwrap().to_string();

    a.client.place(a_ship).await.unwrap();
    b.client.place(b_ship).await.unwrap();
    a.client.wait_status("match_started").await.unwrap();
    b.client.wait_status("match_started").await.unwrap();
    (a, b, token)
}

pub fn count_chats(messages: &[ServerMessage], from: &str) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, ServerMessage::Chat(body) if body.from == from))
        .count()
}

pub fn statuses<'a>(messages: &'a [ServerMessage], kind: &str) -> Vec<&'a Value> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Status(v) if v["type"] == kind => Some(v),
            _ => None,
        })
        .collect()
}
