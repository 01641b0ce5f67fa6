//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via BROADSIDE_CONFIG)
//! 3. Environment variables

use crate::lobby::PromotionPolicy;
use broadside_core::{classic_fleet, validate_fleet, ShipSpec};
use broadside_protocol::{ChecksumKind, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Match rules and timing.
    pub game: GameConfig,
    /// Abuse limits.
    pub limits: LimitsConfig,
    /// Wire protocol options.
    pub protocol: ProtocolConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("BROADSIDE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.game.apply_env_overrides();
        self.limits.apply_env_overrides();
        self.protocol.apply_env_overrides();
    }

    /// Rejects configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "network.max_connections must be at least 1".to_string(),
            ));
        }
        let rate = self.limits.rate_limit_per_sec;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "limits.rate_limit_per_sec must be positive, got {}",
                self.limits.rate_limit_per_sec
            )));
        }
        if self.limits.max_strikes == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_strikes must be at least 1".to_string(),
            ));
        }
        if self.limits.outbox_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "limits.outbox_capacity must be at least 1".to_string(),
            ));
        }
        if self.game.max_skipped_turns == 0 {
            return Err(ConfigError::ValidationError(
                "game.max_skipped_turns must be at least 1".to_string(),
            ));
        }
        if self.game.sweep_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "game.sweep_interval_ms must be at least 1".to_string(),
            ));
        }
        validate_fleet(&self.game.fleet)
            .map_err(|e| ConfigError::ValidationError(format!("game.fleet: {}", e)))?;
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections, players and spectators together.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_connections: 6,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("BROADSIDE_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(max) = std::env::var("BROADSIDE_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
    }
}

/// Match rules and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Seconds a player has to fire once it is their turn.
    pub turn_timeout_secs: u64,
    /// Seconds both players have to place their fleets.
    pub placement_timeout_secs: u64,
    /// Seconds a disconnected player's slot is held for `/rejoin`.
    pub reconnect_grace_secs: u64,
    /// Consecutive timed-out turns before a player forfeits.
    pub max_skipped_turns: u32,
    /// Who plays the next match.
    pub promotion_policy: PromotionPolicy,
    /// Ships each player places, in order.
    pub fleet: Vec<ShipSpec>,
    /// How often deadlines are checked, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Seconds of countdown announced before each match starts.
    pub start_countdown_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: 30,
            placement_timeout_secs: 120,
            reconnect_grace_secs: 30,
            max_skipped_turns: 2,
            promotion_policy: PromotionPolicy::Fifo,
            fleet: classic_fleet(),
            sweep_interval_ms: 250,
            start_countdown_secs: 5,
        }
    }
}

impl GameConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(timeout) = std::env::var("BROADSIDE_TURN_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.turn_timeout_secs = secs;
            }
        }

        if let Ok(timeout) = std::env::var("BROADSIDE_PLACEMENT_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.placement_timeout_secs = secs;
            }
        }

        if let Ok(grace) = std::env::var("BROADSIDE_RECONNECT_GRACE") {
            if let Ok(secs) = grace.parse() {
                self.reconnect_grace_secs = secs;
            }
        }

        if let Ok(max) = std::env::var("BROADSIDE_MAX_SKIPPED_TURNS") {
            if let Ok(n) = max.parse() {
                self.max_skipped_turns = n;
            }
        }

        if let Ok(countdown) = std::env::var("BROADSIDE_START_COUNTDOWN") {
            if let Ok(secs) = countdown.parse() {
                self.start_countdown_secs = secs;
            }
        }

        if let Ok(policy) = std::env::var("BROADSIDE_PROMOTION_POLICY") {
            if let Ok(parsed) = policy.parse() {
                self.promotion_policy = parsed;
            }
        }
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn placement_timeout(&self) -> Duration {
        Duration::from_secs(self.placement_timeout_secs)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_secs(self.reconnect_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn start_countdown(&self) -> Duration {
        Duration::from_secs(self.start_countdown_secs)
    }
}

/// Abuse limits applied per connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Messages per second; the bucket holds the same number of tokens.
    pub rate_limit_per_sec: f64,
    /// Consecutive over-budget messages before the connection is closed.
    pub rate_limit_hard_cap: u32,
    /// Consecutive checksum or malformed frames before the connection is closed.
    pub max_strikes: u32,
    /// Packets queued per recipient before the oldest is dropped.
    pub outbox_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_sec: 2.0,
            rate_limit_hard_cap: 20,
            max_strikes: 3,
            outbox_capacity: 64,
        }
    }
}

impl LimitsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(rate) = std::env::var("BROADSIDE_RATE_LIMIT") {
            if let Ok(n) = rate.parse() {
                self.rate_limit_per_sec = n;
            }
        }
    }
}

/// Wire protocol options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Checksum trailer width.
    pub checksum: ChecksumKind,
}

impl ProtocolConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(kind) = std::env::var("BROADSIDE_CHECKSUM") {
            if let Ok(parsed) = kind.parse() {
                self.checksum = parsed;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.network.max_connections, 6);
        assert_eq!(config.limits.rate_limit_per_sec, 2.0);
        assert_eq!(config.limits.max_strikes, 3);
        assert_eq!(config.game.turn_timeout(), Duration::from_secs(30));
        assert_eq!(config.game.reconnect_grace(), Duration::from_secs(30));
        assert_eq!(config.game.start_countdown(), Duration::from_secs(5));
        assert_eq!(config.game.fleet.len(), 5);
        assert_eq!(config.game.promotion_policy, PromotionPolicy::Fifo);
        assert_eq!(config.protocol.checksum, ChecksumKind::Sum8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.network.bind_addr, config.network.bind_addr);
        assert_eq!(parsed.game.fleet, config.game.fleet);
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
network:
  bind_addr: "0.0.0.0:6000"
game:
  promotion_policy: winner_stays
  start_countdown_secs: 0
  fleet:
    - name: Dinghy
      length: 1
protocol:
  checksum: sum16
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.network.bind_addr.port(), 6000);
        assert_eq!(config.network.max_connections, 6);
        assert_eq!(config.game.promotion_policy, PromotionPolicy::WinnerStays);
        assert_eq!(config.game.fleet, vec![ShipSpec::new("Dinghy", 1)]);
        assert_eq!(config.game.turn_timeout_secs, 30);
        assert_eq!(config.game.start_countdown(), Duration::ZERO);
        assert_eq!(config.protocol.checksum, ChecksumKind::Sum16);
    }

    #[test]
    fn test_from_file_errors() {
        let err = Config::from_file("/nonexistent/broadside.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(..)));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "network: [not, a, map]").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(..)));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = Config::default();
        config.network.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.limits.rate_limit_per_sec = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.limits.rate_limit_per_sec = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.game.fleet.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.game.fleet.push(ShipSpec::new("Leviathan", 12));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Leviathan"));
    }

    #[test]
    fn test_save_and_reload() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.limits.rate_limit_per_sec = 5.0;
        config.save(file.path()).unwrap();

        let loaded = Config::from_file(file.path()).unwrap();
        assert_eq!(loaded.limits.rate_limit_per_sec, 5.0);
    }

    #[test]
    fn test_env_override_promotion_policy() {
        std::env::set_var("BROADSIDE_PROMOTION_POLICY", "winner_stays");
        let mut game = GameConfig::default();
        game.apply_env_overrides();
        std::env::remove_var("BROADSIDE_PROMOTION_POLICY");
        assert_eq!(game.promotion_policy, PromotionPolicy::WinnerStays);
    }
}
