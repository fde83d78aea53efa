//! Runtime configuration
//!
//! Loaded from JSON. Durations use humantime notation (`"1s"`, `"250ms"`).
//! Every field has a default, so a config file only names what it changes.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crisscross_core::{CoordError, CoordResult, PeerId};
use crisscross_liveness::LivenessConfig;
use crisscross_transport::AddressBook;

/// Node configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Name this node sends as
    pub node_id: String,
    /// Local UDP address
    pub bind_addr: SocketAddr,
    /// Known peers by name
    pub peers: BTreeMap<String, SocketAddr>,
    /// Silence before a participant is suspected
    #[serde(with = "duration_text")]
    pub heartbeat_timeout: Duration,
    /// Multiple of the timeout before a participant is failed
    pub failure_multiplier: u32,
    /// Period of the coordinator's liveness scan
    #[serde(with = "duration_text")]
    pub scan_interval: Duration,
    /// Period of client heartbeats
    #[serde(with = "duration_text")]
    pub client_heartbeat_interval: Duration,
    /// `tracing` filter directive; `RUST_LOG` takes precedence
    pub log_filter: String,
    pub json_logs: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            node_id: "coordinator".into(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            peers: BTreeMap::new(),
            heartbeat_timeout: Duration::from_secs(1),
            failure_multiplier: 3,
            scan_interval: Duration::from_secs(1),
            client_heartbeat_interval: Duration::from_secs(1),
            log_filter: "info".into(),
            json_logs: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> CoordResult<Self> {
        let config: RuntimeConfig =
            serde_json::from_str(json).map_err(|e| CoordError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> CoordResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CoordError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> CoordResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoordError::Config(e.to_string()))
    }

    pub fn validate(&self) -> CoordResult<()> {
        if self.node_id.is_empty() {
            return Err(CoordError::Config("node_id must not be empty".into()));
        }
        self.liveness().validate()?;
        if self.scan_interval.is_zero() {
            return Err(CoordError::Config("scan_interval must be non-zero".into()));
        }
        if self.client_heartbeat_interval.is_zero() {
            return Err(CoordError::Config(
                "client_heartbeat_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn node_peer(&self) -> PeerId {
        PeerId::new(self.node_id.as_str())
    }

    pub fn liveness(&self) -> LivenessConfig {
        LivenessConfig::new(self.heartbeat_timeout, self.failure_multiplier)
    }

    /// Address book holding every configured peer
    pub fn address_book(&self) -> AddressBook {
        let book = AddressBook::new();
        for (name, addr) in &self.peers {
            book.insert(PeerId::new(name.as_str()), *addr);
        }
        book
    }
}

/// Durations as humantime text
mod duration_text {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.liveness(), LivenessConfig::default());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json_str(
            r#"{
                "node_id": "server",
                "heartbeat_timeout": "250ms",
                "failure_multiplier": 4,
                "peers": { "alice": "127.0.0.1:9001" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.node_peer(), PeerId::new("server"));
        assert_eq!(config.heartbeat_timeout, Duration::from_millis(250));
        assert_eq!(config.liveness().failure_after(), Duration::from_secs(1));
        assert_eq!(config.scan_interval, Duration::from_secs(1));
        assert_eq!(
            config.address_book().lookup(&PeerId::new("alice")),
            Some("127.0.0.1:9001".parse().unwrap())
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = RuntimeConfig::default();
        config.client_heartbeat_interval = Duration::from_millis(1500);
        let json = config.to_json_string().unwrap();
        assert!(json.contains("\"1s 500ms\""));
        assert_eq!(RuntimeConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RuntimeConfig::from_json_str(r#"{"failure_multiplier": 0}"#).is_err());
        assert!(RuntimeConfig::from_json_str(r#"{"scan_interval": "0s"}"#).is_err());
        assert!(RuntimeConfig::from_json_str(r#"{"heartbeat_timeout": "soon"}"#).is_err());
        assert!(RuntimeConfig::from_json_str(r#"{"node_id": ""}"#).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            RuntimeConfig::from_file("/nonexistent/crisscross.json"),
            Err(CoordError::Config(_))
        ));
    }
}
