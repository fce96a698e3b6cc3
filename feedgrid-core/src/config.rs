use serde::{Deserialize, Serialize};

fn default_backup_interval_ms() -> i64 {
    10_000
}

fn default_monitor_interval_ms() -> i64 {
    1_000
}

fn default_reconnection_threshold_ms() -> f64 {
    60_000.0
}

fn default_max_fetch_length() -> i64 {
    10_000
}

/// Recognized runtime options. CLI parsing and file/env loading are deliberately excluded here -
/// this is the shape the loader (wherever it lives) is expected to produce.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Enable ingestion from configured exchange adapters.
    pub collect: bool,

    /// Ordered list of storage driver names; the first is primary for historical queries.
    #[serde(default)]
    pub storage: Vec<String>,

    /// Milliseconds between aligned persistence flushes.
    #[serde(default = "default_backup_interval_ms")]
    pub backup_interval_ms: i64,

    /// Enable websocket fan-out to broadcast clients.
    #[serde(default)]
    pub broadcast: bool,

    /// Enable aggregation mode. Mutually exclusive with `broadcast_debounce_ms`.
    #[serde(default)]
    pub broadcast_aggr: bool,

    /// Millisecond tick for debounced broadcast mode.
    #[serde(default)]
    pub broadcast_debounce_ms: Option<i64>,

    pub port: Option<u16>,

    /// Enable the HTTP/WebSocket API surface.
    #[serde(default)]
    pub api: bool,

    #[serde(default)]
    pub enable_rate_limit: bool,

    #[serde(default)]
    pub rate_limit_time_window_ms: Option<i64>,

    #[serde(default)]
    pub rate_limit_max: Option<u32>,

    /// Origin regex accepted by the HTTP/WebSocket surface.
    #[serde(default)]
    pub origin: Option<String>,

    #[serde(default = "default_max_fetch_length")]
    pub max_fetch_length: i64,

    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: i64,

    #[serde(default = "default_reconnection_threshold_ms")]
    pub reconnection_threshold_ms: f64,

    #[serde(default)]
    pub pairs: Vec<String>,
}

impl Config {
    /// Validate the cross-field invariants the loader cannot express structurally: aggregation
    /// and debounce are mutually exclusive, and an enabled API needs a port.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast_aggr && self.broadcast_debounce_ms.is_some() {
            return Err(ConfigError::ConflictingBroadcastMode);
        }

        if self.api && self.port.is_none() {
            return Err(ConfigError::MissingPort);
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("broadcastAggr and broadcastDebounce are mutually exclusive")]
    ConflictingBroadcastMode,
    #[error("api is enabled but no port is configured")]
    MissingPort,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            collect: true,
            storage: vec![],
            backup_interval_ms: default_backup_interval_ms(),
            broadcast: true,
            broadcast_aggr: false,
            broadcast_debounce_ms: None,
            port: Some(8080),
            api: true,
            enable_rate_limit: false,
            rate_limit_time_window_ms: None,
            rate_limit_max: None,
            origin: None,
            max_fetch_length: default_max_fetch_length(),
            monitor_interval_ms: default_monitor_interval_ms(),
            reconnection_threshold_ms: default_reconnection_threshold_ms(),
            pairs: vec![],
        }
    }

    #[test]
    fn aggregation_and_debounce_cannot_both_be_set() {
        let mut config = base_config();
        config.broadcast_aggr = true;
        config.broadcast_debounce_ms = Some(1_000);

        assert_eq!(
            config.validate(),
            Err(ConfigError::ConflictingBroadcastMode)
        );
    }

    #[test]
    fn api_without_port_is_a_misconfiguration() {
        let mut config = base_config();
        config.port = None;

        assert_eq!(config.validate(), Err(ConfigError::MissingPort));
    }

    #[test]
    fn a_valid_config_passes() {
        assert_eq!(base_config().validate(), Ok(()));
    }
}
