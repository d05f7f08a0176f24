//! Server configuration: JSON file (optional) overlaid with environment
//! variables, normalized on load. Mirrors the settings-loading idiom this
//! project's core engine design is grounded on — `serde` defaults plus an
//! explicit `normalize()` pass rather than validating ad hoc at each call
//! site.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub shutdown_grace_ms: u64,
    pub asr_chunk_secs: f32,
    pub asr_poll_interval_ms: u64,
    pub tts_poll_interval_ms: u64,
    pub tts_pause_poll_interval_ms: u64,
    pub audio_buffer_capacity: usize,
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8090".to_string(),
            shutdown_grace_ms: 3_000,
            asr_chunk_secs: 0.6,
            asr_poll_interval_ms: 5,
            tts_poll_interval_ms: 100,
            tts_pause_poll_interval_ms: 50,
            audio_buffer_capacity: 1000,
            log_filter: "turnrelay=info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Clamp values that would otherwise produce a degenerate server
    /// (zero-length sleeps, an unparsable bind address).
    pub fn normalize(&mut self) {
        if self.bind_addr.parse::<SocketAddr>().is_err() {
            warn!(bind_addr = %self.bind_addr, "invalid bind_addr, falling back to default");
            self.bind_addr = Self::default().bind_addr;
        }
        self.shutdown_grace_ms = self.shutdown_grace_ms.clamp(100, 30_000);
        self.asr_chunk_secs = self.asr_chunk_secs.clamp(0.05, 5.0);
        self.asr_poll_interval_ms = self.asr_poll_interval_ms.clamp(1, 1_000);
        self.tts_poll_interval_ms = self.tts_poll_interval_ms.clamp(10, 2_000);
        self.tts_pause_poll_interval_ms = self.tts_pause_poll_interval_ms.clamp(10, 2_000);
        self.audio_buffer_capacity = self.audio_buffer_capacity.max(1);
        if self.log_filter.trim().is_empty() {
            self.log_filter = Self::default().log_filter;
        }
    }
}

/// Resolves the config file path: `TURNRELAY_CONFIG` env var if set,
/// otherwise a platform default data directory, matching the lookup order
/// the desktop app this server replaces used for its own settings file.
pub fn default_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("TURNRELAY_CONFIG") {
        return PathBuf::from(p);
    }
    let base = if cfg!(windows) {
        std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string())
    } else {
        std::env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
            std::env::var("HOME")
                .map(|h| format!("{h}/.local/share"))
                .unwrap_or_else(|_| ".".to_string())
        })
    };
    PathBuf::from(base).join("turnrelay").join("config.json")
}

pub fn load_config(path: &Path) -> ServerConfig {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(c) => {
                info!(path = ?path, "loaded server config");
                c
            }
            Err(err) => {
                warn!(path = ?path, error = %err, "failed to parse config file, using defaults");
                ServerConfig::default()
            }
        },
        Err(_) => {
            info!(path = ?path, "no config file found, using defaults");
            ServerConfig::default()
        }
    };
    apply_env_overrides(&mut config);
    config.normalize();
    config
}

fn apply_env_overrides(config: &mut ServerConfig) {
    if let Ok(v) = std::env::var("TURNRELAY_BIND_ADDR") {
        config.bind_addr = v;
    }
    if let Ok(v) = std::env::var("TURNRELAY_LOG_FILTER") {
        config.log_filter = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_degenerate_values() {
        let mut config = ServerConfig {
            bind_addr: "not an address".to_string(),
            shutdown_grace_ms: 0,
            asr_chunk_secs: -1.0,
            asr_poll_interval_ms: 0,
            tts_poll_interval_ms: 0,
            tts_pause_poll_interval_ms: 0,
            audio_buffer_capacity: 0,
            log_filter: "  ".to_string(),
        };
        config.normalize();
        assert!(config.bind_addr.parse::<SocketAddr>().is_ok());
        assert!(config.shutdown_grace_ms >= 100);
        assert!(config.asr_chunk_secs >= 0.05);
        assert_eq!(config.audio_buffer_capacity, 1);
        assert_eq!(config.log_filter, "turnrelay=info");
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = ServerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bind_addr, config.bind_addr);
    }
}
