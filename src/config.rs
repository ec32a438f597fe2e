//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::game::sync::protocol::{
    EntityProtocolSpec, EntityProtocolType, DEFAULT_TRACKING_RANGE, DEFAULT_TRACKING_UPDATE_RATE,
};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name used in logs
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// World ID (1-255)
    #[serde(default = "default_world_id")]
    pub world_id: u8,

    /// Game tick rate in milliseconds
    #[serde(default = "default_tick_rate")]
    pub tick_rate_ms: u64,

    /// Capacity of each session's outbound message queue
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// Entity tracking configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Demo world population used by the server binary
    #[serde(default)]
    pub demo: DemoConfig,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

/// Entity tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Tracking range used when a kind has no override
    #[serde(default = "default_tracking_range")]
    pub default_range: f64,

    /// Ticks between tracking passes when a kind has no override
    #[serde(default = "default_tracking_update_rate")]
    pub default_update_rate: u32,

    /// Per-protocol overrides, keyed by protocol name
    /// (`object`, `living`, `insentient`, `slime`, `humanoid`, `lightning`)
    #[serde(default)]
    pub kinds: HashMap<String, KindTracking>,
}

/// Tracking overrides of one protocol type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindTracking {
    #[serde(default)]
    pub range: Option<f64>,
    #[serde(default)]
    pub update_rate: Option<u32>,
}

/// Demo world population
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Number of wandering entities
    #[serde(default = "default_demo_entities")]
    pub entities: u32,

    /// Number of simulated viewers
    #[serde(default = "default_demo_viewers")]
    pub viewers: u32,

    /// Radius around the origin entities and viewers wander in
    #[serde(default = "default_demo_radius")]
    pub radius: f64,
}

// Default value functions
fn default_server_name() -> String {
    "entity-sync".to_string()
}

fn default_world_id() -> u8 {
    1
}

fn default_tick_rate() -> u64 {
    50
}

fn default_outbound_queue_capacity() -> usize {
    1024
}

fn default_tracking_range() -> f64 {
    DEFAULT_TRACKING_RANGE
}

fn default_tracking_update_rate() -> u32 {
    DEFAULT_TRACKING_UPDATE_RATE
}

fn default_demo_entities() -> u32 {
    16
}

fn default_demo_viewers() -> u32 {
    4
}

fn default_demo_radius() -> f64 {
    96.0
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            default_range: default_tracking_range(),
            default_update_rate: default_tracking_update_rate(),
            kinds: HashMap::new(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            entities: default_demo_entities(),
            viewers: default_demo_viewers(),
            radius: default_demo_radius(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            world_id: default_world_id(),
            tick_rate_ms: default_tick_rate(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            tracking: TrackingConfig::default(),
            demo: DemoConfig::default(),
            debug: false,
        }
    }
}

impl TrackingConfig {
    /// Resolve the tracking spec of a protocol type
    pub fn spec_for(&self, protocol: EntityProtocolType) -> EntityProtocolSpec {
        let overrides = self.kinds.get(protocol.name());
        EntityProtocolSpec::new(protocol)
            .with_range(
                overrides
                    .and_then(|k| k.range)
                    .unwrap_or(self.default_range),
            )
            .with_update_rate(
                overrides
                    .and_then(|k| k.update_rate)
                    .unwrap_or(self.default_update_rate),
            )
    }

    /// Validate ranges, rates and override keys
    pub fn validate(&self) -> Result<()> {
        for name in self.kinds.keys() {
            if !EntityProtocolType::ALL.iter().any(|p| p.name() == name.as_str()) {
                anyhow::bail!("Unknown entity protocol in tracking overrides: {}", name);
            }
        }
        for protocol in EntityProtocolType::ALL {
            self.spec_for(protocol)
                .validate()
                .with_context(|| format!("Invalid tracking for {}", protocol.name()))?;
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("ENTITY_SYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        // Try to load from file
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("ENTITY_SYNC_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("ENTITY_SYNC_WORLD_ID") {
            if let Ok(id) = val.parse() {
                self.world_id = id;
            }
        }
        if let Ok(val) = env::var("ENTITY_SYNC_TICK_RATE_MS") {
            if let Ok(rate) = val.parse() {
                self.tick_rate_ms = rate;
            }
        }
        if let Ok(val) = env::var("ENTITY_SYNC_OUTBOUND_QUEUE_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.outbound_queue_capacity = capacity;
            }
        }
        if let Ok(val) = env::var("ENTITY_SYNC_TRACKING_RANGE") {
            if let Ok(range) = val.parse() {
                self.tracking.default_range = range;
            }
        }
        if let Ok(val) = env::var("ENTITY_SYNC_TRACKING_UPDATE_RATE") {
            if let Ok(rate) = val.parse() {
                self.tracking.default_update_rate = rate;
            }
        }
        if let Ok(val) = env::var("ENTITY_SYNC_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // World ID must be 1-255
        if self.world_id == 0 {
            anyhow::bail!("World ID must be between 1 and 255");
        }

        // Tick rate must be reasonable
        if self.tick_rate_ms < 10 || self.tick_rate_ms > 1000 {
            anyhow::bail!("Tick rate must be between 10ms and 1000ms");
        }

        if self.outbound_queue_capacity == 0 {
            anyhow::bail!("Outbound queue capacity must be at least 1");
        }

        self.tracking.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server_name, "entity-sync");
        assert_eq!(config.world_id, 1);
        assert_eq!(config.tick_rate_ms, 50);
        assert_eq!(config.outbound_queue_capacity, 1024);
        assert_eq!(config.tracking.default_range, 64.0);
        assert_eq!(config.tracking.default_update_rate, 4);
    }

    #[test]
    fn test_kind_overrides() {
        let config = ServerConfig::from_toml(
            r#"
            tick_rate_ms = 100

            [tracking]
            default_range = 48.0

            [tracking.kinds.lightning]
            range = 512.0
            update_rate = 1

            [tracking.kinds.humanoid]
            update_rate = 2
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());

        let lightning = config.tracking.spec_for(EntityProtocolType::Lightning);
        assert_eq!(lightning.tracking_range, 512.0);
        assert_eq!(lightning.tracking_update_rate, 1);

        let humanoid = config.tracking.spec_for(EntityProtocolType::Humanoid);
        assert_eq!(humanoid.tracking_range, 48.0);
        assert_eq!(humanoid.tracking_update_rate, 2);

        let object = config.tracking.spec_for(EntityProtocolType::Object);
        assert_eq!(object.tracking_range, 48.0);
        assert_eq!(object.tracking_update_rate, 4);
    }

    #[test]
    fn test_validation() {
        let mut config = ServerConfig::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Invalid world ID
        config.world_id = 0;
        assert!(config.validate().is_err());
        config.world_id = 1;

        // Tick rate out of range
        config.tick_rate_ms = 5;
        assert!(config.validate().is_err());
        config.tick_rate_ms = 50;

        // Zero update rate
        config.tracking.kinds.insert(
            "slime".to_string(),
            KindTracking {
                range: None,
                update_rate: Some(0),
            },
        );
        assert!(config.validate().is_err());
        config.tracking.kinds.clear();

        // Unknown protocol name
        config
            .tracking
            .kinds
            .insert("dragon".to_string(), KindTracking::default());
        assert!(config.validate().is_err());
    }
}
