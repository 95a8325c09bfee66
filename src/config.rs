//! Bridge Configuration

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Default seconds between status polls while a strategy runs
pub const DEFAULT_STATUS_UPDATE_INTERVAL: u64 = 10;

/// Static configuration, loaded once at startup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// First topic segment the bots publish under
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Topic root for host actions (options, services, button presses)
    #[serde(default = "default_control_prefix")]
    pub control_prefix: String,
    /// Topic root entity snapshots are written to
    #[serde(default = "default_state_prefix")]
    pub state_prefix: String,
    #[serde(default = "default_status_update_frequency")]
    pub status_update_frequency: u64,
    /// Entity id of the helper holding the strategy name to import
    #[serde(default)]
    pub strategy_name_helper: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
            control_prefix: default_control_prefix(),
            state_prefix: default_state_prefix(),
            status_update_frequency: default_status_update_frequency(),
            strategy_name_helper: None,
            log_level: default_log_level(),
        }
    }
}

fn default_topic_prefix() -> String {
    "hbot".to_string()
}
fn default_control_prefix() -> String {
    "hbot_bridge".to_string()
}
fn default_state_prefix() -> String {
    "homeassistant/hummingbot".to_string()
}
fn default_status_update_frequency() -> u64 {
    DEFAULT_STATUS_UPDATE_INTERVAL
}
fn default_log_level() -> String {
    "info".to_string()
}

impl BridgeConfig {
    /// Load from `HBOT_BRIDGE_CONFIG` (or `hbot-bridge.toml`) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("HBOT_BRIDGE_CONFIG")
            .unwrap_or_else(|_| "hbot-bridge.toml".to_string());
        Self::load_from(path)
    }

    /// Load from a specific file, overridden by `HBOT_BRIDGE_*` variables
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("HBOT_BRIDGE").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    /// The hot-reloadable subset
    pub fn options(&self) -> BridgeOptions {
        BridgeOptions {
            status_update_frequency: self.status_update_frequency,
            strategy_name_helper: self.strategy_name_helper.clone(),
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.log_level);
            tracing::Level::INFO
        })
    }
}

/// Options that can change while the bridge runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeOptions {
    pub status_update_frequency: u64,
    pub strategy_name_helper: Option<String>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        BridgeConfig::default().options()
    }
}

/// Partial options update, as sent by the host's options flow
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionsUpdate {
    #[serde(default)]
    pub status_update_frequency: Option<serde_json::Value>,
    #[serde(default)]
    pub strategy_name_helper: Option<String>,
}

impl BridgeOptions {
    /// Apply an update; returns whether anything changed
    pub fn apply(&mut self, update: OptionsUpdate) -> bool {
        let mut changed = false;

        if let Some(value) = update.status_update_frequency {
            match parse_frequency(&value) {
                Some(freq) if freq != self.status_update_frequency => {
                    self.status_update_frequency = freq;
                    changed = true;
                }
                Some(_) => {}
                None => warn!("Invalid status update frequency: {}", value),
            }
        }

        if let Some(helper) = update.strategy_name_helper {
            if self.strategy_name_helper.as_deref() != Some(helper.as_str()) {
                self.strategy_name_helper = Some(helper);
                changed = true;
            }
        }

        changed
    }
}

fn parse_frequency(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
