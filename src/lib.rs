//! Hummingbot Bridge Library
//!
//! Tracks Hummingbot instances from their MQTT output and projects their
//! state into home-automation entities.

pub mod command;
pub mod config;
pub mod entity;
pub mod error;
pub mod health;
pub mod host;
pub mod instance;
pub mod manager;
pub mod publisher;
pub mod services;
pub mod status_report;
pub mod types;

// Re-export main types for convenience
pub use command::{BotCommand, OutboundMessage};
pub use config::{BridgeConfig, BridgeOptions, OptionsUpdate};
pub use entity::{EntitySnapshot, EntityType, Platform, Projection, StateFragment};
pub use error::{BridgeError, Result};
pub use health::{Watchdog, HEALTH_CHECK_PERIOD, INSTANCE_TIMEOUT};
pub use host::HostAction;
pub use instance::{BotInstance, SharedInstance};
pub use manager::BridgeManager;
pub use publisher::{ChannelPublisher, CommandPublisher};
pub use services::{ImportStrategyRequest, IMPORT_STRATEGY};
pub use status_report::StatusReport;
pub use types::{Balances, Endpoint, MarketPrices, OrderEventType, OrderSide, TrackedOrder};

#[cfg(test)]
mod tests;
