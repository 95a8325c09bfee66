//! Per-instance coordinator
//!
//! Turns the messages one bot publishes into normalized state (order table,
//! balances, prices, running/imported/available flags) and keeps the
//! instance's entity projections in step with it.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command::{BotCommand, OutboundMessage};
use crate::config::BridgeOptions;
use crate::entity::{EntityRegistry, EntitySnapshot, EntityType, StateFragment};
use crate::error::{BridgeError, Result};
use crate::health::INSTANCE_TIMEOUT;
use crate::publisher::CommandPublisher;
use crate::status_report::StatusReport;
use crate::types::{
    Balances, Endpoint, MarketPrices, OrderEventData, OrderEventType, TrackedOrder,
};

/// Minimum spacing between two running-state changes
const RUNNING_CHANGE_COOLDOWN: Duration = Duration::from_millis(400);

/// Poll grace period while no mid price has been seen yet
const ACCELERATED_POLL: Duration = Duration::from_secs(5);

const MSG_START_INITIATED: &str = "start command initiated.";
const MSG_STOP_INITIATED: &str = "stop command initiated.";
const MSG_NO_STRATEGY_RUNNING: &str = "No strategy is currently running!";
const MSG_IMPORT_OR_CREATE: &str = "Strategy check: Please import or create a strategy.";
const MSG_NO_SUCH_FILE: &str = "No such file or directory";

pub type SharedInstance = Arc<Mutex<BotInstance>>;

/// State tracked for one bot instance
pub struct BotInstance {
    instance_id: String,
    topic_prefix: String,
    options: watch::Receiver<BridgeOptions>,
    publisher: Arc<dyn CommandPublisher>,
    entities: EntityRegistry,
    order_tracker: HashMap<String, TrackedOrder>,
    balances: Balances,
    market_prices: MarketPrices,
    base_asset: Option<String>,
    quote_asset: Option<String>,
    last_imported_strategy: Option<String>,
    strategy_running: Option<bool>,
    strategy_imported: Option<bool>,
    available: Option<bool>,
    last_event_received: Option<Instant>,
    last_status_poll: Option<Instant>,
    last_changed_running: Option<Instant>,
}

impl BotInstance {
    /// Create an instance and discover its entities
    pub fn new(
        instance_id: &str,
        topic_prefix: &str,
        options: watch::Receiver<BridgeOptions>,
        publisher: Arc<dyn CommandPublisher>,
    ) -> Self {
        info!("Discovered Hummingbot instance {}", instance_id);

        Self {
            instance_id: instance_id.to_string(),
            topic_prefix: topic_prefix.to_string(),
            options,
            publisher,
            entities: EntityRegistry::discover(instance_id),
            order_tracker: HashMap::new(),
            balances: Balances::default(),
            market_prices: MarketPrices::default(),
            base_asset: None,
            quote_asset: None,
            last_imported_strategy: None,
            strategy_running: None,
            strategy_imported: None,
            available: None,
            last_event_received: None,
            last_status_poll: None,
            last_changed_running: None,
        }
    }

    pub fn shared(self) -> SharedInstance {
        Arc::new(Mutex::new(self))
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    pub fn market_prices(&self) -> &MarketPrices {
        &self.market_prices
    }

    pub fn orders(&self) -> &HashMap<String, TrackedOrder> {
        &self.order_tracker
    }

    pub fn base_asset(&self) -> Option<&str> {
        self.base_asset.as_deref()
    }

    pub fn quote_asset(&self) -> Option<&str> {
        self.quote_asset.as_deref()
    }

    pub fn last_imported_strategy(&self) -> Option<&str> {
        self.last_imported_strategy.as_deref()
    }

    pub fn strategy_running(&self) -> Option<bool> {
        self.strategy_running
    }

    pub fn strategy_imported(&self) -> Option<bool> {
        self.strategy_imported
    }

    pub fn available(&self) -> Option<bool> {
        self.available
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    /// Snapshots of the entities changed since the last flush
    pub fn drain_dirty_entities(&mut self) -> Vec<EntitySnapshot> {
        self.entities.drain_dirty()
    }

    pub fn status_update_frequency(&self) -> Duration {
        Duration::from_secs(self.options.borrow().status_update_frequency)
    }

    // ---- liveness ----

    pub fn mark_event_received(&mut self) {
        self.last_event_received = Some(Instant::now());
    }

    pub fn last_event_received(&self) -> Option<Instant> {
        self.last_event_received
    }

    /// No message for longer than the instance timeout
    pub fn is_stale(&self, now: Instant) -> bool {
        match self.last_event_received {
            Some(last) => now.saturating_duration_since(last) > INSTANCE_TIMEOUT,
            None => true,
        }
    }

    pub fn mark_timed_out(&mut self) {
        warn!("Instance {} timed out, marking unavailable", self.instance_id);
        self.update_strategy_running_state(false);
        self.set_unavailable();
    }

    // ---- inbound ----

    /// Parse a payload and run the checks every message goes through.
    ///
    /// Returns `Ok(None)` for availability messages, which carry no content.
    pub fn extract_event_payload(
        &mut self,
        segment: &str,
        raw: &str,
    ) -> Result<Option<(Endpoint, Map<String, Value>)>> {
        let event = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(BridgeError::MalformedPayload(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
            Err(e) => return Err(BridgeError::MalformedPayload(e.to_string())),
        };

        let endpoint = Endpoint::parse(segment);

        if let Some(endpoint) = endpoint {
            self.check_availability(endpoint, &event);
        }

        self.check_status_command();

        match endpoint {
            None => Err(BridgeError::InvalidEndpoint(segment.to_string())),
            Some(ep) if ep.is_availability() => Ok(None),
            Some(ep) => Ok(Some((ep, event))),
        }
    }

    /// Heartbeat handling. Returns whether the message carries content.
    pub fn check_availability(&mut self, endpoint: Endpoint, payload: &Map<String, Value>) -> bool {
        if !endpoint.is_availability() {
            return true;
        }

        let online = if endpoint == Endpoint::StatusUpdates
            && payload.get("type").and_then(Value::as_str) == Some("availability")
        {
            payload.get("msg").and_then(Value::as_str) == Some("online")
        } else {
            payload.get("ts").map(|ts| !ts.is_null()).unwrap_or(false)
        };

        if online {
            self.set_available();
        } else {
            self.set_unavailable();
        }

        false
    }

    /// Apply a content message to the instance state
    pub fn update_data(&mut self, endpoint: Endpoint, payload: &Map<String, Value>) {
        match endpoint {
            Endpoint::Events => self.handle_order_event(payload),
            Endpoint::Notify => self.handle_notify(message(payload)),
            Endpoint::Log => match message(payload) {
                MSG_START_INITIATED => self.update_strategy_running_state(true),
                MSG_STOP_INITIATED => self.update_strategy_running_state(false),
                _ => {}
            },
            Endpoint::HassReplies => {
                let msg = payload
                    .get("data")
                    .and_then(|d| d.get("msg"))
                    .map(stringify)
                    .unwrap_or_default();

                if msg == MSG_NO_STRATEGY_RUNNING {
                    self.update_strategy_running_state(false);
                } else if msg == MSG_IMPORT_OR_CREATE {
                    self.update_strategy_imported_state(false);
                }
            }
            Endpoint::HassRepliesImport => self.handle_import_reply(payload.get("data")),
            Endpoint::Heartbeat | Endpoint::StatusUpdates => {}
        }

        self.update_status_sensor_data();
    }

    fn handle_order_event(&mut self, payload: &Map<String, Value>) {
        let Some(event_type) = payload
            .get("type")
            .and_then(Value::as_str)
            .and_then(OrderEventType::parse)
        else {
            return;
        };

        let data = match payload
            .get("data")
            .cloned()
            .map(serde_json::from_value::<OrderEventData>)
        {
            Some(Ok(data)) => data,
            Some(Err(e)) => {
                warn!("Ignoring {:?} without usable order data: {}", event_type, e);
                return;
            }
            None => {
                warn!("Ignoring {:?} without order data", event_type);
                return;
            }
        };

        match event_type.created_side() {
            Some(side) if !self.order_tracker.contains_key(&data.order_id) => {
                // A start reset clears the table, so settle the flags first
                self.update_strategy_imported_state(true);
                self.update_strategy_running_state(true);

                debug!("Tracking {} order {}", side, data.order_id);
                self.order_tracker
                    .insert(data.order_id.clone(), TrackedOrder::from_event(data, side));
            }
            None => {
                if self.order_tracker.remove(&data.order_id).is_some() {
                    debug!("Order {} closed by {:?}", data.order_id, event_type);
                }
            }
            _ => {}
        }

        self.update_active_order_sensor_data();
    }

    fn handle_notify(&mut self, msg: &str) {
        if msg.contains("strategy started") {
            self.update_strategy_running_state(true);
        } else if msg.trim_start_matches("\\n").trim() == "Winding down..." {
            self.update_strategy_running_state(false);
        } else if msg.contains("file is imported.") {
            self.last_imported_strategy = Some(imported_strategy_name(msg));
            self.update_strategy_imported_state(true);
        } else if msg.contains("Strategy import error") {
            self.update_strategy_imported_state(false);
        } else if StatusReport::is_status_block(msg) {
            self.apply_status_report(StatusReport::parse(msg));
        }
    }

    fn handle_import_reply(&mut self, data: Option<&Value>) {
        let status = data
            .and_then(|d| d.get("status"))
            .map(stringify)
            .unwrap_or_default();

        let missing_file = match data {
            Some(Value::String(s)) => s.contains(MSG_NO_SUCH_FILE),
            Some(d) => d
                .get("msg")
                .and_then(Value::as_str)
                .map(|m| m.contains(MSG_NO_SUCH_FILE))
                .unwrap_or(false),
            None => false,
        };

        if status == "200" {
            self.update_strategy_imported_state(true);
        } else if status == "400" || missing_file {
            self.update_strategy_imported_state(false);
        }
    }

    /// Copy whatever the report carries; absent sections keep prior values
    pub fn apply_status_report(&mut self, report: StatusReport) {
        if let Some(base) = report.base_asset {
            self.base_asset = Some(base);
        }
        if let Some(quote) = report.quote_asset {
            self.quote_asset = Some(quote);
        }
        if let Some((base, quote)) = report.total {
            self.balances.total.set_base(&base);
            self.balances.total.set_quote(&quote);
        }
        if let Some((base, quote)) = report.available {
            self.balances.available.set_base(&base);
            self.balances.available.set_quote(&quote);
        }
        if let Some(row) = report.prices {
            if self.strategy_running == Some(true) {
                self.market_prices.set_bid(&row.bid);
                self.market_prices.set_ask(&row.ask);
                self.market_prices.set_mid(&row.mid);
            }
        }
    }

    // ---- status polling ----

    /// Throttle gate for the status command; records the poll when open
    pub fn should_update_status(&mut self) -> bool {
        let now = Instant::now();
        let should_update = match self.last_status_poll {
            None => true,
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                elapsed > self.status_update_frequency()
                    || (elapsed > ACCELERATED_POLL && self.market_prices.mid.is_zero())
            }
        };

        if should_update {
            self.last_status_poll = Some(now);
        }

        should_update
    }

    pub fn check_status_command(&mut self) {
        if self.strategy_running == Some(true) && self.should_update_status() {
            self.send_command(BotCommand::Status);
        }
    }

    // ---- outbound ----

    pub fn build_command(&self, command: &BotCommand) -> OutboundMessage {
        command.build(&self.topic_prefix, &self.instance_id, chrono::Utc::now())
    }

    pub fn send_command(&mut self, command: BotCommand) {
        if let BotCommand::Import { strategy } = &command {
            self.last_imported_strategy = Some(strategy.clone());
        }
        let message = self.build_command(&command);
        self.publisher.publish(message);
    }

    pub fn send_import_command(&mut self, strategy_name: &str) {
        self.send_command(BotCommand::Import {
            strategy: strategy_name.to_string(),
        });
    }

    /// Press one of the instance's buttons
    pub fn press_button(&mut self, entity_type: EntityType, strategy_name: &str) -> Result<()> {
        let command = self
            .entities
            .button(entity_type)
            .map(|button| button.activate(strategy_name))
            .ok_or_else(|| BridgeError::UnknownButton(entity_type.label().to_string()))?;

        debug!("{} pressed on {}", entity_type.label(), self.instance_id);
        self.send_command(command);
        Ok(())
    }

    // ---- flags ----

    pub fn update_strategy_running_state(&mut self, new_state: bool) {
        let now = Instant::now();
        if let Some(last) = self.last_changed_running {
            if now.saturating_duration_since(last) <= RUNNING_CHANGE_COOLDOWN {
                return;
            }
        }

        if self.strategy_running == Some(new_state) {
            return;
        }

        self.strategy_running = Some(new_state);
        self.last_changed_running = Some(now);

        if new_state {
            self.reset_instance_on_start();
        } else {
            self.reset_instance_on_stop();
        }

        self.entities
            .push(EntityType::StrategyRunning, StateFragment::state(new_state));
    }

    pub fn update_strategy_imported_state(&mut self, new_state: bool) {
        if self.strategy_imported == Some(new_state) {
            return;
        }

        self.strategy_imported = Some(new_state);
        self.entities
            .push(EntityType::StrategyImported, StateFragment::state(new_state));
    }

    pub fn set_available(&mut self) {
        if self.available != Some(true) {
            self.reset_instance_on_connected();
        }

        self.available = Some(true);
        self.entities.set_available(true);
    }

    pub fn set_unavailable(&mut self) {
        self.available = Some(false);
        self.entities.set_available(false);
    }

    // ---- resets ----

    fn reset_strategy_status(&mut self, with_balances: bool) {
        if with_balances {
            self.balances = Balances::default();
        }
        self.market_prices = MarketPrices::default();
        self.update_status_sensor_data();
    }

    fn reset_order_tracker(&mut self) {
        self.order_tracker.clear();
        self.update_active_order_sensor_data();
    }

    fn reset_instance_on_stop(&mut self) {
        debug!("Received stop, resetting.");
        self.reset_strategy_status(false);
    }

    fn reset_instance_on_start(&mut self) {
        debug!("Received start, resetting.");
        self.reset_strategy_status(true);
        self.reset_order_tracker();
        self.update_strategy_imported_state(true);
    }

    fn reset_instance_on_connected(&mut self) {
        debug!("Received connected, resetting.");
        self.reset_strategy_status(true);
        self.reset_order_tracker();

        if self.strategy_running.is_none() {
            self.update_strategy_running_state(false);
        }
        if self.strategy_imported.is_none() {
            self.update_strategy_imported_state(false);
        }
    }

    // ---- projections ----

    fn update_active_order_sensor_data(&mut self) {
        let orders: Map<String, Value> = self
            .order_tracker
            .iter()
            .map(|(id, order)| (id.clone(), order.attributes()))
            .collect();

        let fragment = StateFragment::state(self.order_tracker.len())
            .with_attribute("orders", Value::Object(orders));
        self.entities.push(EntityType::ActiveOrders, fragment);
    }

    fn update_status_sensor_data(&mut self) {
        let state = match (&self.base_asset, &self.quote_asset) {
            (Some(base), Some(quote)) => Value::from(format!("{}-{}", base, quote)),
            _ => Value::Null,
        };
        let helper = self.options.borrow().strategy_name_helper.clone();

        let fragment = StateFragment {
            state: Some(state),
            attributes: Map::new(),
        }
        .with_attribute("asset_base", self.base_asset.clone())
        .with_attribute("asset_quote", self.quote_asset.clone())
        .with_attribute("balances", self.balances.to_json())
        .with_attribute("market_prices", self.market_prices.to_json())
        .with_attribute("strategy_name_helper", helper)
        .with_attribute("instance_id", self.instance_id.clone())
        .with_attribute("last_imported_strategy", self.last_imported_strategy.clone());

        self.entities.push(EntityType::StrategyStatus, fragment);
    }
}

fn message(payload: &Map<String, Value>) -> &str {
    payload.get("msg").and_then(Value::as_str).unwrap_or("")
}

/// `str()`-style rendering: strings bare, everything else as JSON
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `... Configuration from pure_mm.yml file is imported.` -> `pure_mm`
fn imported_strategy_name(msg: &str) -> String {
    msg.split("Configuration from ")
        .nth(1)
        .and_then(|rest| rest.split(" file is").next())
        .and_then(|name| name.split(".yml").next())
        .unwrap_or("")
        .to_string()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
