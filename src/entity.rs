//! Entity projections mirroring coordinator state to the host
//!
//! Every bot instance is represented by one device carrying eight entities:
//! two binary sensors, two sensors and four buttons. The coordinator pushes
//! state fragments into them; the host drains the ones that changed.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::command::BotCommand;

/// Integration domain used in device identifiers
pub const DOMAIN: &str = "hummingbot";

const MANUFACTURER: &str = "Hummingbot";

/// Host platform an entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    BinarySensor,
    Sensor,
    Button,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::BinarySensor => "binary_sensor",
            Platform::Sensor => "sensor",
            Platform::Button => "button",
        }
    }
}

/// The fixed set of entities each instance exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    StrategyRunning,
    StrategyImported,
    ActiveOrders,
    StrategyStatus,
    StrategyStart,
    StrategyGetStatus,
    StrategyStop,
    StrategyImport,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        EntityType::StrategyRunning,
        EntityType::StrategyImported,
        EntityType::ActiveOrders,
        EntityType::StrategyStatus,
        EntityType::StrategyStart,
        EntityType::StrategyGetStatus,
        EntityType::StrategyStop,
        EntityType::StrategyImport,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EntityType::StrategyRunning => "Strategy Running",
            EntityType::StrategyImported => "Strategy Imported",
            EntityType::ActiveOrders => "Active Orders",
            EntityType::StrategyStatus => "Strategy Status",
            EntityType::StrategyStart => "Strategy Start",
            EntityType::StrategyGetStatus => "Strategy Get Status",
            EntityType::StrategyStop => "Strategy Stop",
            EntityType::StrategyImport => "Strategy Import",
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            EntityType::StrategyRunning | EntityType::StrategyImported => Platform::BinarySensor,
            EntityType::ActiveOrders | EntityType::StrategyStatus => Platform::Sensor,
            _ => Platform::Button,
        }
    }

    /// `Strategy Get Status` -> `strategy_get_status`
    pub fn slug(&self) -> String {
        slugify(self.label())
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.slug() == slug)
    }
}

/// Lower-case, collapse every run of non-alphanumerics into one `_`
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub manufacturer: String,
    pub model: String,
    pub name: String,
}

impl DeviceInfo {
    pub fn for_instance(instance_id: &str) -> Self {
        Self {
            identifiers: vec![(DOMAIN.to_string(), instance_id.to_string())],
            manufacturer: MANUFACTURER.to_string(),
            model: MANUFACTURER.to_string(),
            name: format!("Hummingbot {}", instance_id),
        }
    }
}

/// State pushed from the coordinator into a projection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateFragment {
    pub state: Option<Value>,
    pub attributes: Map<String, Value>,
}

impl StateFragment {
    pub fn state(value: impl Into<Value>) -> Self {
        Self {
            state: Some(value.into()),
            attributes: Map::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

/// Fields shared by every projection
#[derive(Debug, Clone)]
pub struct EntityBase {
    pub entity_type: EntityType,
    pub unique_id: String,
    pub name: String,
    pub entity_id: String,
    pub device: DeviceInfo,
    pub available: bool,
    pub attributes: Map<String, Value>,
    dirty: bool,
}

impl EntityBase {
    fn new(instance_id: &str, entity_type: EntityType) -> Self {
        let name = format!("Hummingbot {} {}", instance_id, entity_type.label());
        let unique_id = format!("{}_{}", instance_id, entity_type.label())
            .replace(' ', "_")
            .to_lowercase();
        let entity_id = format!("{}.{}", entity_type.platform().as_str(), slugify(&name));

        Self {
            entity_type,
            unique_id,
            name,
            entity_id,
            device: DeviceInfo::for_instance(instance_id),
            available: false,
            attributes: Map::new(),
            dirty: false,
        }
    }

    fn update_attributes(&mut self, attributes: Map<String, Value>) -> bool {
        if self.attributes == attributes {
            return false;
        }
        self.attributes = attributes;
        true
    }
}

#[derive(Debug, Clone)]
pub struct BinarySensor {
    pub base: EntityBase,
    pub is_on: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Sensor {
    pub base: EntityBase,
    pub native_value: Value,
    pub unit_of_measurement: Option<&'static str>,
    pub device_class: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct Button {
    pub base: EntityBase,
}

impl Button {
    /// Command this button sends when pressed
    pub fn activate(&self, strategy_name: &str) -> BotCommand {
        match self.base.entity_type {
            EntityType::StrategyStart => BotCommand::Start,
            EntityType::StrategyStop => BotCommand::Stop,
            EntityType::StrategyImport => BotCommand::Import {
                strategy: strategy_name.to_string(),
            },
            _ => BotCommand::Status,
        }
    }
}

/// One entity of an instance, tagged by platform
#[derive(Debug, Clone)]
pub enum Projection {
    BinarySensor(BinarySensor),
    Sensor(Sensor),
    Button(Button),
}

impl Projection {
    pub fn new(instance_id: &str, entity_type: EntityType) -> Self {
        let base = EntityBase::new(instance_id, entity_type);
        match entity_type.platform() {
            Platform::BinarySensor => Projection::BinarySensor(BinarySensor { base, is_on: None }),
            Platform::Sensor => Projection::Sensor(Sensor {
                base,
                native_value: Value::Null,
                unit_of_measurement: (entity_type == EntityType::ActiveOrders).then_some("orders"),
                device_class: (entity_type == EntityType::StrategyStatus).then_some("enum"),
            }),
            Platform::Button => Projection::Button(Button { base }),
        }
    }

    pub fn base(&self) -> &EntityBase {
        match self {
            Projection::BinarySensor(e) => &e.base,
            Projection::Sensor(e) => &e.base,
            Projection::Button(e) => &e.base,
        }
    }

    fn base_mut(&mut self) -> &mut EntityBase {
        match self {
            Projection::BinarySensor(e) => &mut e.base,
            Projection::Sensor(e) => &mut e.base,
            Projection::Button(e) => &mut e.base,
        }
    }

    pub fn platform(&self) -> Platform {
        self.base().entity_type.platform()
    }

    pub fn is_dirty(&self) -> bool {
        self.base().dirty
    }

    /// Write state and attributes; unchanged input leaves the entity clean
    pub fn push(&mut self, fragment: StateFragment) {
        let StateFragment { state, attributes } = fragment;

        let state_changed = match self {
            Projection::BinarySensor(e) => match state.as_ref().and_then(truthy) {
                Some(on) if e.is_on != Some(on) => {
                    e.is_on = Some(on);
                    true
                }
                _ => false,
            },
            Projection::Sensor(e) => {
                let value = state.unwrap_or(Value::Null);
                if e.native_value != value {
                    e.native_value = value;
                    true
                } else {
                    false
                }
            }
            Projection::Button(_) => false,
        };

        let base = self.base_mut();
        let attributes_changed = base.update_attributes(attributes);
        if state_changed || attributes_changed {
            base.dirty = true;
        }
    }

    pub fn set_available(&mut self, available: bool) {
        let base = self.base_mut();
        if base.available != available {
            base.available = available;
            base.dirty = true;
        }
    }

    /// Kind-specific visible state
    pub fn render_state(&self) -> Value {
        match self {
            Projection::BinarySensor(e) => match e.is_on {
                Some(true) => Value::from("on"),
                Some(false) => Value::from("off"),
                None => Value::Null,
            },
            Projection::Sensor(e) => e.native_value.clone(),
            Projection::Button(_) => Value::Null,
        }
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        let base = self.base();
        let (unit, device_class) = match self {
            Projection::Sensor(e) => (e.unit_of_measurement, e.device_class),
            _ => (None, None),
        };

        EntitySnapshot {
            unique_id: base.unique_id.clone(),
            entity_id: base.entity_id.clone(),
            name: base.name.clone(),
            platform: self.platform(),
            state: self.render_state(),
            available: base.available,
            attributes: base.attributes.clone(),
            unit_of_measurement: unit,
            device_class,
            device: base.device.clone(),
        }
    }

    /// Snapshot for the host flush, clearing the dirty mark
    pub fn take_snapshot_if_dirty(&mut self) -> Option<EntitySnapshot> {
        if !self.is_dirty() {
            return None;
        }
        self.base_mut().dirty = false;
        Some(self.snapshot())
    }
}

/// Python-style truthiness for binary sensor states
fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().map(|f| f != 0.0).unwrap_or(true)),
        Value::String(s) => Some(!s.is_empty()),
        Value::Array(a) => Some(!a.is_empty()),
        Value::Object(o) => Some(!o.is_empty()),
    }
}

/// Serializable view handed to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySnapshot {
    pub unique_id: String,
    pub entity_id: String,
    pub name: String,
    pub platform: Platform,
    pub state: Value,
    pub available: bool,
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    pub device: DeviceInfo,
}

/// The entities discovered for one instance
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entities: Vec<Projection>,
}

impl EntityRegistry {
    /// Create the full entity set for an instance
    pub fn discover(instance_id: &str) -> Self {
        Self {
            entities: EntityType::ALL
                .iter()
                .map(|t| Projection::new(instance_id, *t))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, entity_type: EntityType) -> Option<&Projection> {
        self.entities
            .iter()
            .find(|e| e.base().entity_type == entity_type)
    }

    pub fn get_mut(&mut self, entity_type: EntityType) -> Option<&mut Projection> {
        self.entities
            .iter_mut()
            .find(|e| e.base().entity_type == entity_type)
    }

    pub fn button(&self, entity_type: EntityType) -> Option<&Button> {
        match self.get(entity_type) {
            Some(Projection::Button(b)) => Some(b),
            _ => None,
        }
    }

    pub fn push(&mut self, entity_type: EntityType, fragment: StateFragment) {
        if let Some(entity) = self.get_mut(entity_type) {
            entity.push(fragment);
        }
    }

    pub fn set_available(&mut self, available: bool) {
        for entity in &mut self.entities {
            entity.set_available(available);
        }
    }

    pub fn drain_dirty(&mut self) -> Vec<EntitySnapshot> {
        self.entities
            .iter_mut()
            .filter_map(|e| e.take_snapshot_if_dirty())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Projection> {
        self.entities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_builds_all_entities() {
        let registry = EntityRegistry::discover("abc123");
        assert_eq!(registry.len(), 8);

        let running = registry.get(EntityType::StrategyRunning).unwrap();
        assert_eq!(running.platform(), Platform::BinarySensor);
        assert_eq!(running.base().unique_id, "abc123_strategy_running");
        assert_eq!(running.base().name, "Hummingbot abc123 Strategy Running");
        assert_eq!(
            running.base().entity_id,
            "binary_sensor.hummingbot_abc123_strategy_running"
        );
        assert!(!running.base().available);

        let orders = registry.get(EntityType::ActiveOrders).unwrap();
        assert_eq!(orders.snapshot().unit_of_measurement, Some("orders"));
    }

    #[test]
    fn test_push_is_idempotent() {
        let mut entity = Projection::new("bot", EntityType::StrategyStatus);
        let fragment = StateFragment::state("BTC-USDT").with_attribute("instance_id", "bot");

        entity.push(fragment.clone());
        assert!(entity.take_snapshot_if_dirty().is_some());

        entity.push(fragment);
        assert!(!entity.is_dirty());
        assert_eq!(entity.render_state(), Value::from("BTC-USDT"));
    }

    #[test]
    fn test_binary_sensor_ignores_missing_state() {
        let mut entity = Projection::new("bot", EntityType::StrategyImported);
        entity.push(StateFragment::state(true));
        assert_eq!(entity.render_state(), Value::from("on"));

        entity.push(StateFragment::default());
        assert_eq!(entity.render_state(), Value::from("on"));

        entity.push(StateFragment::state(false));
        assert_eq!(entity.render_state(), Value::from("off"));
    }

    #[test]
    fn test_button_activation() {
        let registry = EntityRegistry::discover("bot");
        let import = registry.button(EntityType::StrategyImport).unwrap();
        assert_eq!(
            import.activate("pure_mm"),
            BotCommand::Import {
                strategy: "pure_mm".to_string()
            }
        );
        let status = registry.button(EntityType::StrategyGetStatus).unwrap();
        assert_eq!(status.activate("ignored"), BotCommand::Status);
        assert!(registry.button(EntityType::ActiveOrders).is_none());
    }

    #[test]
    fn test_slugs() {
        assert_eq!(EntityType::StrategyGetStatus.slug(), "strategy_get_status");
        assert_eq!(EntityType::from_slug("strategy_stop"), Some(EntityType::StrategyStop));
        assert_eq!(slugify("Hummingbot Bot-1 Strategy Start"), "hummingbot_bot_1_strategy_start");
    }
}
