//! Bridge Manager
//!
//! Owns every discovered bot instance, routes inbound topics to them and
//! exposes the host-facing operations (services, buttons, options).

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{BridgeConfig, BridgeOptions, OptionsUpdate};
use crate::entity::{EntitySnapshot, EntityType};
use crate::error::{BridgeError, Result};
use crate::health::Watchdog;
use crate::instance::{BotInstance, SharedInstance};
use crate::publisher::CommandPublisher;
use crate::types::Endpoint;

struct InstanceSlot {
    instance: SharedInstance,
    watchdog: Watchdog,
}

pub struct BridgeManager {
    topic_prefix: String,
    publisher: Arc<dyn CommandPublisher>,
    options: watch::Sender<BridgeOptions>,
    instances: HashMap<String, InstanceSlot>,
    helper_values: HashMap<String, String>,
    services_registered: bool,
}

impl BridgeManager {
    pub fn new(config: &BridgeConfig, publisher: Arc<dyn CommandPublisher>) -> Self {
        let (options, _) = watch::channel(config.options());

        Self {
            topic_prefix: config.topic_prefix.clone(),
            publisher,
            options,
            instances: HashMap::new(),
            helper_values: HashMap::new(),
            services_registered: false,
        }
    }

    /// Split `<prefix>/<instance_id>/.../<endpoint>` into instance id and endpoint
    pub fn extract_instance_id_endpoint(topic: &str) -> Result<(String, String)> {
        let segments: Vec<&str> = topic.split('/').collect();
        match segments.as_slice() {
            [_, instance_id, .., endpoint] => {
                Ok((instance_id.to_string(), endpoint.to_string()))
            }
            _ => Err(BridgeError::InvalidTopic(topic.to_string())),
        }
    }

    /// Resolve a topic to its instance, creating the instance on first sight
    pub fn route(&mut self, topic: &str) -> Result<(String, String, SharedInstance)> {
        let (instance_id, endpoint) = Self::extract_instance_id_endpoint(topic)?;
        let instance = self.get_or_create(&instance_id);
        Ok((instance_id, endpoint, instance))
    }

    fn get_or_create(&mut self, instance_id: &str) -> SharedInstance {
        if let Some(slot) = self.instances.get(instance_id) {
            return slot.instance.clone();
        }

        let instance = BotInstance::new(
            instance_id,
            &self.topic_prefix,
            self.options.subscribe(),
            self.publisher.clone(),
        )
        .shared();

        self.instances.insert(
            instance_id.to_string(),
            InstanceSlot {
                instance: instance.clone(),
                watchdog: Watchdog::new(),
            },
        );

        instance
    }

    pub fn instance(&self, instance_id: &str) -> Option<SharedInstance> {
        self.instances.get(instance_id).map(|slot| slot.instance.clone())
    }

    pub fn instance_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Process one inbound MQTT message.
    ///
    /// Returns the endpoint whose content was applied, or `None` for
    /// availability-only messages.
    pub async fn handle_message(&mut self, topic: &str, payload: &str) -> Result<Option<Endpoint>> {
        let (instance_id, endpoint, instance) = self.route(topic)?;

        {
            let mut inst = instance.lock().await;
            inst.mark_event_received();
        }
        if let Some(slot) = self.instances.get_mut(&instance_id) {
            slot.watchdog.rearm(instance.clone());
        }

        let mut inst = instance.lock().await;
        let extracted = inst.extract_event_payload(&endpoint, payload).map_err(|e| {
            debug!("Dropping message on {}: {}", topic, e);
            e
        })?;

        Ok(extracted.map(|(endpoint, data)| {
            inst.update_data(endpoint, &data);
            endpoint
        }))
    }

    /// Register the host services once; later calls are no-ops
    pub fn register_services(&mut self) -> bool {
        if self.services_registered {
            return false;
        }
        self.services_registered = true;
        info!("Registered service {}", crate::services::IMPORT_STRATEGY);
        true
    }

    pub fn services_registered(&self) -> bool {
        self.services_registered
    }

    pub fn options(&self) -> BridgeOptions {
        self.options.borrow().clone()
    }

    /// Hot-reload options; instances see the new values on their next read
    pub fn update_options(&mut self, update: OptionsUpdate) -> bool {
        let changed = self.options.send_if_modified(|options| options.apply(update));
        if changed {
            info!("Options updated: {:?}", *self.options.borrow());
        }
        changed
    }

    /// Record the current value of a host helper entity
    pub fn set_helper_value(&mut self, entity_id: &str, value: &str) {
        debug!("Helper {} = {:?}", entity_id, value);
        self.helper_values
            .insert(entity_id.to_string(), value.to_string());
    }

    /// Strategy name read from the configured helper, empty when unset
    pub fn helper_strategy_name(&self) -> String {
        self.options
            .borrow()
            .strategy_name_helper
            .as_ref()
            .and_then(|helper| self.helper_values.get(helper))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn send_import_command(&mut self, instance_id: &str, strategy_name: &str) {
        let instance = self.get_or_create(instance_id);
        let mut inst = instance.lock().await;
        inst.send_import_command(strategy_name);
    }

    /// Press a button of an instance by its entity slug
    pub async fn press_button(&mut self, instance_id: &str, button: &str) -> Result<()> {
        let entity_type = EntityType::from_slug(button)
            .ok_or_else(|| BridgeError::UnknownButton(button.to_string()))?;
        let instance = self
            .instance(instance_id)
            .ok_or_else(|| BridgeError::UnknownInstance(instance_id.to_string()))?;

        let strategy_name = self.helper_strategy_name();
        let mut inst = instance.lock().await;
        inst.press_button(entity_type, &strategy_name)
    }

    /// Entity snapshots changed since the previous flush, across all instances
    pub async fn flush_entities(&self) -> Vec<EntitySnapshot> {
        let mut snapshots = Vec::new();
        for id in self.instance_ids() {
            if let Some(slot) = self.instances.get(&id) {
                snapshots.extend(slot.instance.lock().await.drain_dirty_entities());
            }
        }
        snapshots
    }

    /// Cancel every watchdog
    pub fn shutdown(&mut self) {
        for (id, slot) in self.instances.iter_mut() {
            if slot.watchdog.is_active() {
                debug!("Stopping watchdog for {}", id);
            }
            slot.watchdog.cancel();
        }
        info!("Bridge stopped, {} instances", self.instances.len());
        self.services_registered = false;
    }
}
