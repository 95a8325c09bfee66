//! Line protocol between the bridge binary and its host
//!
//! Every inbound line is `topic payload`, as printed by `mosquitto_sub -v`.
//! Topics under the control prefix carry host actions, everything else is a
//! bot message. Outbound lines use the same shape.

use serde_json::Value;

use crate::command::OutboundMessage;
use crate::config::OptionsUpdate;
use crate::entity::EntitySnapshot;
use crate::error::{BridgeError, Result};
use crate::manager::BridgeManager;

/// One parsed inbound line
#[derive(Debug, Clone, PartialEq)]
pub enum HostAction {
    /// Message published by a bot
    BotMessage { topic: String, payload: String },
    /// Options flow submission
    Options(Value),
    Service { name: String, data: Value },
    Button { instance_id: String, button: String },
    Helper { entity_id: String, value: String },
}

/// Split `topic payload` at the first run of whitespace
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    match line.split_once(char::is_whitespace) {
        Some((topic, payload)) => Some((topic, payload.trim_start())),
        None => Some((line, "")),
    }
}

impl HostAction {
    pub fn parse(control_prefix: &str, topic: &str, payload: &str) -> Result<Self> {
        let Some(action) = topic
            .strip_prefix(control_prefix)
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return Ok(HostAction::BotMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
            });
        };

        let parts: Vec<&str> = action.split('/').collect();
        match parts.as_slice() {
            ["options"] => Ok(HostAction::Options(parse_json(payload)?)),
            ["services", name] => Ok(HostAction::Service {
                name: name.to_string(),
                data: if payload.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    parse_json(payload)?
                },
            }),
            ["buttons", instance_id, button] => Ok(HostAction::Button {
                instance_id: instance_id.to_string(),
                button: button.to_string(),
            }),
            ["helpers", entity_id] => Ok(HostAction::Helper {
                entity_id: entity_id.to_string(),
                value: payload.trim().to_string(),
            }),
            _ => Err(BridgeError::InvalidTopic(topic.to_string())),
        }
    }

    /// Apply the action to the manager
    pub async fn dispatch(self, manager: &mut BridgeManager) -> Result<()> {
        match self {
            HostAction::BotMessage { topic, payload } => {
                manager.handle_message(&topic, &payload).await.map(|_| ())
            }
            HostAction::Options(value) => {
                let update: OptionsUpdate = serde_json::from_value(value)
                    .map_err(|e| BridgeError::MalformedPayload(e.to_string()))?;
                manager.update_options(update);
                Ok(())
            }
            HostAction::Service { name, data } => manager.call_service(&name, data).await,
            HostAction::Button {
                instance_id,
                button,
            } => manager.press_button(&instance_id, &button).await,
            HostAction::Helper { entity_id, value } => {
                manager.set_helper_value(&entity_id, &value);
                Ok(())
            }
        }
    }
}

fn parse_json(payload: &str) -> Result<Value> {
    serde_json::from_str(payload).map_err(|e| BridgeError::MalformedPayload(e.to_string()))
}

/// State line for a flushed entity: `<state_prefix>/<unique_id>/state`
pub fn state_message(state_prefix: &str, snapshot: &EntitySnapshot) -> OutboundMessage {
    OutboundMessage {
        topic: format!("{}/{}/state", state_prefix, snapshot.unique_id),
        payload: serde_json::to_string(snapshot).unwrap_or_default(),
    }
}

pub fn format_line(message: &OutboundMessage) -> String {
    format!("{} {}", message.topic, message.payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityRegistry, EntityType};

    #[test]
    fn test_split_line() {
        assert_eq!(
            split_line("hbot/bot1/hb {\"ts\": 1}\n"),
            Some(("hbot/bot1/hb", "{\"ts\": 1}"))
        );
        assert_eq!(split_line("hbot_bridge/helpers/input_text.s"), Some(("hbot_bridge/helpers/input_text.s", "")));
        assert_eq!(split_line("   \n"), None);
    }

    #[test]
    fn test_parse_control_topics() {
        let action = HostAction::parse("hbot_bridge", "hbot_bridge/buttons/bot1/strategy_stop", "").unwrap();
        assert_eq!(
            action,
            HostAction::Button {
                instance_id: "bot1".to_string(),
                button: "strategy_stop".to_string(),
            }
        );

        let action = HostAction::parse(
            "hbot_bridge",
            "hbot_bridge/options",
            r#"{"status_update_frequency": 20}"#,
        )
        .unwrap();
        assert!(matches!(action, HostAction::Options(_)));

        let action =
            HostAction::parse("hbot_bridge", "hbot_bridge/helpers/input_text.strategy", " pure_mm ").unwrap();
        assert_eq!(
            action,
            HostAction::Helper {
                entity_id: "input_text.strategy".to_string(),
                value: "pure_mm".to_string(),
            }
        );

        assert!(matches!(
            HostAction::parse("hbot_bridge", "hbot_bridge/reboot", ""),
            Err(BridgeError::InvalidTopic(_))
        ));
        assert!(matches!(
            HostAction::parse("hbot_bridge", "hbot_bridge/services/import_strategy", "{oops"),
            Err(BridgeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_other_topics_are_bot_messages() {
        let action = HostAction::parse("hbot_bridge", "hbot/abc123/events", "{}").unwrap();
        assert_eq!(
            action,
            HostAction::BotMessage {
                topic: "hbot/abc123/events".to_string(),
                payload: "{}".to_string(),
            }
        );
        // prefix must match a whole segment
        let action = HostAction::parse("hbot_bridge", "hbot_bridge2/x/hb", "{}").unwrap();
        assert!(matches!(action, HostAction::BotMessage { .. }));
    }

    #[test]
    fn test_state_message() {
        let registry = EntityRegistry::discover("bot1");
        let snapshot = registry.get(EntityType::ActiveOrders).unwrap().snapshot();
        let msg = state_message("homeassistant/hummingbot", &snapshot);
        assert_eq!(msg.topic, "homeassistant/hummingbot/bot1_active_orders/state");

        let body: Value = serde_json::from_str(&msg.payload).unwrap();
        assert_eq!(body["entity_id"], "sensor.hummingbot_bot1_active_orders");
        assert_eq!(body["unit_of_measurement"], "orders");
        assert!(format_line(&msg).starts_with("homeassistant/hummingbot/bot1_active_orders/state {"));
    }
}
