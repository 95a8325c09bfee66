//! Outbound commands sent to a bot instance

use serde::Serialize;

/// Default endpoint the bot answers on
pub const DEFAULT_REPLY_ENDPOINT: &str = "hass_replies";

/// Endpoint the bot answers import commands on
pub const IMPORT_REPLY_ENDPOINT: &str = "hass_replies_import";

/// Commands understood by the bot's remote-command listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Stop,
    Status,
    Import { strategy: String },
}

impl BotCommand {
    /// Topic suffix the command is published under
    pub fn endpoint(&self) -> &'static str {
        match self {
            BotCommand::Start => "start",
            BotCommand::Stop => "stop",
            BotCommand::Status => "status",
            BotCommand::Import { .. } => "import",
        }
    }

    pub fn reply_endpoint(&self) -> &'static str {
        match self {
            BotCommand::Import { .. } => IMPORT_REPLY_ENDPOINT,
            _ => DEFAULT_REPLY_ENDPOINT,
        }
    }

    fn data(&self) -> serde_json::Value {
        match self {
            BotCommand::Import { strategy } => serde_json::json!({ "strategy": strategy }),
            _ => serde_json::json!({}),
        }
    }

    /// Build the topic and JSON body for an instance
    pub fn build(
        &self,
        topic_prefix: &str,
        instance_id: &str,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> OutboundMessage {
        let payload = CommandPayload {
            timestamp: timestamp.timestamp_millis(),
            header: CommandHeader {
                reply_to: command_topic(topic_prefix, instance_id, self.reply_endpoint()),
            },
            data: self.data(),
        };

        OutboundMessage {
            topic: command_topic(topic_prefix, instance_id, self.endpoint()),
            // Serializing a struct of strings and a json Value cannot fail
            payload: serde_json::to_string(&payload).unwrap_or_default(),
        }
    }
}

/// Format: `{prefix}/{instance_id}/{endpoint}`
pub fn command_topic(topic_prefix: &str, instance_id: &str, endpoint: &str) -> String {
    format!("{}/{}/{}", topic_prefix, instance_id, endpoint)
}

#[derive(Debug, Clone, Serialize)]
struct CommandPayload {
    timestamp: i64,
    header: CommandHeader,
    data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
struct CommandHeader {
    reply_to: String,
}

/// A message ready for the MQTT publish primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_import_command_payload() {
        let ts = chrono::Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let cmd = BotCommand::Import {
            strategy: "pure_mm".to_string(),
        };

        let msg = cmd.build("hbot", "abc123", ts);
        assert_eq!(msg.topic, "hbot/abc123/import");

        let body: serde_json::Value = serde_json::from_str(&msg.payload).unwrap();
        assert_eq!(body["header"]["reply_to"], "hbot/abc123/hass_replies_import");
        assert_eq!(body["data"], serde_json::json!({ "strategy": "pure_mm" }));
        assert_eq!(body["timestamp"], 1_700_000_000_123_i64);
    }

    #[test]
    fn test_plain_commands_reply_to_default_endpoint() {
        let ts = chrono::Utc::now();
        for cmd in [BotCommand::Start, BotCommand::Stop, BotCommand::Status] {
            let msg = cmd.build("hbot", "bot1", ts);
            assert_eq!(msg.topic, format!("hbot/bot1/{}", cmd.endpoint()));

            let body: serde_json::Value = serde_json::from_str(&msg.payload).unwrap();
            assert_eq!(body["header"]["reply_to"], "hbot/bot1/hass_replies");
            assert_eq!(body["data"], serde_json::json!({}));
        }
    }
}
