//! Host services exposed by the bridge

use serde::Deserialize;
use tracing::info;

use crate::error::{BridgeError, Result};
use crate::manager::BridgeManager;

/// Service name for importing a strategy on one instance
pub const IMPORT_STRATEGY: &str = "import_strategy";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportStrategyRequest {
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub strategy_name: Option<String>,
}

impl BridgeManager {
    /// Send an import command for the requested instance
    pub async fn import_strategy(&mut self, request: ImportStrategyRequest) -> Result<()> {
        let instance_id = request
            .instance_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BridgeError::MalformedPayload("instance_id is required".to_string()))?;
        let strategy_name = request.strategy_name.unwrap_or_default();

        info!("Importing strategy {:?} on {}", strategy_name, instance_id);
        self.send_import_command(&instance_id, &strategy_name).await;
        Ok(())
    }

    /// Dispatch a service call by name
    pub async fn call_service(&mut self, service: &str, data: serde_json::Value) -> Result<()> {
        match service {
            IMPORT_STRATEGY => {
                let request: ImportStrategyRequest = serde_json::from_value(data)
                    .map_err(|e| BridgeError::MalformedPayload(e.to_string()))?;
                self.import_strategy(request).await
            }
            other => Err(BridgeError::InvalidEndpoint(format!("service {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::publisher::ChannelPublisher;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_import_strategy_service() {
        let (publisher, mut rx) = ChannelPublisher::new();
        let mut manager = BridgeManager::new(&BridgeConfig::default(), Arc::new(publisher));

        manager
            .call_service(
                IMPORT_STRATEGY,
                serde_json::json!({ "instance_id": "abc123", "strategy_name": "pure_mm" }),
            )
            .await
            .unwrap();

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.topic, "hbot/abc123/import");
        let body: serde_json::Value = serde_json::from_str(&msg.payload).unwrap();
        assert_eq!(body["data"]["strategy"], "pure_mm");
        assert_eq!(body["header"]["reply_to"], "hbot/abc123/hass_replies_import");

        let instance = manager.instance("abc123").unwrap();
        assert_eq!(instance.lock().await.last_imported_strategy(), Some("pure_mm"));
    }

    #[tokio::test]
    async fn test_import_strategy_requires_instance() {
        let (publisher, mut rx) = ChannelPublisher::new();
        let mut manager = BridgeManager::new(&BridgeConfig::default(), Arc::new(publisher));

        let result = manager
            .call_service(IMPORT_STRATEGY, serde_json::json!({ "strategy_name": "x" }))
            .await;
        assert!(matches!(result, Err(BridgeError::MalformedPayload(_))));
        assert!(rx.try_recv().is_err());

        assert!(manager
            .call_service("restart", serde_json::json!({}))
            .await
            .is_err());
    }
}
