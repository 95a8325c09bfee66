//! Crate-level tests for the bridge

#[cfg(test)]
mod tests {
    use crate::command::OutboundMessage;
    use crate::config::BridgeConfig;
    use crate::entity::EntityType;
    use crate::error::BridgeError;
    use crate::host::HostAction;
    use crate::manager::BridgeManager;
    use crate::publisher::ChannelPublisher;
    use crate::types::Endpoint;
    use rust_decimal::Decimal;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    fn bridge() -> (BridgeManager, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (publisher, rx) = ChannelPublisher::new();
        (
            BridgeManager::new(&BridgeConfig::default(), Arc::new(publisher)),
            rx,
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_bot_session_end_to_end() {
        let (mut manager, mut rx) = bridge();

        let applied = assert_ok!(manager.handle_message("hbot/bot1/hb", r#"{"ts": 1}"#).await);
        assert_eq!(applied, None);

        tokio::time::advance(Duration::from_secs(1)).await;
        let applied = assert_ok!(
            manager
                .handle_message("hbot/bot1/log", r#"{"msg": "start command initiated."}"#)
                .await
        );
        assert_eq!(applied, Some(Endpoint::Log));

        // running is now known, the next message triggers a status poll
        assert_ok!(manager.handle_message("hbot/bot1/hb", r#"{"ts": 2}"#).await);
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "hbot/bot1/status");

        let status = "Assets: BTC USDT\n\
                      Total    100  200  5.0   1000.0\n\
                      Available 100 200  4.0   900.0\n\
                      Exchange  0    0    29000 29010 29005";
        let payload = serde_json::json!({ "msg": status }).to_string();
        assert_ok!(manager.handle_message("hbot/bot1/notify", &payload).await);

        let instance = manager.instance("bot1").unwrap();
        {
            let inst = instance.lock().await;
            assert_eq!(inst.strategy_running(), Some(true));
            assert_eq!(inst.strategy_imported(), Some(true));
            assert_eq!(inst.base_asset(), Some("BTC"));
            assert_eq!(inst.quote_asset(), Some("USDT"));
            assert_eq!(inst.balances().total.base, Decimal::new(50, 1));
            assert_eq!(inst.balances().total.quote, Decimal::from(1000));
            assert_eq!(inst.balances().available.base, Decimal::from(4));
            assert_eq!(inst.balances().available.quote, Decimal::from(900));
            assert_eq!(inst.market_prices().bid, Decimal::from(29000));
            assert_eq!(inst.market_prices().ask, Decimal::from(29010));
            assert_eq!(inst.market_prices().mid, Decimal::from(29005));
        }

        let snapshots = manager.flush_entities().await;
        let status = snapshots
            .iter()
            .find(|s| s.unique_id == "bot1_strategy_status")
            .unwrap();
        assert_eq!(status.state, Value::from("BTC-USDT"));
        assert_eq!(status.attributes["balances"]["available"]["quote"], 900.0);
        assert_eq!(status.attributes["instance_id"], "bot1");
        assert!(status.available);

        // nothing changed since the flush
        assert!(manager.flush_entities().await.is_empty());
        manager.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_events_drive_active_orders() {
        let (mut manager, _rx) = bridge();
        assert_ok!(manager.handle_message("hbot/bot1/hb", r#"{"ts": 1}"#).await);
        tokio::time::advance(Duration::from_secs(1)).await;

        let created = |id: &str, kind: &str| {
            serde_json::json!({
                "type": kind,
                "data": {
                    "order_id": id,
                    "type": "OrderType.LIMIT_MAKER",
                    "trading_pair": "ETH-USDT",
                    "amount": 0.5,
                    "price": 1800.25,
                    "creation_timestamp": 1700000000000_i64,
                }
            })
            .to_string()
        };

        assert_ok!(manager.handle_message("hbot/bot1/events", &created("a", "BuyOrderCreated")).await);
        assert_ok!(manager.handle_message("hbot/bot1/events", &created("b", "SellOrderCreated")).await);
        assert_ok!(
            manager
                .handle_message(
                    "hbot/bot1/events",
                    r#"{"type": "SellOrderCompleted", "data": {"order_id": "b"}}"#
                )
                .await
        );

        let instance = manager.instance("bot1").unwrap();
        let inst = instance.lock().await;
        assert_eq!(inst.orders().len(), 1);
        assert_eq!(inst.strategy_running(), Some(true));

        let orders = inst.entities().get(EntityType::ActiveOrders).unwrap();
        assert_eq!(orders.render_state(), Value::from(1));
        let attrs = &orders.base().attributes["orders"]["a"];
        assert_eq!(attrs["t"], "LIMIT_MAKER");
        assert_eq!(attrs["s"], "buy");
        assert_eq!(attrs["p"], 1800.25);
        drop(inst);
        manager.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_endpoints() {
        let (mut manager, _rx) = bridge();
        assert_ok!(manager.handle_message("hbot/bot1/hb", r#"{"ts": 1}"#).await);
        tokio::time::advance(Duration::from_secs(1)).await;

        assert_ok!(
            manager
                .handle_message(
                    "hbot/bot1/hass_replies_import",
                    r#"{"data": {"status": 200, "msg": "ok"}}"#
                )
                .await
        );
        let instance = manager.instance("bot1").unwrap();
        assert_eq!(instance.lock().await.strategy_imported(), Some(true));

        assert_ok!(
            manager
                .handle_message("hbot/bot1/notify", r#"{"msg": "strategy started."}"#)
                .await
        );
        assert_eq!(instance.lock().await.strategy_running(), Some(true));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_ok!(
            manager
                .handle_message(
                    "hbot/bot1/hass_replies",
                    r#"{"data": {"msg": "No strategy is currently running!"}}"#
                )
                .await
        );
        assert_eq!(instance.lock().await.strategy_running(), Some(false));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_ok!(
            manager
                .handle_message("hbot/bot1/notify", r#"{"msg": "strategy started."}"#)
                .await
        );
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_ok!(
            manager
                .handle_message("hbot/bot1/notify", r#"{"msg": "\\nWinding down..."}"#)
                .await
        );
        assert_eq!(instance.lock().await.strategy_running(), Some(false));
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_malformed_messages_are_rejected() {
        let (mut manager, _rx) = bridge();

        assert!(matches!(
            manager.handle_message("bad", "{}").await,
            Err(BridgeError::InvalidTopic(_))
        ));
        assert!(manager.instance_ids().is_empty());

        let result = manager.handle_message("hbot/bot1/notify", "not json").await;
        assert!(matches!(result, Err(BridgeError::MalformedPayload(_))));
        assert_err!(manager.handle_message("hbot/bot1/notify", "42").await);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_host_actions_dispatch() {
        let (mut manager, mut rx) = bridge();
        assert_ok!(manager.handle_message("hbot/bot1/hb", r#"{"ts": 1}"#).await);

        let actions = [
            ("hbot_bridge/options", r#"{"strategy_name_helper": "input_text.hbot"}"#),
            ("hbot_bridge/helpers/input_text.hbot", "conf_avellaneda_1"),
            ("hbot_bridge/buttons/bot1/strategy_import", ""),
        ];
        for (topic, payload) in actions {
            let action = assert_ok!(HostAction::parse("hbot_bridge", topic, payload));
            assert_ok!(action.dispatch(&mut manager).await);
        }

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "hbot/bot1/import");
        let body: Value = serde_json::from_str(&sent[0].payload).unwrap();
        assert_eq!(body["data"]["strategy"], "conf_avellaneda_1");

        let action = assert_ok!(HostAction::parse(
            "hbot_bridge",
            "hbot_bridge/buttons/bot1/active_orders",
            ""
        ));
        assert_err!(action.dispatch(&mut manager).await);
        manager.shutdown();
    }
}
