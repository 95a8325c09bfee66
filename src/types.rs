//! Core types shared by the coordinator and its projections

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Message category, taken from the last topic segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Heartbeat,
    StatusUpdates,
    Events,
    Notify,
    Log,
    HassReplies,
    HassRepliesImport,
}

impl Endpoint {
    /// Parse a topic suffix into a known endpoint
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "hb" => Some(Endpoint::Heartbeat),
            "status_updates" => Some(Endpoint::StatusUpdates),
            "events" => Some(Endpoint::Events),
            "notify" => Some(Endpoint::Notify),
            "log" => Some(Endpoint::Log),
            "hass_replies" => Some(Endpoint::HassReplies),
            "hass_replies_import" => Some(Endpoint::HassRepliesImport),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Heartbeat => "hb",
            Endpoint::StatusUpdates => "status_updates",
            Endpoint::Events => "events",
            Endpoint::Notify => "notify",
            Endpoint::Log => "log",
            Endpoint::HassReplies => "hass_replies",
            Endpoint::HassRepliesImport => "hass_replies_import",
        }
    }

    /// Heartbeat-style endpoints only drive availability
    pub fn is_availability(&self) -> bool {
        matches!(self, Endpoint::Heartbeat | Endpoint::StatusUpdates)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order lifecycle events the bot publishes on `events`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEventType {
    BuyOrderCreated,
    SellOrderCreated,
    OrderCancelled,
    BuyOrderCompleted,
    SellOrderCompleted,
    OrderExpired,
    OrderFailure,
}

impl OrderEventType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "BuyOrderCreated" => Some(OrderEventType::BuyOrderCreated),
            "SellOrderCreated" => Some(OrderEventType::SellOrderCreated),
            "OrderCancelled" => Some(OrderEventType::OrderCancelled),
            "BuyOrderCompleted" => Some(OrderEventType::BuyOrderCompleted),
            "SellOrderCompleted" => Some(OrderEventType::SellOrderCompleted),
            "OrderExpired" => Some(OrderEventType::OrderExpired),
            "OrderFailure" => Some(OrderEventType::OrderFailure),
            _ => None,
        }
    }

    /// Side of a newly created order, `None` for terminal events
    pub fn created_side(&self) -> Option<OrderSide> {
        match self {
            OrderEventType::BuyOrderCreated => Some(OrderSide::Buy),
            OrderEventType::SellOrderCreated => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// `data` section of an order event. Numeric fields are kept as sent.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderEventData {
    pub order_id: String,
    #[serde(rename = "type", default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub trading_pair: Option<String>,
    #[serde(default)]
    pub amount: serde_json::Value,
    #[serde(default)]
    pub price: serde_json::Value,
    #[serde(default)]
    pub creation_timestamp: serde_json::Value,
}

/// Open order tracked for the active-orders projection
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedOrder {
    pub order_type: String,
    pub trading_pair: String,
    pub amount: serde_json::Value,
    pub price: serde_json::Value,
    pub side: OrderSide,
    pub creation_timestamp: serde_json::Value,
}

impl TrackedOrder {
    pub fn from_event(data: OrderEventData, side: OrderSide) -> Self {
        Self {
            order_type: data.order_type.unwrap_or_default(),
            trading_pair: data.trading_pair.unwrap_or_default(),
            amount: data.amount,
            price: data.price,
            side,
            creation_timestamp: data.creation_timestamp,
        }
    }

    /// Compact attribute form: `OrderType.LIMIT` is reported as `LIMIT`
    pub fn attributes(&self) -> serde_json::Value {
        let short_type = self
            .order_type
            .split_once('.')
            .map(|(_, rest)| rest.split('.').next().unwrap_or(rest))
            .unwrap_or(self.order_type.as_str());

        serde_json::json!({
            "t": short_type,
            "tp": self.trading_pair,
            "a": self.amount,
            "p": self.price,
            "s": self.side,
            "ts": self.creation_timestamp,
        })
    }
}

/// Parse a decimal from a loose text or JSON token
pub fn try_parse(value: &str) -> Option<Decimal> {
    let trimmed = value.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Base/quote amount pair
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BalanceItem {
    pub base: Decimal,
    pub quote: Decimal,
}

impl BalanceItem {
    /// Assign from text, keeping the current value on parse failure
    pub fn set_base(&mut self, value: &str) {
        if let Some(v) = try_parse(value) {
            self.base = v;
        }
    }

    pub fn set_quote(&mut self, value: &str) {
        if let Some(v) = try_parse(value) {
            self.quote = v;
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "base": self.base.to_f64().unwrap_or_default(),
            "quote": self.quote.to_f64().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Balances {
    pub total: BalanceItem,
    pub available: BalanceItem,
}

impl Balances {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "total": self.total.to_json(),
            "available": self.available.to_json(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarketPrices {
    pub bid: Decimal,
    pub ask: Decimal,
    pub mid: Decimal,
}

impl MarketPrices {
    pub fn set_bid(&mut self, value: &str) {
        if let Some(v) = try_parse(value) {
            self.bid = v;
        }
    }

    pub fn set_ask(&mut self, value: &str) {
        if let Some(v) = try_parse(value) {
            self.ask = v;
        }
    }

    pub fn set_mid(&mut self, value: &str) {
        if let Some(v) = try_parse(value) {
            self.mid = v;
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "bid": self.bid.to_f64().unwrap_or_default(),
            "ask": self.ask.to_f64().unwrap_or_default(),
            "mid": self.mid.to_f64().unwrap_or_default(),
        })
    }
}
