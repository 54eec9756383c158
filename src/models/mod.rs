use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Named API credential pair, loaded once from the credential file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub key: String,
    pub secret: String,
}

/// Latest trade price for a symbol at poll time. Not persisted beyond a log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: String,
    pub price: f64,
}

/// OHLCV candlestick for one time bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Parameters for a new order. `price` is required for limit orders and
/// ignored for market orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub qty: f64,
    pub price: Option<f64>,
    pub time_in_force: String,
}

impl OrderRequest {
    pub fn limit(symbol: &str, side: OrderSide, qty: f64, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            order_type: OrderType::Limit,
            side,
            qty,
            price: Some(price),
            time_in_force: "gtc".to_string(),
        }
    }

    pub fn market(symbol: &str, side: OrderSide, qty: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            order_type: OrderType::Market,
            side,
            qty,
            price: None,
            time_in_force: "gtc".to_string(),
        }
    }

    pub fn with_time_in_force(mut self, tif: &str) -> Self {
        self.time_in_force = tif.to_string();
        self
    }
}

/// Order record as relayed from the venue. The venue owns the lifecycle;
/// this is never cached or mutated locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHandle {
    pub id: String,
    pub symbol: String,
    pub side: Option<OrderSide>,
    pub qty: Option<f64>,
    pub status: String,
    /// Venue payload as received, for callers that need venue-specific fields.
    pub raw: serde_json::Value,
}

/// Broker-style position record: symbol plus signed quantity
/// (negative = short).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub qty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetBalance {
    pub free: f64,
    pub locked: f64,
}

/// Exchange-style account snapshot: per-asset free/locked amounts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BalanceSnapshot {
    pub balances: HashMap<String, AssetBalance>,
}

impl BalanceSnapshot {
    pub fn free(&self, asset: &str) -> f64 {
        self.balances.get(asset).map(|b| b.free).unwrap_or(0.0)
    }
}

/// What the account currently holds, in the shape the venue type natively
/// exposes. Broker venues report discrete position records; generic
/// exchanges report a balance snapshot. Callers branch on the variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Portfolio {
    Positions(Vec<Position>),
    Balances(BalanceSnapshot),
}

/// Row shape of the durable log store.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_request_carries_price() {
        let req = OrderRequest::limit("BTCUSDT", OrderSide::Buy, 0.5, 42_000.0);
        assert_eq!(req.order_type, OrderType::Limit);
        assert_eq!(req.price, Some(42_000.0));
        assert_eq!(req.time_in_force, "gtc");
    }

    #[test]
    fn test_market_request_has_no_price() {
        let req = OrderRequest::market("AAPL", OrderSide::Sell, 3.0).with_time_in_force("day");
        assert_eq!(req.order_type, OrderType::Market);
        assert_eq!(req.price, None);
        assert_eq!(req.time_in_force, "day");
    }

    #[test]
    fn test_balance_snapshot_free_lookup() {
        let mut snapshot = BalanceSnapshot::default();
        snapshot.balances.insert(
            "BTC".to_string(),
            AssetBalance {
                free: 1.5,
                locked: 0.25,
            },
        );

        assert_eq!(snapshot.free("BTC"), 1.5);
        assert_eq!(snapshot.free("ETH"), 0.0);
    }

    #[test]
    fn test_side_display() {
        assert_eq!(OrderSide::Buy.to_string(), "buy");
        assert_eq!(OrderSide::Sell.to_string(), "sell");
    }
}
