use crate::models::{AssetBalance, BalanceSnapshot, OrderHandle, OrderRequest, OrderSide, OrderType};
use crate::{Error, Result};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

const EXCHANGE_API_BASE: &str = "https://api.binance.com";

/// REST client for the generic exchange-style venue (Binance-shaped API).
///
/// Account state is a balance snapshot rather than position records, and the
/// venue type has no order-replace endpoint. Market-data endpoints (ticker,
/// klines, exchange info) are public; account/order endpoints are signed
/// with HMAC-SHA256 over the query string.
#[derive(Clone)]
pub struct ExchangeClient {
    client: Client,
    base_url: String,
    key: String,
    secret: String,
}

/// One kline page entry, millisecond-epoch timestamped.
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct PriceTicker {
    price: String,
}

#[derive(Debug, Deserialize)]
struct AccountRaw {
    balances: Vec<BalanceRaw>,
}

#[derive(Debug, Deserialize)]
struct BalanceRaw {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoRaw {
    symbols: Vec<SymbolInfoRaw>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfoRaw {
    symbol: String,
    base_asset: String,
}

// ============== Implementation ==============

impl ExchangeClient {
    pub fn new(key: String, secret: String) -> Self {
        Self::with_base_url(key, secret, EXCHANGE_API_BASE)
    }

    /// Point the client at a different host. Tests use this with a mock server.
    pub fn with_base_url(key: String, secret: String, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
            secret,
        }
    }

    /// Credential-less client for public market data only.
    pub fn public() -> Self {
        Self::new(String::new(), String::new())
    }

    pub fn public_with_base_url(base_url: &str) -> Self {
        Self::with_base_url(String::new(), String::new(), base_url)
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn sign(&self, query: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn check(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Venue(format!(
                "Exchange API error ({}): {}",
                status, body
            )));
        }
        Ok(body)
    }

    async fn signed_request(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &str,
    ) -> Result<String> {
        let ts = Self::timestamp_ms();
        let query = if params.is_empty() {
            format!("timestamp={}", ts)
        } else {
            format!("{}&timestamp={}", params, ts)
        };
        let signature = self.sign(&query);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.key)
            .send()
            .await?;
        self.check(response).await
    }

    /// Place a limit or market order.
    /// Endpoint: POST /api/v3/order (signed)
    pub async fn create_order(&self, request: &OrderRequest) -> Result<OrderHandle> {
        let side = match request.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let mut params = format!(
            "symbol={}&side={}&type={}&quantity={}",
            request.symbol,
            side,
            match request.order_type {
                OrderType::Limit => "LIMIT",
                OrderType::Market => "MARKET",
            },
            request.qty
        );
        if request.order_type == OrderType::Limit {
            if let Some(price) = request.price {
                params.push_str(&format!(
                    "&price={}&timeInForce={}",
                    price,
                    request.time_in_force.to_uppercase()
                ));
            }
        }

        let body = self.signed_request(reqwest::Method::POST, "/api/v3/order", &params).await?;
        let raw: serde_json::Value = serde_json::from_str(&body)?;
        Ok(order_from_value(raw))
    }

    /// Open orders, optionally filtered to one symbol.
    /// Endpoint: GET /api/v3/openOrders (signed)
    pub async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderHandle>> {
        let params = match symbol {
            Some(s) => format!("symbol={}", s),
            None => String::new(),
        };
        let body = self
            .signed_request(reqwest::Method::GET, "/api/v3/openOrders", &params)
            .await?;
        let raw: Vec<serde_json::Value> = serde_json::from_str(&body)?;
        Ok(raw.into_iter().map(order_from_value).collect())
    }

    /// Cancel by id. The venue requires the symbol alongside the order id.
    /// Endpoint: DELETE /api/v3/order (signed)
    pub async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<serde_json::Value> {
        let params = format!("symbol={}&orderId={}", symbol, order_id);
        let body = self
            .signed_request(reqwest::Method::DELETE, "/api/v3/order", &params)
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Current state of one order.
    /// Endpoint: GET /api/v3/order (signed)
    pub async fn get_order(&self, order_id: &str, symbol: Option<&str>) -> Result<OrderHandle> {
        let params = match symbol {
            Some(s) => format!("symbol={}&orderId={}", s, order_id),
            None => format!("orderId={}", order_id),
        };
        let body = self.signed_request(reqwest::Method::GET, "/api/v3/order", &params).await?;
        let raw: serde_json::Value = serde_json::from_str(&body)?;
        Ok(order_from_value(raw))
    }

    /// Per-asset free/locked balances for the account.
    /// Endpoint: GET /api/v3/account (signed)
    pub async fn account_balances(&self) -> Result<BalanceSnapshot> {
        let body = self.signed_request(reqwest::Method::GET, "/api/v3/account", "").await?;
        let account: AccountRaw = serde_json::from_str(&body)?;

        let mut snapshot = BalanceSnapshot::default();
        for b in account.balances {
            snapshot.balances.insert(
                b.asset,
                AssetBalance {
                    free: b.free.parse::<f64>().unwrap_or(0.0),
                    locked: b.locked.parse::<f64>().unwrap_or(0.0),
                },
            );
        }
        Ok(snapshot)
    }

    /// Latest trade price for a symbol.
    /// Endpoint: GET /api/v3/ticker/price (public)
    pub async fn ticker_price(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol);
        let response = self.client.get(&url).send().await?;
        let body = self.check(response).await?;
        let ticker: PriceTicker = serde_json::from_str(&body)?;

        ticker
            .price
            .parse::<f64>()
            .map_err(|e| Error::Venue(format!("Unparseable ticker price: {}", e)))
    }

    /// One page of candles starting at `start_ms`, ascending.
    /// Endpoint: GET /api/v3/klines (public)
    pub async fn klines(&self, symbol: &str, interval: &str, start_ms: i64) -> Result<Vec<Kline>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&startTime={}",
            self.base_url, symbol, interval, start_ms
        );
        let response = self.client.get(&url).send().await?;
        let body = self.check(response).await?;
        let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(&body)?;

        let mut page = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() < 6 {
                return Err(Error::Venue(format!(
                    "Malformed kline row with {} fields",
                    row.len()
                )));
            }
            page.push(Kline {
                ts_ms: row[0].as_i64().unwrap_or(0),
                open: value_to_f64(&row[1]),
                high: value_to_f64(&row[2]),
                low: value_to_f64(&row[3]),
                close: value_to_f64(&row[4]),
                volume: value_to_f64(&row[5]),
            });
        }
        Ok(page)
    }

    /// Base asset of a trading pair (e.g. "BTC" for BTCUSDT).
    /// Endpoint: GET /api/v3/exchangeInfo (public)
    pub async fn base_asset(&self, symbol: &str) -> Result<String> {
        let url = format!("{}/api/v3/exchangeInfo?symbol={}", self.base_url, symbol);
        let response = self.client.get(&url).send().await?;
        let body = self.check(response).await?;
        let info: ExchangeInfoRaw = serde_json::from_str(&body)?;

        info.symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .map(|s| s.base_asset)
            .ok_or_else(|| Error::Venue(format!("Unknown symbol: {}", symbol)))
    }
}

/// Klines carry prices as strings; some venues return plain numbers.
fn value_to_f64(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::String(s) => s.parse::<f64>().unwrap_or(0.0),
        other => other.as_f64().unwrap_or(0.0),
    }
}

/// Map the exchange's order payload onto the normalized handle, keeping the
/// original payload in `raw`.
fn order_from_value(raw: serde_json::Value) -> OrderHandle {
    let id = if raw["orderId"].is_number() {
        raw["orderId"].to_string()
    } else {
        raw["orderId"].as_str().unwrap_or_default().to_string()
    };
    let symbol = raw["symbol"].as_str().unwrap_or_default().to_string();
    let side = match raw["side"].as_str() {
        Some("BUY") => Some(OrderSide::Buy),
        Some("SELL") => Some(OrderSide::Sell),
        _ => None,
    };
    let qty = raw["origQty"].as_str().and_then(|q| q.parse::<f64>().ok());
    let status = raw["status"].as_str().unwrap_or_default().to_string();

    OrderHandle {
        id,
        symbol,
        side,
        qty,
        status,
        raw,
    }
}
