use crate::models::{OrderHandle, OrderRequest, OrderSide, OrderType, Position};
use crate::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const PAPER_API_BASE: &str = "https://paper-api.alpaca.markets";

/// REST client for the broker-style venue (Alpaca-shaped API).
///
/// Exposes discrete position records and in-place order replacement, which
/// the generic exchange venue type does not.
#[derive(Clone)]
pub struct BrokerClient {
    client: Client,
    base_url: String,
    key: String,
    secret: String,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct PositionRaw {
    symbol: String,
    qty: String,
}

// ============== Implementation ==============

impl BrokerClient {
    pub fn new(key: String, secret: String) -> Self {
        Self::with_base_url(key, secret, PAPER_API_BASE)
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

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("APCA-API-KEY-ID", &self.key)
            .header("APCA-API-SECRET-KEY", &self.secret)
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Venue(format!("Broker API error ({}): {}", status, body)));
        }
        Ok(response)
    }

    /// Submit an order.
    /// Endpoint: POST /v2/orders
    pub async fn submit_order(&self, request: &OrderRequest) -> Result<OrderHandle> {
        let mut body = json!({
            "symbol": request.symbol,
            "qty": request.qty.to_string(),
            "side": request.side.to_string(),
            "type": match request.order_type {
                OrderType::Limit => "limit",
                OrderType::Market => "market",
            },
            "time_in_force": request.time_in_force,
            "client_order_id": uuid::Uuid::new_v4().to_string(),
        });
        if request.order_type == OrderType::Limit {
            if let Some(price) = request.price {
                body["limit_price"] = json!(price.to_string());
            }
        }

        let response = self
            .request(reqwest::Method::POST, "/v2/orders")
            .json(&body)
            .send()
            .await?;
        let raw: serde_json::Value = self.check(response).await?.json().await?;
        Ok(order_from_value(raw))
    }

    /// All open orders, account-wide. The broker venue has no per-symbol
    /// filter on this listing.
    /// Endpoint: GET /v2/orders?status=open
    pub async fn list_open_orders(&self) -> Result<Vec<OrderHandle>> {
        let response = self
            .request(reqwest::Method::GET, "/v2/orders?status=open")
            .send()
            .await?;
        let raw: Vec<serde_json::Value> = self.check(response).await?.json().await?;
        Ok(raw.into_iter().map(order_from_value).collect())
    }

    /// Endpoint: GET /v2/orders/{id}
    pub async fn get_order(&self, order_id: &str) -> Result<OrderHandle> {
        let response = self
            .request(reqwest::Method::GET, &format!("/v2/orders/{}", order_id))
            .send()
            .await?;
        let raw: serde_json::Value = self.check(response).await?.json().await?;
        Ok(order_from_value(raw))
    }

    /// Endpoint: DELETE /v2/orders/{id} (204 on success)
    pub async fn cancel_order(&self, order_id: &str) -> Result<serde_json::Value> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/v2/orders/{}", order_id))
            .send()
            .await?;
        let response = self.check(response).await?;
        let text = response.text().await?;
        if text.is_empty() {
            Ok(json!({ "id": order_id, "status": "canceled" }))
        } else {
            Ok(serde_json::from_str(&text)?)
        }
    }

    /// Replace quantity/limit price of a live order in place.
    /// Endpoint: PATCH /v2/orders/{id}
    pub async fn replace_order(
        &self,
        order_id: &str,
        qty: Option<f64>,
        price: Option<f64>,
    ) -> Result<OrderHandle> {
        let mut body = json!({});
        if let Some(qty) = qty {
            body["qty"] = json!(qty.to_string());
        }
        if let Some(price) = price {
            body["limit_price"] = json!(price.to_string());
        }

        let response = self
            .request(reqwest::Method::PATCH, &format!("/v2/orders/{}", order_id))
            .json(&body)
            .send()
            .await?;
        let raw: serde_json::Value = self.check(response).await?.json().await?;
        Ok(order_from_value(raw))
    }

    /// Open positions as (symbol, signed qty) records.
    /// Endpoint: GET /v2/positions
    pub async fn list_positions(&self) -> Result<Vec<Position>> {
        let response = self.request(reqwest::Method::GET, "/v2/positions").send().await?;
        let raw: Vec<PositionRaw> = self.check(response).await?.json().await?;

        Ok(raw
            .into_iter()
            .map(|p| Position {
                symbol: p.symbol,
                qty: p.qty.parse::<f64>().unwrap_or(0.0),
            })
            .collect())
    }
}

/// Map the broker's order payload onto the normalized handle, keeping the
/// original payload in `raw`.
fn order_from_value(raw: serde_json::Value) -> OrderHandle {
    let id = raw["id"].as_str().unwrap_or_default().to_string();
    let symbol = raw["symbol"].as_str().unwrap_or_default().to_string();
    let side = match raw["side"].as_str() {
        Some("buy") => Some(OrderSide::Buy),
        Some("sell") => Some(OrderSide::Sell),
        _ => None,
    };
    let qty = raw["qty"].as_str().and_then(|q| q.parse::<f64>().ok());
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
