use crate::api::{BrokerClient, ExchangeClient};
use crate::logger::Logger;
use crate::models::{
    Credential, OrderHandle, OrderRequest, OrderSide, OrderType, Portfolio,
};
use crate::{Error, Result};
use async_trait::async_trait;

/// Which of the two venue contracts an order manager routes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Broker-style: discrete position records, order replace supported.
    Broker,
    /// Generic exchange-style: balance snapshots, no order replace.
    Exchange,
}

/// The operations a trading venue must support, at the level the order
/// manager needs. One implementation per venue contract; the manager holds a
/// `dyn TradingBackend` chosen once at construction.
#[async_trait]
pub trait TradingBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderHandle>;

    /// Open orders. Broker venues list account-wide and ignore the filter;
    /// exchange venues apply it when given.
    async fn fetch_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderHandle>>;

    async fn cancel_order(&self, order_id: &str, symbol: Option<&str>)
        -> Result<serde_json::Value>;

    async fn fetch_order_status(&self, order_id: &str) -> Result<OrderHandle>;

    async fn fetch_positions(&self) -> Result<Portfolio>;

    /// Close whatever the venue considers the position in `symbol` with a
    /// market order. `Ok(None)` means nothing is held.
    async fn exit_position(&self, symbol: &str) -> Result<Option<OrderHandle>>;

    /// Replace quantity/price in place. `Ok(None)` means the venue type has
    /// no replace capability.
    async fn modify_order(
        &self,
        order_id: &str,
        qty: Option<f64>,
        price: Option<f64>,
    ) -> Result<Option<OrderHandle>>;
}

// ============== Backend A: broker ==============

pub struct BrokerBackend {
    client: BrokerClient,
}

impl BrokerBackend {
    pub fn new(client: BrokerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TradingBackend for BrokerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Broker
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderHandle> {
        self.client.submit_order(request).await
    }

    async fn fetch_open_orders(&self, _symbol: Option<&str>) -> Result<Vec<OrderHandle>> {
        self.client.list_open_orders().await
    }

    async fn cancel_order(
        &self,
        order_id: &str,
        _symbol: Option<&str>,
    ) -> Result<serde_json::Value> {
        self.client.cancel_order(order_id).await
    }

    async fn fetch_order_status(&self, order_id: &str) -> Result<OrderHandle> {
        self.client.get_order(order_id).await
    }

    async fn fetch_positions(&self) -> Result<Portfolio> {
        Ok(Portfolio::Positions(self.client.list_positions().await?))
    }

    async fn exit_position(&self, symbol: &str) -> Result<Option<OrderHandle>> {
        let positions = self.client.list_positions().await?;
        let held = positions
            .into_iter()
            .find(|p| p.symbol == symbol && p.qty != 0.0);

        let Some(position) = held else {
            return Ok(None);
        };

        // Closing side is the inverse of the held quantity's sign.
        let side = if position.qty > 0.0 {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        tracing::debug!(
            symbol = %symbol,
            qty = position.qty,
            side = %side,
            "Closing broker position"
        );

        let request = OrderRequest::market(symbol, side, position.qty.abs());
        Ok(Some(self.client.submit_order(&request).await?))
    }

    async fn modify_order(
        &self,
        order_id: &str,
        qty: Option<f64>,
        price: Option<f64>,
    ) -> Result<Option<OrderHandle>> {
        Ok(Some(self.client.replace_order(order_id, qty, price).await?))
    }
}

// ============== Backend B: generic exchange ==============

pub struct ExchangeBackend {
    client: ExchangeClient,
}

impl ExchangeBackend {
    pub fn new(client: ExchangeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TradingBackend for ExchangeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Exchange
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderHandle> {
        self.client.create_order(request).await
    }

    async fn fetch_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderHandle>> {
        self.client.open_orders(symbol).await
    }

    async fn cancel_order(
        &self,
        order_id: &str,
        symbol: Option<&str>,
    ) -> Result<serde_json::Value> {
        let symbol = symbol.ok_or_else(|| {
            Error::InvalidOrder("cancellation on this venue requires a symbol".to_string())
        })?;
        self.client.cancel_order(order_id, symbol).await
    }

    async fn fetch_order_status(&self, order_id: &str) -> Result<OrderHandle> {
        self.client.get_order(order_id, None).await
    }

    async fn fetch_positions(&self) -> Result<Portfolio> {
        Ok(Portfolio::Balances(self.client.account_balances().await?))
    }

    async fn exit_position(&self, symbol: &str) -> Result<Option<OrderHandle>> {
        // "Position" on this venue type is the free balance of the pair's
        // base asset, not a discrete record.
        let base = self.client.base_asset(symbol).await?;
        let balances = self.client.account_balances().await?;
        let free = balances.free(&base);

        if free == 0.0 {
            return Ok(None);
        }

        let side = if free > 0.0 {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        tracing::debug!(symbol = %symbol, base = %base, free, side = %side, "Closing exchange balance");

        let request = OrderRequest::market(symbol, side, free.abs());
        Ok(Some(self.client.create_order(&request).await?))
    }

    async fn modify_order(
        &self,
        _order_id: &str,
        _qty: Option<f64>,
        _price: Option<f64>,
    ) -> Result<Option<OrderHandle>> {
        // Capability gap of the venue type, not an error.
        Ok(None)
    }
}

// ============== The facade ==============

/// Unified order management over one venue connection.
///
/// Every operation wraps its backend call in the same failure boundary: a
/// backend error is logged and converted to an explicit absent result, never
/// propagated. Backend selection happens once, at construction, and is fixed
/// for the manager's lifetime.
pub struct OrderManager {
    backend: Box<dyn TradingBackend>,
    logger: Logger,
}

impl OrderManager {
    /// Bind a manager to the venue identified by `backend_id`. `"alpaca"`
    /// selects the broker contract; any other id selects the generic
    /// exchange contract.
    pub fn connect(backend_id: &str, credential: &Credential, logger: Logger) -> Self {
        let backend: Box<dyn TradingBackend> = if backend_id.eq_ignore_ascii_case("alpaca") {
            Box::new(BrokerBackend::new(BrokerClient::new(
                credential.key.clone(),
                credential.secret.clone(),
            )))
        } else {
            Box::new(ExchangeBackend::new(ExchangeClient::new(
                credential.key.clone(),
                credential.secret.clone(),
            )))
        };
        Self { backend, logger }
    }

    /// Bind to an already-built backend. Tests use this to point the manager
    /// at a mock server.
    pub fn from_backend(backend: Box<dyn TradingBackend>, logger: Logger) -> Self {
        Self { backend, logger }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Place an order on the venue. A limit request without a price is
    /// rejected here, before any network call, with the same logged-absence
    /// contract as every other failure.
    pub async fn create_order(&self, request: &OrderRequest) -> Option<OrderHandle> {
        if request.order_type == OrderType::Limit && request.price.is_none() {
            self.logger
                .log(&format!(
                    "Error placing order: limit order for {} has no limit price",
                    request.symbol
                ))
                .await;
            return None;
        }

        match self.backend.create_order(request).await {
            Ok(order) => {
                self.logger
                    .log(&format!("Order placed: {} {}", order.id, order.status))
                    .await;
                Some(order)
            }
            Err(e) => {
                self.logger.log(&format!("Error placing order: {}", e)).await;
                None
            }
        }
    }

    /// Open orders, empty on failure. The broker contract lists account-wide
    /// and ignores `symbol`; the exchange contract filters by it.
    pub async fn fetch_open_orders(&self, symbol: Option<&str>) -> Vec<OrderHandle> {
        match self.backend.fetch_open_orders(symbol).await {
            Ok(orders) => {
                self.logger
                    .log(&format!("Open orders: {} order(s)", orders.len()))
                    .await;
                orders
            }
            Err(e) => {
                self.logger
                    .log(&format!("Error fetching open orders: {}", e))
                    .await;
                Vec::new()
            }
        }
    }

    pub async fn cancel_order(
        &self,
        order_id: &str,
        symbol: Option<&str>,
    ) -> Option<serde_json::Value> {
        match self.backend.cancel_order(order_id, symbol).await {
            Ok(result) => {
                self.logger
                    .log(&format!("Order {} canceled.", order_id))
                    .await;
                Some(result)
            }
            Err(e) => {
                self.logger
                    .log(&format!("Error canceling order: {}", e))
                    .await;
                None
            }
        }
    }

    pub async fn fetch_order_status(&self, order_id: &str) -> Option<OrderHandle> {
        match self.backend.fetch_order_status(order_id).await {
            Ok(order) => {
                self.logger
                    .log(&format!("Order status for {}: {}", order_id, order.status))
                    .await;
                Some(order)
            }
            Err(e) => {
                self.logger
                    .log(&format!("Error fetching order status: {}", e))
                    .await;
                None
            }
        }
    }

    /// Account holdings in the venue's native shape: position records from a
    /// broker, a balance snapshot from an exchange. Callers branch on the
    /// `Portfolio` variant.
    pub async fn fetch_positions(&self) -> Option<Portfolio> {
        match self.backend.fetch_positions().await {
            Ok(portfolio) => {
                let summary = match &portfolio {
                    Portfolio::Positions(p) => format!("{} position(s)", p.len()),
                    Portfolio::Balances(b) => format!("{} balance(s)", b.balances.len()),
                };
                self.logger
                    .log(&format!("Fetched positions: {}", summary))
                    .await;
                Some(portfolio)
            }
            Err(e) => {
                self.logger
                    .log(&format!("Error fetching positions: {}", e))
                    .await;
                None
            }
        }
    }

    /// Flatten the holding in `symbol` with a market order.
    pub async fn exit_position(&self, symbol: &str) -> Option<OrderHandle> {
        match self.backend.exit_position(symbol).await {
            Ok(Some(order)) => {
                self.logger
                    .log(&format!("Exited position in {}: {}", symbol, order.id))
                    .await;
                Some(order)
            }
            Ok(None) => {
                self.logger
                    .log(&format!("No open position found for symbol: {}", symbol))
                    .await;
                None
            }
            Err(e) => {
                self.logger
                    .log(&format!("Error exiting position for {}: {}", symbol, e))
                    .await;
                None
            }
        }
    }

    /// Replace quantity/price of a live order. Only the broker contract can;
    /// on an exchange venue this logs the capability gap and yields nothing.
    pub async fn modify_order(
        &self,
        order_id: &str,
        qty: Option<f64>,
        price: Option<f64>,
    ) -> Option<OrderHandle> {
        match self.backend.modify_order(order_id, qty, price).await {
            Ok(Some(order)) => {
                self.logger
                    .log(&format!("Order modified: {}", order.id))
                    .await;
                Some(order)
            }
            Ok(None) => {
                self.logger
                    .log("Order modification is not supported for generic exchange venues.")
                    .await;
                None
            }
            Err(e) => {
                self.logger
                    .log(&format!("Error modifying order {}: {}", order_id, e))
                    .await;
                None
            }
        }
    }
}
