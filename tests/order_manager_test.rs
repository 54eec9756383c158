use cryptokit::api::{BrokerClient, ExchangeClient};
use cryptokit::execution::{BrokerBackend, ExchangeBackend, OrderManager};
use cryptokit::models::{OrderRequest, OrderSide, Portfolio};
use cryptokit::Logger;
use mockito::Matcher;

async fn memory_logger() -> Logger {
    Logger::open("sqlite::memory:").await.unwrap()
}

fn broker_manager(server: &mockito::ServerGuard, logger: Logger) -> OrderManager {
    let client = BrokerClient::with_base_url("key".into(), "secret".into(), &server.url());
    OrderManager::from_backend(Box::new(BrokerBackend::new(client)), logger)
}

fn exchange_manager(server: &mockito::ServerGuard, logger: Logger) -> OrderManager {
    let client = ExchangeClient::with_base_url("key".into(), "secret".into(), &server.url());
    OrderManager::from_backend(Box::new(ExchangeBackend::new(client)), logger)
}

// ===== Backend A (broker) =====

#[tokio::test]
async fn test_broker_exit_position_sells_held_long() {
    let mut server = mockito::Server::new_async().await;

    let positions = server
        .mock("GET", "/v2/positions")
        .with_header("content-type", "application/json")
        .with_body(r#"[{"symbol": "AAPL", "qty": "2"}, {"symbol": "TSLA", "qty": "-1"}]"#)
        .create_async()
        .await;

    // Held qty 2 means a market sell of 2 closes the position.
    let order = server
        .mock("POST", "/v2/orders")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "symbol": "AAPL",
            "side": "sell",
            "type": "market",
            "qty": "2"
        })))
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id": "ord-1", "symbol": "AAPL", "side": "sell", "qty": "2", "status": "accepted"}"#,
        )
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = broker_manager(&server, logger.clone());

    let handle = manager.exit_position("AAPL").await.expect("order expected");
    assert_eq!(handle.id, "ord-1");
    assert_eq!(handle.side, Some(OrderSide::Sell));
    assert_eq!(handle.qty, Some(2.0));

    positions.assert_async().await;
    order.assert_async().await;

    let last = logger.last().await.unwrap().unwrap();
    assert_eq!(last.message, "Exited position in AAPL: ord-1");
}

#[tokio::test]
async fn test_broker_exit_position_without_match_is_logged_absence() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/v2/positions")
        .with_header("content-type", "application/json")
        .with_body(r#"[{"symbol": "TSLA", "qty": "5"}]"#)
        .create_async()
        .await;

    let no_order = server
        .mock("POST", "/v2/orders")
        .expect(0)
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = broker_manager(&server, logger.clone());

    assert!(manager.exit_position("AAPL").await.is_none());
    no_order.assert_async().await;

    let last = logger.last().await.unwrap().unwrap();
    assert_eq!(last.message, "No open position found for symbol: AAPL");
}

#[tokio::test]
async fn test_broker_open_orders_ignore_symbol_filter() {
    let mut server = mockito::Server::new_async().await;

    // The broker listing is account-wide; the symbol argument must not
    // change the request.
    let listing = server
        .mock("GET", "/v2/orders")
        .match_query(Matcher::UrlEncoded("status".into(), "open".into()))
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"id": "o1", "symbol": "AAPL", "side": "buy", "qty": "1", "status": "open"},
                {"id": "o2", "symbol": "TSLA", "side": "sell", "qty": "2", "status": "open"}
            ]"#,
        )
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = broker_manager(&server, logger);

    let orders = manager.fetch_open_orders(Some("AAPL")).await;
    assert_eq!(orders.len(), 2);
    listing.assert_async().await;
}

#[tokio::test]
async fn test_broker_cancel_and_modify() {
    let mut server = mockito::Server::new_async().await;

    let cancel = server
        .mock("DELETE", "/v2/orders/ord-9")
        .with_status(204)
        .create_async()
        .await;

    let replace = server
        .mock("PATCH", "/v2/orders/ord-9")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "qty": "3",
            "limit_price": "101.5"
        })))
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id": "ord-10", "symbol": "AAPL", "side": "buy", "qty": "3", "status": "replaced"}"#,
        )
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = broker_manager(&server, logger.clone());

    let result = manager.cancel_order("ord-9", None).await;
    assert!(result.is_some());
    cancel.assert_async().await;

    let modified = manager
        .modify_order("ord-9", Some(3.0), Some(101.5))
        .await
        .expect("replacement expected");
    assert_eq!(modified.id, "ord-10");
    replace.assert_async().await;

    let last = logger.last().await.unwrap().unwrap();
    assert_eq!(last.message, "Order modified: ord-10");
}

#[tokio::test]
async fn test_broker_positions_come_back_as_position_records() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/v2/positions")
        .with_header("content-type", "application/json")
        .with_body(r#"[{"symbol": "AAPL", "qty": "2"}]"#)
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = broker_manager(&server, logger);

    match manager.fetch_positions().await.expect("portfolio expected") {
        Portfolio::Positions(positions) => {
            assert_eq!(positions.len(), 1);
            assert_eq!(positions[0].symbol, "AAPL");
            assert_eq!(positions[0].qty, 2.0);
        }
        Portfolio::Balances(_) => panic!("broker backend must report positions"),
    }
}

#[tokio::test]
async fn test_broker_create_order_failure_is_logged_absence() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("POST", "/v2/orders")
        .with_status(403)
        .with_body(r#"{"message": "forbidden"}"#)
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = broker_manager(&server, logger.clone());

    let request = OrderRequest::limit("AAPL", OrderSide::Buy, 1.0, 100.0);
    assert!(manager.create_order(&request).await.is_none());

    let last = logger.last().await.unwrap().unwrap();
    assert!(last.message.starts_with("Error placing order:"), "got: {}", last.message);
}

// ===== Backend B (generic exchange) =====

#[tokio::test]
async fn test_exchange_exit_position_buys_back_negative_balance() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/api/v3/exchangeInfo")
        .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()))
        .with_header("content-type", "application/json")
        .with_body(r#"{"symbols": [{"symbol": "BTCUSDT", "baseAsset": "BTC"}]}"#)
        .create_async()
        .await;

    server
        .mock("GET", "/api/v3/account")
        .match_query(Matcher::Any)
        .with_header("content-type", "application/json")
        .with_body(r#"{"balances": [{"asset": "BTC", "free": "-3", "locked": "0"}]}"#)
        .create_async()
        .await;

    // Free balance of -3 closes with a market buy of 3.
    let order = server
        .mock("POST", "/api/v3/order")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            Matcher::UrlEncoded("side".into(), "BUY".into()),
            Matcher::UrlEncoded("type".into(), "MARKET".into()),
            Matcher::UrlEncoded("quantity".into(), "3".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(r#"{"orderId": 77, "symbol": "BTCUSDT", "side": "BUY", "origQty": "3", "status": "FILLED"}"#)
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = exchange_manager(&server, logger.clone());

    let handle = manager.exit_position("BTCUSDT").await.expect("order expected");
    assert_eq!(handle.id, "77");
    assert_eq!(handle.side, Some(OrderSide::Buy));
    assert_eq!(handle.qty, Some(3.0));
    order.assert_async().await;
}

#[tokio::test]
async fn test_exchange_exit_position_zero_balance_is_logged_absence() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/api/v3/exchangeInfo")
        .match_query(Matcher::Any)
        .with_header("content-type", "application/json")
        .with_body(r#"{"symbols": [{"symbol": "BTCUSDT", "baseAsset": "BTC"}]}"#)
        .create_async()
        .await;

    server
        .mock("GET", "/api/v3/account")
        .match_query(Matcher::Any)
        .with_header("content-type", "application/json")
        .with_body(r#"{"balances": [{"asset": "ETH", "free": "1", "locked": "0"}]}"#)
        .create_async()
        .await;

    let no_order = server
        .mock("POST", "/api/v3/order")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = exchange_manager(&server, logger.clone());

    assert!(manager.exit_position("BTCUSDT").await.is_none());
    no_order.assert_async().await;

    let last = logger.last().await.unwrap().unwrap();
    assert_eq!(last.message, "No open position found for symbol: BTCUSDT");
}

#[tokio::test]
async fn test_exchange_limit_order_carries_price_and_tif() {
    let mut server = mockito::Server::new_async().await;

    let order = server
        .mock("POST", "/api/v3/order")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            Matcher::UrlEncoded("side".into(), "BUY".into()),
            Matcher::UrlEncoded("type".into(), "LIMIT".into()),
            Matcher::UrlEncoded("quantity".into(), "0.5".into()),
            Matcher::UrlEncoded("price".into(), "42000".into()),
            Matcher::UrlEncoded("timeInForce".into(), "GTC".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(r#"{"orderId": 5, "symbol": "BTCUSDT", "side": "BUY", "origQty": "0.5", "status": "NEW"}"#)
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = exchange_manager(&server, logger);

    let request = OrderRequest::limit("BTCUSDT", OrderSide::Buy, 0.5, 42_000.0);
    let handle = manager.create_order(&request).await.expect("order expected");
    assert_eq!(handle.id, "5");
    assert_eq!(handle.status, "NEW");
    order.assert_async().await;
}

#[tokio::test]
async fn test_exchange_open_orders_filter_by_symbol() {
    let mut server = mockito::Server::new_async().await;

    let listing = server
        .mock("GET", "/api/v3/openOrders")
        .match_query(Matcher::UrlEncoded("symbol".into(), "ETHUSDT".into()))
        .with_header("content-type", "application/json")
        .with_body(r#"[{"orderId": 9, "symbol": "ETHUSDT", "side": "SELL", "origQty": "1", "status": "NEW"}]"#)
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = exchange_manager(&server, logger);

    let orders = manager.fetch_open_orders(Some("ETHUSDT")).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].symbol, "ETHUSDT");
    listing.assert_async().await;
}

#[tokio::test]
async fn test_exchange_positions_come_back_as_balances() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/api/v3/account")
        .match_query(Matcher::Any)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"balances": [
                {"asset": "BTC", "free": "0.7", "locked": "0.1"},
                {"asset": "USDT", "free": "1500", "locked": "0"}
            ]}"#,
        )
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = exchange_manager(&server, logger);

    match manager.fetch_positions().await.expect("portfolio expected") {
        Portfolio::Balances(snapshot) => {
            assert_eq!(snapshot.free("BTC"), 0.7);
            assert_eq!(snapshot.free("USDT"), 1500.0);
        }
        Portfolio::Positions(_) => panic!("exchange backend must report balances"),
    }
}

#[tokio::test]
async fn test_exchange_cancel_requires_and_uses_symbol() {
    let mut server = mockito::Server::new_async().await;

    let cancel = server
        .mock("DELETE", "/api/v3/order")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            Matcher::UrlEncoded("orderId".into(), "31".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(r#"{"orderId": 31, "symbol": "BTCUSDT", "status": "CANCELED"}"#)
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = exchange_manager(&server, logger.clone());

    let result = manager.cancel_order("31", Some("BTCUSDT")).await;
    assert!(result.is_some());
    cancel.assert_async().await;

    let last = logger.last().await.unwrap().unwrap();
    assert_eq!(last.message, "Order 31 canceled.");
}

#[tokio::test]
async fn test_exchange_order_status_relay() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/api/v3/order")
        .match_query(Matcher::UrlEncoded("orderId".into(), "12".into()))
        .with_header("content-type", "application/json")
        .with_body(r#"{"orderId": 12, "symbol": "BTCUSDT", "side": "BUY", "origQty": "1", "status": "PARTIALLY_FILLED"}"#)
        .create_async()
        .await;

    let logger = memory_logger().await;
    let manager = exchange_manager(&server, logger.clone());

    let handle = manager.fetch_order_status("12").await.expect("order expected");
    assert_eq!(handle.status, "PARTIALLY_FILLED");

    let last = logger.last().await.unwrap().unwrap();
    assert_eq!(last.message, "Order status for 12: PARTIALLY_FILLED");
}
