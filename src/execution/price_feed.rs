use crate::api::ExchangeClient;
use crate::logger::Logger;
use crate::models::PricePoint;
use tokio::sync::watch;
use tokio::time::Duration;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Polls the exchange for the last trade price of each configured symbol.
pub struct PriceFeed {
    exchange: ExchangeClient,
    logger: Logger,
    symbols: Vec<String>,
    interval: Duration,
}

impl PriceFeed {
    pub fn new(exchange: ExchangeClient, symbols: Vec<String>, logger: Logger) -> Self {
        Self {
            exchange,
            logger,
            symbols,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval. Tests inject a short one.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Latest trade price for `symbol`. A fetch failure is logged and
    /// surfaces as an absent result, never as an error.
    pub async fn fetch_price(&self, symbol: &str) -> Option<PricePoint> {
        match self.exchange.ticker_price(symbol).await {
            Ok(price) => {
                self.logger
                    .log(&format!("Live price of {}: {}", symbol, price))
                    .await;
                Some(PricePoint {
                    symbol: symbol.to_string(),
                    price,
                })
            }
            Err(e) => {
                self.logger
                    .log(&format!("Error fetching live price for {}: {}", symbol, e))
                    .await;
                None
            }
        }
    }

    /// Poll every symbol in order, sleep, repeat. A failed iteration is
    /// logged and the loop continues. Stops when `shutdown` flips to true or
    /// its sender is dropped.
    pub async fn listen(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            for symbol in &self.symbols {
                if let Some(point) = self.fetch_price(symbol).await {
                    println!("Price of {}: {}", point.symbol, point.price);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Price listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_logger() -> Logger {
        Logger::open("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_fetch_price_failure_is_logged_absence() {
        let logger = memory_logger().await;
        let exchange = ExchangeClient::public_with_base_url("http://127.0.0.1:1");
        let feed = PriceFeed::new(exchange, vec!["BTCUSDT".to_string()], logger.clone());

        assert!(feed.fetch_price("BTCUSDT").await.is_none());

        let last = logger.last().await.unwrap().unwrap();
        assert!(last.message.contains("Error fetching live price for BTCUSDT"));
    }

    #[tokio::test]
    async fn test_listen_stops_on_shutdown_signal() {
        let logger = memory_logger().await;
        let exchange = ExchangeClient::public_with_base_url("http://127.0.0.1:1");
        let feed = PriceFeed::new(exchange, vec!["BTCUSDT".to_string()], logger)
            .with_interval(Duration::from_millis(10));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { feed.listen(rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener did not stop after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_listen_stops_when_sender_dropped() {
        let logger = memory_logger().await;
        let exchange = ExchangeClient::public_with_base_url("http://127.0.0.1:1");
        let feed = PriceFeed::new(exchange, vec![], logger).with_interval(Duration::from_secs(60));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { feed.listen(rx).await });
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener did not stop after sender drop")
            .unwrap();
    }
}
