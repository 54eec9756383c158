use cryptokit::api::ExchangeClient;
use cryptokit::credentials::CredentialStore;
use cryptokit::logger::Logger;
use cryptokit::PriceFeed;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    tracing::info!("cryptokit starting");

    let logs_db = std::env::var("LOGS_DB").unwrap_or_else(|_| "logs.db".to_string());
    let credentials_file =
        std::env::var("CREDENTIALS_FILE").unwrap_or_else(|_| "credentials.json".to_string());
    let symbols: Vec<String> = std::env::var("WATCH_SYMBOLS")
        .unwrap_or_else(|_| "BTCUSDT,ETHUSDT".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let logger = Logger::open(&logs_db).await?;

    // Connect every backend named in the credential file. Misses are logged
    // per name; a partial batch still starts the listener.
    match CredentialStore::load(&credentials_file) {
        Ok(store) => {
            let names: Vec<&str> = store.names().collect();
            let outcomes = store.connect(&names, &logger).await;
            let connected = outcomes.iter().filter(|(_, o)| o.is_connected()).count();
            tracing::info!("{}/{} backends connected", connected, outcomes.len());
        }
        Err(e) => {
            logger
                .log(&format!(
                    "Could not load credentials from {}: {}",
                    credentials_file, e
                ))
                .await;
        }
    }

    // Price polling runs until ctrl-c.
    let feed = PriceFeed::new(ExchangeClient::public(), symbols, logger);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = tokio::spawn(async move { feed.listen(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    shutdown_tx.send(true).ok();
    listener.await?;

    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cryptokit=info".into()),
        )
        .init();
}
