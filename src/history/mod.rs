use crate::api::ExchangeClient;
use crate::logger::Logger;
use crate::models::Candle;
use crate::Result;
use chrono::{DateTime, Utc};

/// Hard cap on pagination rounds. A venue would need a multi-year range at
/// one-minute granularity to hit this legitimately.
const MAX_PAGES: usize = 10_000;

/// Paginates an exchange's candle API over `[start, end)` into one flat
/// ascending sequence of OHLCV records.
pub struct HistoryFetcher {
    exchange: ExchangeClient,
    logger: Logger,
}

impl HistoryFetcher {
    pub fn new(exchange: ExchangeClient, logger: Logger) -> Self {
        Self { exchange, logger }
    }

    /// All candles for `symbol` in `[start, end)` at the venue's `timeframe`
    /// granularity. Any backend error is logged and yields an empty sequence;
    /// partial progress is discarded.
    pub async fn fetch_historical(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Candle> {
        match self.paginate(symbol, timeframe, start, end).await {
            Ok(candles) => candles,
            Err(e) => {
                self.logger
                    .log(&format!(
                        "Error fetching historical data for {}: {}",
                        symbol, e
                    ))
                    .await;
                Vec::new()
            }
        }
    }

    async fn paginate(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let start_ms = start.timestamp_millis();
        let end_ms = end.timestamp_millis();

        let mut all = Vec::new();
        let mut cursor = start_ms;
        let mut pages = 0usize;

        while cursor < end_ms {
            if pages >= MAX_PAGES {
                self.logger
                    .log(&format!(
                        "Pagination cap reached for {} after {} pages; returning what was fetched",
                        symbol, pages
                    ))
                    .await;
                break;
            }
            pages += 1;

            let page = self.exchange.klines(symbol, timeframe, cursor).await?;
            let Some(last_ts) = page.last().map(|k| k.ts_ms) else {
                break;
            };

            // Stall guard: a page that does not reach the cursor can never
            // advance it, and a misbehaving paginator would loop forever.
            if last_ts < cursor {
                self.logger
                    .log(&format!(
                        "Pagination stalled for {} at timestamp {}; stopping",
                        symbol, last_ts
                    ))
                    .await;
                break;
            }

            self.logger
                .log(&format!(
                    "Fetched batch of historical data for {} with timeframe {}.",
                    symbol, timeframe
                ))
                .await;
            all.extend(page);

            if last_ts >= end_ms {
                break;
            }
            cursor = last_ts + 1;
        }

        Ok(all
            .into_iter()
            .filter(|k| k.ts_ms < end_ms)
            .filter_map(|k| {
                DateTime::<Utc>::from_timestamp_millis(k.ts_ms).map(|timestamp| Candle {
                    timestamp,
                    open: k.open,
                    high: k.high,
                    low: k.low,
                    close: k.close,
                    volume: k.volume,
                })
            })
            .collect())
    }
}
