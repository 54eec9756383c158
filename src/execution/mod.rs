// Order routing and price polling module
pub mod order_manager;
pub mod price_feed;

pub use order_manager::{
    BackendKind, BrokerBackend, ExchangeBackend, OrderManager, TradingBackend,
};
pub use price_feed::PriceFeed;
