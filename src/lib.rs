// Core modules
pub mod api;
pub mod credentials;
pub mod error;
pub mod execution;
pub mod history;
pub mod logger;
pub mod models;

// Re-export commonly used types
pub use api::*;
pub use credentials::{ConnectOutcome, CredentialStore};
pub use execution::{BackendKind, OrderManager, PriceFeed, TradingBackend};
pub use history::HistoryFetcher;
pub use logger::Logger;
pub use models::*;

// Error handling
pub use error::{Error, Result};
