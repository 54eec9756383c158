pub mod broker;
pub mod exchange;

pub use broker::BrokerClient;
pub use exchange::ExchangeClient;
