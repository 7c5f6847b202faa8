pub mod binance;
pub mod provider;
pub mod rate_limiter;

pub use provider::{FeedError, KlineProvider};
