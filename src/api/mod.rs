pub mod client;
pub mod error;
pub mod rate_limiter;
pub mod rest;

pub use client::{
    AccountScope, ChangeFeed, ChangeKind, FetchTradesRequest, JournalBackend, RateLimitConfig,
    TradeChange,
};
pub use error::BackendError;
pub use rate_limiter::RateLimiter;
