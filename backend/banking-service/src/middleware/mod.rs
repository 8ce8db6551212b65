//! Request middleware shared by the API and socket scopes.

pub mod rate_limit;

pub use rate_limit::{
    rate_limit_key, InMemoryRateLimitStore, RateLimitDecision, RateLimitMiddleware, RateLimitStore,
    RateLimiter, RedisRateLimitStore,
};
