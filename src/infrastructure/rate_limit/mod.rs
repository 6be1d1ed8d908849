//! Rate limiting infrastructure
//!
//! Counter stores (in-memory, Redis, PostgreSQL) and the limiter that
//! applies windows and the failure policy on top of them.

mod in_memory;
mod limiter;
mod postgres;
mod redis;

pub use in_memory::InMemoryRateLimitStore;
pub use limiter::{RateLimiter, DEFAULT_WINDOW};
pub use postgres::PostgresRateLimitStore;
pub use redis::RedisRateLimitStore;
