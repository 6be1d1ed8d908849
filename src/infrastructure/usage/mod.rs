//! Usage recording infrastructure

mod in_memory;
mod postgres;
mod recorder;

pub use in_memory::{InMemoryUsageSink, TracingUsageSink};
pub use postgres::PostgresUsageSink;
pub use recorder::{UsageRecorder, DEFAULT_CHANNEL_CAPACITY};
