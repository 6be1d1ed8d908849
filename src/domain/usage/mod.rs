//! Usage audit domain

mod entry;
mod sink;

pub use entry::UsageLogEntry;
pub use sink::UsageSink;
#[cfg(test)]
pub use sink::MockUsageSink;
