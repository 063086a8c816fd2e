//! Per-connection accumulation of telemetry between two reads.

mod aggregator;
mod sink;
mod state;

pub use aggregator::WorldStateAggregator;
pub use sink::TelemetrySink;
pub use state::WorldState;
