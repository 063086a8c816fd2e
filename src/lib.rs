pub mod config;
pub mod connection;
pub mod rendezvous;
pub mod retention;
pub mod telemetry;
pub mod world;

#[cfg(feature = "python")]
mod python;

pub use config::{ConfigError, RendezvousConfig};
pub use connection::{AgentConnection, ConnectionError, Scenario};
pub use rendezvous::{CancelToken, Rendezvous, RendezvousError, Session};
pub use retention::{RetentionPolicy, TelemetryPolicies};
pub use telemetry::TelemetryEvent;
pub use world::{WorldState, WorldStateAggregator};
