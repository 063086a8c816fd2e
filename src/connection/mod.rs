//! The boundary to one remote participant.
//!
//! The wire protocol lives behind [`AgentConnection`]; the host only needs to
//! start a participant, send it commands and read what it delivered into its
//! [`WorldStateAggregator`](crate::world::WorldStateAggregator).

mod errors;
pub mod scripted;
mod traits;
mod types;

pub use errors::ConnectionError;
pub use scripted::ScriptedConnection;
pub use traits::AgentConnection;
pub use types::{
    ClientInfo, ClientPool, DEFAULT_CLIENT_CONTROL_PORT, ExperimentId, RecordSpec, Role,
    Scenario, StartRequest,
};
