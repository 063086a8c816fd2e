mod cancel;
mod coordinator;
mod errors;
mod session;
mod state;

use std::sync::Arc;
use std::time::Duration;

pub use cancel::CancelToken;
pub use coordinator::Rendezvous;
pub use errors::{ErrorReport, RendezvousError, StartFailure};
pub use session::Session;
pub use state::{MissionAttempt, Phase};

use crate::config::RendezvousConfig;
use crate::connection::{AgentConnection, ClientPool, ExperimentId, RecordSpec, Scenario};

const SINGLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Starts one connection on localhost, allowing `max_attempts` start attempts.
pub async fn start_single(
    max_attempts: u32,
    connection: Arc<dyn AgentConnection>,
    scenario: &Scenario,
    record: &RecordSpec,
) -> Result<Session, RendezvousError> {
    let config = RendezvousConfig::default()
        .with_max_attempts(max_attempts)
        .with_poll_interval(SINGLE_POLL_INTERVAL);
    Rendezvous::new(config)?
        .start_single(connection, scenario, record)
        .await
}

/// Starts every connection under `experiment_id` and waits until all have
/// begun, allowing `max_attempts` start attempts per connection.
pub async fn start_multi(
    max_attempts: u32,
    connections: Vec<Arc<dyn AgentConnection>>,
    scenario: &Scenario,
    client_pool: &ClientPool,
    record: &RecordSpec,
    experiment_id: &ExperimentId,
) -> Result<Session, RendezvousError> {
    let config = RendezvousConfig::default().with_max_attempts(max_attempts);
    Rendezvous::new(config)?
        .start_multi(connections, scenario, client_pool, record, experiment_id)
        .await
}
