use async_trait::async_trait;

use super::errors::ConnectionError;
use super::types::StartRequest;
use crate::world::WorldStateAggregator;

/// One addressable simulation participant.
///
/// Implementations deliver telemetry asynchronously into the aggregator
/// returned by [`world_state`](AgentConnection::world_state), typically through
/// its [`TelemetrySink`](crate::world::TelemetrySink). Sending a command must not
/// wait on that delivery path.
#[async_trait]
pub trait AgentConnection: Send + Sync {
    fn world_state(&self) -> &WorldStateAggregator;

    /// Asks the participant to start a session. Returning `Ok` means the
    /// request was accepted; the session has begun only once the participant
    /// says so through its telemetry.
    async fn start(&self, request: &StartRequest) -> Result<(), ConnectionError>;

    async fn send_command(&self, command: &str) -> Result<(), ConnectionError>;

    async fn stop(&self) -> Result<(), ConnectionError>;
}
