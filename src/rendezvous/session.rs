use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::coordinator::pause;
use super::errors::RendezvousError;
use super::state::Phase;
use crate::config::RendezvousConfig;
use crate::connection::AgentConnection;
use crate::world::WorldState;

/// Handle over connections that have begun together.
///
/// Indices match the order the connections were handed to the coordinator.
pub struct Session {
    connections: Vec<Arc<dyn AgentConnection>>,
    config: RendezvousConfig,
    phase: Phase,
}

impl Session {
    pub(crate) fn new(connections: Vec<Arc<dyn AgentConnection>>, config: RendezvousConfig) -> Self {
        Self {
            connections,
            config,
            phase: Phase::Running,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn connection(&self, index: usize) -> Option<&Arc<dyn AgentConnection>> {
        self.connections.get(index)
    }

    pub fn peek(&self, index: usize) -> Option<WorldState> {
        self.connection(index).map(|c| c.world_state().peek())
    }

    pub fn take(&self, index: usize) -> Option<WorldState> {
        self.connection(index).map(|c| c.world_state().take())
    }

    pub fn is_running(&self) -> bool {
        self.connections
            .iter()
            .any(|c| c.world_state().is_running())
    }

    pub async fn send_command(&self, index: usize, command: &str) -> Result<(), RendezvousError> {
        let connection = self
            .connection(index)
            .ok_or(RendezvousError::UnknownConnection(index))?;
        debug!(connection = index, command, "sending command");
        connection
            .send_command(command)
            .await
            .map_err(|source| RendezvousError::Connection {
                connection: index,
                source,
            })
    }

    /// Polls until no connection reports a running session. Telemetry is
    /// peeked, not drained.
    pub async fn wait_for_end(&mut self, cancel: &CancelToken) -> Result<(), RendezvousError> {
        let started = Instant::now();
        loop {
            let pending: Vec<usize> = self
                .connections
                .iter()
                .enumerate()
                .filter(|(_, c)| c.world_state().is_running())
                .map(|(index, _)| index)
                .collect();
            if pending.is_empty() {
                info!(connections = self.len(), "session ended");
                self.finish();
                return Ok(());
            }
            if let Some(timeout) = self.config.end_timeout() {
                let waited = started.elapsed();
                if waited >= timeout {
                    warn!(?waited, ?pending, "gave up waiting for session to end");
                    return Err(RendezvousError::TimedOut {
                        phase: Phase::Running,
                        waited,
                        pending,
                    });
                }
            }
            pause(cancel, self.config.poll_interval(), Phase::Running).await?;
        }
    }

    /// Stops every connection concurrently.
    pub async fn stop_all(&mut self) -> Result<(), RendezvousError> {
        let results = join_all(self.connections.iter().map(|c| c.stop())).await;
        let failures: Vec<_> = results
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| result.err().map(|e| (index, e)))
            .collect();
        for connection in &self.connections {
            connection.world_state().mark_stopped();
        }
        self.finish();
        if failures.is_empty() {
            Ok(())
        } else {
            warn!(failed = failures.len(), "some connections failed to stop");
            Err(RendezvousError::StopFailed(failures))
        }
    }

    fn finish(&mut self) {
        if self.phase.can_transition_to(Phase::Ended) {
            self.phase = Phase::Ended;
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connections", &self.connections.len())
            .field("phase", &self.phase)
            .finish()
    }
}
