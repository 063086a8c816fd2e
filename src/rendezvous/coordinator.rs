use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::errors::{ErrorReport, RendezvousError, StartFailure};
use super::session::Session;
use super::state::{MissionAttempt, Phase, PhaseTracker};
use crate::config::{ConfigError, RendezvousConfig};
use crate::connection::{
    AgentConnection, ClientPool, ConnectionError, ExperimentId, RecordSpec, Role, Scenario,
    StartRequest,
};
use crate::world::WorldState;

/// Brings one or more connections into a running session together.
///
/// Connections are started in index order, each with its own retry budget.
/// Once every start is accepted the coordinator polls all aggregators until
/// each reports the session as begun in the same round, aborting as soon as
/// any of them reports an error.
#[derive(Debug, Clone, Default)]
pub struct Rendezvous {
    config: RendezvousConfig,
    cancel: CancelToken,
}

impl Rendezvous {
    pub fn new(config: RendezvousConfig) -> Result<Self, RendezvousError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RendezvousConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Starts a lone connection on localhost as role 0.
    pub async fn start_single(
        &self,
        connection: Arc<dyn AgentConnection>,
        scenario: &Scenario,
        record: &RecordSpec,
    ) -> Result<Session, RendezvousError> {
        let template = StartRequest {
            scenario: scenario.clone(),
            client_pool: ClientPool::localhost(),
            record: record.clone(),
            role: Role(0),
            experiment_id: None,
        };
        self.run(vec![connection], template).await
    }

    /// Starts every connection under one experiment id; connection `i` takes
    /// role `i`. The scenario must ask for exactly as many agents as there
    /// are connections.
    pub async fn start_multi(
        &self,
        connections: Vec<Arc<dyn AgentConnection>>,
        scenario: &Scenario,
        client_pool: &ClientPool,
        record: &RecordSpec,
        experiment_id: &ExperimentId,
    ) -> Result<Session, RendezvousError> {
        if connections.is_empty() {
            return Err(RendezvousError::NoConnections);
        }
        if scenario.agent_count != connections.len() {
            return Err(ConfigError::Invalid(format!(
                "scenario expects {} agent(s) but {} connection(s) were given",
                scenario.agent_count,
                connections.len()
            ))
            .into());
        }
        let template = StartRequest {
            scenario: scenario.clone(),
            client_pool: client_pool.clone(),
            record: record.clone(),
            role: Role(0),
            experiment_id: Some(experiment_id.clone()),
        };
        self.run(connections, template).await
    }

    async fn run(
        &self,
        connections: Vec<Arc<dyn AgentConnection>>,
        template: StartRequest,
    ) -> Result<Session, RendezvousError> {
        if connections.is_empty() {
            return Err(RendezvousError::NoConnections);
        }
        let mut tracker = PhaseTracker::new(connections.len());
        tracker.advance(Phase::Starting);

        for (index, connection) in connections.iter().enumerate() {
            tracker.advance_connection(index, Phase::Starting);
            let request = StartRequest {
                role: Role(index),
                ..template.clone()
            };
            if let Err(error) = self.start_connection(index, connection.as_ref(), &request).await {
                tracker.advance_connection(index, Phase::Aborted);
                return Err(abort(&mut tracker, error));
            }
            tracker.advance_connection(index, Phase::AwaitingBegin);
        }

        tracker.advance(Phase::AwaitingBegin);
        if let Err(error) = self.await_begin(&connections).await {
            for index in error.connections() {
                tracker.advance_connection(index, Phase::Aborted);
            }
            return Err(abort(&mut tracker, error));
        }

        tracker.advance_all_connections(Phase::Running);
        tracker.advance(Phase::Running);
        Ok(Session::new(connections, self.config.clone()))
    }

    async fn start_connection(
        &self,
        index: usize,
        connection: &dyn AgentConnection,
        request: &StartRequest,
    ) -> Result<(), RendezvousError> {
        let world = connection.world_state();
        if world.is_running() {
            warn!(connection = index, "refusing to start over a running session");
            return Err(RendezvousError::StartFailed(vec![StartFailure {
                connection: index,
                attempts: Vec::new(),
                last_error: ConnectionError::AlreadyRunning,
            }]));
        }
        world.reset();

        let mut attempts = Vec::new();
        let mut attempt = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(RendezvousError::Cancelled {
                    phase: Phase::Starting,
                });
            }
            attempt += 1;
            debug!(connection = index, attempt, "sending start request");
            let error = match connection.start(request).await {
                Ok(()) => {
                    info!(connection = index, attempt, "start accepted");
                    world.lock_policies();
                    return Ok(());
                }
                Err(error) => error,
            };

            let retryable = error.is_retryable();
            attempts.push(MissionAttempt {
                connection: index,
                attempt,
                error: error.clone(),
            });
            if !retryable || attempt >= self.config.max_attempts {
                warn!(connection = index, attempt, %error, retryable, "giving up on start");
                return Err(RendezvousError::StartFailed(vec![StartFailure {
                    connection: index,
                    attempts,
                    last_error: error,
                }]));
            }
            warn!(
                connection = index,
                attempt,
                %error,
                retry_in = ?self.config.retry_interval(),
                "start failed, retrying"
            );
            self.pause(self.config.retry_interval(), Phase::Starting)
                .await?;
        }
    }

    async fn await_begin(
        &self,
        connections: &[Arc<dyn AgentConnection>],
    ) -> Result<(), RendezvousError> {
        let started = Instant::now();
        let mut round: u64 = 0;
        loop {
            self.pause(self.config.poll_interval(), Phase::AwaitingBegin)
                .await?;
            round += 1;

            let states: Vec<WorldState> = connections
                .iter()
                .map(|connection| connection.world_state().peek())
                .collect();

            let reports: Vec<ErrorReport> = states
                .iter()
                .enumerate()
                .filter(|(_, state)| state.has_errors())
                .map(|(connection, state)| ErrorReport {
                    connection,
                    errors: state.error_texts(),
                })
                .collect();
            if !reports.is_empty() {
                for report in &reports {
                    warn!(round, %report, "connection reported errors while waiting to begin");
                }
                return Err(RendezvousError::RemoteErrors {
                    aborting: reports.iter().map(|r| r.connection).collect(),
                    reports,
                });
            }

            let pending: Vec<usize> = states
                .iter()
                .enumerate()
                .filter(|(_, state)| !state.has_begun)
                .map(|(index, _)| index)
                .collect();
            if pending.is_empty() {
                info!(round, connections = connections.len(), "all connections have begun");
                return Ok(());
            }
            debug!(round, ?pending, "waiting for session to begin");

            if let Some(timeout) = self.config.begin_timeout() {
                let waited = started.elapsed();
                if waited >= timeout {
                    warn!(?waited, ?pending, "gave up waiting for session to begin");
                    return Err(RendezvousError::TimedOut {
                        phase: Phase::AwaitingBegin,
                        waited,
                        pending,
                    });
                }
            }
        }
    }

    async fn pause(&self, duration: Duration, phase: Phase) -> Result<(), RendezvousError> {
        pause(&self.cancel, duration, phase).await
    }
}

fn abort(tracker: &mut PhaseTracker, error: RendezvousError) -> RendezvousError {
    warn!(
        from = %tracker.phase(),
        connections = ?tracker.connection_phases(),
        %error,
        "rendezvous aborted"
    );
    tracker.advance(Phase::Aborted);
    error
}

/// Sleeps for `duration` unless `cancel` fires first.
pub(crate) async fn pause(
    cancel: &CancelToken,
    duration: Duration,
    phase: Phase,
) -> Result<(), RendezvousError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!(%phase, "rendezvous cancelled");
            Err(RendezvousError::Cancelled { phase })
        }
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
