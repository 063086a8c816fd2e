//! An in-process participant that follows a fixed script.
//!
//! Useful for harnesses that exercise the coordinator without a simulation
//! backend: it fails a chosen number of start attempts, then reports the
//! session as begun (or reports an error) after a chosen delay.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::errors::ConnectionError;
use super::traits::AgentConnection;
use super::types::StartRequest;
use crate::world::{TelemetrySink, WorldStateAggregator};

const BEGIN_MESSAGE: &str = "<MissionInit/>";
const END_MESSAGE: &str = "<MissionEnded><Status>ENDED</Status></MissionEnded>";

#[derive(Debug, Clone)]
struct Script {
    failing_starts: u32,
    start_error: ConnectionError,
    begin_after: Option<Duration>,
    error_after: Option<(Duration, String)>,
    end_after: Option<Duration>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            failing_starts: 0,
            start_error: ConnectionError::Refused("scripted".to_string()),
            begin_after: Some(Duration::ZERO),
            error_after: None,
            end_after: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedConnection {
    aggregator: WorldStateAggregator,
    script: Script,
    /// Session status as the participant sees it, kept apart from the
    /// aggregator so commands never wait on telemetry delivery.
    open: Arc<AtomicBool>,
    attempts: Mutex<Vec<Instant>>,
    requests: Mutex<Vec<StartRequest>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedConnection {
    /// Accepts the first start and begins immediately.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aggregator(mut self, aggregator: WorldStateAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Fails the first `count` start attempts with `error`.
    pub fn failing_starts(mut self, count: u32, error: ConnectionError) -> Self {
        self.script.failing_starts = count;
        self.script.start_error = error;
        self
    }

    pub fn always_failing(self, error: ConnectionError) -> Self {
        self.failing_starts(u32::MAX, error)
    }

    /// Reports the session as begun `delay` after an accepted start.
    pub fn begin_after(mut self, delay: Duration) -> Self {
        self.script.begin_after = Some(delay);
        self
    }

    pub fn never_begins(mut self) -> Self {
        self.script.begin_after = None;
        self
    }

    /// Reports `text` as an error `delay` after an accepted start.
    pub fn error_after(mut self, delay: Duration, text: impl Into<String>) -> Self {
        self.script.error_after = Some((delay, text.into()));
        self
    }

    /// Reports the session as ended `delay` after an accepted start.
    pub fn end_after(mut self, delay: Duration) -> Self {
        self.script.end_after = Some(delay);
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    pub fn last_request(&self) -> Option<StartRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn schedule<F>(&self, delay: Duration, deliver: F)
    where
        F: FnOnce(&TelemetrySink, &AtomicBool) + Send + 'static,
    {
        let sink = self.aggregator.sink();
        let open = Arc::clone(&self.open);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            deliver(&sink, &open);
        });
    }
}

#[async_trait]
impl AgentConnection for ScriptedConnection {
    fn world_state(&self) -> &WorldStateAggregator {
        &self.aggregator
    }

    async fn start(&self, request: &StartRequest) -> Result<(), ConnectionError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            attempts.push(Instant::now());
            attempts.len()
        };
        if u32::try_from(attempt).unwrap_or(u32::MAX) <= self.script.failing_starts {
            debug!(attempt, role = request.role.0, "scripted start refused");
            return Err(self.script.start_error.clone());
        }
        self.requests.lock().push(request.clone());

        if let Some((delay, text)) = self.script.error_after.clone() {
            self.schedule(delay, move |sink, _| sink.on_error(Utc::now(), text));
        }
        if let Some(delay) = self.script.begin_after {
            self.schedule(delay, |sink, open| {
                open.store(true, Ordering::Release);
                sink.on_control(Utc::now(), BEGIN_MESSAGE);
            });
        }
        if let Some(delay) = self.script.end_after {
            self.schedule(delay, |sink, open| {
                if open.swap(false, Ordering::AcqRel) {
                    sink.on_control(Utc::now(), END_MESSAGE);
                }
            });
        }
        Ok(())
    }

    async fn send_command(&self, command: &str) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::NotRunning);
        }
        self.commands.lock().push(command.to_string());
        Ok(())
    }

    async fn stop(&self) -> Result<(), ConnectionError> {
        if self.open.swap(false, Ordering::AcqRel) {
            self.aggregator.sink().on_control(Utc::now(), END_MESSAGE);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ClientPool, RecordSpec, Role, Scenario};

    fn request() -> StartRequest {
        StartRequest {
            scenario: Scenario::new("<Mission/>"),
            client_pool: ClientPool::localhost(),
            record: RecordSpec::none(),
            role: Role(0),
            experiment_id: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_then_begins() {
        let connection = ScriptedConnection::new()
            .failing_starts(1, ConnectionError::Refused("x".into()))
            .begin_after(Duration::from_millis(50));

        assert!(connection.start(&request()).await.is_err());
        assert!(connection.start(&request()).await.is_ok());
        assert_eq!(connection.attempts(), 2);
        assert!(!connection.world_state().has_begun());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(connection.world_state().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_require_running_session() {
        let connection = ScriptedConnection::new();
        assert_eq!(
            connection.send_command("move 1").await,
            Err(ConnectionError::NotRunning)
        );

        connection.start(&request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        connection.send_command("move 1").await.unwrap();
        assert_eq!(connection.commands(), vec!["move 1"]);

        connection.stop().await.unwrap();
        assert!(connection.world_state().peek().has_ended());
        assert!(!connection.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_do_not_wait_on_telemetry_lock() {
        let connection = Arc::new(ScriptedConnection::new());
        connection.start(&request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        // Hold the aggregator's lock from another thread while commands go out.
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let aggregator = connection.world_state().clone();
        let holder = std::thread::spawn(move || {
            aggregator.with_state_locked(|| {
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            });
        });
        held_rx.recv().unwrap();

        connection.send_command("attack 1").await.unwrap();

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert_eq!(connection.commands(), vec!["attack 1"]);
    }
}
