use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::state::{MissionAttempt, Phase};
use crate::config::ConfigError;
use crate::connection::ConnectionError;

/// A connection that never accepted a start. `attempts` is empty when the
/// connection was refused before any attempt was made.
#[derive(Debug, Clone, PartialEq)]
pub struct StartFailure {
    pub connection: usize,
    pub attempts: Vec<MissionAttempt>,
    pub last_error: ConnectionError,
}

impl fmt::Display for StartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return write!(
                f,
                "connection {} was not started: {}",
                self.connection, self.last_error
            );
        }
        write!(
            f,
            "connection {} failed to start after {} attempt(s): {}",
            self.connection,
            self.attempts.len(),
            self.last_error
        )
    }
}

/// Error texts accumulated on one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub connection: usize,
    pub errors: Vec<String>,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connection {}: {}",
            self.connection,
            self.errors.join("; ")
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RendezvousError {
    #[error("no connections to start")]
    NoConnections,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{}", join(.0))]
    StartFailed(Vec<StartFailure>),

    #[error("connection(s) {aborting:?} reported errors: {}", join(.reports))]
    RemoteErrors {
        aborting: Vec<usize>,
        reports: Vec<ErrorReport>,
    },

    #[error("timed out after {waited:?} while {phase}; still waiting on connection(s) {pending:?}")]
    TimedOut {
        phase: Phase,
        waited: Duration,
        pending: Vec<usize>,
    },

    #[error("cancelled while {phase}")]
    Cancelled { phase: Phase },

    #[error("no connection at index {0}")]
    UnknownConnection(usize),

    #[error("connection {connection}: {source}")]
    Connection {
        connection: usize,
        source: ConnectionError,
    },

    #[error("failed to stop connection(s): {}", join_stop(.0))]
    StopFailed(Vec<(usize, ConnectionError)>),
}

impl RendezvousError {
    /// Indices of the connections this error is attributed to.
    pub fn connections(&self) -> Vec<usize> {
        match self {
            RendezvousError::StartFailed(failures) => {
                failures.iter().map(|f| f.connection).collect()
            }
            RendezvousError::RemoteErrors { aborting, .. } => aborting.clone(),
            RendezvousError::TimedOut { pending, .. } => pending.clone(),
            RendezvousError::UnknownConnection(index)
            | RendezvousError::Connection {
                connection: index, ..
            } => vec![*index],
            RendezvousError::StopFailed(failures) => failures.iter().map(|(i, _)| *i).collect(),
            RendezvousError::NoConnections
            | RendezvousError::Config(_)
            | RendezvousError::Cancelled { .. } => Vec::new(),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_stop(failures: &[(usize, ConnectionError)]) -> String {
    failures
        .iter()
        .map(|(index, error)| format!("connection {index}: {error}"))
        .collect::<Vec<_>>()
        .join(", ")
}
