use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::connection::ConnectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Starting,
    AwaitingBegin,
    Running,
    Ended,
    Aborted,
}

impl Phase {
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, AwaitingBegin)
                | (Starting, Aborted)
                | (AwaitingBegin, Running)
                | (AwaitingBegin, Aborted)
                | (Running, Ended)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Ended | Phase::Aborted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::AwaitingBegin => "awaiting begin",
            Phase::Running => "running",
            Phase::Ended => "ended",
            Phase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One refused start attempt on one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionAttempt {
    pub connection: usize,
    /// 1-based.
    pub attempt: u32,
    pub error: ConnectionError,
}

impl fmt::Display for MissionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connection {} attempt {}: {}",
            self.connection, self.attempt, self.error
        )
    }
}

/// Overall phase plus one sub-phase per connection.
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    phase: Phase,
    connections: Vec<Phase>,
}

impl PhaseTracker {
    pub(crate) fn new(connections: usize) -> Self {
        Self {
            phase: Phase::Idle,
            connections: vec![Phase::Idle; connections],
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal rendezvous transition {} -> {}",
            self.phase,
            next
        );
        info!(from = %self.phase, to = %next, "rendezvous phase changed");
        self.phase = next;
    }

    pub(crate) fn advance_connection(&mut self, connection: usize, next: Phase) {
        if let Some(phase) = self.connections.get_mut(connection) {
            debug!(connection, from = %phase, to = %next, "connection phase changed");
            *phase = next;
        }
    }

    pub(crate) fn advance_all_connections(&mut self, next: Phase) {
        for connection in 0..self.connections.len() {
            self.advance_connection(connection, next);
        }
    }

    pub(crate) fn connection_phases(&self) -> &[Phase] {
        &self.connections
    }
}
