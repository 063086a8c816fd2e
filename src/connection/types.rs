use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_CLIENT_CONTROL_PORT: u16 = 10000;

/// Opaque description of the session to run, plus how many participants it
/// expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub description: String,
    pub agent_count: usize,
}

impl Scenario {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            agent_count: 1,
        }
    }

    pub fn with_agents(mut self, agent_count: usize) -> Self {
        self.agent_count = agent_count;
        self
    }
}

/// Address of one simulation client that may host a participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientInfo {
    pub address: String,
    pub control_port: u16,
    /// 0 lets the client pick.
    pub command_port: u16,
}

impl ClientInfo {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            control_port: DEFAULT_CLIENT_CONTROL_PORT,
            command_port: 0,
        }
    }

    pub fn with_control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }

    pub fn with_command_port(mut self, port: u16) -> Self {
        self.command_port = port;
        self
    }
}

impl fmt::Display for ClientInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClientInfo: {}:{}:{}",
            self.address, self.control_port, self.command_port
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPool {
    pub clients: Vec<ClientInfo>,
}

impl ClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pool used when none is given: one client on this machine.
    pub fn localhost() -> Self {
        Self::new().with_client(ClientInfo::new("127.0.0.1"))
    }

    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.add(client);
        self
    }

    pub fn add(&mut self, client: ClientInfo) {
        self.clients.push(client);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientInfo> {
        self.clients.iter()
    }
}

/// What the participant should record, and where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSpec {
    pub destination: Option<PathBuf>,
    pub observations: bool,
    pub rewards: bool,
    pub commands: bool,
}

impl RecordSpec {
    /// Records nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn to(destination: impl AsRef<Path>) -> Self {
        Self {
            destination: Some(destination.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    pub fn record_observations(mut self) -> Self {
        self.observations = true;
        self
    }

    pub fn record_rewards(mut self) -> Self {
        self.rewards = true;
        self
    }

    pub fn record_commands(mut self) -> Self {
        self.commands = true;
        self
    }

    pub fn is_recording(&self) -> bool {
        self.destination.is_some() && (self.observations || self.rewards || self.commands)
    }
}

/// Zero-based participant index within a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Role(pub usize);

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "role {}", self.0)
    }
}

/// Identity shared by every participant of one multi-agent session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentId(String);

impl ExperimentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a participant needs to start its part of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub scenario: Scenario,
    pub client_pool: ClientPool,
    pub record: RecordSpec,
    pub role: Role,
    /// Absent for single-participant sessions.
    pub experiment_id: Option<ExperimentId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_info_defaults() {
        let client = ClientInfo::new("10.0.0.2");
        assert_eq!(client.control_port, DEFAULT_CLIENT_CONTROL_PORT);
        assert_eq!(client.to_string(), "ClientInfo: 10.0.0.2:10000:0");
        let client = client.with_control_port(10001).with_command_port(10002);
        assert_eq!(client.to_string(), "ClientInfo: 10.0.0.2:10001:10002");
    }

    #[test]
    fn test_localhost_pool() {
        let pool = ClientPool::localhost();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.iter().next().unwrap().address, "127.0.0.1");
    }

    #[test]
    fn test_experiment_ids_are_unique() {
        let a = ExperimentId::generate();
        let b = ExperimentId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_record_spec() {
        assert!(!RecordSpec::none().is_recording());
        assert!(!RecordSpec::to("/tmp/run.tgz").is_recording());
        assert!(RecordSpec::to("/tmp/run.tgz").record_rewards().is_recording());
    }
}
