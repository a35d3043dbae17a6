//! Shared domain types for the agent request/worker lifecycle (§3).

use std::net::SocketAddr;
use std::time::Instant;

/// Upper bound on a target node-name, in bytes (§3).
pub const MAX_NAME_LEN: usize = 64;

/// RPC message types the agent is willing to dispatch (§4.5 precondition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    RevokeJobCredential,
    NodeRegistrationStatus,
    Ping,
}

impl MessageType {
    pub const REQUEST_REVOKE_JOB_CREDENTIAL: u32 = 1;
    pub const REQUEST_NODE_REGISTRATION_STATUS: u32 = 2;
    pub const REQUEST_PING: u32 = 3;

    /// Parse a raw wire message-type tag. Per §4.5/§7, an out-of-range tag is
    /// a programmer error at the RPC boundary and is unreachable for a valid
    /// caller — callers that accept untrusted input must validate upstream.
    pub fn from_wire(tag: u32) -> Self {
        match tag {
            Self::REQUEST_REVOKE_JOB_CREDENTIAL => MessageType::RevokeJobCredential,
            Self::REQUEST_NODE_REGISTRATION_STATUS => MessageType::NodeRegistrationStatus,
            Self::REQUEST_PING => MessageType::Ping,
            other => panic!("fatal: invalid agent message type {other}"),
        }
    }
}

/// A single dispatch target: where to connect, and the node name used when
/// reconciling results back into the controller's node table.
#[derive(Debug, Clone)]
pub struct Target {
    pub address: SocketAddr,
    pub node_name: String,
}

impl Target {
    /// Construct a target, truncating an oversized node name the way the
    /// teacher's DTOs normalize oversized/garbage input rather than reject it.
    pub fn new(address: SocketAddr, node_name: impl Into<String>) -> Self {
        let mut node_name = node_name.into();
        if node_name.len() > MAX_NAME_LEN {
            node_name.truncate(MAX_NAME_LEN);
        }
        Self { address, node_name }
    }
}

/// Immutable input to a single agent invocation (§3 Agent request).
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub msg_type: MessageType,
    pub payload: Vec<u8>,
    pub targets: Vec<Target>,
}

impl AgentRequest {
    pub fn new(msg_type: MessageType, payload: Vec<u8>, targets: Vec<Target>) -> Self {
        Self {
            msg_type,
            payload,
            targets,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Worker lifecycle state (§3 Worker record). Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    New,
    Active,
    Done,
    Failed,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Done | WorkerState::Failed)
    }
}

/// One record per target (§3). `timestamp` is either "start instant" while
/// `Active`, or "elapsed seconds" once terminal — mirroring spec.md §4.7's
/// reuse of the same field for both meanings.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub state: WorkerState,
    pub address: SocketAddr,
    pub node_name: String,
    pub started_at: Option<Instant>,
    pub elapsed_secs: f64,
}

impl WorkerRecord {
    pub fn new(target: &Target) -> Self {
        Self {
            state: WorkerState::New,
            address: target.address,
            node_name: target.node_name.clone(),
            started_at: None,
            elapsed_secs: 0.0,
        }
    }

    pub fn mark_active(&mut self, now: Instant) {
        self.state = WorkerState::Active;
        self.started_at = Some(now);
    }

    pub fn mark_terminal(&mut self, state: WorkerState, now: Instant) {
        debug_assert!(state.is_terminal());
        self.elapsed_secs = self
            .started_at
            .map(|s| now.duration_since(s).as_secs_f64())
            .unwrap_or(0.0);
        self.state = state;
    }
}

/// Stand-in for the RPC reply envelope named in §6
/// (`RESPONSE_SLURM_RC { return_code }`); other reply shapes classify FAILED.
#[derive(Debug, Clone)]
pub enum ControlReply {
    Rc { return_code: i32 },
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_node_name_is_truncated() {
        let name = "x".repeat(MAX_NAME_LEN + 10);
        let t = Target::new("127.0.0.1:7000".parse().unwrap(), name);
        assert_eq!(t.node_name.len(), MAX_NAME_LEN);
    }

    #[test]
    fn empty_request_is_a_noop() {
        let req = AgentRequest::new(MessageType::Ping, vec![], vec![]);
        assert!(req.is_empty());
    }

    #[test]
    #[should_panic(expected = "fatal: invalid agent message type")]
    fn unknown_wire_message_type_is_fatal() {
        MessageType::from_wire(9999);
    }

    #[test]
    fn known_wire_message_types_round_trip() {
        assert_eq!(
            MessageType::from_wire(MessageType::REQUEST_PING),
            MessageType::Ping
        );
    }
}
