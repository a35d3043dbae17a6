//! C6 — worker-pool scheduler (§4.5). `dispatch` is the agent's single
//! public entry point, mirroring the teacher's `start_engine`/`run_engine`
//! split: validate, build shared state, spawn the watchdog, then
//! loop-spawn workers throttled by a semaphore.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_core::{AgentRequest, WorkerRecord};
use tokio::sync::Semaphore;

use crate::controller::{ControllerLocks, NodeTable};
use crate::shared::Shared;
use crate::transport::RpcTransport;
use crate::watchdog::{run_watchdog, DispatchOutcome};
use crate::worker::run_worker;

/// Tunables named in the glossary: `AGENT_THREAD_COUNT`, `COMMAND_TIMEOUT`,
/// `WDOG_POLL`.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub agent_thread_count: usize,
    pub command_timeout: Duration,
    pub wdog_poll: Duration,
}

impl DispatchConfig {
    /// `WDOG_POLL` is 1 or 2 seconds depending on `COMMAND_TIMEOUT` (§4.7);
    /// we pick 1s below a minute and 2s otherwise.
    pub fn new(agent_thread_count: usize, command_timeout: Duration) -> Self {
        assert!(
            agent_thread_count >= 1,
            "fatal: AGENT_THREAD_COUNT must be >= 1"
        );
        let wdog_poll = if command_timeout < Duration::from_secs(60) {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(2)
        };
        Self {
            agent_thread_count,
            command_timeout,
            wdog_poll,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(30))
    }
}

/// Dispatch `request` to every target, fanned out across up to
/// `config.agent_thread_count` concurrent workers, and wait for the watchdog
/// to reconcile all terminal states into `node_table`.
///
/// Preconditions (§4.5): a non-empty request with a valid, already-typed
/// `MessageType` — both are enforced by `AgentRequest`'s construction, so the
/// only runtime precondition left to assert is `agent_thread_count >= 1`,
/// which `DispatchConfig::new` already guarantees.
pub async fn dispatch<T, N>(
    request: AgentRequest,
    transport: Arc<T>,
    node_table: Arc<N>,
    locks: Arc<ControllerLocks>,
    config: DispatchConfig,
) -> DispatchOutcome
where
    T: RpcTransport + Send + Sync + 'static,
    N: NodeTable + 'static,
{
    if request.is_empty() {
        return DispatchOutcome::default();
    }

    let records: Vec<WorkerRecord> = request.targets.iter().map(WorkerRecord::new).collect();
    let target_count = records.len();

    let shared = Arc::new(Shared {
        records: Mutex::new(records),
        cancels: (0..target_count).map(|_| tokio::sync::Notify::new()).collect(),
        semaphore: Arc::new(Semaphore::new(config.agent_thread_count)),
    });

    let watchdog = tokio::spawn(run_watchdog(
        shared.clone(),
        node_table,
        locks,
        config.wdog_poll,
        config.command_timeout,
    ));

    let msg_type = request.msg_type;
    let payload = Arc::new(request.payload);

    for idx in 0..target_count {
        // Backpressure loop: retry indefinitely on (practically unreachable)
        // semaphore closure, mirroring spec.md's "wait and retry forever" on
        // thread-spawn failure (§4.5 step 3, §7).
        let permit = loop {
            match shared.semaphore.clone().acquire_owned().await {
                Ok(permit) => break permit,
                Err(_closed) => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        };

        tokio::spawn(run_worker(
            idx,
            shared.clone(),
            transport.clone(),
            msg_type,
            payload.clone(),
            permit,
        ));
    }

    watchdog.await.expect("watchdog task panicked")
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{MessageType, Target};
    use crate::controller::InMemoryNodeTable;
    use crate::transport::test_server;
    use crate::transport::TcpJsonTransport;
    use tokio::net::TcpListener;

    async fn bind_loopback() -> (TcpListener, std::net::SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn happy_fan_out_all_respond() {
        let mut targets = Vec::new();
        for i in 0..3 {
            let (listener, addr) = bind_loopback().await;
            tokio::spawn(test_server::serve_once(listener, 0));
            targets.push(Target::new(addr, format!("node{i}")));
        }

        let request = AgentRequest::new(MessageType::Ping, vec![], targets);
        let node_table = Arc::new(InMemoryNodeTable::new());
        let outcome = dispatch(
            request,
            Arc::new(TcpJsonTransport),
            node_table.clone(),
            Arc::new(ControllerLocks::new()),
            DispatchConfig::new(4, Duration::from_secs(5)),
        )
        .await;

        assert_eq!(outcome.done, 3);
        assert_eq!(outcome.failed, 0);
        let snap = node_table.snapshot();
        assert!(snap.values().all(|responded| *responded));
    }

    #[tokio::test]
    async fn stalled_target_is_forced_failed_by_watchdog() {
        let (listener, stuck_addr) = bind_loopback().await;
        tokio::spawn(test_server::serve_and_hang(listener));
        let (listener2, ok_addr) = bind_loopback().await;
        tokio::spawn(test_server::serve_once(listener2, 0));

        let targets = vec![
            Target::new(stuck_addr, "stuck".to_string()),
            Target::new(ok_addr, "ok".to_string()),
        ];
        let request = AgentRequest::new(MessageType::Ping, vec![], targets);
        let node_table = Arc::new(InMemoryNodeTable::new());

        let outcome = dispatch(
            request,
            Arc::new(TcpJsonTransport),
            node_table.clone(),
            Arc::new(ControllerLocks::new()),
            DispatchConfig::new(4, Duration::from_secs(2)),
        )
        .await;

        assert_eq!(outcome.done, 1);
        assert_eq!(outcome.failed, 1);
        let snap = node_table.snapshot();
        assert_eq!(snap.get("stuck"), Some(&false));
        assert_eq!(snap.get("ok"), Some(&true));
    }

    #[tokio::test]
    async fn saturation_never_exceeds_agent_thread_count() {
        let mut targets = Vec::new();
        let mut listeners = Vec::new();
        for i in 0..10 {
            let (listener, addr) = bind_loopback().await;
            listeners.push(listener);
            targets.push(Target::new(addr, format!("node{i}")));
        }
        for listener in listeners {
            tokio::spawn(test_server::serve_once(listener, 0));
        }

        let request = AgentRequest::new(MessageType::Ping, vec![], targets);
        let node_table = Arc::new(InMemoryNodeTable::new());
        let outcome = dispatch(
            request,
            Arc::new(TcpJsonTransport),
            node_table,
            Arc::new(ControllerLocks::new()),
            DispatchConfig::new(4, Duration::from_secs(5)),
        )
        .await;

        assert_eq!(outcome.done, 10);
    }

    #[tokio::test]
    async fn empty_request_is_a_noop() {
        let request = AgentRequest::new(MessageType::Ping, vec![], vec![]);
        let outcome = dispatch(
            request,
            Arc::new(TcpJsonTransport),
            Arc::new(InMemoryNodeTable::new()),
            Arc::new(ControllerLocks::new()),
            DispatchConfig::default(),
        )
        .await;
        assert_eq!(outcome, DispatchOutcome::default());
    }
}
