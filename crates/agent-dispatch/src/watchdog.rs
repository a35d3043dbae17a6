//! C8 — watchdog supervisor (§4.7).

use std::sync::Arc;
use std::time::{Duration, Instant};

use agent_core::WorkerState;

use crate::controller::{ControllerLocks, NodeTable};
use crate::shared::Shared;

/// Outcome of a completed dispatch (§8: every worker ends DONE or FAILED).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DispatchOutcome {
    pub done: usize,
    pub failed: usize,
    /// Slowest observed `DONE` duration, in seconds; 0.0 if none completed.
    pub max_delay_secs: f64,
}

/// Poll every `wdog_poll` until no worker is `New`/`Active`, forcing a
/// cancellation signal into any `Active` worker past `command_timeout`, then
/// reconcile terminal states into the node table under the controller's
/// composite lock.
pub(crate) async fn run_watchdog<N: NodeTable>(
    shared: Arc<Shared>,
    node_table: Arc<N>,
    locks: Arc<ControllerLocks>,
    wdog_poll: Duration,
    command_timeout: Duration,
) -> DispatchOutcome {
    loop {
        tokio::time::sleep(wdog_poll).await;

        let mut records = shared.records.lock().expect("worker table lock poisoned");
        let now = Instant::now();
        let mut in_progress = false;
        let mut max_delay = 0.0_f64;

        for (idx, rec) in records.iter().enumerate() {
            match rec.state {
                WorkerState::Active => {
                    in_progress = true;
                    let elapsed = rec
                        .started_at
                        .map(|s| now.duration_since(s).as_secs_f64())
                        .unwrap_or(0.0);
                    if elapsed >= command_timeout.as_secs_f64() {
                        shared.cancels[idx].notify_one();
                    }
                }
                WorkerState::New => in_progress = true,
                WorkerState::Done => max_delay = max_delay.max(rec.elapsed_secs),
                WorkerState::Failed => {}
            }
        }

        if in_progress {
            continue;
        }

        // Still holding the worker-table mutex, per §4.7 step 6.
        let mut done = 0usize;
        let mut failed = 0usize;
        {
            let _composite = locks.acquire_job_node_write();
            for rec in records.iter() {
                match rec.state {
                    WorkerState::Failed => {
                        node_table.node_not_resp(&rec.node_name);
                        failed += 1;
                    }
                    WorkerState::Done => {
                        node_table.node_did_resp(&rec.node_name);
                        done += 1;
                    }
                    WorkerState::New | WorkerState::Active => {
                        unreachable!("watchdog only reconciles once all workers are terminal")
                    }
                }
            }
        }

        if max_delay > 0.0 {
            eprintln!("debug: agent dispatch max delay {max_delay:.3}s");
        }

        return DispatchOutcome {
            done,
            failed,
            max_delay_secs: max_delay,
        };
    }
}
