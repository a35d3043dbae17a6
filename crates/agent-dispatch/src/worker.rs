//! C7 — per-target worker (§4.6).

use std::sync::Arc;
use std::time::Instant;

use agent_core::{ControlReply, MessageType, WorkerState};
use tokio::sync::OwnedSemaphorePermit;

use crate::shared::Shared;
use crate::transport::RpcTransport;

/// Run one target's RPC to completion (success, failure, or watchdog
/// cancellation) and record its terminal state. `_permit` is held for the
/// worker's whole lifetime and releases the scheduler's throttle on drop.
pub(crate) async fn run_worker<T: RpcTransport>(
    idx: usize,
    shared: Arc<Shared>,
    transport: Arc<T>,
    msg_type: MessageType,
    payload: Arc<Vec<u8>>,
    _permit: OwnedSemaphorePermit,
) {
    let (address, start) = {
        let mut records = shared.records.lock().expect("worker table lock poisoned");
        let now = Instant::now();
        let rec = &mut records[idx];
        rec.mark_active(now);
        (rec.address, now)
    };
    let _ = start;

    let outcome = tokio::select! {
        res = transport.call(address, msg_type, &payload) => classify(res),
        _ = shared.cancels[idx].notified() => WorkerState::Failed,
    };

    let mut records = shared.records.lock().expect("worker table lock poisoned");
    records[idx].mark_terminal(outcome, Instant::now());
}

fn classify(res: std::io::Result<ControlReply>) -> WorkerState {
    match res {
        Err(_) => WorkerState::Failed,
        Ok(ControlReply::Rc { return_code: 0 }) => WorkerState::Done,
        Ok(ControlReply::Rc { return_code: rc }) => {
            eprintln!("warning: worker: target returned non-zero rc {rc}");
            WorkerState::Failed
        }
        Ok(ControlReply::Other) => WorkerState::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_spec_table() {
        assert_eq!(
            classify(Ok(ControlReply::Rc { return_code: 0 })),
            WorkerState::Done
        );
        assert_eq!(
            classify(Ok(ControlReply::Rc { return_code: 1 })),
            WorkerState::Failed
        );
        assert_eq!(classify(Ok(ControlReply::Other)), WorkerState::Failed);
        assert_eq!(
            classify(Err(std::io::Error::new(std::io::ErrorKind::Other, "x"))),
            WorkerState::Failed
        );
    }
}
