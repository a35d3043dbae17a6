//! The scheduler context (§3): the state C6, C7, and C8 all touch.

use std::sync::{Arc, Mutex};

use agent_core::WorkerRecord;
use tokio::sync::{Notify, Semaphore};

/// Bounded-concurrency throttle and worker table shared by the dispatch
/// loop, every worker task, and the watchdog.
///
/// `semaphore` is the async translation of spec.md's
/// `threads_active`-counter-guarded-by-condvar: acquiring a permit *is*
/// "wait while `threads_active >= AGENT_THREAD_COUNT`", and dropping one *is*
/// "decrement and signal the condition".
pub(crate) struct Shared {
    pub(crate) records: Mutex<Vec<WorkerRecord>>,
    pub(crate) cancels: Vec<Notify>,
    pub(crate) semaphore: Arc<Semaphore>,
}
