//! §4.8 — interruptible sleep primitive.
//!
//! The historical primitive waits on a mutex+condvar until either an
//! absolute deadline or an explicit wake-up, checking a termination flag on
//! either exit path. `tokio::select!` between a timer and a `Notify` is the
//! async-idiomatic equivalent (SPEC_FULL.md §4.8).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// A sleep that can be woken early or permanently silenced.
#[derive(Debug, Default)]
pub struct InterruptibleSleep {
    notify: Notify,
    terminated: AtomicBool,
}

/// Why [`InterruptibleSleep::sleep`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    TimedOut,
    Woken,
    Terminated,
}

impl InterruptibleSleep {
    pub fn new() -> Arc<Self> {
        Arc::new(InterruptibleSleep {
            notify: Notify::new(),
            terminated: AtomicBool::new(false),
        })
    }

    /// Sleep up to `duration`, returning early if woken or terminated.
    pub async fn sleep(&self, duration: Duration) -> WakeReason {
        if self.terminated.load(Ordering::Acquire) {
            return WakeReason::Terminated;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => WakeReason::TimedOut,
            _ = self.notify.notified() => {
                if self.terminated.load(Ordering::Acquire) {
                    WakeReason::Terminated
                } else {
                    WakeReason::Woken
                }
            }
        }
    }

    /// Wake a pending (or future) `sleep` early without terminating it.
    pub fn wake(&self) {
        self.notify.notify_waiters();
    }

    /// Permanently wake and silence this sleep: all current and future
    /// `sleep` calls return `WakeReason::Terminated` immediately.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn times_out_without_a_wake() {
        let sleeper = InterruptibleSleep::new();
        let reason = sleeper.sleep(Duration::from_secs(5)).await;
        assert_eq!(reason, WakeReason::TimedOut);
    }

    #[tokio::test]
    async fn wake_interrupts_the_sleep() {
        let sleeper = InterruptibleSleep::new();
        let waiter = sleeper.clone();
        let handle = tokio::spawn(async move { waiter.sleep(Duration::from_secs(60)).await });

        tokio::task::yield_now().await;
        sleeper.wake();

        assert_eq!(handle.await.unwrap(), WakeReason::Woken);
    }

    #[tokio::test]
    async fn terminate_short_circuits_future_sleeps() {
        let sleeper = InterruptibleSleep::new();
        sleeper.terminate();
        assert_eq!(sleeper.sleep(Duration::from_secs(60)).await, WakeReason::Terminated);
    }
}
