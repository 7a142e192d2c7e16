//! One-shot delayed callbacks with cooperative cancellation.
//!
//! A timer cannot be interrupted mid-delay. Cancelling only flips a flag;
//! the task still wakes up when the delay elapses and then finds the flag
//! set and does nothing. Implementors of [`Fire`] must re-check
//! [`TimerHandle::is_cancelled`] right before any side effect, because the
//! flag can flip between the wake-up check and the callback body.

use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What a timer does when it fires.
pub trait Fire: Send + 'static {
    fn fire(self, handle: TimerHandle) -> BoxFuture<'static, ()>;
}

/// Shared view of one armed timer. Clones refer to the same timer.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Request suppression of the callback. Idempotent; returns true only
    /// for the call that actually flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True if both handles refer to the same armed timer.
    pub fn same_timer(&self, other: &TimerHandle) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// Spawn a task that waits `delay` and then runs `action` unless the
/// returned handle was cancelled in the meantime.
///
/// Re-arming means calling this again; an existing timer is never reset.
pub fn schedule<F: Fire>(delay: Duration, action: F) -> TimerHandle {
    let handle = TimerHandle::default();
    let task_handle = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if task_handle.is_cancelled() {
            debug!(delay_secs = delay.as_secs(), "timer woke up cancelled");
            return;
        }
        action.fire(task_handle).await;
    });
    handle
}
