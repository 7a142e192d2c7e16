//! Per-room alarm session.
//!
//! A session is `Active` from creation until exactly one of two things
//! happens: the monitored user acknowledges (`Cancelled`) or the retry
//! limit runs out (`Exhausted`). Both paths run under the session's state
//! lock and go through [`Session::finish`], a compare-and-swap on the
//! status, so only one of them ever sends its terminal messages and
//! deregisters the session.

use crate::monitor::Monitor;
use crate::policy::{AlertReport, Decision, Notification};
use crate::timer::{self, Fire, TimerHandle};
use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Status {
    Active = 0,
    Cancelled = 1,
    Exhausted = 2,
}

impl Status {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Status::Active,
            1 => Status::Cancelled,
            _ => Status::Exhausted,
        }
    }
}

/// Result of feeding a chat message to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgment {
    /// Nobody is being monitored in that room.
    NotMonitored,
    /// Wrong sender or text that is not a greeting.
    Ignored,
    /// The session ended on another path first.
    AlreadyFinished,
    /// Monitoring stopped by this message.
    Cancelled,
}

#[derive(Debug, Default)]
struct SessionState {
    repeat_count: u32,
    timer: Option<TimerHandle>,
}

#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub room_id: String,
    pub monitored_user_id: String,
    pub alert_room_id: Option<String>,
    pub interval: Duration,
    pub created_at: Instant,
    status: AtomicU8,
    state: Mutex<SessionState>,
}

/// Timer payload: run the escalation step for one session.
struct Escalate {
    session: Arc<Session>,
    monitor: Monitor,
}

impl Fire for Escalate {
    fn fire(self, handle: TimerHandle) -> BoxFuture<'static, ()> {
        self.session.on_fire(self.monitor, handle).boxed()
    }
}

impl Session {
    pub fn new(
        room_id: impl Into<String>,
        monitored_user_id: impl Into<String>,
        alert_room_id: Option<String>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            room_id: room_id.into(),
            monitored_user_id: monitored_user_id.into(),
            alert_room_id: alert_room_id.filter(|id| !id.is_empty()),
            interval,
            created_at: Instant::now(),
            status: AtomicU8::new(Status::Active as u8),
            state: Mutex::new(SessionState::default()),
        })
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn is_active(&self) -> bool {
        self.status() == Status::Active
    }

    /// Number of reminders sent so far.
    pub async fn repeat_count(&self) -> u32 {
        self.state.lock().await.repeat_count
    }

    /// Leave `Active`. Returns false if some other path already did.
    fn finish(&self, to: Status) -> bool {
        self.status
            .compare_exchange(
                Status::Active as u8,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    fn arm(self: &Arc<Self>, monitor: &Monitor) -> TimerHandle {
        timer::schedule(
            self.interval,
            Escalate {
                session: Arc::clone(self),
                monitor: monitor.clone(),
            },
        )
    }

    /// Arm the first timer. Called once, right after registration.
    pub(crate) async fn start(self: &Arc<Self>, monitor: &Monitor) {
        let mut state = self.state.lock().await;
        if self.is_active() && state.timer.is_none() {
            state.timer = Some(self.arm(monitor));
            info!(
                session_id = %self.id,
                room_id = %self.room_id,
                interval_secs = self.interval.as_secs(),
                "monitoring started"
            );
        }
    }

    async fn on_fire(self: Arc<Self>, monitor: Monitor, handle: TimerHandle) {
        let mut state = self.state.lock().await;

        let current = state.timer.as_ref().is_some_and(|t| t.same_timer(&handle));
        if handle.is_cancelled() || !current || !self.is_active() {
            debug!(session_id = %self.id, "stale timer fired, ignoring");
            return;
        }

        let policy = monitor.policy();
        let alert_room_id = self.alert_room_id.as_deref();
        let decision = match policy.decide(state.repeat_count, &self.room_id, alert_room_id) {
            Decision::Remind(reminder) => {
                monitor.messenger().notify(&self.room_id, &reminder).await;
                state.repeat_count += 1;
                info!(
                    session_id = %self.id,
                    room_id = %self.room_id,
                    repeat_count = state.repeat_count,
                    "reminder sent"
                );

                // The reminder that reaches the limit is followed by the
                // give-up message right away, not one interval later.
                match policy.decide(state.repeat_count, &self.room_id, alert_room_id) {
                    Decision::Remind(_) => {
                        state.timer = Some(self.arm(&monitor));
                        return;
                    }
                    exhausted => exhausted,
                }
            }
            exhausted => exhausted,
        };

        if let Decision::Exhausted { notification, alert } = decision {
            self.exhaust(&monitor, &mut state, notification, alert).await;
        }
    }

    async fn exhaust(
        &self,
        monitor: &Monitor,
        state: &mut SessionState,
        notification: Notification,
        alert: Option<AlertReport>,
    ) {
        if !self.finish(Status::Exhausted) {
            return;
        }
        state.timer = None;
        monitor.registry().remove(self).await;

        let messenger = monitor.messenger();
        messenger.notify(&self.room_id, &notification).await;
        if let Some(alert) = alert {
            messenger.notify(&self.room_id, &alert.room_notice).await;
            messenger.notify(&alert.alert_room_id, &alert.report).await;
        }

        info!(
            session_id = %self.id,
            room_id = %self.room_id,
            repeat_count = state.repeat_count,
            "retry limit reached, monitoring finished"
        );
    }

    /// Handle a chat message posted in this session's room.
    pub async fn acknowledge(&self, monitor: &Monitor, sender_id: &str, text: &str) -> Acknowledgment {
        if sender_id != self.monitored_user_id || !monitor.policy().is_acknowledgment(text) {
            return Acknowledgment::Ignored;
        }

        let mut state = self.state.lock().await;
        if !self.finish(Status::Cancelled) {
            debug!(session_id = %self.id, "acknowledged after session finished");
            return Acknowledgment::AlreadyFinished;
        }
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        monitor.registry().remove(self).await;

        info!(
            session_id = %self.id,
            room_id = %self.room_id,
            user_id = %sender_id,
            repeat_count = state.repeat_count,
            "acknowledged, monitoring stopped"
        );
        monitor
            .messenger()
            .notify(&self.room_id, &monitor.policy().acknowledged())
            .await;

        Acknowledgment::Cancelled
    }
}
