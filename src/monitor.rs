//! Entry points into the wake-up engine used by the HTTP handlers.

use crate::error::{Error, Result};
use crate::messaging::Messenger;
use crate::policy::EscalationPolicy;
use crate::registry::Registry;
use crate::session::{Acknowledgment, Session};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// A "wake someone up" request.
#[derive(Debug, Clone)]
pub struct MonitorRequest {
    pub room_id: String,
    pub monitored_user_id: String,
    pub message: String,
    /// Re-notification interval; zero or negative means send once.
    pub interval_secs: i64,
    pub alert_room_id: Option<String>,
}

impl MonitorRequest {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.monitored_user_id.trim().is_empty() {
            return Err(Error::validation("'user_id' is missing."));
        }
        if self.room_id.trim().is_empty() {
            return Err(Error::validation("'room_id' is missing."));
        }
        if self.message.trim().is_empty() {
            return Err(Error::validation("'message' is missing."));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Message sent, nobody monitored.
    Sent,
    /// Message sent and a session is running.
    Monitoring { session_id: Uuid },
    /// The room already has an active session; nothing was sent.
    AlreadyMonitoring,
}

/// Process-wide engine state: the registry plus what sessions need when
/// their timers fire.
#[derive(Clone)]
pub struct Monitor {
    registry: Registry,
    messenger: Arc<dyn Messenger>,
    policy: Arc<EscalationPolicy>,
}

impl Monitor {
    pub fn new(messenger: Arc<dyn Messenger>, policy: EscalationPolicy) -> Self {
        Self {
            registry: Registry::new(),
            messenger,
            policy: Arc::new(policy),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn messenger(&self) -> &dyn Messenger {
        self.messenger.as_ref()
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Post the request's message and, for a positive interval, start
    /// nagging the monitored user. Returns without waiting on any timer.
    pub async fn start(&self, req: MonitorRequest) -> Result<StartOutcome> {
        req.validate()?;

        let mut outcome = StartOutcome::Sent;
        if req.interval_secs > 0 {
            let session = Session::new(
                req.room_id.clone(),
                req.monitored_user_id.clone(),
                req.alert_room_id.clone(),
                Duration::from_secs(req.interval_secs as u64),
            );
            if !self.registry.create(session.clone()).await {
                warn!(room_id = %req.room_id, "room is already being monitored");
                return Ok(StartOutcome::AlreadyMonitoring);
            }
            session.start(self).await;
            outcome = StartOutcome::Monitoring {
                session_id: session.id,
            };
        }

        self.messenger.send_message(&req.room_id, &req.message).await?;
        info!(room_id = %req.room_id, user_id = %req.monitored_user_id, "wake-up message pushed");
        Ok(outcome)
    }

    /// Feed an inbound chat message to the session of its room, if any.
    pub async fn acknowledge(&self, sender_id: &str, room_id: &str, text: &str) -> Acknowledgment {
        match self.registry.lookup(room_id).await {
            Some(session) => session.acknowledge(self, sender_id, text).await,
            None => Acknowledgment::NotMonitored,
        }
    }

    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.registry.list().await
    }
}
