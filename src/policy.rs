//! Escalation policy: what to say on each reminder and when to give up.
//!
//! Everything here is pure. The session decides *when* to ask; the policy
//! only answers *what next*.

use regex::Regex;

/// Retry limit used unless configured otherwise.
pub const DEFAULT_RETRY_LIMIT: u32 = 5;

/// A LINE sticker reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sticker {
    pub package_id: String,
    pub sticker_id: String,
}

impl Sticker {
    pub fn new(package_id: impl Into<String>, sticker_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            sticker_id: sticker_id.into(),
        }
    }
}

/// Text plus an optional sticker, sent to one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub sticker: Option<Sticker>,
}

impl Notification {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sticker: None,
        }
    }

    pub fn with_sticker(text: impl Into<String>, sticker: Sticker) -> Self {
        Self {
            text: text.into(),
            sticker: Some(sticker),
        }
    }
}

/// Messages produced when the alert room has to be told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertReport {
    pub alert_room_id: String,
    /// Posted in the monitored room, naming who is being told.
    pub room_notice: Notification,
    /// Posted in the alert room.
    pub report: Notification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Send a reminder and keep going.
    Remind(Notification),
    /// Retry limit reached.
    Exhausted {
        notification: Notification,
        alert: Option<AlertReport>,
    },
}

#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    limit: u32,
    acknowledgment: Regex,
}

impl EscalationPolicy {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            // "おはよ" plus at least one more character: おはよう, おはよー, ...
            acknowledgment: Regex::new(r"^おはよ.").expect("static pattern"),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_exhausted(&self, repeat_count: u32) -> bool {
        repeat_count >= self.limit
    }

    /// Decide the next step for a session that has sent `repeat_count`
    /// reminders so far.
    pub fn decide(&self, repeat_count: u32, room_id: &str, alert_room_id: Option<&str>) -> Decision {
        if !self.is_exhausted(repeat_count) {
            return Decision::Remind(Notification::with_sticker(
                "おーい。起きてるかー？？",
                Sticker::new("11537", "52002744"),
            ));
        }

        let alert = alert_room_id
            .filter(|id| !id.is_empty())
            .map(|alert_room_id| AlertReport {
                alert_room_id: alert_room_id.to_string(),
                room_notice: Notification::text(format!("[INFO] ここで ID: {} に通報", alert_room_id)),
                report: Notification::text(format!(
                    "{} 回起こしたんですが反応なかったので寝てるかも😇\n(room: {})",
                    repeat_count, room_id
                )),
            });

        Decision::Exhausted {
            notification: Notification::with_sticker(
                "もう知らない！\n起きなかったら知らないからね！！",
                Sticker::new("3", "193"),
            ),
            alert,
        }
    }

    pub fn is_acknowledgment(&self, text: &str) -> bool {
        self.acknowledgment.is_match(text)
    }

    /// Reply sent when the monitored user acknowledges.
    pub fn acknowledged(&self) -> Notification {
        Notification::with_sticker(
            "おはよー！！\n今日も一日がんばるぞい☀",
            Sticker::new("11537", "52002764"),
        )
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_LIMIT)
    }
}
