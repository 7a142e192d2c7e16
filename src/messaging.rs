//! Outbound messages to LINE.

use crate::error::{Error, Result};
use crate::policy::Notification;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_LINE_API_BASE: &str = "https://api.line.me";

/// Something that can post into a chat room.
#[async_trait]
pub trait Messenger: Send + Sync + 'static {
    async fn send_message(&self, room_id: &str, text: &str) -> Result<()>;

    async fn send_sticker(&self, room_id: &str, package_id: &str, sticker_id: &str) -> Result<()>;

    /// Best effort: failures are logged, never returned.
    async fn notify(&self, room_id: &str, notification: &Notification) {
        if let Err(e) = self.send_message(room_id, &notification.text).await {
            warn!(room_id, "failed to send message: {}", e);
        }
        if let Some(sticker) = &notification.sticker {
            if let Err(e) = self
                .send_sticker(room_id, &sticker.package_id, &sticker.sticker_id)
                .await
            {
                warn!(room_id, "failed to send sticker: {}", e);
            }
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Message<'a> {
    Text {
        text: &'a str,
    },
    Sticker {
        #[serde(rename = "packageId")]
        package_id: &'a str,
        #[serde(rename = "stickerId")]
        sticker_id: &'a str,
    },
}

/// Client for the LINE Messaging API push endpoint.
#[derive(Clone)]
pub struct LineClient {
    http: reqwest::Client,
    api_base: String,
    channel_token: String,
}

impl LineClient {
    pub fn new(api_base: impl Into<String>, channel_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            channel_token: channel_token.into(),
        })
    }

    async fn push(&self, room_id: &str, message: Message<'_>) -> Result<()> {
        let url = format!("{}/v2/bot/message/push", self.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.channel_token)
            .json(&json!({ "to": room_id, "messages": [message] }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for LineClient {
    async fn send_message(&self, room_id: &str, text: &str) -> Result<()> {
        self.push(room_id, Message::Text { text }).await?;
        info!(room_id, "message pushed");
        Ok(())
    }

    async fn send_sticker(&self, room_id: &str, package_id: &str, sticker_id: &str) -> Result<()> {
        self.push(
            room_id,
            Message::Sticker {
                package_id,
                sticker_id,
            },
        )
        .await
    }
}
