//! LINE webhook decoding: signature check and text-message extraction.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Check `X-Line-Signature`: base64 of HMAC-SHA256 over the raw body.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> Result<()> {
    let expected = STANDARD
        .decode(signature.trim())
        .map_err(|_| Error::InvalidSignature)?;
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
        .map_err(|_| Error::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| Error::InvalidSignature)
}

#[cfg(test)]
pub fn sign(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes()).unwrap();
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    source: Source,
    message: Option<MessageBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Source {
    user_id: Option<String>,
    group_id: Option<String>,
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// A text message posted in a conversation the bot is a member of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender_id: String,
    /// Group id, else multi-person room id, else the sender for 1:1 chats.
    pub room_id: String,
    pub group_id: Option<String>,
    pub text: String,
}

/// Decode a webhook body into its text messages. Other event types
/// (follow, join, stickers, ...) are dropped.
pub fn parse_events(body: &[u8]) -> Result<Vec<InboundMessage>> {
    let payload: Payload = serde_json::from_slice(body)?;
    let messages = payload
        .events
        .into_iter()
        .filter(|e| e.kind == "message")
        .filter_map(|e| {
            let message = e.message?;
            if message.kind != "text" {
                return None;
            }
            let sender_id = e.source.user_id.clone().unwrap_or_default();
            let room_id = e
                .source
                .group_id
                .clone()
                .or_else(|| e.source.room_id.clone())
                .unwrap_or_else(|| sender_id.clone());
            Some(InboundMessage {
                sender_id,
                room_id,
                group_id: e.source.group_id,
                text: message.text.unwrap_or_default(),
            })
        })
        .collect();
    Ok(messages)
}
