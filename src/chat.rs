//! Outbound side of the chat platform.
//!
//! Everything the bot sends goes through [`ChatService`], so handlers can be
//! exercised against a recording implementation in tests.

use crate::model::MessageRef;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Network hiccup, rate limit or similar; worth another attempt.
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// The platform rejected the request (unknown chat, bot blocked, ...).
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeliveryError::Permanent(_))
    }
}

/// All text arguments are HTML-formatted.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Post into a chat, optionally as a reply to one of its messages.
    async fn send_reply(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<(), DeliveryError>;

    /// Send a private message; `quoted` points at the message that caused it.
    async fn send_private(
        &self,
        recipient_id: i64,
        text: &str,
        quoted: Option<MessageRef>,
    ) -> Result<(), DeliveryError>;

    async fn delete_message(&self, message: MessageRef) -> Result<(), DeliveryError>;
}

/// Public link to a message in a supergroup (`-100…` chat ids only).
pub fn message_link(message: MessageRef) -> Option<String> {
    let id = message.chat_id.to_string();
    let internal = id.strip_prefix("-100").filter(|s| !s.is_empty())?;
    Some(format!("https://t.me/c/{}/{}", internal, message.message_id))
}
