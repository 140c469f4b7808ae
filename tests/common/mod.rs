#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tg_tagbot::chat::{ChatService, DeliveryError};
use tg_tagbot::config::DeliveryPolicy;
use tg_tagbot::entities::{Entity, EntityKind, InboundMessage};
use tg_tagbot::model::MessageRef;
use tokio::sync::Mutex;

pub const CHAT_ID: i64 = -1001234567890;

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn fast_policy(attempts: u32) -> DeliveryPolicy {
    DeliveryPolicy {
        timeout: Duration::from_millis(200),
        attempts,
        backoff: Duration::from_millis(1),
    }
}

/// Build a message from `sender`, locating each `(kind, needle)` span in `text`.
pub fn message(sender: &str, text: &str, spans: Vec<(EntityKind, &str)>) -> InboundMessage {
    let entities = spans
        .into_iter()
        .map(|(kind, needle)| {
            let byte = text.find(needle).expect("needle in text");
            let offset = text[..byte].encode_utf16().count();
            Entity::new(kind, offset, needle.encode_utf16().count())
        })
        .collect();
    InboundMessage {
        chat_id: CHAT_ID,
        message_id: 77,
        chat_title: Some("Study Hall".into()),
        sender_handle: Some(sender.to_string()),
        sender_name: sender.to_uppercase(),
        text: text.to_string(),
        entities,
    }
}

/// Scripted outcome for one `send_private` call.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Transient,
    Permanent,
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: i64,
    pub text: String,
    pub reply_to: Option<i32>,
}

#[derive(Clone, Default)]
pub struct RecordingChat {
    replies: Arc<Mutex<Vec<Reply>>>,
    private_calls: Arc<Mutex<Vec<i64>>>,
    delivered: Arc<Mutex<Vec<(i64, String)>>>,
    deleted: Arc<Mutex<Vec<MessageRef>>>,
    script: Arc<Mutex<HashMap<i64, VecDeque<Outcome>>>>,
    fail_replies: Arc<Mutex<bool>>,
    hang_replies: Arc<Mutex<bool>>,
}

impl RecordingChat {
    pub async fn script(&self, recipient: i64, outcomes: Vec<Outcome>) {
        self.script
            .lock()
            .await
            .insert(recipient, VecDeque::from(outcomes));
    }

    pub async fn fail_replies(&self) {
        *self.fail_replies.lock().await = true;
    }

    pub async fn hang_replies(&self) {
        *self.hang_replies.lock().await = true;
    }

    pub async fn replies(&self) -> Vec<Reply> {
        self.replies.lock().await.clone()
    }

    pub async fn last_reply_text(&self) -> String {
        self.replies
            .lock()
            .await
            .last()
            .map(|r| r.text.clone())
            .unwrap_or_default()
    }

    /// Recipients of successful private sends.
    pub async fn delivered_to(&self) -> Vec<i64> {
        self.delivered.lock().await.iter().map(|(id, _)| *id).collect()
    }

    pub async fn delivered(&self) -> Vec<(i64, String)> {
        self.delivered.lock().await.clone()
    }

    pub async fn attempts_for(&self, recipient: i64) -> usize {
        self.private_calls
            .lock()
            .await
            .iter()
            .filter(|id| **id == recipient)
            .count()
    }

    pub async fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl ChatService for RecordingChat {
    async fn send_reply(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<(), DeliveryError> {
        if *self.hang_replies.lock().await {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if *self.fail_replies.lock().await {
            return Err(DeliveryError::Transient("chat unavailable".into()));
        }
        self.replies.lock().await.push(Reply {
            chat_id,
            text: text.to_string(),
            reply_to,
        });
        Ok(())
    }

    async fn send_private(
        &self,
        recipient_id: i64,
        text: &str,
        _quoted: Option<MessageRef>,
    ) -> Result<(), DeliveryError> {
        self.private_calls.lock().await.push(recipient_id);
        let next = self
            .script
            .lock()
            .await
            .get_mut(&recipient_id)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Outcome::Transient) => Err(DeliveryError::Transient("network down".into())),
            Some(Outcome::Permanent) => Err(DeliveryError::Permanent("chat not found".into())),
            Some(Outcome::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
            None => {
                self.delivered
                    .lock()
                    .await
                    .push((recipient_id, text.to_string()));
                Ok(())
            }
        }
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), DeliveryError> {
        self.deleted.lock().await.push(message);
        Ok(())
    }
}
