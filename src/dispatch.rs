//! Fan-out of tagged messages: the public mention reply and the private
//! copies sent to watch-listed users.

use crate::chat::{ChatService, DeliveryError};
use crate::config::{DeliveryPolicy, WatchEntry, WatchList};
use crate::db::{self, Pool};
use crate::entities::{self, InboundMessage};
use crate::model::{dedup_handles, normalize_handle, MessageRef, TagGroup};
use anyhow::Result;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use teloxide::utils::html;
use tracing::{debug, info, instrument, warn};

/// What a single dispatch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub replied: bool,
    pub notified: Vec<i64>,
    pub failed: Vec<i64>,
}

#[derive(Clone)]
pub struct Dispatcher {
    chat: Arc<dyn ChatService>,
    watch_list: Arc<WatchList>,
    policy: DeliveryPolicy,
    repost: bool,
}

impl Dispatcher {
    pub fn new(chat: Arc<dyn ChatService>, watch_list: Arc<WatchList>, policy: DeliveryPolicy) -> Self {
        Self {
            chat,
            watch_list,
            policy,
            repost: false,
        }
    }

    /// Delete tagged messages and repost them with the mention list instead of
    /// replying underneath.
    pub fn with_repost(mut self, repost: bool) -> Self {
        self.repost = repost;
        self
    }

    /// Handle a non-command message.
    ///
    /// Hashtags matching stored groups produce a chat reply listing the
    /// union of their tags plus any bare mentions, minus the sender. Every
    /// watch-listed handle in that union gets a private notification, the
    /// sender included. Without a group match only the bare mentions count
    /// and the sender is left out. Delivery failures are logged per recipient
    /// and never fail the dispatch.
    #[instrument(skip_all, fields(chat_id = msg.chat_id, message_id = msg.message_id))]
    pub async fn dispatch(&self, pool: &Pool, msg: &InboundMessage) -> Result<DispatchReport> {
        let resolved = entities::resolve(msg);
        let mut report = DispatchReport::default();

        let groups = if resolved.hashtags.is_empty() {
            Vec::new()
        } else {
            db::get_tag_groups(pool, msg.chat_id, Some(&resolved.hashtag_keys())).await?
        };
        let mentions = resolved.mentions.iter().map(|t| t.display.clone());

        let candidates = if groups.is_empty() {
            dedup_handles(mentions)
        } else {
            let candidates = dedup_handles(
                groups
                    .iter()
                    .flat_map(|g| g.tags.iter().cloned())
                    .chain(mentions),
            );
            let sender = msg.sender_key();
            let public: Vec<&str> = candidates
                .iter()
                .filter(|h| sender.as_deref() != Some(normalize_handle(h).as_str()))
                .map(String::as_str)
                .collect();
            if !public.is_empty() {
                report.replied = self.post_reply(msg, &groups, &public).await;
            }
            candidates
        };

        if !candidates.is_empty() && !self.watch_list.is_empty() {
            let exclude_sender = groups.is_empty();
            self.notify_watchers(msg, &candidates, exclude_sender, &mut report)
                .await;
        }
        debug!(?report, "dispatch finished");
        Ok(report)
    }

    async fn post_reply(&self, msg: &InboundMessage, groups: &[TagGroup], handles: &[&str]) -> bool {
        let handles = html::escape(&handles.join(" "));
        let original = MessageRef {
            chat_id: msg.chat_id,
            message_id: msg.message_id,
        };

        let (text, reply_to) = if self.repost {
            let labels: String = groups.iter().map(|g| g.label.as_str()).collect();
            let header = if labels.is_empty() {
                html::escape(&msg.sender_display())
            } else {
                format!("{} {}", html::escape(&labels), html::escape(&msg.sender_display()))
            };
            let text = format!(
                "<i>{}</i>\n{}\n\n<i>{}</i>",
                header,
                html::escape(&msg.text),
                handles
            );
            (text, None)
        } else {
            (handles, Some(msg.message_id))
        };

        if let Err(err) = self.send_reply(msg.chat_id, &text, reply_to).await {
            warn!(%err, "failed to send tag reply");
            return false;
        }

        if self.repost {
            if let Err(err) = self.with_timeout(self.chat.delete_message(original)).await {
                warn!(%err, "failed to delete reposted message");
            }
        }
        true
    }

    async fn notify_watchers(
        &self,
        msg: &InboundMessage,
        candidates: &[String],
        exclude_sender: bool,
        report: &mut DispatchReport,
    ) {
        let keys: HashSet<String> = candidates.iter().map(|h| normalize_handle(h)).collect();
        let sender = msg.sender_key().filter(|_| exclude_sender);

        let mut seen = HashSet::new();
        let targets: Vec<&WatchEntry> = self
            .watch_list
            .entries()
            .iter()
            .filter(|e| keys.contains(&e.handle))
            .filter(|e| sender.as_deref() != Some(e.handle.as_str()))
            .filter(|e| seen.insert(e.user_id))
            .collect();
        if targets.is_empty() {
            return;
        }

        let text = private_notification(msg);
        let quoted = MessageRef {
            chat_id: msg.chat_id,
            message_id: msg.message_id,
        };
        let results = join_all(targets.iter().map(|e| self.deliver(e.user_id, &text, quoted))).await;

        for (entry, delivered) in targets.iter().zip(results) {
            if delivered {
                report.notified.push(entry.user_id);
            } else {
                report.failed.push(entry.user_id);
            }
        }
        info!(
            notified = report.notified.len(),
            failed = report.failed.len(),
            "sent private notifications"
        );
    }

    /// Post to a chat under the delivery timeout. Not retried.
    pub async fn send_reply(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<(), DeliveryError> {
        self.with_timeout(self.chat.send_reply(chat_id, text, reply_to))
            .await
    }

    /// Send one private notification, retrying transient failures.
    async fn deliver(&self, recipient: i64, text: &str, quoted: MessageRef) -> bool {
        let attempts = self.policy.attempts.max(1);
        for attempt in 1..=attempts {
            let result = self
                .with_timeout(self.chat.send_private(recipient, text, Some(quoted)))
                .await;
            match result {
                Ok(()) => return true,
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(recipient, attempt, %err, "private notification failed; retrying");
                    tokio::time::sleep(self.policy.backoff_for(attempt)).await;
                }
                Err(err) => {
                    warn!(recipient, attempt, %err, "private notification failed; skipping");
                    return false;
                }
            }
        }
        false
    }

    async fn with_timeout<F>(&self, fut: F) -> Result<(), DeliveryError>
    where
        F: std::future::Future<Output = Result<(), DeliveryError>>,
    {
        match tokio::time::timeout(self.policy.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.policy.timeout)),
        }
    }
}

/// Body of the private copy sent to a watch-listed user.
pub fn private_notification(msg: &InboundMessage) -> String {
    let chat = msg.chat_title.as_deref().unwrap_or("a group");
    format!(
        "<b>{}</b> mentioned you in <b>{}</b>:\n\n{}",
        html::escape(&msg.sender_display()),
        html::escape(chat),
        html::escape(&msg.text)
    )
}
