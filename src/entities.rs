//! Platform-neutral view of an inbound message and extraction of the hashtag
//! and mention tokens it carries.
//!
//! Entity offsets and lengths are in UTF-16 code units, as Telegram sends them.

use crate::model::{normalize_group, normalize_handle};
use std::collections::HashSet;

/// Kind of a structured span inside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Hashtag,
    /// `@handle` mention.
    Mention,
    /// Mention of a user without a public handle; only a display name is known.
    TextMention { display_name: String },
    BotCommand,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

impl Entity {
    pub fn new(kind: EntityKind, offset: usize, length: usize) -> Self {
        Self { kind, offset, length }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub chat_title: Option<String>,
    pub sender_handle: Option<String>,
    pub sender_name: String,
    pub text: String,
    pub entities: Vec<Entity>,
}

impl InboundMessage {
    /// Normalized handle of the sender, if they have one.
    pub fn sender_key(&self) -> Option<String> {
        self.sender_handle
            .as_deref()
            .map(normalize_handle)
            .filter(|h| !h.is_empty())
    }

    /// `@handle` when available, otherwise the display name.
    pub fn sender_display(&self) -> String {
        match self.sender_handle.as_deref() {
            Some(h) if !h.is_empty() => format!("@{}", h.trim_start_matches('@')),
            _ => self.sender_name.clone(),
        }
    }

    pub fn span_text(&self, entity: &Entity) -> Option<String> {
        utf16_slice(&self.text, entity.offset, entity.length)
    }
}

/// A hashtag or mention as typed (`display`) plus its comparison key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub display: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    pub hashtags: Vec<Token>,
    pub mentions: Vec<Token>,
    /// Display names of handle-less mentions.
    pub text_mentions: Vec<String>,
}

impl Resolved {
    pub fn hashtag_keys(&self) -> Vec<String> {
        self.hashtags.iter().map(|t| t.key.clone()).collect()
    }
}

/// Extract hashtags and mentions, deduplicated by key in order of first
/// appearance.
pub fn resolve(msg: &InboundMessage) -> Resolved {
    let mut out = Resolved::default();
    let mut seen_tags = HashSet::new();
    let mut seen_mentions = HashSet::new();

    for entity in &msg.entities {
        match &entity.kind {
            EntityKind::Hashtag => {
                let Some(display) = msg.span_text(entity) else { continue };
                let key = normalize_group(&display);
                if !key.is_empty() && seen_tags.insert(key.clone()) {
                    out.hashtags.push(Token { display, key });
                }
            }
            EntityKind::Mention => {
                let Some(display) = msg.span_text(entity) else { continue };
                let key = normalize_handle(&display);
                if !key.is_empty() && seen_mentions.insert(key.clone()) {
                    out.mentions.push(Token { display, key });
                }
            }
            EntityKind::TextMention { display_name } => {
                out.text_mentions.push(display_name.clone());
            }
            EntityKind::BotCommand | EntityKind::Other => {}
        }
    }
    out
}

/// Message text with every entity span removed, whitespace collapsed.
pub fn text_outside_entities(msg: &InboundMessage) -> String {
    let units: Vec<u16> = msg.text.encode_utf16().collect();
    let mut keep = vec![true; units.len()];
    for e in &msg.entities {
        let end = e.offset.saturating_add(e.length).min(units.len());
        for flag in keep.iter_mut().take(end).skip(e.offset) {
            *flag = false;
        }
    }
    let kept: Vec<u16> = units
        .into_iter()
        .zip(keep)
        .filter_map(|(u, k)| k.then_some(u))
        .collect();
    String::from_utf16_lossy(&kept)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn utf16_slice(text: &str, offset: usize, length: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = offset.checked_add(length)?;
    let slice = units.get(offset..end)?;
    String::from_utf16(slice).ok()
}


#[cfg(test)]
pub(crate) use tests::message as test_message;
