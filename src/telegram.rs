//! Telegram binding: converts teloxide messages into [`InboundMessage`] and
//! implements [`ChatService`] on top of a `Bot`.

use crate::chat::{message_link, ChatService, DeliveryError};
use crate::command::COMMANDS;
use crate::entities::{Entity, EntityKind, InboundMessage};
use crate::model::MessageRef;
use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, MessageEntity, MessageEntityKind, MessageId, ParseMode};
use teloxide::RequestError;

#[derive(Clone)]
pub struct TelegramChat {
    bot: Bot,
}

impl TelegramChat {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn classify(err: RequestError) -> DeliveryError {
    match err {
        RequestError::Api(api) => DeliveryError::Permanent(api.to_string()),
        other => DeliveryError::Transient(other.to_string()),
    }
}

#[async_trait]
impl ChatService for TelegramChat {
    async fn send_reply(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<(), DeliveryError> {
        let mut req = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(id) = reply_to {
            req = req
                .reply_to_message_id(MessageId(id))
                .allow_sending_without_reply(true);
        }
        req.await.map(|_| ()).map_err(classify)
    }

    async fn send_private(
        &self,
        recipient_id: i64,
        text: &str,
        quoted: Option<MessageRef>,
    ) -> Result<(), DeliveryError> {
        let text = match quoted.and_then(message_link) {
            Some(link) => format!("{}\n\n<a href=\"{}\">Open message</a>", text, link),
            None => text.to_string(),
        };
        self.bot
            .send_message(ChatId(recipient_id), text)
            .parse_mode(ParseMode::Html)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), DeliveryError> {
        self.bot
            .delete_message(ChatId(message.chat_id), MessageId(message.message_id))
            .await
            .map(|_| ())
            .map_err(classify)
    }
}

/// Register the command menu shown by Telegram clients.
pub async fn set_commands(bot: &Bot) -> Result<()> {
    let commands: Vec<BotCommand> = COMMANDS
        .iter()
        .map(|(name, description)| BotCommand::new(*name, *description))
        .collect();
    bot.set_my_commands(commands).await?;
    Ok(())
}

fn convert_entity(entity: &MessageEntity) -> Entity {
    let kind = match &entity.kind {
        MessageEntityKind::Hashtag => EntityKind::Hashtag,
        MessageEntityKind::Mention => EntityKind::Mention,
        MessageEntityKind::TextMention { user } => EntityKind::TextMention {
            display_name: user.full_name(),
        },
        MessageEntityKind::BotCommand => EntityKind::BotCommand,
        _ => EntityKind::Other,
    };
    Entity::new(kind, entity.offset, entity.length)
}

/// Build the platform-neutral view of a text (or captioned) message.
/// Returns `None` for messages without a sender or without text.
pub fn inbound_from_message(msg: &Message) -> Option<InboundMessage> {
    let user = msg.from()?;
    let (text, entities) = match (msg.text(), msg.caption()) {
        (Some(text), _) => (text, msg.entities().unwrap_or_default()),
        (None, Some(caption)) => (caption, msg.caption_entities().unwrap_or_default()),
        (None, None) => return None,
    };

    Some(InboundMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        chat_title: msg.chat.title().map(str::to_owned),
        sender_handle: user.username.clone(),
        sender_name: user.full_name(),
        text: text.to_string(),
        entities: entities.iter().map(convert_entity).collect(),
    })
}
