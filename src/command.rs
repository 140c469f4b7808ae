//! Classification of `/tagadd`, `/tagdel` and `/taglist` commands into typed
//! requests. Nothing here touches the store or the network.

use crate::entities::{self, EntityKind, InboundMessage};
use crate::model::TagGroup;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/([A-Za-z0-9_]+)(?:@([A-Za-z0-9_]+))?(?:\s|$)").expect("valid command regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagCommand {
    Add(TagGroup),
    /// Normalized group names to remove.
    Delete(Vec<String>),
    List,
}

impl TagCommand {
    pub fn name(&self) -> &'static str {
        match self {
            TagCommand::Add(_) => "tagadd",
            TagCommand::Delete(_) => "tagdel",
            TagCommand::List => "taglist",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParsingError {
    #[error("Expected {expected} {what}, got {actual}.")]
    EntityCount {
        what: &'static str,
        expected: &'static str,
        actual: usize,
    },
    #[error("Users without a @username can't be tagged: {}", .names.join(", "))]
    UnsupportedTextMentions { names: Vec<String> },
}

/// Commands the bot answers to, with their menu descriptions.
pub const COMMANDS: [(&str, &str); 3] = [
    ("taglist", "Lists available tags"),
    ("tagadd", "Adds a tag group"),
    ("tagdel", "Deletes a tag group"),
];

/// Usage hint shown after a parsing error.
pub fn usage(command: &str) -> &'static str {
    match command {
        "tagadd" => "/tagadd [emoji] #group @user1 @user2 ...",
        "tagdel" => "/tagdel #group1 #group2 ...",
        _ => "/taglist",
    }
}

/// Text sent back to the chat for a malformed command.
pub fn error_reply(command: &str, err: &ParsingError) -> String {
    format!("{}\n\nPlease use the following format:\n{}", err, usage(command))
}

/// Name of the slash command at the start of `text`, if any.
///
/// A `@botname` suffix addressed to another bot yields `None`.
pub fn command_name<'a>(text: &'a str, bot_username: Option<&str>) -> Option<&'a str> {
    let caps = COMMAND_RE.captures(text.trim_start())?;
    if let (Some(target), Some(me)) = (caps.get(2), bot_username) {
        if !target.as_str().eq_ignore_ascii_case(me.trim_start_matches('@')) {
            return None;
        }
    }
    caps.get(1).map(|m| m.as_str())
}

/// Classify a message. `None` means it is not one of the tag commands.
pub fn parse_command(
    msg: &InboundMessage,
    bot_username: Option<&str>,
) -> Option<Result<TagCommand, ParsingError>> {
    let name = command_name(&msg.text, bot_username)?;
    let parsed = match name.to_ascii_lowercase().as_str() {
        "tagadd" => parse_tagadd(msg),
        "tagdel" => parse_tagdel(msg),
        "taglist" => Ok(TagCommand::List),
        _ => return None,
    };
    Some(parsed)
}

fn count(msg: &InboundMessage, pick: impl Fn(&EntityKind) -> bool) -> usize {
    msg.entities.iter().filter(|e| pick(&e.kind)).count()
}

fn reject_text_mentions(msg: &InboundMessage) -> Result<(), ParsingError> {
    let names: Vec<String> = msg
        .entities
        .iter()
        .filter_map(|e| match &e.kind {
            EntityKind::TextMention { display_name } => Some(display_name.clone()),
            _ => None,
        })
        .collect();
    if names.is_empty() {
        Ok(())
    } else {
        Err(ParsingError::UnsupportedTextMentions { names })
    }
}

fn parse_tagadd(msg: &InboundMessage) -> Result<TagCommand, ParsingError> {
    reject_text_mentions(msg)?;

    let hashtags = count(msg, |k| matches!(k, EntityKind::Hashtag));
    if hashtags != 1 {
        return Err(ParsingError::EntityCount {
            what: "#group",
            expected: "exactly one",
            actual: hashtags,
        });
    }
    let mentions = count(msg, |k| matches!(k, EntityKind::Mention));
    if mentions == 0 {
        return Err(ParsingError::EntityCount {
            what: "@mention",
            expected: "at least one",
            actual: 0,
        });
    }

    let resolved = entities::resolve(msg);
    let Some(group) = resolved.hashtags.first() else {
        return Err(ParsingError::EntityCount {
            what: "#group",
            expected: "exactly one",
            actual: 0,
        });
    };
    let tags = resolved.mentions.iter().map(|t| t.display.clone()).collect();
    let label = entities::text_outside_entities(msg);

    Ok(TagCommand::Add(TagGroup::new(msg.chat_id, &group.key, &label, tags)))
}

fn parse_tagdel(msg: &InboundMessage) -> Result<TagCommand, ParsingError> {
    reject_text_mentions(msg)?;

    let resolved = entities::resolve(msg);
    if resolved.hashtags.is_empty() {
        return Err(ParsingError::EntityCount {
            what: "#group",
            expected: "at least one",
            actual: 0,
        });
    }
    Ok(TagCommand::Delete(resolved.hashtag_keys()))
}
