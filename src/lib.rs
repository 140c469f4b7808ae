//! Telegram bot that lets chat members define hashtag groups of `@handles`,
//! expands those hashtags into mention lists and forwards private copies to
//! watch-listed users.

pub mod chat;
pub mod command;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod entities;
pub mod handlers;
pub mod model;
pub mod tags;
pub mod telegram;
