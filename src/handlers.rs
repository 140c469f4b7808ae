use crate::command::{self, TagCommand};
use crate::db::Pool;
use crate::dispatch::Dispatcher;
use crate::entities::InboundMessage;
use crate::tags;
use anyhow::Result;
use teloxide::types::Message;
use tracing::{instrument, warn};

/// Reply sent when the group store fails.
pub const GENERIC_FAILURE: &str = "Something went wrong, please try again later.";

/// Shared state handed to every update.
#[derive(Clone)]
pub struct App {
    pub pool: Pool,
    pub dispatcher: Dispatcher,
    pub bot_username: Option<String>,
}

#[instrument(skip_all)]
pub async fn handle_update(app: &App, msg: &Message) -> Result<()> {
    let Some(inbound) = crate::telegram::inbound_from_message(msg) else {
        return Ok(());
    };
    handle_inbound(app, &inbound).await
}

/// Route one message: tag commands get a confirmation, everything else goes
/// through the fan-out dispatcher.
#[instrument(skip_all, fields(chat_id = msg.chat_id, message_id = msg.message_id))]
pub async fn handle_inbound(app: &App, msg: &InboundMessage) -> Result<()> {
    match command::parse_command(msg, app.bot_username.as_deref()) {
        Some(Ok(cmd)) => handle_command(app, msg, &cmd).await,
        Some(Err(err)) => {
            let name = command::command_name(&msg.text, None)
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            warn!(%err, command = %name, "rejected malformed command");
            let text = teloxide::utils::html::escape(&command::error_reply(&name, &err));
            reply(app, msg, &text).await;
            Ok(())
        }
        None => {
            app.dispatcher.dispatch(&app.pool, msg).await?;
            Ok(())
        }
    }
}

async fn handle_command(app: &App, msg: &InboundMessage, cmd: &TagCommand) -> Result<()> {
    match tags::execute(&app.pool, msg.chat_id, cmd).await {
        Ok(text) => {
            if let Err(err) = app.dispatcher.send_reply(msg.chat_id, &text, None).await {
                warn!(%err, "failed to send command confirmation");
            }
            Ok(())
        }
        Err(err) => {
            reply(app, msg, GENERIC_FAILURE).await;
            Err(err.context(format!("/{} failed", cmd.name())))
        }
    }
}

async fn reply(app: &App, msg: &InboundMessage, text: &str) {
    if let Err(err) = app
        .dispatcher
        .send_reply(msg.chat_id, text, Some(msg.message_id))
        .await
    {
        warn!(%err, "failed to reply");
    }
}
