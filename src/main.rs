use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;
use tg_tagbot::chat::ChatService;
use tg_tagbot::dispatch::Dispatcher;
use tg_tagbot::handlers::{self, App};
use tg_tagbot::telegram::{self, TelegramChat};
use tg_tagbot::{config, db};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.default_database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let bot_username = match bot.get_me().await {
        Ok(me) => me.user.username.clone(),
        Err(err) => {
            warn!(?err, "failed to fetch bot identity; accepting any @bot suffix");
            None
        }
    };
    if let Err(err) = telegram::set_commands(&bot).await {
        warn!(?err, "failed to register bot commands");
    }

    // The watch-list is fixed for the lifetime of the process.
    let watch_list = Arc::new(cfg.watch_list());
    let chat: Arc<dyn ChatService> = Arc::new(TelegramChat::new(bot.clone()));
    let dispatcher = Dispatcher::new(chat, watch_list.clone(), cfg.delivery_policy())
        .with_repost(cfg.telegram.repost_tagged_messages);
    let app = App {
        pool,
        dispatcher,
        bot_username,
    };

    info!(watched = watch_list.entries().len(), "starting telegram bot");
    teloxide::repl(bot, move |_bot: Bot, msg: Message| {
        let app = app.clone();
        async move {
            if let Err(err) = handlers::handle_update(&app, &msg).await {
                error!(?err, "failed to handle update");
            }
            respond(())
        }
    })
    .await;

    Ok(())
}
