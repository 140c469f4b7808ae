//! Execution of validated tag commands against the group store.

use crate::command::TagCommand;
use crate::db::{self, Pool};
use crate::model::{normalize_group, TagGroup, UpsertStatus};
use anyhow::Result;
use std::collections::HashSet;
use teloxide::utils::html;
use tracing::{info, instrument};

pub const NO_GROUPS: &str =
    "<i>There are no configured groups.</i>\nUse /tagadd to create a new group.";

/// Run a command and return the (HTML) confirmation text for the chat.
#[instrument(skip_all, fields(chat_id = chat_id, command = command.name()))]
pub async fn execute(pool: &Pool, chat_id: i64, command: &TagCommand) -> Result<String> {
    match command {
        TagCommand::Add(group) => add(pool, group).await,
        TagCommand::Delete(names) => delete(pool, chat_id, names).await,
        TagCommand::List => list(pool, chat_id).await,
    }
}

async fn add(pool: &Pool, group: &TagGroup) -> Result<String> {
    let status = db::upsert_tag_group(pool, group).await?;
    info!(group = %group.name, tags = group.tags.len(), status = status.as_str(), "saved tag group");
    let text = match status {
        UpsertStatus::Inserted => format!("Group {} added!", group.display_name()),
        UpsertStatus::Updated => format!("Group {} updated!", group.display_name()),
    };
    Ok(html::escape(&text))
}

async fn delete(pool: &Pool, chat_id: i64, names: &[String]) -> Result<String> {
    let removed = db::delete_tag_groups(pool, chat_id, names).await?;
    info!(requested = names.len(), removed = removed.len(), "deleted tag groups");
    Ok(html::escape(&deletion_report(names, &removed)))
}

async fn list(pool: &Pool, chat_id: i64) -> Result<String> {
    let groups = db::get_tag_groups(pool, chat_id, None).await?;
    Ok(render_list(&groups))
}

/// `/tagdel` confirmation. Names not in `removed` are reported as not found.
pub fn deletion_report(requested: &[String], removed: &[String]) -> String {
    let removed_set: HashSet<&str> = removed.iter().map(String::as_str).collect();
    let requested: Vec<String> = requested.iter().map(|n| normalize_group(n)).collect();
    let mut seen = HashSet::new();
    let missing: Vec<String> = requested
        .iter()
        .filter(|n| !removed_set.contains(n.as_str()) && seen.insert(n.as_str()))
        .map(|n| format!("#{}", n))
        .collect();
    let removed: Vec<String> = removed.iter().map(|n| format!("#{}", n)).collect();

    let mut lines = Vec::new();
    if !removed.is_empty() {
        lines.push(format!(
            "The following groups have been removed: {}",
            removed.join(", ")
        ));
    }
    if !missing.is_empty() {
        lines.push(format!(
            "The following groups were not found: {}",
            missing.join(", ")
        ));
    }
    lines.join("\n")
}

/// `/taglist` body, one line per group.
pub fn render_list(groups: &[TagGroup]) -> String {
    if groups.is_empty() {
        return NO_GROUPS.to_string();
    }
    let lines: Vec<String> = groups
        .iter()
        .map(|g| html::escape(&g.listing_line()))
        .collect();
    format!("<b>Groups:</b>\n\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn add_cmd(name: &str, tags: &[&str]) -> TagCommand {
        TagCommand::Add(TagGroup::new(
            5,
            name,
            "",
            tags.iter().map(|t| t.to_string()).collect(),
        ))
    }

    #[tokio::test]
    async fn add_reports_added_then_updated() {
        let pool = setup_pool().await;
        let text = execute(&pool, 5, &add_cmd("#study", &["@alice"])).await.unwrap();
        assert_eq!(text, "Group #study added!");
        let text = execute(&pool, 5, &add_cmd("#Study", &["@bob"])).await.unwrap();
        assert_eq!(text, "Group #study updated!");
    }

    #[tokio::test]
    async fn list_round_trip() {
        let pool = setup_pool().await;
        assert_eq!(execute(&pool, 5, &TagCommand::List).await.unwrap(), NO_GROUPS);

        execute(&pool, 5, &add_cmd("#study", &["@alice", "@bob"])).await.unwrap();
        execute(&pool, 5, &add_cmd("#art", &["@carol"])).await.unwrap();
        let text = execute(&pool, 5, &TagCommand::List).await.unwrap();
        assert_eq!(text, "<b>Groups:</b>\n\nart: carol\nstudy: alice, bob");
    }

    #[tokio::test]
    async fn delete_reports_removed_and_missing() {
        let pool = setup_pool().await;
        execute(&pool, 5, &add_cmd("#study", &["@alice"])).await.unwrap();
        execute(&pool, 5, &add_cmd("#math", &["@bob"])).await.unwrap();

        let cmd = TagCommand::Delete(vec!["study".into(), "ghost".into(), "math".into()]);
        let text = execute(&pool, 5, &cmd).await.unwrap();
        assert_eq!(
            text,
            "The following groups have been removed: #study, #math\n\
             The following groups were not found: #ghost"
        );

        let cmd = TagCommand::Delete(vec!["study".into()]);
        let text = execute(&pool, 5, &cmd).await.unwrap();
        assert_eq!(text, "The following groups were not found: #study");
    }

    #[test]
    fn list_escapes_html() {
        let groups = vec![TagGroup::new(1, "#a", "<3", vec!["@x".into()])];
        assert_eq!(render_list(&groups), "<b>Groups:</b>\n\n&lt;3 a: x");
    }
}
