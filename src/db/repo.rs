use super::model::TagGroupRow;
use crate::model::{normalize_group, TagGroup, UpsertStatus};
use anyhow::{bail, Context, Result};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, instrument};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. In-memory and
/// non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query_part {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) => format!("{}&mode=rwc", q),
        None => "mode=rwc".to_string(),
    };
    format!("sqlite://{}?{}", expanded_path, query)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Fetch groups for a chat, ordered by name.
///
/// `None` returns every group in the chat; `Some(names)` returns only the
/// matching ones (names are normalized first, so `#Study` finds `study`).
#[instrument(skip_all, fields(chat_id = chat_id))]
pub async fn get_tag_groups(
    pool: &Pool,
    chat_id: i64,
    names: Option<&[String]>,
) -> Result<Vec<TagGroup>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT chat_id, group_name, label, tags FROM tag_groups WHERE chat_id = ",
    );
    qb.push_bind(chat_id);
    if let Some(names) = names {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        qb.push(" AND group_name IN (");
        let mut list = qb.separated(", ");
        for name in names {
            list.push_bind(normalize_group(name));
        }
        list.push_unseparated(")");
    }
    qb.push(" ORDER BY group_name");

    let rows: Vec<TagGroupRow> = qb
        .build_query_as::<TagGroupRow>()
        .fetch_all(pool)
        .await
        .context("failed to load tag groups")?;
    rows.into_iter().map(TagGroupRow::into_group).collect()
}

/// Insert a group or fully replace an existing one, in one statement.
///
/// `revision` starts at 1 and the conflict branch increments it, so the
/// returned value tells which branch ran without a separate existence read.
#[instrument(skip_all, fields(chat_id = group.chat_id, group = %group.name))]
pub async fn upsert_tag_group(pool: &Pool, group: &TagGroup) -> Result<UpsertStatus> {
    if group.name.is_empty() {
        bail!("tag group name must be non-empty");
    }
    if group.tags.is_empty() {
        bail!("tag group {} must contain at least one tag", group.name);
    }
    let tags = serde_json::to_string(&group.tags)?;

    let revision: i64 = sqlx::query_scalar(
        "INSERT INTO tag_groups (chat_id, group_name, label, tags) VALUES (?, ?, ?, ?) \
         ON CONFLICT (chat_id, group_name) DO UPDATE SET \
             label = excluded.label, \
             tags = excluded.tags, \
             revision = tag_groups.revision + 1, \
             updated_at = CURRENT_TIMESTAMP \
         RETURNING revision",
    )
    .bind(group.chat_id)
    .bind(&group.name)
    .bind(&group.label)
    .bind(tags)
    .fetch_one(pool)
    .await
    .context("failed to upsert tag group")?;

    let status = if revision == 1 {
        UpsertStatus::Inserted
    } else {
        UpsertStatus::Updated
    };
    debug!(revision, status = status.as_str(), "upserted tag group");
    Ok(status)
}

/// Remove the named groups in one batch and return the names actually
/// removed, in request order. Unknown names are left out of the result.
#[instrument(skip_all, fields(chat_id = chat_id))]
pub async fn delete_tag_groups(pool: &Pool, chat_id: i64, names: &[String]) -> Result<Vec<String>> {
    let requested = dedup_group_names(names);
    if requested.is_empty() {
        return Ok(Vec::new());
    }

    let mut tx = pool.begin().await?;
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("DELETE FROM tag_groups WHERE chat_id = ");
    qb.push_bind(chat_id);
    qb.push(" AND group_name IN (");
    let mut list = qb.separated(", ");
    for name in &requested {
        list.push_bind(name.clone());
    }
    list.push_unseparated(") RETURNING group_name");

    let removed: Vec<String> = qb
        .build_query_scalar::<String>()
        .fetch_all(&mut *tx)
        .await
        .context("failed to delete tag groups")?;
    tx.commit().await?;

    let removed: HashSet<String> = removed.into_iter().collect();
    Ok(requested.into_iter().filter(|n| removed.contains(n)).collect())
}

fn dedup_group_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| normalize_group(n))
        .filter(|n| !n.is_empty() && seen.insert(n.clone()))
        .collect()
}
