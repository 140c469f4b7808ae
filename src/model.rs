/// Lower-case a handle and strip one leading `@`.
pub fn normalize_handle(raw: &str) -> String {
    let raw = raw.trim();
    raw.strip_prefix('@').unwrap_or(raw).to_lowercase()
}

/// Lower-case a group name and strip one leading `#`.
pub fn normalize_group(raw: &str) -> String {
    let raw = raw.trim();
    raw.strip_prefix('#').unwrap_or(raw).to_lowercase()
}

/// Outcome of an insert-or-update on a tag group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStatus {
    Inserted,
    Updated,
}

impl UpsertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertStatus::Inserted => "added",
            UpsertStatus::Updated => "updated",
        }
    }
}

/// A named set of mention handles owned by one chat.
///
/// `name` is stored normalized (no `#`, lower-cased). `tags` keep the casing
/// the author typed, including the leading `@`, and are unique under
/// [`normalize_handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagGroup {
    pub chat_id: i64,
    pub name: String,
    pub label: String,
    pub tags: Vec<String>,
}

impl TagGroup {
    pub fn new(chat_id: i64, name: &str, label: &str, tags: Vec<String>) -> Self {
        Self {
            chat_id,
            name: normalize_group(name),
            label: label.trim().to_string(),
            tags: dedup_handles(tags),
        }
    }

    /// `#name` as shown in confirmations.
    pub fn display_name(&self) -> String {
        format!("#{}", self.name)
    }

    /// One `/taglist` line: `[label ]name: alice, bob`.
    pub fn listing_line(&self) -> String {
        let handles: Vec<&str> = self
            .tags
            .iter()
            .map(|t| t.trim_start_matches('@'))
            .collect();
        if self.label.is_empty() {
            format!("{}: {}", self.name, handles.join(", "))
        } else {
            format!("{} {}: {}", self.label, self.name, handles.join(", "))
        }
    }
}

/// Ensure every handle carries `@` and drop case-insensitive duplicates,
/// keeping the first spelling seen.
pub fn dedup_handles(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let key = normalize_handle(&tag);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        let tag = tag.trim();
        if tag.starts_with('@') {
            out.push(tag.to_string());
        } else {
            out.push(format!("@{}", tag));
        }
    }
    out
}

/// Reference to a message in some chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}
