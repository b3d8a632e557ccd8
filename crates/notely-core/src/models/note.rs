//! Note model

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::SyncStatus;
use crate::util::now_millis;

/// A unique identifier for a note, using UUID v7 (time-sortable)
///
/// Assigned by the client at creation time and never regenerated; it is the
/// only identity used to match client and server records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A note as held on the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    /// Title, empty by default
    #[serde(default)]
    pub title: String,
    /// Body text, empty by default
    #[serde(default)]
    pub content: String,
    /// Tag set; duplicates collapse
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Wall-clock time of the last mutation (Unix ms); drives conflict resolution
    pub last_modified: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Soft delete flag for sync
    #[serde(default)]
    pub is_deleted: bool,
    /// Client-only sync state
    #[serde(default)]
    pub sync_status: SyncStatus,
}

/// Fields for a note that does not exist yet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// Partial update; `None` leaves the field as it is
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl NotePatch {
    /// True when the patch would not change any field
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.tags.is_none()
    }
}

impl Note {
    /// Create a new pending note from a draft
    #[must_use]
    pub fn new(draft: NoteDraft) -> Self {
        let now = now_millis();
        Self {
            id: NoteId::new(),
            title: draft.title,
            content: draft.content,
            tags: normalize_tags(draft.tags),
            last_modified: now,
            created_at: now,
            is_deleted: false,
            sync_status: SyncStatus::Pending,
        }
    }

    /// Record a local mutation: bump `last_modified` and mark the note pending.
    ///
    /// The new timestamp is strictly greater than the previous one even if the
    /// wall clock has not advanced, so the server sees the edit as newer.
    pub fn touch(&mut self) {
        self.last_modified = now_millis().max(self.last_modified.saturating_add(1));
        self.sync_status = SyncStatus::Pending;
    }

    /// Apply a partial update and record it as a mutation
    pub fn apply_patch(&mut self, patch: NotePatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(tags) = patch.tags {
            self.tags = normalize_tags(tags);
        }
        self.touch();
    }

    /// Soft delete, propagated like any other content change
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
        self.touch();
    }

    /// Title, or the first content line when the title is blank, truncated to
    /// `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            self.content.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.trim().chars().take(max_len).collect()
    }
}

/// Collapse a tag list into a set, trimming whitespace and dropping empties
#[must_use]
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| tag.as_ref().trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Extract #tags from text
///
/// Valid tags match the pattern: `#[a-zA-Z][a-zA-Z0-9_-]*`
/// Tags are returned in lowercase and deduplicated.
///
/// # Examples
///
/// ```
/// use notely_core::models::extract_tags;
///
/// let tags = extract_tags("Hello #world this is #Rust-lang");
/// assert!(tags.contains(&"world".to_string()));
/// assert!(tags.contains(&"rust-lang".to_string()));
/// ```
#[must_use]
pub fn extract_tags(text: &str) -> Vec<String> {
    let re = Regex::new(r"#([a-zA-Z][a-zA-Z0-9_-]*)").expect("Invalid regex");
    re.captures_iter(text)
        .map(|cap| cap[1].to_lowercase())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect()
}
