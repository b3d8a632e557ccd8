//! Wire protocol between the sync orchestrator and the merge server.
//!
//! `POST /notes/sync` takes a [`SyncRequest`] and answers with a
//! [`SyncResponse`] holding the user's complete non-deleted note set.
//! `GET /notes` answers with the same [`SyncResponse`] shape.
//!
//! Note ids are UUID strings; clients mint them as UUID v7. A body holding
//! any other id does not deserialize, so the server answers `400` and
//! writes nothing from that batch.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Note, NoteId, SyncStatus};

/// Default cap on notes accepted in a single sync batch
pub const DEFAULT_MAX_BATCH_NOTES: usize = 1000;

/// A client's claim about one note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteInput {
    pub id: NoteId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub last_modified: i64,
    #[serde(default)]
    pub is_deleted: bool,
    /// Only used when the server has never seen the note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// The server's authoritative copy of one note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCanonical {
    pub id: NoteId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub last_modified: i64,
    pub created_at: i64,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Body of `POST /notes/sync`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub notes: Vec<NoteInput>,
}

/// Body of every successful sync or list response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub notes: Vec<NoteCanonical>,
}

/// Reasons a sync batch is refused before anything is written
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("batch holds {count} notes, more than the limit of {max}")]
    TooManyNotes { count: usize, max: usize },
    #[error("note {0} has a negative lastModified")]
    NegativeTimestamp(NoteId),
    #[error("note {0} has a negative createdAt")]
    NegativeCreatedAt(NoteId),
}

impl SyncRequest {
    /// Build a request from local notes, dropping client-only fields
    pub fn from_notes<'a>(notes: impl IntoIterator<Item = &'a Note>) -> Self {
        Self {
            notes: notes.into_iter().map(NoteInput::from).collect(),
        }
    }

    /// Check the batch shape. Duplicate IDs are allowed: the merge is order
    /// independent, so they resolve to the newest copy.
    pub fn validate(&self, max_notes: usize) -> Result<(), ProtocolError> {
        if self.notes.len() > max_notes {
            return Err(ProtocolError::TooManyNotes {
                count: self.notes.len(),
                max: max_notes,
            });
        }

        for note in &self.notes {
            if note.last_modified < 0 {
                return Err(ProtocolError::NegativeTimestamp(note.id));
            }
            if note.created_at.is_some_and(|created_at| created_at < 0) {
                return Err(ProtocolError::NegativeCreatedAt(note.id));
            }
        }

        Ok(())
    }
}

impl From<&Note> for NoteInput {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            title: note.title.clone(),
            content: note.content.clone(),
            tags: note.tags.clone(),
            last_modified: note.last_modified,
            is_deleted: note.is_deleted,
            created_at: Some(note.created_at),
        }
    }
}

impl From<NoteCanonical> for Note {
    fn from(canonical: NoteCanonical) -> Self {
        Self {
            id: canonical.id,
            title: canonical.title,
            content: canonical.content,
            tags: canonical.tags,
            last_modified: canonical.last_modified,
            created_at: canonical.created_at,
            is_deleted: canonical.is_deleted,
            sync_status: SyncStatus::Synced,
        }
    }
}
