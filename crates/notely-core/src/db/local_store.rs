//! Local note store: the trait the sync orchestrator writes through, and its
//! libSQL implementation.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{Note, NoteId, SyncStatus};

/// Durable per-device persistence of the full note set
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// All stored notes, including soft-deleted ones
    async fn get_all(&self) -> Result<Vec<Note>>;

    /// Fetch a note by ID
    async fn get(&self, id: &NoteId) -> Result<Option<Note>>;

    /// Insert or replace a note keyed by its ID
    async fn put(&self, note: &Note) -> Result<()>;

    /// Physically remove a note. Only for client-side cleanup; user-facing
    /// deletes are soft deletes written through `put`.
    async fn remove(&self, id: &NoteId) -> Result<()>;

    /// Notes currently in the given sync status
    async fn get_by_status(&self, status: SyncStatus) -> Result<Vec<Note>>;

    /// Notes with local changes the server has not confirmed yet
    async fn get_pending(&self) -> Result<Vec<Note>> {
        self.get_by_status(SyncStatus::Pending).await
    }

    /// Move the given notes from `from` to `to`, skipping any note that is no
    /// longer in `from`. Returns the number of notes changed.
    async fn mark_status(&self, ids: &[NoteId], from: SyncStatus, to: SyncStatus)
        -> Result<usize>;
}

pub(crate) fn ensure_transition(from: SyncStatus, to: SyncStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "Illegal sync status transition: {from} -> {to}"
        )))
    }
}

const NOTE_COLUMNS: &str =
    "id, title, content, tags, last_modified, created_at, is_deleted, sync_status";

/// libSQL implementation of `LocalStore`
#[derive(Clone)]
pub struct LibSqlLocalStore {
    db: Arc<Mutex<Database>>,
}

impl LibSqlLocalStore {
    /// Open the store at the given filesystem path, creating parent directories
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::open(path).await?;
        tracing::debug!("Opened local note store at {}", path.display());
        Ok(Self::from_database(db))
    }

    /// Open an in-memory store (primarily for tests)
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory().await?))
    }

    /// Wrap an already opened database
    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    async fn query_notes(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Note>> {
        let db = self.db.lock().await;
        let mut rows = db.connection().query(sql, params).await?;

        let mut notes = Vec::new();
        while let Some(row) = rows.next().await? {
            notes.push(Self::parse_note(&row)?);
        }
        Ok(notes)
    }

    /// Parse a note from a database row selected with `NOTE_COLUMNS`
    fn parse_note(row: &libsql::Row) -> Result<Note> {
        let id: String = row.get(0)?;
        let tags: String = row.get(3)?;
        let status: String = row.get(7)?;

        Ok(Note {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid note id in local store: {id}")))?,
            title: row.get(1)?,
            content: row.get(2)?,
            tags: serde_json::from_str::<BTreeSet<String>>(&tags)?,
            last_modified: row.get(4)?,
            created_at: row.get(5)?,
            is_deleted: row.get::<i32>(6)? != 0,
            sync_status: status.parse()?,
        })
    }
}

#[async_trait]
impl LocalStore for LibSqlLocalStore {
    async fn get_all(&self) -> Result<Vec<Note>> {
        self.query_notes(
            &format!("SELECT {NOTE_COLUMNS} FROM local_notes ORDER BY last_modified DESC"),
            (),
        )
        .await
    }

    async fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        let mut notes = self
            .query_notes(
                &format!("SELECT {NOTE_COLUMNS} FROM local_notes WHERE id = ?"),
                [id.as_str()],
            )
            .await?;
        Ok(notes.pop())
    }

    async fn put(&self, note: &Note) -> Result<()> {
        let tags = serde_json::to_string(&note.tags)?;
        let db = self.db.lock().await;
        db.connection()
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO local_notes ({NOTE_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                libsql::params![
                    note.id.as_str(),
                    note.title.clone(),
                    note.content.clone(),
                    tags,
                    note.last_modified,
                    note.created_at,
                    i64::from(note.is_deleted),
                    note.sync_status.as_str()
                ],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &NoteId) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute("DELETE FROM local_notes WHERE id = ?", [id.as_str()])
            .await?;
        Ok(())
    }

    async fn get_by_status(&self, status: SyncStatus) -> Result<Vec<Note>> {
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS} FROM local_notes
                 WHERE sync_status = ?
                 ORDER BY last_modified DESC"
            ),
            [status.as_str()],
        )
        .await
    }

    async fn mark_status(
        &self,
        ids: &[NoteId],
        from: SyncStatus,
        to: SyncStatus,
    ) -> Result<usize> {
        ensure_transition(from, to)?;

        let db = self.db.lock().await;
        let mut changed = 0usize;
        for id in ids {
            let rows = db
                .connection()
                .execute(
                    "UPDATE local_notes SET sync_status = ? WHERE id = ? AND sync_status = ?",
                    [to.as_str().to_string(), id.as_str(), from.as_str().to_string()],
                )
                .await?;
            changed += usize::try_from(rows).unwrap_or(usize::MAX);
        }
        Ok(changed)
    }
}
