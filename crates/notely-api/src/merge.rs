//! Server-side merge engine.
//!
//! Each incoming note is applied with one conditional upsert: content fields
//! change only when the incoming `lastModified` is strictly newer, and the
//! stored `lastModified` never decreases. Replaying a batch, reordering it, or
//! receiving stale copies therefore leaves the canonical set unchanged.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use libsql::Connection;
use notely_core::db::{Database, Migration};
use notely_core::sync::{NoteCanonical, NoteInput};
use thiserror::Error;
use tokio::sync::Mutex;

pub const SERVER_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "canonical notes keyed by user",
    statements: &[
        "CREATE TABLE IF NOT EXISTS notes (
            user_id TEXT NOT NULL,
            id TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',
            last_modified INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_notes_user_modified ON notes(user_id, last_modified DESC)",
    ],
}];

const UPSERT_NOTE: &str = "
    INSERT INTO notes (user_id, id, title, content, tags, last_modified, created_at, is_deleted)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(user_id, id) DO UPDATE SET
        title = CASE WHEN excluded.last_modified > COALESCE(notes.last_modified, 0)
            THEN excluded.title ELSE notes.title END,
        content = CASE WHEN excluded.last_modified > COALESCE(notes.last_modified, 0)
            THEN excluded.content ELSE notes.content END,
        tags = CASE WHEN excluded.last_modified > COALESCE(notes.last_modified, 0)
            THEN excluded.tags ELSE notes.tags END,
        is_deleted = CASE WHEN excluded.last_modified > COALESCE(notes.last_modified, 0)
            THEN excluded.is_deleted ELSE notes.is_deleted END,
        last_modified = MAX(excluded.last_modified, COALESCE(notes.last_modified, 0))";

const SELECT_LIVE_NOTES: &str = "
    SELECT id, title, content, tags, last_modified, created_at, is_deleted
    FROM notes
    WHERE user_id = ?1 AND is_deleted = 0
    ORDER BY last_modified DESC";

#[derive(Debug, Error)]
pub enum MergeError {
    /// Write raced with another writer or hit a constraint; the batch can be retried
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Storage(String),
}

impl From<libsql::Error> for MergeError {
    fn from(error: libsql::Error) -> Self {
        classify(error.to_string())
    }
}

impl From<notely_core::Error> for MergeError {
    fn from(error: notely_core::Error) -> Self {
        match error {
            notely_core::Error::LibSql(error) => error.into(),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for MergeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Storage(format!("Invalid stored tags: {error}"))
    }
}

fn classify(message: String) -> MergeError {
    let lowered = message.to_ascii_lowercase();
    let is_conflict = ["constraint failed", "database is locked", "database is busy", "sqlite_busy"]
        .iter()
        .any(|marker| lowered.contains(marker));
    if is_conflict {
        MergeError::Conflict(message)
    } else {
        MergeError::Storage(message)
    }
}

/// Applies client batches to the canonical note set
#[derive(Clone)]
pub struct MergeEngine {
    db: Arc<Mutex<Database>>,
}

impl MergeEngine {
    pub async fn open(path: &Path) -> Result<Self, MergeError> {
        let db = Database::open_with_migrations(path, SERVER_MIGRATIONS).await?;
        tracing::info!("Opened note database at {}", path.display());
        Ok(Self::from_database(db))
    }

    pub async fn open_in_memory() -> Result<Self, MergeError> {
        let db = Database::open_in_memory_with_migrations(SERVER_MIGRATIONS).await?;
        Ok(Self::from_database(db))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Apply a batch for one user and return their complete non-deleted set.
    ///
    /// The batch commits as a whole or not at all.
    pub async fn merge_batch(
        &self,
        user_id: &str,
        notes: &[NoteInput],
    ) -> Result<Vec<NoteCanonical>, MergeError> {
        let now = chrono::Utc::now().timestamp_millis();
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        for note in notes {
            if let Err(error) = upsert(conn, user_id, note, now).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(error);
            }
        }
        if let Err(error) = conn.execute("COMMIT", ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }

        tracing::debug!("Merged {} notes", notes.len());
        live_notes(conn, user_id).await
    }

    /// The user's complete non-deleted set, newest first
    pub async fn list(&self, user_id: &str) -> Result<Vec<NoteCanonical>, MergeError> {
        let db = self.db.lock().await;
        live_notes(db.connection(), user_id).await
    }
}

async fn upsert(
    conn: &Connection,
    user_id: &str,
    note: &NoteInput,
    now: i64,
) -> Result<(), MergeError> {
    let tags = serde_json::to_string(&note.tags)?;
    conn.execute(
        UPSERT_NOTE,
        libsql::params![
            user_id,
            note.id.as_str(),
            note.title.clone(),
            note.content.clone(),
            tags,
            note.last_modified,
            note.created_at.unwrap_or(now),
            i64::from(note.is_deleted)
        ],
    )
    .await?;
    Ok(())
}

async fn live_notes(conn: &Connection, user_id: &str) -> Result<Vec<NoteCanonical>, MergeError> {
    let mut rows = conn.query(SELECT_LIVE_NOTES, [user_id]).await?;

    let mut notes = Vec::new();
    while let Some(row) = rows.next().await? {
        notes.push(parse_note(&row)?);
    }
    Ok(notes)
}

fn parse_note(row: &libsql::Row) -> Result<NoteCanonical, MergeError> {
    let id: String = row.get(0)?;
    let tags: String = row.get(3)?;

    Ok(NoteCanonical {
        id: id
            .parse()
            .map_err(|_| MergeError::Storage(format!("Invalid stored note id: {id}")))?,
        title: row.get(1)?,
        content: row.get(2)?,
        tags: serde_json::from_str::<BTreeSet<String>>(&tags)?,
        last_modified: row.get(4)?,
        created_at: row.get(5)?,
        is_deleted: row.get::<i32>(6)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notely_core::NoteId;
    use pretty_assertions::assert_eq;

    const USER: &str = "user-a";

    async fn engine() -> MergeEngine {
        MergeEngine::open_in_memory().await.unwrap()
    }

    fn input(id: NoteId, title: &str, last_modified: i64) -> NoteInput {
        NoteInput {
            id,
            title: title.to_string(),
            content: format!("{title} body"),
            tags: BTreeSet::new(),
            last_modified,
            is_deleted: false,
            created_at: Some(10),
        }
    }

    fn deleted(id: NoteId, last_modified: i64) -> NoteInput {
        NoteInput {
            is_deleted: true,
            ..input(id, "", last_modified)
        }
    }

    fn only(notes: &[NoteCanonical]) -> &NoteCanonical {
        assert_eq!(notes.len(), 1, "expected exactly one canonical note");
        &notes[0]
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_sighting_is_stored_as_is() {
        let engine = engine().await;
        let id = NoteId::new();
        let mut note = input(id, "A", 100);
        note.tags = BTreeSet::from(["work".to_string()]);

        let canonical = engine.merge_batch(USER, &[note]).await.unwrap();

        assert_eq!(
            only(&canonical),
            &NoteCanonical {
                id,
                title: "A".to_string(),
                content: "A body".to_string(),
                tags: BTreeSet::from(["work".to_string()]),
                last_modified: 100,
                created_at: 10,
                is_deleted: false,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn newer_copy_replaces_content() {
        let engine = engine().await;
        let id = NoteId::new();
        engine.merge_batch(USER, &[input(id, "A", 100)]).await.unwrap();

        let canonical = engine.merge_batch(USER, &[input(id, "B", 150)]).await.unwrap();

        let note = only(&canonical);
        assert_eq!(note.title, "B");
        assert_eq!(note.last_modified, 150);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn older_copy_is_ignored() {
        let engine = engine().await;
        let id = NoteId::new();
        engine.merge_batch(USER, &[input(id, "A", 100)]).await.unwrap();

        let canonical = engine.merge_batch(USER, &[input(id, "B", 50)]).await.unwrap();

        let note = only(&canonical);
        assert_eq!(note.title, "A");
        assert_eq!(note.last_modified, 100);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tie_keeps_stored_content() {
        let engine = engine().await;
        let id = NoteId::new();
        engine.merge_batch(USER, &[input(id, "A", 100)]).await.unwrap();

        let canonical = engine.merge_batch(USER, &[input(id, "B", 100)]).await.unwrap();

        assert_eq!(only(&canonical).title, "A");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn replaying_a_batch_is_idempotent() {
        let engine = engine().await;
        let batch = vec![
            input(NoteId::new(), "One", 100),
            input(NoteId::new(), "Two", 200),
        ];

        let first = engine.merge_batch(USER, &batch).await.unwrap();
        let second = engine.merge_batch(USER, &batch).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_order_does_not_matter() {
        let id = NoteId::new();

        let forward = engine().await;
        let forward_result = forward
            .merge_batch(USER, &[input(id, "A", 100), input(id, "B", 150)])
            .await
            .unwrap();

        let reversed = engine().await;
        let reversed_result = reversed
            .merge_batch(USER, &[input(id, "B", 150), input(id, "A", 100)])
            .await
            .unwrap();

        assert_eq!(forward_result, reversed_result);
        assert_eq!(only(&forward_result).title, "B");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn last_modified_never_decreases() {
        let engine = engine().await;
        let id = NoteId::new();

        for (title, last_modified) in [("A", 300), ("B", 100), ("C", 200), ("D", 300)] {
            let canonical = engine
                .merge_batch(USER, &[input(id, title, last_modified)])
                .await
                .unwrap();
            assert_eq!(only(&canonical).last_modified, 300);
            assert_eq!(only(&canonical).title, "A");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn soft_delete_hides_note_and_stale_copies_cannot_revive_it() {
        let engine = engine().await;
        let id = NoteId::new();
        engine.merge_batch(USER, &[input(id, "A", 100)]).await.unwrap();

        let after_delete = engine.merge_batch(USER, &[deleted(id, 200)]).await.unwrap();
        assert!(after_delete.is_empty());

        let after_stale = engine
            .merge_batch(USER, &[input(id, "Stale", 150)])
            .await
            .unwrap();
        assert!(after_stale.is_empty());
        assert!(engine.list(USER).await.unwrap().is_empty());

        let revived = engine
            .merge_batch(USER, &[input(id, "Restored", 250)])
            .await
            .unwrap();
        assert_eq!(only(&revived).title, "Restored");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn created_at_is_fixed_by_first_write() {
        let engine = engine().await;
        let id = NoteId::new();
        let mut first = input(id, "A", 100);
        first.created_at = None;
        let canonical = engine.merge_batch(USER, &[first]).await.unwrap();
        let created_at = only(&canonical).created_at;
        assert!(created_at > 0);

        let mut second = input(id, "B", 200);
        second.created_at = Some(1);
        let canonical = engine.merge_batch(USER, &[second]).await.unwrap();
        assert_eq!(only(&canonical).created_at, created_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn users_are_isolated() {
        let engine = engine().await;
        let id = NoteId::new();
        engine.merge_batch("user-a", &[input(id, "A", 100)]).await.unwrap();
        engine.merge_batch("user-b", &[input(id, "B", 50)]).await.unwrap();

        assert_eq!(only(&engine.list("user-a").await.unwrap()).title, "A");
        assert_eq!(only(&engine.list("user-b").await.unwrap()).title, "B");
        assert!(engine.list("user-c").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_batch_rolls_back_entirely() {
        let engine = engine().await;
        {
            let db = engine.db.lock().await;
            db.connection()
                .execute(
                    "CREATE TRIGGER reject_poison BEFORE INSERT ON notes
                     WHEN NEW.title = 'poison'
                     BEGIN SELECT RAISE(ABORT, 'poisoned note'); END",
                    (),
                )
                .await
                .unwrap();
        }

        let result = engine
            .merge_batch(
                USER,
                &[input(NoteId::new(), "fine", 100), input(NoteId::new(), "poison", 100)],
            )
            .await;

        assert!(matches!(result, Err(MergeError::Storage(_))));
        assert!(engine.list(USER).await.unwrap().is_empty());

        // The connection is usable again after the rollback.
        let canonical = engine
            .merge_batch(USER, &[input(NoteId::new(), "fine", 100)])
            .await
            .unwrap();
        assert_eq!(canonical.len(), 1);
    }

    #[test]
    fn constraint_and_busy_errors_are_conflicts() {
        assert!(matches!(
            classify("SQLite failure: `UNIQUE constraint failed: notes.user_id, notes.id`".into()),
            MergeError::Conflict(_)
        ));
        assert!(matches!(
            classify("SQLite failure: `database is locked`".into()),
            MergeError::Conflict(_)
        ));
        assert!(matches!(
            classify("SQLite failure: `disk I/O error`".into()),
            MergeError::Storage(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn notes_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("server.db");
        let id = NoteId::new();

        {
            let engine = MergeEngine::open(&path).await.unwrap();
            engine.merge_batch(USER, &[input(id, "Kept", 100)]).await.unwrap();
        }

        let reopened = MergeEngine::open(&path).await.unwrap();
        assert_eq!(only(&reopened.list(USER).await.unwrap()).id, id);
    }
}
