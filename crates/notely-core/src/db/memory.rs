//! In-memory `LocalStore`, for tests and throwaway sessions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::local_store::{ensure_transition, LocalStore};
use crate::error::Result;
use crate::models::{Note, NoteId, SyncStatus};

/// `HashMap`-backed store; contents are lost when dropped
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    notes: Mutex<HashMap<NoteId, Note>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn notes(&self) -> MutexGuard<'_, HashMap<NoteId, Note>> {
        self.notes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sorted(mut notes: Vec<Note>) -> Vec<Note> {
        notes.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        notes
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get_all(&self) -> Result<Vec<Note>> {
        Ok(Self::sorted(self.notes().values().cloned().collect()))
    }

    async fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        Ok(self.notes().get(id).cloned())
    }

    async fn put(&self, note: &Note) -> Result<()> {
        self.notes().insert(note.id, note.clone());
        Ok(())
    }

    async fn remove(&self, id: &NoteId) -> Result<()> {
        self.notes().remove(id);
        Ok(())
    }

    async fn get_by_status(&self, status: SyncStatus) -> Result<Vec<Note>> {
        Ok(Self::sorted(
            self.notes()
                .values()
                .filter(|note| note.sync_status == status)
                .cloned()
                .collect(),
        ))
    }

    async fn mark_status(
        &self,
        ids: &[NoteId],
        from: SyncStatus,
        to: SyncStatus,
    ) -> Result<usize> {
        ensure_transition(from, to)?;

        let mut notes = self.notes();
        let mut changed = 0;
        for id in ids {
            if let Some(note) = notes.get_mut(id) {
                if note.sync_status == from {
                    note.sync_status = to;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }
}
