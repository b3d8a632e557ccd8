//! Data models for Notely

mod note;
mod sync_status;

pub use note::{extract_tags, normalize_tags, Note, NoteDraft, NoteId, NotePatch};
pub use sync_status::SyncStatus;
