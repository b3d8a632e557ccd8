//! notely-core - Core library for Notely
//!
//! This crate contains the note model, the local durable store, the wire
//! protocol shared with the sync server, and the client-side sync
//! orchestrator used by every Notely interface.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;
pub mod util;

pub use error::{Error, Fault, Result};
pub use models::{Note, NoteDraft, NoteId, NotePatch, SyncStatus};
