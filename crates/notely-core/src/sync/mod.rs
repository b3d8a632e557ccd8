//! Note synchronization: wire protocol, transport, and the client orchestrator.

mod orchestrator;
pub mod protocol;
mod transport;

pub use orchestrator::{
    ReconcileSummary, RoundOutcome, RoundTrigger, SkipReason, SyncOrchestrator, SyncSettings,
    DEFAULT_DEBOUNCE,
};
pub use protocol::{NoteCanonical, NoteInput, ProtocolError, SyncRequest, SyncResponse};
pub use transport::{HttpTransport, NoteTransport, SessionToken};
