//! Client-side sync orchestrator.
//!
//! Every mutation lands in the [`LocalStore`] first and is marked `pending`.
//! A debounce timer collapses bursts of edits into one round; a round pushes
//! all outstanding notes in batches the server accepts, then reconciles the local store against the
//! canonical set the server returns.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::protocol::{SyncRequest, SyncResponse, DEFAULT_MAX_BATCH_NOTES};
use super::transport::{NoteTransport, SessionToken};
use crate::db::LocalStore;
use crate::error::{Error, Result};
use crate::models::{Note, NoteDraft, NoteId, NotePatch, SyncStatus};

/// Default quiet period between the last mutation and a sync round
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub debounce: Duration,
    /// Most notes sent in one push; larger outstanding sets go in several
    pub max_batch_notes: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            max_batch_notes: DEFAULT_MAX_BATCH_NOTES,
        }
    }
}

/// What started a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTrigger {
    Debounce,
    Manual,
    Reconnect,
}

impl RoundTrigger {
    /// Whether a round with nothing to push still fetches the canonical set
    const fn pulls_when_idle(self) -> bool {
        !matches!(self, Self::Debounce)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSession,
    NetworkUnavailable,
}

/// Counts from reconciling the local store against a canonical set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Notes sent in the round
    pub pushed: usize,
    /// Canonical notes written locally as `synced`
    pub applied: usize,
    /// Local notes the server no longer lists, removed from the store
    pub removed: usize,
    /// Local notes left `pending` because the server has not seen them yet
    pub kept_local: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Synced(ReconcileSummary),
    NothingToSync,
    Skipped(SkipReason),
    AlreadyRunning,
}

struct Inner {
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn NoteTransport>,
    settings: SyncSettings,
    session: RwLock<Option<SessionToken>>,
    network_available: AtomicBool,
    status: watch::Sender<SyncStatus>,
    debounce: StdMutex<Option<JoinHandle<()>>>,
    // Held for the whole round; acquired with `try_lock` so triggers never overlap.
    round: Mutex<()>,
    // Serializes read-modify-write of notes between mutations and reconciliation.
    writes: Mutex<()>,
}

/// Owns the local note set and keeps it converging with the server.
///
/// Cloning is cheap; clones share the same store, timer and status.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncOrchestrator")
            .field("settings", &self.inner.settings)
            .field("status", &self.status())
            .field(
                "network_available",
                &self.inner.network_available.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Build an orchestrator over an existing store.
    ///
    /// The initial status is `pending` when the store already holds
    /// outstanding notes from an earlier session.
    pub async fn new(
        store: Arc<dyn LocalStore>,
        transport: Arc<dyn NoteTransport>,
        settings: SyncSettings,
    ) -> Result<Self> {
        let outstanding = outstanding_notes(store.as_ref()).await?;
        let initial = if outstanding.is_empty() {
            SyncStatus::Synced
        } else {
            SyncStatus::Pending
        };
        let (status, _) = watch::channel(initial);

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                transport,
                settings,
                session: RwLock::new(None),
                network_available: AtomicBool::new(true),
                status,
                debounce: StdMutex::new(None),
                round: Mutex::new(()),
                writes: Mutex::new(()),
            }),
        })
    }

    /// Create a note locally and schedule a sync
    pub async fn create(&self, draft: NoteDraft) -> Result<Note> {
        let note = Note::new(draft);
        {
            let _writes = self.inner.writes.lock().await;
            self.inner.store.put(&note).await?;
        }
        tracing::debug!("Created note {}", note.id);
        self.after_mutation();
        Ok(note)
    }

    /// Apply a partial update to a live note and schedule a sync
    pub async fn update(&self, id: &NoteId, patch: NotePatch) -> Result<Note> {
        let note = {
            let _writes = self.inner.writes.lock().await;
            let mut note = self.live_note(id).await?;
            note.apply_patch(patch);
            self.inner.store.put(&note).await?;
            note
        };
        tracing::debug!("Updated note {}", note.id);
        self.after_mutation();
        Ok(note)
    }

    /// Soft delete a note and schedule a sync
    pub async fn delete(&self, id: &NoteId) -> Result<Note> {
        let note = {
            let _writes = self.inner.writes.lock().await;
            let mut note = self.live_note(id).await?;
            note.mark_deleted();
            self.inner.store.put(&note).await?;
            note
        };
        tracing::debug!("Deleted note {}", note.id);
        self.after_mutation();
        Ok(note)
    }

    /// Non-deleted notes, most recently modified first
    pub async fn notes(&self) -> Result<Vec<Note>> {
        let mut notes = self.inner.store.get_all().await?;
        notes.retain(|note| !note.is_deleted);
        notes.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(notes)
    }

    /// A single non-deleted note
    pub async fn note(&self, id: &NoteId) -> Result<Option<Note>> {
        Ok(self
            .inner
            .store
            .get(id)
            .await?
            .filter(|note| !note.is_deleted))
    }

    pub fn status(&self) -> SyncStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Install or clear the credential used for rounds
    pub async fn set_session(&self, session: Option<SessionToken>) {
        *self.inner.session.write().await = session;
    }

    /// Record a connectivity change.
    ///
    /// Coming back online runs a round immediately and returns its outcome;
    /// any other call returns `None`.
    pub async fn set_network_available(&self, available: bool) -> Result<Option<RoundOutcome>> {
        let was_available = self
            .inner
            .network_available
            .swap(available, Ordering::SeqCst);

        match (was_available, available) {
            (false, true) => {
                tracing::info!("Network available again, draining outstanding notes");
                self.cancel_debounce();
                self.run_round(RoundTrigger::Reconnect).await.map(Some)
            }
            (true, false) => {
                tracing::debug!("Network marked unavailable");
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Run a round now, replacing any scheduled one
    pub async fn sync_now(&self) -> Result<RoundOutcome> {
        self.cancel_debounce();
        self.run_round(RoundTrigger::Manual).await
    }

    /// Cold load. Pushes outstanding notes when there are any, otherwise
    /// fetches the canonical set and reconciles against it.
    pub async fn refresh(&self) -> Result<RoundOutcome> {
        self.run_round(RoundTrigger::Manual).await
    }

    /// Cancel a scheduled round. A round already in flight completes.
    pub fn shutdown(&self) {
        self.cancel_debounce();
    }

    async fn live_note(&self, id: &NoteId) -> Result<Note> {
        self.inner
            .store
            .get(id)
            .await?
            .filter(|note| !note.is_deleted)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn after_mutation(&self) {
        self.set_status(SyncStatus::Pending);
        self.schedule_debounce();
    }

    fn set_status(&self, status: SyncStatus) {
        let previous = self.inner.status.send_replace(status);
        if previous != status {
            tracing::debug!("Sync status {previous} -> {status}");
        }
    }

    fn debounce_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .debounce
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_debounce(&self) {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let window = self.inner.settings.debounce;

        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let orchestrator = Self { inner };
            // Detached so that re-arming the timer cannot abort this round.
            tokio::spawn(async move {
                if let Err(error) = orchestrator.run_round(RoundTrigger::Debounce).await {
                    tracing::warn!("Debounced sync round failed: {error}");
                }
            });
        });

        if let Some(previous) = self.debounce_slot().replace(timer) {
            previous.abort();
        }
        tracing::debug!("Sync scheduled in {}ms", window.as_millis());
    }

    fn cancel_debounce(&self) {
        if let Some(timer) = self.debounce_slot().take() {
            timer.abort();
        }
    }

    async fn run_round(&self, trigger: RoundTrigger) -> Result<RoundOutcome> {
        let Ok(_round) = self.inner.round.try_lock() else {
            tracing::debug!("Sync round already in flight, {trigger:?} trigger ignored");
            return Ok(RoundOutcome::AlreadyRunning);
        };

        let Some(session) = self.inner.session.read().await.clone() else {
            tracing::debug!("No session, sync round skipped");
            return Ok(RoundOutcome::Skipped(SkipReason::NoSession));
        };
        if !self.inner.network_available.load(Ordering::SeqCst) {
            tracing::debug!("Network unavailable, sync round skipped");
            return Ok(RoundOutcome::Skipped(SkipReason::NetworkUnavailable));
        }

        match self.execute_round(trigger, &session).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                if matches!(error.fault(), crate::Fault::Local) {
                    tracing::error!("Sync round failed on local storage: {error}");
                } else {
                    tracing::warn!("Sync round failed: {error}");
                }
                self.set_status(SyncStatus::Error);
                Err(error)
            }
        }
    }

    async fn execute_round(
        &self,
        trigger: RoundTrigger,
        session: &SessionToken,
    ) -> Result<RoundOutcome> {
        let store = self.inner.store.as_ref();
        let outstanding = outstanding_notes(store).await?;

        if outstanding.is_empty() {
            if !trigger.pulls_when_idle() {
                self.set_status(SyncStatus::Synced);
                return Ok(RoundOutcome::NothingToSync);
            }
            self.set_status(SyncStatus::Pending);
            let response = self.inner.transport.fetch_all(session).await?;
            let summary = self.reconcile(response, &[]).await?;
            self.finish_round(summary).await?;
            return Ok(RoundOutcome::Synced(summary));
        }

        self.set_status(SyncStatus::Pending);
        let retried: Vec<NoteId> = outstanding
            .iter()
            .filter(|note| note.sync_status == SyncStatus::Error)
            .map(|note| note.id)
            .collect();
        if !retried.is_empty() {
            store
                .mark_status(&retried, SyncStatus::Error, SyncStatus::Pending)
                .await?;
        }

        let batch = self.inner.settings.max_batch_notes.max(1);
        let mut latest: Option<SyncResponse> = None;
        for (index, chunk) in outstanding.chunks(batch).enumerate() {
            let request = SyncRequest::from_notes(chunk);
            tracing::debug!(
                "Pushing {} of {} notes ({trigger:?})",
                request.notes.len(),
                outstanding.len()
            );

            match self.inner.transport.push(session, &request).await {
                Ok(response) => latest = Some(response),
                Err(error) => {
                    let (sent, unsent) = outstanding.split_at(index * batch);
                    self.abandon_push(latest, sent, unsent).await;
                    return Err(error);
                }
            }
        }

        let response = latest.unwrap_or_default();
        let summary = self.reconcile(response, &outstanding).await?;
        self.finish_round(summary).await?;
        Ok(RoundOutcome::Synced(summary))
    }

    /// Wind down a round whose push failed part way.
    ///
    /// Batches the server already accepted are reconciled against the last
    /// canonical set it returned. Local copies that never reached the server
    /// stay as they are; only their status records the failure.
    async fn abandon_push(&self, latest: Option<SyncResponse>, sent: &[Note], unsent: &[Note]) {
        if let Some(response) = latest {
            match self.reconcile(response, sent).await {
                Ok(summary) => tracing::debug!(
                    "Reconciled {} notes accepted before the failed batch",
                    summary.pushed
                ),
                Err(error) => tracing::error!("Failed to reconcile accepted batches: {error}"),
            }
        }

        let ids: Vec<NoteId> = unsent.iter().map(|note| note.id).collect();
        if let Err(error) = self
            .inner
            .store
            .mark_status(&ids, SyncStatus::Pending, SyncStatus::Error)
            .await
        {
            tracing::error!("Failed to mark notes as errored: {error}");
        }
    }

    async fn finish_round(&self, summary: ReconcileSummary) -> Result<()> {
        let remaining = outstanding_notes(self.inner.store.as_ref()).await?;
        tracing::info!(
            "Sync round complete: pushed {}, applied {}, removed {}, kept {}",
            summary.pushed,
            summary.applied,
            summary.removed,
            summary.kept_local
        );

        if remaining.is_empty() {
            self.set_status(SyncStatus::Synced);
        } else {
            tracing::debug!("{} notes changed during the round", remaining.len());
            self.set_status(SyncStatus::Pending);
            self.schedule_debounce();
        }
        Ok(())
    }

    /// Bring the local store in line with a canonical set.
    ///
    /// `pushed` holds the local copies sent in this round, as they were sent.
    async fn reconcile(
        &self,
        response: SyncResponse,
        pushed: &[Note],
    ) -> Result<ReconcileSummary> {
        let store = self.inner.store.as_ref();
        let _writes = self.inner.writes.lock().await;

        let sent: HashMap<NoteId, i64> = pushed
            .iter()
            .map(|note| (note.id, note.last_modified))
            .collect();
        let local: HashMap<NoteId, Note> = store
            .get_all()
            .await?
            .into_iter()
            .map(|note| (note.id, note))
            .collect();
        let canonical_ids: HashSet<NoteId> = response.notes.iter().map(|note| note.id).collect();

        let mut summary = ReconcileSummary {
            pushed: pushed.len(),
            ..ReconcileSummary::default()
        };

        for canonical in response.notes {
            let edited_since = local.get(&canonical.id).is_some_and(|note| {
                note.sync_status.is_outstanding() && note.last_modified > canonical.last_modified
            });
            if edited_since {
                summary.kept_local += 1;
                continue;
            }
            store.put(&Note::from(canonical)).await?;
            summary.applied += 1;
        }

        for note in local.values() {
            if canonical_ids.contains(&note.id) {
                continue;
            }
            let seen_by_server = match note.sync_status {
                SyncStatus::Synced => true,
                SyncStatus::Pending | SyncStatus::Error => {
                    sent.get(&note.id) == Some(&note.last_modified)
                }
            };
            if seen_by_server {
                store.remove(&note.id).await?;
                summary.removed += 1;
            } else {
                summary.kept_local += 1;
            }
        }

        Ok(summary)
    }
}

async fn outstanding_notes(store: &dyn LocalStore) -> Result<Vec<Note>> {
    let mut notes = store.get_pending().await?;
    notes.extend(store.get_by_status(SyncStatus::Error).await?);
    Ok(notes)
}
