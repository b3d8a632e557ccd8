use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::Utc;
use notely_core::config::ClientConfig;
use notely_core::db::{LibSqlLocalStore, LocalStore};
use notely_core::sync::{
    HttpTransport, NoteTransport, RoundOutcome, SessionToken, SkipReason, SyncOrchestrator,
    SyncRequest, SyncResponse,
};
use notely_core::{Note, NoteId};
use serde::Serialize;

use crate::error::CliError;

const DB_PATH_ENV: &str = "NOTELY_DB_PATH";
const SHORT_ID_LEN: usize = 13;

/// Where the CLI keeps its database and config file
#[derive(Debug, Clone)]
pub struct CliPaths {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl CliPaths {
    pub fn resolve(
        cli_db_path: Option<PathBuf>,
        cli_config_path: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let db_path = cli_db_path
            .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
            .or_else(ClientConfig::default_database_path)
            .ok_or_else(|| {
                CliError::Config(format!(
                    "Could not determine a data directory; pass --db-path or set {DB_PATH_ENV}"
                ))
            })?;
        let config_path = cli_config_path
            .or_else(ClientConfig::default_path)
            .ok_or_else(|| {
                CliError::Config(
                    "Could not determine a config directory; pass --config".to_string(),
                )
            })?;

        Ok(Self {
            db_path,
            config_path,
        })
    }
}

/// Stand-in used when no server URL is configured. The orchestrator never
/// reaches it because no session is installed in that case.
struct DisconnectedTransport;

#[async_trait]
impl NoteTransport for DisconnectedTransport {
    async fn push(
        &self,
        _session: &SessionToken,
        _request: &SyncRequest,
    ) -> notely_core::Result<SyncResponse> {
        Err(not_configured())
    }

    async fn fetch_all(&self, _session: &SessionToken) -> notely_core::Result<SyncResponse> {
        Err(not_configured())
    }
}

fn not_configured() -> notely_core::Error {
    notely_core::Error::InvalidInput("No sync server configured".to_string())
}

/// An open local store with its orchestrator, for the duration of one command
pub struct NoteSession {
    pub orchestrator: SyncOrchestrator,
    pub store: Arc<LibSqlLocalStore>,
    pub config: ClientConfig,
}

impl NoteSession {
    /// Stop the debounce timer and, when sync is configured, push what this
    /// command changed. A failed push leaves the notes saved locally.
    pub async fn finish(&self) {
        self.orchestrator.shutdown();
        if !self.config.can_sync() {
            return;
        }

        match self.orchestrator.sync_now().await {
            Ok(outcome) => tracing::debug!("Post-command sync: {outcome:?}"),
            Err(error) => eprintln!("Saved locally; sync failed: {error}"),
        }
        self.orchestrator.shutdown();
    }
}

/// Effective client config: the config file plus `NOTELY_*` overrides
pub fn load_effective_config(paths: &CliPaths) -> Result<ClientConfig, CliError> {
    Ok(ClientConfig::load(&paths.config_path)?.with_env_overrides()?)
}

pub async fn open_session(paths: &CliPaths) -> Result<NoteSession, CliError> {
    let config = load_effective_config(paths)?;
    open_session_with(&paths.db_path, config).await
}

pub async fn open_session_with(
    db_path: &Path,
    config: ClientConfig,
) -> Result<NoteSession, CliError> {
    let store = Arc::new(LibSqlLocalStore::open(db_path).await?);
    let transport: Arc<dyn NoteTransport> = match config.api_base_url.as_deref() {
        Some(url) => Arc::new(HttpTransport::new(url)?),
        None => Arc::new(DisconnectedTransport),
    };

    let orchestrator = SyncOrchestrator::new(
        Arc::clone(&store) as Arc<dyn LocalStore>,
        transport,
        config.sync_settings(),
    )
    .await?;
    if config.can_sync() {
        orchestrator.set_session(config.session()).await;
    }

    Ok(NoteSession {
        orchestrator,
        store,
        config,
    })
}

/// Find a live note by full ID or by a unique case-insensitive ID prefix
pub async fn resolve_note(
    note_query: &str,
    orchestrator: &SyncOrchestrator,
) -> Result<Note, CliError> {
    if let Ok(note_id) = note_query.parse::<NoteId>() {
        if let Some(note) = orchestrator.note(&note_id).await? {
            return Ok(note);
        }
    }

    let prefix = note_query.to_lowercase();
    let mut matches = orchestrator
        .notes()
        .await?
        .into_iter()
        .filter(|note| note.id.to_string().starts_with(&prefix))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::NoteNotFound(note_query.to_string())),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|note| short_id(&note.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{note_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Live notes, newest first, optionally filtered by tag and truncated
pub fn filter_notes(notes: Vec<Note>, tag: Option<&str>, limit: Option<usize>) -> Vec<Note> {
    let tag = tag.map(|tag| tag.trim().trim_start_matches('#').to_lowercase());
    notes
        .into_iter()
        .filter(|note| match tag.as_deref() {
            Some(wanted) => note.tags.iter().any(|tag| tag.to_lowercase() == wanted),
            None => true,
        })
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub last_modified: i64,
    pub relative_time: String,
    pub sync_status: String,
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();

    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        content: note.content.clone(),
        tags: note.tags.iter().cloned().collect(),
        created_at: note.created_at,
        last_modified: note.last_modified,
        relative_time: format_relative_time(note.last_modified, now_ms),
        sync_status: note.sync_status.to_string(),
    }
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let short_id = short_id(&note.id);
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.last_modified, now_ms);
            let marker = if note.sync_status.is_outstanding() {
                "*"
            } else {
                " "
            };
            let tags = render_tags(note);

            if tags.is_empty() {
                format!("{short_id:<13}{marker} {preview:<40}  {relative_time}")
            } else {
                format!("{short_id:<13}{marker} {preview:<40}  {relative_time:<10}  {tags}")
            }
        })
        .collect()
}

pub fn short_id(id: &NoteId) -> String {
    id.to_string().chars().take(SHORT_ID_LEN).collect()
}

/// One-line summary: the title, or the first content line when untitled
pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let source = note.title_preview(usize::MAX);
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(note: &Note) -> String {
    note.tags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn describe_outcome(outcome: &RoundOutcome) -> String {
    match outcome {
        RoundOutcome::Synced(summary) => {
            let mut line = format!(
                "Sync completed: pushed {}, received {}",
                summary.pushed, summary.applied
            );
            if summary.removed > 0 {
                line.push_str(&format!(", removed {}", summary.removed));
            }
            if summary.kept_local > 0 {
                line.push_str(&format!(", {} still pending", summary.kept_local));
            }
            line
        }
        RoundOutcome::NothingToSync => "Nothing to sync".to_string(),
        RoundOutcome::Skipped(SkipReason::NoSession) => {
            "Sync skipped: no access token configured".to_string()
        }
        RoundOutcome::Skipped(SkipReason::NetworkUnavailable) => {
            "Sync skipped: network unavailable".to_string()
        }
        RoundOutcome::AlreadyRunning => "A sync round is already running".to_string(),
    }
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("notely-note-{}-{now}.md", std::process::id()))
}
