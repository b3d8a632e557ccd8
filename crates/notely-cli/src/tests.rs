use std::path::Path;

use notely_core::config::ClientConfig;
use notely_core::db::LocalStore;
use notely_core::sync::{ReconcileSummary, RoundOutcome, SkipReason};
use notely_core::{Note, NoteDraft, NoteId, NotePatch, SyncStatus};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::commands::add::build_draft;
use crate::commands::common::{
    default_editor, describe_outcome, filter_notes, format_relative_time, normalize_content,
    normalize_note_identifier, note_preview, open_session_with, resolve_note, CliPaths,
};
use crate::commands::config::{render_config, update_config_file};
use crate::commands::delete::run_delete;
use crate::commands::edit::changes_note;
use crate::commands::show::render_note;
use crate::commands::status::StatusReport;
use crate::commands::sync::run_sync;
use crate::error::CliError;

fn note(id: &str, title: &str, content: &str, tags: &[&str], last_modified: i64) -> Note {
    let mut note = Note::new(NoteDraft {
        title: title.to_string(),
        content: content.to_string(),
        tags: tags.iter().map(|tag| (*tag).to_string()).collect(),
    });
    note.id = id.parse().unwrap();
    note.last_modified = last_modified;
    note.created_at = last_modified;
    note
}

fn paths_in(dir: &Path) -> CliPaths {
    CliPaths::resolve(
        Some(dir.join("notes.db")),
        Some(dir.join("config.json")),
    )
    .unwrap()
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn normalize_content_keeps_multiline_text() {
    assert_eq!(
        normalize_content("line 1\nline 2\n"),
        Some("line 1\nline 2".to_string())
    );
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn normalize_note_identifier_rejects_empty() {
    assert!(matches!(
        normalize_note_identifier("   "),
        Err(CliError::EmptyNoteId)
    ));
    assert_eq!(normalize_note_identifier(" abc ").unwrap(), "abc");
}

#[test]
fn cli_paths_prefer_explicit_flags() {
    let paths = CliPaths::resolve(
        Some("/tmp/custom/notes.db".into()),
        Some("/tmp/custom/config.json".into()),
    )
    .unwrap();
    assert_eq!(paths.db_path, Path::new("/tmp/custom/notes.db"));
    assert_eq!(paths.config_path, Path::new("/tmp/custom/config.json"));
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn note_preview_prefers_title_and_truncates_with_ellipsis() {
    let titled = note(
        "11111111-1111-7111-8111-111111111111",
        "Groceries",
        "milk\neggs",
        &[],
        1,
    );
    assert_eq!(note_preview(&titled, 40), "Groceries");

    let untitled = note(
        "11111111-1111-7111-8111-222222222222",
        "",
        "a very   long first line that keeps going\nsecond",
        &[],
        1,
    );
    assert_eq!(note_preview(&untitled, 12), "a very lo...");
}

#[test]
fn build_draft_merges_flag_tags_with_hashtags() {
    let draft = build_draft(
        Some("Plan".to_string()),
        &["#work".to_string(), " ideas ".to_string()],
        "Ship it #Release".to_string(),
    );

    assert_eq!(draft.title, "Plan");
    let mut tags = draft.tags;
    tags.sort();
    assert_eq!(tags, vec!["ideas", "release", "work"]);
}

#[test]
fn filter_notes_respects_limit_and_tag() {
    let notes = vec![
        note("11111111-1111-7111-8111-000000000003", "", "c", &["work"], 3),
        note("11111111-1111-7111-8111-000000000002", "", "b", &["home"], 2),
        note("11111111-1111-7111-8111-000000000001", "", "a", &["Work"], 1),
    ];

    let limited = filter_notes(notes.clone(), None, Some(2));
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].content, "c");

    let tagged = filter_notes(notes.clone(), Some("#work"), None);
    assert_eq!(
        tagged.iter().map(|n| n.content.as_str()).collect::<Vec<_>>(),
        vec!["c", "a"]
    );

    assert!(filter_notes(notes, Some("missing"), None).is_empty());
}

#[test]
fn changes_note_ignores_identical_patches() {
    let existing = note(
        "11111111-1111-7111-8111-111111111111",
        "Title",
        "Body",
        &["a", "b"],
        1,
    );

    let same = NotePatch {
        title: Some("Title".to_string()),
        content: Some("Body".to_string()),
        tags: Some(vec!["b".to_string(), "a".to_string(), "a".to_string()]),
    };
    assert!(!changes_note(&existing, &same));

    let retitled = NotePatch {
        title: Some("Other".to_string()),
        ..NotePatch::default()
    };
    assert!(changes_note(&existing, &retitled));

    let cleared = NotePatch {
        tags: Some(Vec::new()),
        ..NotePatch::default()
    };
    assert!(changes_note(&existing, &cleared));
}

#[test]
fn render_note_includes_title_tags_and_status() {
    let rendered = render_note(&note(
        "11111111-1111-7111-8111-111111111111",
        "Title",
        "Body",
        &["x"],
        0,
    ));

    assert!(rendered.starts_with("# Title\n\nBody\n\n"));
    assert!(rendered.contains("tags:     #x"));
    assert!(rendered.contains("id:       11111111-1111-7111-8111-111111111111"));
    assert!(rendered.contains("modified: 1970-01-01 00:00:00 UTC"));
    assert!(rendered.contains("sync:     pending"));
}

#[test]
fn describe_outcome_summarizes_rounds() {
    let synced = RoundOutcome::Synced(ReconcileSummary {
        pushed: 2,
        applied: 5,
        removed: 1,
        kept_local: 0,
    });
    assert_eq!(
        describe_outcome(&synced),
        "Sync completed: pushed 2, received 5, removed 1"
    );
    assert_eq!(
        describe_outcome(&RoundOutcome::NothingToSync),
        "Nothing to sync"
    );
    assert_eq!(
        describe_outcome(&RoundOutcome::Skipped(SkipReason::NetworkUnavailable)),
        "Sync skipped: network unavailable"
    );
}

#[test]
fn status_report_counts_outstanding_notes() {
    let mut synced = note("11111111-1111-7111-8111-000000000001", "", "a", &[], 1);
    synced.sync_status = SyncStatus::Synced;
    let pending = note("11111111-1111-7111-8111-000000000002", "", "b", &[], 2);
    let mut failed = note("11111111-1111-7111-8111-000000000003", "", "c", &[], 3);
    failed.sync_status = SyncStatus::Error;
    failed.is_deleted = true;

    let report = StatusReport::from_notes(
        SyncStatus::Error,
        &[synced, pending, failed],
        Some("https://notes.example.com".to_string()),
        true,
    );

    assert_eq!(report.notes, 2);
    assert_eq!(report.pending, 1);
    assert_eq!(report.errored, 1);
    assert!(report.lines()[0].ends_with("error"));
}

#[test]
fn config_file_updates_persist_and_render_redacted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    update_config_file(&path, |config| {
        config.set_api_base_url("https://notes.example.com/")
    })
    .unwrap();
    update_config_file(&path, |config| config.set_access_token("secret-token")).unwrap();

    let saved = ClientConfig::load(&path).unwrap();
    assert_eq!(
        saved.api_base_url.as_deref(),
        Some("https://notes.example.com")
    );
    assert!(saved.can_sync());

    let rendered = render_config(&saved, &path, Path::new("notes.db")).join("\n");
    assert!(rendered.contains("[REDACTED]"));
    assert!(!rendered.contains("secret-token"));

    update_config_file(&path, |config| {
        config.clear_access_token();
        Ok(())
    })
    .unwrap();
    assert!(!ClientConfig::load(&path).unwrap().can_sync());
}

#[test]
fn config_file_rejects_non_http_url() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");

    let error = update_config_file(&path, |config| config.set_api_base_url("notes.example.com"))
        .unwrap_err();
    assert!(matches!(error, CliError::Core(_)));
    assert!(!path.exists());
}

#[tokio::test(flavor = "current_thread")]
async fn resolve_note_supports_exact_and_prefix_id() {
    let dir = tempdir().unwrap();
    let session = open_session_with(&dir.path().join("notes.db"), ClientConfig::default())
        .await
        .unwrap();

    let first = note("aaaaaaaa-1111-7111-8111-111111111111", "", "first", &[], 1);
    let second = note("aaaaaaaa-1111-7111-8111-222222222222", "", "second", &[], 2);
    session.store.put(&first).await.unwrap();
    session.store.put(&second).await.unwrap();

    let exact = resolve_note("aaaaaaaa-1111-7111-8111-111111111111", &session.orchestrator)
        .await
        .unwrap();
    assert_eq!(exact.content, "first");

    let prefixed = resolve_note("AAAAAAAA-1111-7111-8111-2", &session.orchestrator)
        .await
        .unwrap();
    assert_eq!(prefixed.id, second.id);
}

#[tokio::test(flavor = "current_thread")]
async fn resolve_note_rejects_ambiguous_and_missing_ids() {
    let dir = tempdir().unwrap();
    let session = open_session_with(&dir.path().join("notes.db"), ClientConfig::default())
        .await
        .unwrap();

    session
        .store
        .put(&note("bbbbbbbb-1111-7111-8111-111111111111", "", "a", &[], 1))
        .await
        .unwrap();
    session
        .store
        .put(&note("bbbbbbbb-1111-7111-8111-222222222222", "", "b", &[], 2))
        .await
        .unwrap();

    let ambiguous = resolve_note("bbbbbbbb", &session.orchestrator)
        .await
        .unwrap_err();
    match ambiguous {
        CliError::AmbiguousNoteId(message) => {
            assert!(message.contains("bbbbbbbb-1111"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let missing = resolve_note("cccc", &session.orchestrator).await.unwrap_err();
    assert!(matches!(missing, CliError::NoteNotFound(_)));

    let unknown_full_id = NoteId::new().to_string();
    let missing = resolve_note(&unknown_full_id, &session.orchestrator)
        .await
        .unwrap_err();
    assert!(matches!(missing, CliError::NoteNotFound(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn resolve_note_skips_deleted_notes() {
    let dir = tempdir().unwrap();
    let session = open_session_with(&dir.path().join("notes.db"), ClientConfig::default())
        .await
        .unwrap();

    let mut gone = note("dddddddd-1111-7111-8111-111111111111", "", "gone", &[], 1);
    gone.is_deleted = true;
    session.store.put(&gone).await.unwrap();

    let error = resolve_note("dddddddd", &session.orchestrator)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::NoteNotFound(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn run_delete_soft_deletes_note_by_prefix() {
    let dir = tempdir().unwrap();
    let paths = paths_in(dir.path());

    let keep = note("eeeeeeee-1111-7111-8111-111111111111", "", "keep", &[], 1);
    let remove = note("eeeeeeee-1111-7111-8111-222222222222", "", "remove", &[], 2);
    {
        let session = open_session_with(&paths.db_path, ClientConfig::default())
            .await
            .unwrap();
        session.store.put(&keep).await.unwrap();
        session.store.put(&remove).await.unwrap();
    }

    run_delete(&paths, "eeeeeeee-1111-7111-8111-2").await.unwrap();

    let session = open_session_with(&paths.db_path, ClientConfig::default())
        .await
        .unwrap();
    let stored = session.store.get(&remove.id).await.unwrap().unwrap();
    assert!(stored.is_deleted);
    assert_eq!(stored.sync_status, SyncStatus::Pending);
    assert!(stored.last_modified > remove.last_modified);

    let live = session.orchestrator.notes().await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, keep.id);
}

#[tokio::test(flavor = "current_thread")]
async fn run_sync_requires_sync_configuration() {
    let dir = tempdir().unwrap();
    let paths = paths_in(dir.path());

    let error = run_sync(&paths).await.unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));
}
