use notely_core::db::LocalStore;
use notely_core::{Note, SyncStatus};
use serde::Serialize;

use crate::commands::common::{open_session, CliPaths};
use crate::error::CliError;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusReport {
    pub status: SyncStatus,
    pub notes: usize,
    pub pending: usize,
    pub errored: usize,
    pub server: Option<String>,
    pub signed_in: bool,
}

impl StatusReport {
    pub fn from_notes(
        status: SyncStatus,
        notes: &[Note],
        server: Option<String>,
        signed_in: bool,
    ) -> Self {
        let count = |wanted: SyncStatus| {
            notes
                .iter()
                .filter(|note| note.sync_status == wanted)
                .count()
        };

        Self {
            status,
            notes: notes.iter().filter(|note| !note.is_deleted).count(),
            pending: count(SyncStatus::Pending),
            errored: count(SyncStatus::Error),
            server,
            signed_in,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("Sync status: {}", self.status),
            format!("Notes:       {}", self.notes),
            format!("Pending:     {}", self.pending),
            format!("Failed:      {}", self.errored),
            format!(
                "Server:      {}",
                self.server.as_deref().unwrap_or("(not configured)")
            ),
            format!(
                "Token:       {}",
                if self.signed_in { "configured" } else { "missing" }
            ),
        ]
    }
}

pub async fn run_status(paths: &CliPaths, as_json: bool) -> Result<(), CliError> {
    let session = open_session(paths).await?;
    let notes = session.store.get_all().await?;

    let report = StatusReport::from_notes(
        session.orchestrator.status(),
        &notes,
        session.config.api_base_url.clone(),
        session.config.access_token.is_some(),
    );

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in report.lines() {
            println!("{line}");
        }
    }
    Ok(())
}
