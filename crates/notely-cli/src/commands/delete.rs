use crate::commands::common::{normalize_note_identifier, open_session, resolve_note, CliPaths};
use crate::error::CliError;

pub async fn run_delete(paths: &CliPaths, id: &str) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let session = open_session(paths).await?;
    let note = resolve_note(&normalized_id, &session.orchestrator).await?;

    session.orchestrator.delete(&note.id).await?;
    session.finish().await;
    println!("{}", note.id);
    Ok(())
}
