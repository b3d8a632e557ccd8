use notely_core::Note;

use crate::commands::common::{
    format_timestamp, normalize_note_identifier, note_to_list_item, open_session, render_tags,
    resolve_note, CliPaths,
};
use crate::error::CliError;

pub async fn run_show(paths: &CliPaths, id: &str, as_json: bool) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let session = open_session(paths).await?;
    let note = resolve_note(&normalized_id, &session.orchestrator).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&note_to_list_item(&note))?);
    } else {
        print!("{}", render_note(&note));
    }
    Ok(())
}

pub fn render_note(note: &Note) -> String {
    let mut out = String::new();
    if !note.title.trim().is_empty() {
        out.push_str(&format!("# {}\n\n", note.title.trim()));
    }
    if !note.content.is_empty() {
        out.push_str(&note.content);
        out.push_str("\n\n");
    }

    let tags = render_tags(note);
    if !tags.is_empty() {
        out.push_str(&format!("tags:     {tags}\n"));
    }
    out.push_str(&format!("id:       {}\n", note.id));
    out.push_str(&format!("modified: {}\n", format_timestamp(note.last_modified)));
    out.push_str(&format!("sync:     {}\n", note.sync_status));
    out
}
