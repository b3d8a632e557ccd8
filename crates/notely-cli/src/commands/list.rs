use crate::commands::common::{
    filter_notes, format_note_lines, note_to_list_item, open_session, CliPaths, NoteListItem,
};
use crate::error::CliError;

pub async fn run_list(
    paths: &CliPaths,
    limit: Option<usize>,
    tag: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let session = open_session(paths).await?;
    let notes = filter_notes(session.orchestrator.notes().await?, tag, limit);

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if notes.is_empty() {
        println!("No notes yet.");
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
