use notely_core::{Note, NotePatch};

use crate::commands::common::{
    capture_editor_input_with_initial, normalize_note_identifier, open_session, resolve_note,
    CliPaths,
};
use crate::error::CliError;

#[derive(Debug, Default)]
pub struct EditArgs {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Vec<String>,
    pub clear_tags: bool,
}

impl EditArgs {
    fn into_patch(self) -> NotePatch {
        let tags = if self.clear_tags {
            Some(Vec::new())
        } else if self.tags.is_empty() {
            None
        } else {
            Some(self.tags)
        };

        NotePatch {
            title: self.title.map(|title| title.trim().to_string()),
            content: self.content,
            tags,
        }
    }
}

pub async fn run_edit(paths: &CliPaths, id: &str, args: EditArgs) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let session = open_session(paths).await?;
    let note = resolve_note(&normalized_id, &session.orchestrator).await?;

    let patch = args.into_patch();
    let patch = if patch.is_empty() {
        let Some(edited_content) = capture_editor_input_with_initial(&note.content)? else {
            return Err(CliError::EmptyEditedContent);
        };
        NotePatch {
            content: Some(edited_content),
            ..NotePatch::default()
        }
    } else {
        patch
    };

    if !changes_note(&note, &patch) {
        println!("{}", note.id);
        return Ok(());
    }

    let updated = session.orchestrator.update(&note.id, patch).await?;
    session.finish().await;
    println!("{}", updated.id);
    Ok(())
}

/// Whether applying `patch` would change any field of `note`
pub fn changes_note(note: &Note, patch: &NotePatch) -> bool {
    let title_changed = patch
        .title
        .as_ref()
        .is_some_and(|title| *title != note.title);
    let content_changed = patch
        .content
        .as_ref()
        .is_some_and(|content| *content != note.content);
    let tags_changed = patch
        .tags
        .as_ref()
        .is_some_and(|tags| notely_core::models::normalize_tags(tags) != note.tags);

    title_changed || content_changed || tags_changed
}
