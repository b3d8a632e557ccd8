use notely_core::models::extract_tags;
use notely_core::NoteDraft;

use crate::commands::common::{open_session, resolve_note_content, CliPaths};
use crate::error::CliError;

pub async fn run_add(
    paths: &CliPaths,
    title: Option<String>,
    tags: &[String],
    content_parts: &[String],
) -> Result<(), CliError> {
    let title = notely_core::util::normalize_text_option(title);
    let content = if title.is_some() && content_parts.is_empty() {
        String::new()
    } else {
        resolve_note_content(content_parts)?
    };

    let draft = build_draft(title, tags, content);
    let session = open_session(paths).await?;
    let note = session.orchestrator.create(draft).await?;
    session.finish().await;

    println!("{}", note.id);
    Ok(())
}

/// Explicit tags plus any #hashtags found in the content
pub fn build_draft(title: Option<String>, tags: &[String], content: String) -> NoteDraft {
    let mut all_tags = tags
        .iter()
        .map(|tag| tag.trim().trim_start_matches('#').to_string())
        .collect::<Vec<_>>();
    all_tags.extend(extract_tags(&content));

    NoteDraft {
        title: title.unwrap_or_default(),
        content,
        tags: all_tags,
    }
}
