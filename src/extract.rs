//! Document-to-task extraction.
//!
//! `TaskExtractor` is the seam for a text-extraction collaborator (an LLM
//! service in a hosted deployment). Project launch calls it when the form
//! carries document text; a failing extractor never blocks the launch.
//!
//! `OutlineExtractor` is the offline implementation: it reads a markdown-ish
//! outline, takes the first prose paragraph as the summary and turns list
//! items into task drafts.

use async_trait::async_trait;

use crate::fields::Status;
use crate::task::TaskDraft;

/// Documents are cut to this many characters before extraction.
pub const MAX_DOCUMENT_CHARS: usize = 15_000;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("document is empty")]
    Empty,

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// What an extractor found in a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub summary: String,
    /// Drafts without a project id; the launcher fills it in.
    pub tasks: Vec<TaskDraft>,
}

#[async_trait]
pub trait TaskExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Extraction, ExtractError>;
}

/// Cut `text` to at most `max` characters on a char boundary.
pub fn truncate_document(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Offline extractor for outlines.
///
/// - `#` lines are headings; bullets under a heading mentioning "goal" become
///   `GOAL` drafts, all other bullets `TODO` drafts
/// - `-`, `*`, `+`, `1.` and `- [ ]` / `- [x]` mark list items
/// - indented lines under an item become its description
#[derive(Debug, Clone, Default)]
pub struct OutlineExtractor;

impl OutlineExtractor {
    pub fn new() -> Self {
        OutlineExtractor
    }

    fn parse(&self, text: &str) -> Extraction {
        let mut summary_lines: Vec<&str> = Vec::new();
        let mut summary_done = false;
        let mut in_goal_section = false;
        let mut tasks: Vec<TaskDraft> = Vec::new();
        let mut next_order = [0u32; 4];

        for raw in text.lines() {
            let line = raw.trim();

            if line.is_empty() {
                if !summary_lines.is_empty() {
                    summary_done = true;
                }
                continue;
            }

            if let Some(heading) = line.strip_prefix('#') {
                in_goal_section = heading.to_lowercase().contains("goal");
                if !summary_lines.is_empty() {
                    summary_done = true;
                }
                continue;
            }

            if let Some(item) = list_item(line) {
                if !summary_lines.is_empty() {
                    summary_done = true;
                }
                let status = if in_goal_section { Status::Goal } else { Status::Todo };
                let slot = &mut next_order[status.index()];
                let mut draft = TaskDraft::new(item);
                draft.status = status;
                draft.order = Some(*slot);
                draft.is_ai_generated = true;
                *slot += 1;
                tasks.push(draft);
                continue;
            }

            let indented = raw.starts_with(char::is_whitespace);
            match tasks.last_mut() {
                Some(last) if indented => {
                    if !last.description.is_empty() {
                        last.description.push(' ');
                    }
                    last.description.push_str(line);
                }
                _ if !summary_done => summary_lines.push(line),
                _ => {}
            }
        }

        Extraction { summary: summary_lines.join(" "), tasks }
    }
}

/// Text of a list item, or `None` for any other line.
fn list_item(line: &str) -> Option<&str> {
    let rest = ["- ", "* ", "+ "]
        .iter()
        .find_map(|m| line.strip_prefix(m))
        .or_else(|| {
            let digits = line.chars().take_while(char::is_ascii_digit).count();
            if digits == 0 {
                return None;
            }
            line[digits..].strip_prefix(". ").or_else(|| line[digits..].strip_prefix(") "))
        })?;
    let rest = rest.trim_start();
    let rest = ["[ ] ", "[x] ", "[X] "]
        .iter()
        .find_map(|m| rest.strip_prefix(m))
        .unwrap_or(rest)
        .trim();
    (!rest.is_empty()).then_some(rest)
}

#[async_trait]
impl TaskExtractor for OutlineExtractor {
    async fn extract(&self, text: &str) -> Result<Extraction, ExtractError> {
        let text = truncate_document(text, MAX_DOCUMENT_CHARS);
        if text.trim().is_empty() {
            return Err(ExtractError::Empty);
        }
        let extraction = self.parse(text);
        tracing::debug!("Extracted {} drafts from document", extraction.tasks.len());
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "# Launch plan\n\
Ship the public beta by spring.\n\
Keep the scope small.\n\
\n\
## Goals\n\
- Reach 100 beta users\n\
\n\
## Work\n\
- [ ] Set up CI\n\
\x20 GitHub actions with caching\n\
- [x] Draft pricing page\n\
1. Write onboarding emails\n\
Loose prose after the list is ignored.\n";

    #[tokio::test]
    async fn test_outline_extraction() {
        let out = OutlineExtractor::new().extract(PLAN).await.unwrap();
        assert_eq!(out.summary, "Ship the public beta by spring. Keep the scope small.");
        let titles: Vec<(&str, Status, Option<u32>)> =
            out.tasks.iter().map(|t| (t.content.as_str(), t.status, t.order)).collect();
        assert_eq!(
            titles,
            vec![
                ("Reach 100 beta users", Status::Goal, Some(0)),
                ("Set up CI", Status::Todo, Some(0)),
                ("Draft pricing page", Status::Todo, Some(1)),
                ("Write onboarding emails", Status::Todo, Some(2)),
            ]
        );
        assert_eq!(out.tasks[1].description, "GitHub actions with caching");
        assert!(out.tasks.iter().all(|t| t.is_ai_generated && t.project_id.is_none()));
    }

    #[tokio::test]
    async fn test_empty_document_is_an_error() {
        assert!(matches!(OutlineExtractor::new().extract("  \n ").await, Err(ExtractError::Empty)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_document("héllo", 2), "hé");
        assert_eq!(truncate_document("hi", 10), "hi");
    }

    #[test]
    fn test_list_item_markers() {
        assert_eq!(list_item("- a"), Some("a"));
        assert_eq!(list_item("12) b"), Some("b"));
        assert_eq!(list_item("- [ ] "), None);
        assert_eq!(list_item("2026 was fine"), None);
        assert_eq!(list_item("-dash"), None);
    }
}
