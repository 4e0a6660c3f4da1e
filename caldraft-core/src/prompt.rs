//! Prompt construction.
//!
//! Templates use four placeholders: `{event}` (the blank field shape),
//! `{reference}` (anchor instant for relative dates), `{timezone}` (zone
//! assumed when the text names none) and `{content}` (the source text).

use std::path::Path;

use tracing::{debug, warn};

use crate::context::ExtractionContext;
use crate::draft::EventDraft;

const BUILTIN_TEMPLATE: &str = "\
Fill in the fields of this structure with the details of the activity described below: {event}
Put the start in start.dateTime and the end in end.dateTime. Both must be on or after {reference}. \
The line starting with 'Date:' is the date of the message and is the reference for relative dates \
such as \"tomorrow\" or \"next Thursday\". Unless the text says otherwise the time zone is {timezone}.
Keep the original language of the text in every field, do not translate anything.
Reply with the completed structure only, as JSON, without comments or explanations. \
Every field name and every text value must be enclosed in double quotes.
The text is:
{content}";

/// A prompt template with placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate(String);

impl Default for PromptTemplate {
    fn default() -> Self {
        PromptTemplate(BUILTIN_TEMPLATE.to_string())
    }
}

impl PromptTemplate {
    /// Use `text` as the template if it has somewhere to put the content.
    pub fn from_text(text: &str) -> Option<Self> {
        if text.contains("{content}") {
            Some(PromptTemplate(text.to_string()))
        } else {
            None
        }
    }

    /// Load a template file, falling back to the built-in template when the
    /// file is absent, unreadable or has no `{content}` placeholder.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return PromptTemplate::default();
        };

        match std::fs::read_to_string(path) {
            Ok(text) => PromptTemplate::from_text(&text).unwrap_or_else(|| {
                warn!(
                    "Prompt template {} has no {{content}} placeholder, using built-in template",
                    path.display()
                );
                PromptTemplate::default()
            }),
            Err(e) => {
                warn!(
                    "Could not read prompt template {}: {}, using built-in template",
                    path.display(),
                    e
                );
                PromptTemplate::default()
            }
        }
    }
}

/// Build the instruction for one item.
pub fn build_prompt(template: &PromptTemplate, ctx: &ExtractionContext, timezone: &str) -> String {
    let shape = EventDraft::template_shape().to_string();
    let reference = ctx.reference_instant.format("%Y-%m-%d %H:%M:%S %:z").to_string();

    let prompt = template
        .0
        .replace("{event}", &shape)
        .replace("{reference}", &reference)
        .replace("{timezone}", timezone)
        .replace("{content}", &ctx.content_text);

    debug!("Prompt for {}:\n{}", ctx.item_id, prompt);
    prompt
}
