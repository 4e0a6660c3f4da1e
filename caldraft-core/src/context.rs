//! Immutable input bundle for one source item.

use chrono::{DateTime, FixedOffset};

/// Everything the pipeline knows about one source item (an email, a web page).
///
/// Created by the ingestion side and handed to the pipeline by value. The
/// pipeline never mutates it, so a restart re-enters extraction with exactly
/// the same input.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionContext {
    /// Free text combining title, reference date marker and body.
    pub content_text: String,
    /// Anchor for relative dates such as "next Thursday".
    pub reference_instant: DateTime<FixedOffset>,
    /// Opaque identifier used to key side-channel artifacts.
    pub item_id: String,
    /// Fallback event title.
    pub display_label: String,
}

impl ExtractionContext {
    pub fn new(
        content_text: impl Into<String>,
        reference_instant: DateTime<FixedOffset>,
        item_id: impl Into<String>,
        display_label: impl Into<String>,
    ) -> Self {
        ExtractionContext {
            content_text: content_text.into(),
            reference_instant,
            item_id: item_id.into(),
            display_label: display_label.into(),
        }
    }

    /// Build a context from a title and body, embedding the `Date:` marker
    /// the prompt tells the backend to use as reference.
    pub fn from_parts(
        title: &str,
        body: &str,
        reference_instant: DateTime<FixedOffset>,
        item_id: impl Into<String>,
    ) -> Self {
        let content_text = format!("{}\nDate:{}\n{}", title, reference_instant, body);
        ExtractionContext::new(content_text, reference_instant, item_id, title)
    }
}
