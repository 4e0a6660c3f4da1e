//! Tolerant structure extraction from backend replies.
//!
//! Replies arrive wrapped in prose, markdown fences or a reasoning preamble.
//! The payload is taken to be everything between the first `{` and the last
//! `}`. That tolerates commentary on either side but mis-extracts when the
//! reply contains a second brace-delimited block after the payload.

pub mod lenient;

use serde_json::Value;
use tracing::debug;

use crate::draft::EventDraft;
use crate::error::{DraftError, DraftResult};

const THINK_CLOSE: &str = "</think>";

/// Strip stray escapes and collapse line breaks to spaces.
///
/// Literal `\n`, `\r` and `\t` sequences become spaces; any other backslash
/// is dropped. Real newlines are collapsed the same way.
pub fn clean_reply(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if matches!(chars.peek(), Some('n') | Some('r') | Some('t')) {
                    chars.next();
                    out.push(' ');
                }
            }
            '\n' | '\r' => out.push(' '),
            other => out.push(other),
        }
    }

    out
}

/// Drop a `<think>...</think>` reasoning preamble if the reply has one.
fn skip_reasoning(text: &str) -> &str {
    match text.rfind(THINK_CLOSE) {
        Some(idx) => &text[idx + THINK_CLOSE.len()..],
        None => text,
    }
}

/// Slice from the first `{` to the last `}` inclusive.
pub fn locate_structure(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Recover a structure from a raw reply.
pub fn try_extract(raw: &str) -> DraftResult<Value> {
    let cleaned = clean_reply(raw);
    let body = skip_reasoning(&cleaned);
    let candidate = locate_structure(body)
        .ok_or_else(|| DraftError::MalformedStructure("no braces in reply".into()))?;

    let value = lenient::parse(candidate).map_err(|e| DraftError::MalformedStructure(e.to_string()))?;
    if !value.is_object() {
        return Err(DraftError::MalformedStructure("payload is not an object".into()));
    }
    Ok(value)
}

/// Recover a structure from a raw reply, or `None` ("no structure").
pub fn extract(raw: &str) -> Option<Value> {
    match try_extract(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("{}", e);
            None
        }
    }
}

/// Recover a draft from a raw reply, or `None` ("no structure").
pub fn extract_draft(raw: &str) -> Option<EventDraft> {
    extract(raw).and_then(|value| EventDraft::from_structure(&value))
}
