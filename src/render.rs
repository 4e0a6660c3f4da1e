//! TUI rendering for caldraft types.
//!
//! Extension traits and helpers that add colored terminal output to
//! caldraft-core types using owo_colors.

use caldraft_core::draft::{EventDraft, TimePoint};
use caldraft_core::normalize::instant_of;
use caldraft_core::pipeline::ItemOutcome;
use chrono_tz::Tz;
use owo_colors::OwoColorize;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for ItemOutcome {
    fn render(&self) -> String {
        match self {
            ItemOutcome::Published { draft, receipt } => format!(
                "{} {} {}",
                "+".green(),
                draft.summary.green(),
                receipt.dimmed()
            ),
            ItemOutcome::Skipped { item_id, reason } => {
                format!("{} {} {}", "-".yellow(), item_id.yellow(), reason.dimmed())
            }
            ItemOutcome::Failed { item_id, reason } => {
                format!("{} {} {}", "!".red(), item_id.red(), reason.dimmed())
            }
        }
    }
}

fn render_time(point: &TimePoint, zone: Tz) -> String {
    match instant_of(point, zone) {
        Some(instant) => instant
            .with_timezone(&zone)
            .format("%a %Y-%m-%d %H:%M %Z")
            .to_string(),
        None => "(unset)".to_string(),
    }
}

/// Multi-line view of a draft, times shown in `zone`.
pub fn render_draft(draft: &EventDraft, zone: Tz) -> String {
    let mut lines = vec![
        format!("  {}", draft.summary.bold()),
        format!("  Start: {}", render_time(&draft.start, zone)),
        format!("  End:   {}", render_time(&draft.end, zone)),
    ];

    if let Some(location) = &draft.location {
        lines.push(format!("  Where: {}", location));
    }
    for rule in &draft.recurrence {
        lines.push(format!("  {}", rule.dimmed()));
    }

    lines.join("\n")
}

pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}
