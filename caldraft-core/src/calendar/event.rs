//! Provider-neutral event built from a finished draft.

use chrono::{DateTime, Utc};
use rrule::RRuleSet;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{MAX_DESCRIPTION_CHARS, MAX_SUMMARY_CHARS};
use crate::draft::{EventDraft, TimePoint};
use crate::error::{DraftError, DraftResult};

/// A calendar event ready to be published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// RRULE, EXDATE, RDATE lines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recurrence: Vec<String>,
}

fn instant(point: &TimePoint, field: &'static str) -> DraftResult<DateTime<Utc>> {
    point
        .date_time
        .as_deref()
        .and_then(|dt| DateTime::parse_from_rfc3339(dt).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(DraftError::MissingRequiredField(field))
}

fn truncate(text: &str, max: usize, field: &str) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    warn!("Truncating {} to {} characters", field, max);
    text.chars().take(max).collect()
}

/// Keep the recurrence lines the rrule parser accepts for this start.
/// A bare `FREQ=...` rule is given its `RRULE:` prefix.
pub fn valid_recurrence(lines: &[String], start: DateTime<Utc>) -> Vec<String> {
    let dtstart = format!("DTSTART:{}", start.format("%Y%m%dT%H%M%SZ"));

    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| {
            if line.to_uppercase().starts_with("FREQ=") {
                format!("RRULE:{}", line)
            } else {
                line.to_string()
            }
        })
        .filter(|line| {
            // EXDATE/RDATE alone is not a set rrule accepts
            let probe = if line.starts_with("RRULE:") {
                format!("{}\n{}", dtstart, line)
            } else {
                format!("{}\nRRULE:FREQ=DAILY;COUNT=1\n{}", dtstart, line)
            };
            match probe.parse::<RRuleSet>() {
                Ok(_) => true,
                Err(e) => {
                    warn!("Dropping recurrence line '{}': {}", line, e);
                    false
                }
            }
        })
        .collect()
}

impl Event {
    /// Convert a normalized draft. Summary and description are cut to the
    /// lengths calendar providers accept.
    pub fn from_draft(draft: &EventDraft) -> DraftResult<Event> {
        let start = instant(&draft.start, "start")?;
        let end = instant(&draft.end, "end")?;

        let description = match draft.description.trim() {
            "" => None,
            d => Some(truncate(d, MAX_DESCRIPTION_CHARS, "description")),
        };

        Ok(Event {
            uid: format!("caldraft-{}", uuid::Uuid::new_v4()),
            summary: truncate(&draft.summary, MAX_SUMMARY_CHARS, "summary"),
            description,
            location: draft.location.clone().filter(|l| !l.trim().is_empty()),
            start,
            end,
            recurrence: valid_recurrence(&draft.recurrence, start),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> EventDraft {
        EventDraft {
            summary: "Standup".into(),
            location: Some(" ".into()),
            description: "Daily sync".into(),
            start: TimePoint::utc("2024-01-01T09:00:00Z"),
            end: TimePoint::utc("2024-01-01T09:15:00Z"),
            recurrence: vec![],
        }
    }

    #[test]
    fn converts_normalized_draft() {
        let event = Event::from_draft(&draft()).unwrap();

        assert!(event.uid.starts_with("caldraft-"));
        assert_eq!(event.start.to_rfc3339(), "2024-01-01T09:00:00+00:00");
        assert_eq!(event.description.as_deref(), Some("Daily sync"));
        assert_eq!(event.location, None);
    }

    #[test]
    fn fresh_uid_each_time() {
        let a = Event::from_draft(&draft()).unwrap();
        let b = Event::from_draft(&draft()).unwrap();
        assert_ne!(a.uid, b.uid);
    }

    #[test]
    fn long_fields_are_truncated() {
        let mut d = draft();
        d.summary = "é".repeat(MAX_SUMMARY_CHARS + 10);
        d.description = "x".repeat(MAX_DESCRIPTION_CHARS * 2);

        let event = Event::from_draft(&d).unwrap();

        assert_eq!(event.summary.chars().count(), MAX_SUMMARY_CHARS);
        assert_eq!(event.description.unwrap().len(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn unnormalized_draft_is_refused() {
        let mut d = draft();
        d.end = TimePoint::default();
        assert!(matches!(
            Event::from_draft(&d),
            Err(DraftError::MissingRequiredField("end"))
        ));
    }

    #[test]
    fn invalid_recurrence_lines_are_dropped() {
        let start = DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let lines = vec![
            "RRULE:FREQ=WEEKLY;BYDAY=MO".to_string(),
            "FREQ=DAILY;COUNT=5".to_string(),
            "every other tuesday".to_string(),
            "RRULE:FREQ=SOMETIMES".to_string(),
        ];

        assert_eq!(
            valid_recurrence(&lines, start),
            vec!["RRULE:FREQ=WEEKLY;BYDAY=MO", "RRULE:FREQ=DAILY;COUNT=5"]
        );
    }
}
