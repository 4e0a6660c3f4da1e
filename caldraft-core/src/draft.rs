//! The calendar event under construction.
//!
//! Backends reply with loosely shaped structures; `EventDraft::from_structure`
//! maps whatever came back onto explicit optional fields so nothing downstream
//! has to care about key spelling or absence.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A date-time paired with a zone designation.
///
/// Before normalization either field may be absent and `date_time` may be
/// naive or carry an offset. After normalization `date_time` is a UTC
/// instant and `time_zone` is `"UTC"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePoint {
    pub date_time: Option<String>,
    pub time_zone: Option<String>,
}

impl TimePoint {
    pub fn new(date_time: impl Into<String>, time_zone: Option<&str>) -> Self {
        TimePoint {
            date_time: Some(date_time.into()),
            time_zone: time_zone.map(str::to_string),
        }
    }

    pub fn utc(date_time: impl Into<String>) -> Self {
        TimePoint::new(date_time, Some("UTC"))
    }
}

/// Mutable working structure for one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub summary: String,
    pub location: Option<String>,
    pub description: String,
    pub start: TimePoint,
    pub end: TimePoint,
    #[serde(default)]
    pub recurrence: Vec<String>,
}

impl EventDraft {
    /// The field shape embedded in the prompt, with every value blank.
    pub fn template_shape() -> Value {
        serde_json::json!({
            "summary": "",
            "location": "",
            "description": "",
            "start": { "dateTime": "", "timeZone": "" },
            "end": { "dateTime": "", "timeZone": "" },
            "recurrence": []
        })
    }

    /// Map a leniently parsed structure onto a draft.
    ///
    /// Unknown keys are ignored, blank strings count as absent, and a bare
    /// string in `start`/`end` is taken as the date-time itself.
    pub fn from_structure(value: &Value) -> Option<EventDraft> {
        let obj = value.as_object()?;

        Some(EventDraft {
            summary: text_field(obj, &["summary", "title"]).unwrap_or_default(),
            location: text_field(obj, &["location"]),
            description: text_field(obj, &["description"]).unwrap_or_default(),
            start: obj.get("start").map(time_point).unwrap_or_default(),
            end: obj.get("end").map(time_point).unwrap_or_default(),
            recurrence: obj.get("recurrence").map(recurrence).unwrap_or_default(),
        })
    }

    /// Append the original content to the description for traceability.
    pub fn attach_source(&mut self, content: &str) {
        self.description = if self.description.is_empty() {
            format!("Message:\n{}", content)
        } else {
            format!("{}\n\nMessage:\n{}", self.description, content)
        };
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| obj.get(*k).and_then(scalar_text))
}

fn time_point(value: &Value) -> TimePoint {
    match value {
        Value::Object(obj) => TimePoint {
            date_time: text_field(obj, &["dateTime", "date_time", "datetime", "date"]),
            time_zone: text_field(obj, &["timeZone", "time_zone", "timezone", "tz"]),
        },
        other => TimePoint {
            date_time: scalar_text(other),
            time_zone: None,
        },
    }
}

fn recurrence(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_structure_reads_nested_time_points() {
        let value = json!({
            "summary": "Concert",
            "location": "Teatro Real",
            "start": { "dateTime": "2024-05-10T20:00:00", "timeZone": "Europe/Madrid" },
            "end": { "dateTime": "", "timeZone": "" },
            "recurrence": ["RRULE:FREQ=WEEKLY"]
        });

        let draft = EventDraft::from_structure(&value).unwrap();

        assert_eq!(draft.summary, "Concert");
        assert_eq!(draft.location.as_deref(), Some("Teatro Real"));
        assert_eq!(draft.start.date_time.as_deref(), Some("2024-05-10T20:00:00"));
        assert_eq!(draft.start.time_zone.as_deref(), Some("Europe/Madrid"));
        assert_eq!(draft.end.date_time, None);
        assert_eq!(draft.end.time_zone, None);
        assert_eq!(draft.recurrence, vec!["RRULE:FREQ=WEEKLY".to_string()]);
    }

    #[test]
    fn from_structure_accepts_bare_strings_and_missing_keys() {
        let value = json!({ "title": "Lunch", "start": "2024-01-01 13:00" });

        let draft = EventDraft::from_structure(&value).unwrap();

        assert_eq!(draft.summary, "Lunch");
        assert_eq!(draft.start.date_time.as_deref(), Some("2024-01-01 13:00"));
        assert_eq!(draft.location, None);
        assert!(draft.recurrence.is_empty());
    }

    #[test]
    fn from_structure_rejects_non_objects() {
        assert!(EventDraft::from_structure(&json!(["summary"])).is_none());
    }

    #[test]
    fn attach_source_accumulates() {
        let mut draft = EventDraft {
            description: "Bring slides".into(),
            ..Default::default()
        };
        draft.attach_source("original mail");
        assert_eq!(draft.description, "Bring slides\n\nMessage:\noriginal mail");

        let mut empty = EventDraft::default();
        empty.attach_source("body");
        assert_eq!(empty.description, "Message:\nbody");
    }

    #[test]
    fn serializes_with_calendar_key_names() {
        let draft = EventDraft {
            start: TimePoint::utc("2024-01-01T09:00:00Z"),
            ..Default::default()
        };
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value["start"]["dateTime"], "2024-01-01T09:00:00Z");
        assert_eq!(value["start"]["timeZone"], "UTC");
    }
}
