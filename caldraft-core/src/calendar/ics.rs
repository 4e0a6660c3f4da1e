//! ICS file generation.

use icalendar::{Calendar, Component, EventLike, Property};

use crate::calendar::event::Event;
use crate::error::DraftResult;

const ICS_UTC: &str = "%Y%m%dT%H%M%SZ";

/// Generate .ics content for a single event.
pub fn generate_ics(event: &Event) -> DraftResult<String> {
    let mut cal = Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&event.uid);
    ics_event.summary(&event.summary);

    // DTSTAMP is required by RFC 5545
    ics_event.add_property("DTSTAMP", chrono::Utc::now().format(ICS_UTC).to_string());

    ics_event.add_property("DTSTART", event.start.format(ICS_UTC).to_string());
    ics_event.add_property("DTEND", event.end.format(ICS_UTC).to_string());

    if let Some(ref desc) = event.description {
        ics_event.description(desc);
    }

    if let Some(ref loc) = event.location {
        ics_event.location(loc);
    }

    // RRULE may appear once, EXDATE/RDATE several times
    for line in &event.recurrence {
        if let Some((name, value)) = line.split_once(':') {
            let prop = Property::new(name, value);
            if name == "RRULE" {
                ics_event.append_property(prop);
            } else {
                ics_event.append_multi_property(prop);
            }
        }
    }

    let ics_event = ics_event.done();
    cal.push(ics_event);
    let cal = cal.done();

    Ok(strip_ics_bloat(&cal.to_string()))
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with CALDRAFT
/// - Remove CALSCALE:GREGORIAN (it's the default)
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:CALDRAFT\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_test_event() -> Event {
        Event {
            uid: "caldraft-test-123".to_string(),
            summary: "Test Event".to_string(),
            description: Some("Message:\nsee you there".to_string()),
            location: Some("Room 4".to_string()),
            start: Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 3, 20, 16, 0, 0).unwrap(),
            recurrence: vec![],
        }
    }

    #[test]
    fn test_generate_ics_has_utc_times() {
        let ics = generate_ics(&make_test_event()).unwrap();

        assert!(ics.contains("DTSTART:20250320T150000Z"), "ICS:\n{}", ics);
        assert!(ics.contains("DTEND:20250320T160000Z"), "ICS:\n{}", ics);
        assert!(ics.contains("UID:caldraft-test-123"));
        assert!(ics.contains("LOCATION:Room 4"));
    }

    #[test]
    fn test_generate_ics_strips_bloat() {
        let ics = generate_ics(&make_test_event()).unwrap();

        assert!(ics.contains("PRODID:CALDRAFT\r\n"));
        assert!(!ics.contains("CALSCALE"));
    }

    #[test]
    fn test_generate_ics_recurrence_lines() {
        let mut event = make_test_event();
        event.recurrence = vec![
            "RRULE:FREQ=WEEKLY;COUNT=4".to_string(),
            "EXDATE:20250327T150000Z".to_string(),
        ];

        let ics = generate_ics(&event).unwrap();

        assert!(ics.contains("RRULE:FREQ=WEEKLY;COUNT=4"), "ICS:\n{}", ics);
        assert!(ics.contains("EXDATE:20250327T150000Z"), "ICS:\n{}", ics);
    }
}
