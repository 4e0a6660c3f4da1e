//! Time normalization.
//!
//! Converts possibly incomplete, zone-ambiguous start/end fields into an
//! ordered pair of UTC instants. `normalize` is idempotent: the pipeline runs
//! it again after manual edits and confirmation adjustments.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone,
    Utc,
};
use chrono_tz::Tz;
use tracing::warn;

use crate::constants::{INFERRED_DURATION_MINUTES, MANUAL_DATETIME_FORMAT};
use crate::draft::{EventDraft, TimePoint};
use crate::error::{DraftError, DraftResult};

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A date-time string after parsing, before localization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTime {
    /// Carries its own offset; any zone name next to it is ignored.
    Zoned(DateTime<FixedOffset>),
    /// Needs a zone before it means anything.
    Naive(NaiveDateTime),
}

/// Whether a date falls in the years 1 to 9999, the range ICS and
/// providers can store.
pub fn within_calendar_years(date: &impl Datelike) -> bool {
    (1..=9999).contains(&date.year())
}

/// Parse an ISO-8601-ish date-time. Date-only input is taken as midnight.
/// Years outside 1 to 9999 are not dates.
pub fn parse_date_time(input: &str) -> Option<ParsedTime> {
    parse_any_year(input).filter(|parsed| match parsed {
        ParsedTime::Zoned(dt) => within_calendar_years(dt),
        ParsedTime::Naive(dt) => within_calendar_years(dt),
    })
}

fn parse_any_year(input: &str) -> Option<ParsedTime> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(ParsedTime::Zoned(dt));
    }

    // "...Z" without seconds is common and not RFC 3339
    let offset_form = match input.strip_suffix('Z').or_else(|| input.strip_suffix('z')) {
        Some(rest) => format!("{}+00:00", rest),
        None => input.to_string(),
    };
    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&offset_form, fmt) {
            return Some(ParsedTime::Zoned(dt));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(ParsedTime::Naive(dt));
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(ParsedTime::Naive)
}

/// Resolve an IANA zone name, degrading to `default_zone` when unknown.
pub fn resolve_zone(name: Option<&str>, default_zone: Tz) -> Tz {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            warn!("Unknown time zone '{}', using {}", name, default_zone);
            default_zone
        }),
        None => default_zone,
    }
}

/// Interpret a wall-clock time in `zone` and return the UTC instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// DST gap are moved forward by an hour.
pub fn localize(naive: NaiveDateTime, zone: Tz) -> DateTime<Utc> {
    if let Some(dt) = zone.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    naive
        .checked_add_signed(Duration::hours(1))
        .and_then(|later| zone.from_local_datetime(&later).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// The absolute instant a time point denotes, if it denotes one inside the
/// calendar years.
pub fn instant_of(point: &TimePoint, default_zone: Tz) -> Option<DateTime<Utc>> {
    let parsed = parse_date_time(point.date_time.as_deref()?)?;
    let instant = match parsed {
        ParsedTime::Zoned(dt) => dt.with_timezone(&Utc),
        ParsedTime::Naive(naive) => {
            localize(naive, resolve_zone(point.time_zone.as_deref(), default_zone))
        }
    };
    Some(instant).filter(within_calendar_years)
}

/// Canonical text form of a normalized instant.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn utc_point(instant: DateTime<Utc>) -> TimePoint {
    TimePoint::utc(format_instant(instant))
}

/// The endpoint `delta` away from `from`, or an empty point when that leaves
/// the calendar years.
fn shifted_point(from: DateTime<Utc>, delta: Duration, which: &str) -> TimePoint {
    match from.checked_add_signed(delta).filter(within_calendar_years) {
        Some(instant) => utc_point(instant),
        None => {
            warn!(
                "{} time cannot be placed next to {}, dropping it",
                which,
                format_instant(from)
            );
            TimePoint::default()
        }
    }
}

fn localize_point(point: &TimePoint, default_zone: Tz, which: &str) -> (Option<DateTime<Utc>>, TimePoint) {
    let Some(raw) = point.date_time.as_deref() else {
        return (None, point.clone());
    };

    match instant_of(point, default_zone) {
        Some(instant) => (Some(instant), utc_point(instant)),
        None => {
            warn!("{} time '{}' is not a valid ISO 8601 date-time, dropping it", which, raw);
            (None, TimePoint::default())
        }
    }
}

/// Normalize start and end of a draft.
///
/// 1. Localize each endpoint (embedded offset, else its zone, else
///    `default_zone`) and rewrite it as a UTC instant tagged `"UTC"`.
/// 2. If only one endpoint exists, synthesize the other 30 minutes away.
/// 3. If `end <= start`, move end to `start + 30 minutes`.
pub fn normalize(draft: &EventDraft, default_zone: Tz) -> EventDraft {
    let gap = Duration::minutes(INFERRED_DURATION_MINUTES);
    let (start, start_point) = localize_point(&draft.start, default_zone, "Start");
    let (end, end_point) = localize_point(&draft.end, default_zone, "End");

    let (start_point, end_point) = match (start, end) {
        (Some(s), Some(e)) if e <= s => (start_point, shifted_point(s, gap, "End")),
        (Some(s), None) => (start_point, shifted_point(s, gap, "End")),
        (None, Some(e)) => (shifted_point(e, -gap, "Start"), end_point),
        _ => (start_point, end_point),
    };

    EventDraft {
        start: start_point,
        end: end_point,
        ..draft.clone()
    }
}

/// Parse a date-time typed by the operator (`YYYY-MM-DD HH:MM:SS`, a `T`
/// separator and omitted seconds are accepted too).
pub fn parse_typed_datetime(input: &str) -> DraftResult<NaiveDateTime> {
    let input = input.trim();
    [MANUAL_DATETIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .filter(within_calendar_years)
        .ok_or_else(|| {
            DraftError::InvalidManualInput(format!(
                "'{}' is not a date/time, use YYYY-MM-DD HH:MM:SS",
                input
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn berlin() -> Tz {
        "Europe/Berlin".parse().unwrap()
    }

    fn draft(start: Option<&str>, end: Option<&str>) -> EventDraft {
        EventDraft {
            summary: "Test".into(),
            start: TimePoint {
                date_time: start.map(str::to_string),
                time_zone: None,
            },
            end: TimePoint {
                date_time: end.map(str::to_string),
                time_zone: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn localizes_naive_time_in_default_zone() {
        let plus_one: Tz = "Etc/GMT-1".parse().unwrap();
        let out = normalize(&draft(Some("2024-01-01T10:00:00"), None), plus_one);

        assert_eq!(out.start, TimePoint::utc("2024-01-01T09:00:00Z"));
        assert_eq!(out.end, TimePoint::utc("2024-01-01T09:30:00Z"));
    }

    #[test]
    fn infers_start_thirty_minutes_before_end() {
        let out = normalize(&draft(None, Some("2024-01-01T11:00:00")), berlin());

        assert_eq!(out.end, TimePoint::utc("2024-01-01T10:00:00Z"));
        assert_eq!(out.start, TimePoint::utc("2024-01-01T09:30:00Z"));
    }

    #[test]
    fn explicit_zone_wins_over_default() {
        let mut d = draft(Some("2024-07-01T10:00:00"), Some("2024-07-01T12:00:00"));
        d.start.time_zone = Some("America/New_York".into());

        let out = normalize(&d, berlin());

        assert_eq!(out.start.date_time.as_deref(), Some("2024-07-01T14:00:00Z"));
        // 12:00 Berlin is 10:00Z, before start, so end is pushed forward
        assert_eq!(out.end.date_time.as_deref(), Some("2024-07-01T14:30:00Z"));
    }

    #[test]
    fn unknown_zone_degrades_to_default() {
        let mut d = draft(Some("2024-01-01T10:00:00"), None);
        d.start.time_zone = Some("Mars/Olympus_Mons".into());

        let out = normalize(&d, berlin());

        assert_eq!(out.start, TimePoint::utc("2024-01-01T09:00:00Z"));
    }

    #[test]
    fn embedded_offset_ignores_zone_name() {
        let mut d = draft(Some("2024-01-01T10:00:00+05:00"), None);
        d.start.time_zone = Some("Europe/Berlin".into());

        let out = normalize(&d, berlin());

        assert_eq!(out.start.date_time.as_deref(), Some("2024-01-01T05:00:00Z"));
    }

    #[test]
    fn end_not_after_start_is_pushed_forward() {
        let out = normalize(
            &draft(Some("2024-01-01T10:00:00Z"), Some("2024-01-01T10:00:00Z")),
            berlin(),
        );
        assert_eq!(out.end.date_time.as_deref(), Some("2024-01-01T10:30:00Z"));

        let out = normalize(
            &draft(Some("2024-01-01T10:00:00Z"), Some("2024-01-01T08:00:00Z")),
            berlin(),
        );
        assert_eq!(out.end.date_time.as_deref(), Some("2024-01-01T10:30:00Z"));
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut zoned = draft(Some("2024-10-27T02:30:00"), Some("2024-10-27T01:00:00"));
        zoned.end.time_zone = Some("Asia/Tokyo".into());

        let cases = vec![
            draft(Some("2024-01-01T10:00:00"), None),
            draft(None, Some("2024-01-01 11:00")),
            draft(Some("2024-01-01T10:00:00+02:00"), Some("2024-01-01T09:00:00Z")),
            draft(Some("2024-03-31T02:30:00"), Some("2024-03-31T04:00:00")),
            draft(Some("not a date"), Some("2024-01-01")),
            draft(None, None),
            zoned,
        ];

        for d in cases {
            let once = normalize(&d, berlin());
            let twice = normalize(&once, berlin());
            assert_eq!(once, twice, "normalize not idempotent for {:?}", d);
        }
    }

    #[test]
    fn ordering_holds_after_normalization() {
        let cases = vec![
            draft(Some("2024-01-01T10:00:00"), Some("2024-01-01T09:00:00")),
            draft(Some("2024-01-01T10:00:00"), None),
            draft(None, Some("2024-01-01T10:00:00")),
            draft(Some("2024-06-01T23:59:59Z"), Some("2024-06-01T23:59:59Z")),
        ];

        for d in cases {
            let out = normalize(&d, berlin());
            let start = instant_of(&out.start, berlin()).unwrap();
            let end = instant_of(&out.end, berlin()).unwrap();
            assert!(end > start, "end {} not after start {}", end, start);
            assert_eq!(out.start.time_zone.as_deref(), Some("UTC"));
            assert_eq!(out.end.time_zone.as_deref(), Some("UTC"));
        }
    }

    #[test]
    fn unparseable_time_is_dropped_and_inferred() {
        let out = normalize(&draft(Some("next thursday"), Some("2024-01-01T11:00:00Z")), berlin());
        assert_eq!(out.start, TimePoint::utc("2024-01-01T10:30:00Z"));
    }

    #[test]
    fn dst_gap_moves_forward() {
        // 02:30 does not exist in Berlin on 2024-03-31
        let instant = localize(
            NaiveDateTime::parse_from_str("2024-03-31T02:30:00", "%Y-%m-%dT%H:%M:%S").unwrap(),
            berlin(),
        );
        assert_eq!(format_instant(instant), "2024-03-31T01:30:00Z");
    }

    #[test]
    fn date_only_is_midnight() {
        match parse_date_time("2024-05-01") {
            Some(ParsedTime::Naive(dt)) => assert_eq!(dt.hour(), 0),
            other => panic!("Expected naive midnight, got {:?}", other),
        }
    }

    #[test]
    fn z_suffix_without_seconds_is_zoned() {
        assert!(matches!(parse_date_time("2024-05-01T10:00Z"), Some(ParsedTime::Zoned(_))));
    }

    #[test]
    fn years_beyond_9999_are_not_dates() {
        assert_eq!(parse_date_time("+262142-12-31T23:50:00Z"), None);
        assert_eq!(parse_date_time("10000-01-01T00:00:00"), None);

        let out = normalize(&draft(Some("+262142-12-31T23:50:00Z"), None), berlin());
        assert_eq!(out.start, TimePoint::default());
        assert_eq!(out.end, TimePoint::default());
    }

    #[test]
    fn inferred_end_past_year_9999_is_dropped() {
        let d = draft(Some("9999-12-31T23:50:00Z"), None);
        let out = normalize(&d, Tz::UTC);

        assert_eq!(out.start, TimePoint::utc("9999-12-31T23:50:00Z"));
        assert_eq!(out.end, TimePoint::default());
        assert_eq!(normalize(&out, Tz::UTC), out);

        let pushed = normalize(
            &draft(Some("9999-12-31T23:50:00Z"), Some("9999-12-31T23:00:00Z")),
            Tz::UTC,
        );
        assert_eq!(pushed.end, TimePoint::default());
    }

    #[test]
    fn inferred_start_before_year_1_is_dropped() {
        let out = normalize(&draft(None, Some("0001-01-01T00:10:00Z")), Tz::UTC);

        assert_eq!(out.start, TimePoint::default());
        assert_eq!(out.end, TimePoint::utc("0001-01-01T00:10:00Z"));
    }

    #[test]
    fn offset_pushing_past_year_9999_is_rejected() {
        let point = TimePoint::new("9999-12-31T23:00:00-05:00", None);
        assert_eq!(instant_of(&point, Tz::UTC), None);
    }

    #[test]
    fn typed_datetime_formats() {
        assert!(parse_typed_datetime("2024-01-01 10:00:00").is_ok());
        assert!(parse_typed_datetime("2024-01-01T10:00").is_ok());
        assert!(matches!(
            parse_typed_datetime("tomorrow"),
            Err(DraftError::InvalidManualInput(_))
        ));
    }
}
