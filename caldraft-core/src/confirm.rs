//! Interactive confirmation of a normalized draft.
//!
//! Edits are made in wall-clock time of the default zone, then the draft goes
//! back through `normalize` so ordering holds again before control returns.

use chrono::{Datelike, Months, NaiveDateTime, Timelike};
use chrono_tz::Tz;

use crate::draft::{EventDraft, TimePoint};
use crate::error::{DraftError, DraftResult};
use crate::interaction::Interaction;
use crate::normalize::{instant_of, normalize, parse_typed_datetime, within_calendar_years};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Year,
    Month,
    Day,
    Hour,
    Minute,
}

impl Component {
    fn label(&self) -> &'static str {
        match self {
            Component::Year => "year",
            Component::Month => "month",
            Component::Day => "day",
            Component::Hour => "hour",
            Component::Minute => "minute",
        }
    }

    fn get(&self, dt: &NaiveDateTime) -> i64 {
        match self {
            Component::Year => dt.year() as i64,
            Component::Month => dt.month() as i64,
            Component::Day => dt.day() as i64,
            Component::Hour => dt.hour() as i64,
            Component::Minute => dt.minute() as i64,
        }
    }

    fn set(&self, dt: &NaiveDateTime, value: i64) -> Option<NaiveDateTime> {
        match self {
            Component::Year => dt.with_year(i32::try_from(value).ok()?),
            Component::Month => dt.with_month(u32::try_from(value).ok()?),
            Component::Day => dt.with_day(u32::try_from(value).ok()?),
            Component::Hour => dt.with_hour(u32::try_from(value).ok()?),
            Component::Minute => dt.with_minute(u32::try_from(value).ok()?),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmChoice {
    Accept,
    Adjust(Component),
    Replace,
    Restart,
    Invalid,
}

impl ConfirmChoice {
    pub const PROMPT: &'static str = "(a)ccept, change (y)ear/(mo)nth/(d)ay/(h)our/(mi)nute, (r)eplace both times or restar(t)?";

    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "" | "a" | "accept" => ConfirmChoice::Accept,
            "y" | "year" => ConfirmChoice::Adjust(Component::Year),
            "mo" | "month" => ConfirmChoice::Adjust(Component::Month),
            "d" | "day" => ConfirmChoice::Adjust(Component::Day),
            "h" | "hour" => ConfirmChoice::Adjust(Component::Hour),
            "mi" | "minute" => ConfirmChoice::Adjust(Component::Minute),
            "r" | "replace" => ConfirmChoice::Replace,
            "t" | "restart" => ConfirmChoice::Restart,
            _ => ConfirmChoice::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Accepted(EventDraft),
    Restart,
}

fn local_naive(point: &TimePoint, zone: Tz) -> DraftResult<NaiveDateTime> {
    instant_of(point, zone)
        .map(|instant| instant.with_timezone(&zone).naive_local())
        .ok_or(DraftError::MissingRequiredField("start"))
}

fn local_point(naive: NaiveDateTime, zone: Tz) -> TimePoint {
    TimePoint::new(naive.format("%Y-%m-%dT%H:%M:%S").to_string(), Some(zone.name()))
}

fn shift_months(dt: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        dt.checked_add_months(magnitude)
    } else {
        dt.checked_sub_months(magnitude)
    }
}

/// Set `component` of the start to `value` and move the end by the same amount.
pub fn adjust(draft: &EventDraft, component: Component, value: i64, zone: Tz) -> DraftResult<EventDraft> {
    let start = local_naive(&draft.start, zone)?;
    let end = local_naive(&draft.end, zone).unwrap_or(start);

    let invalid = || {
        DraftError::InvalidManualInput(format!("{} {} is not valid for {}", component.label(), value, start))
    };
    let new_start = component
        .set(&start, value)
        .filter(within_calendar_years)
        .ok_or_else(invalid)?;

    let new_end = match component {
        Component::Year | Component::Month => {
            let months = (new_start.year() as i64 * 12 + new_start.month() as i64)
                - (start.year() as i64 * 12 + start.month() as i64);
            shift_months(end, months)
        }
        _ => end.checked_add_signed(new_start - start),
    }
    .filter(within_calendar_years)
    .ok_or_else(invalid)?;

    let edited = EventDraft {
        start: local_point(new_start, zone),
        end: local_point(new_end, zone),
        ..draft.clone()
    };
    Ok(normalize(&edited, zone))
}

/// Replace both endpoints with wall-clock values in `zone`.
pub fn replace_times(draft: &EventDraft, start: NaiveDateTime, end: NaiveDateTime, zone: Tz) -> EventDraft {
    let edited = EventDraft {
        start: local_point(start, zone),
        end: local_point(end, zone),
        ..draft.clone()
    };
    normalize(&edited, zone)
}

pub(crate) fn ask_datetime(interaction: &mut dyn Interaction, prompt: &str) -> DraftResult<NaiveDateTime> {
    loop {
        let answer = interaction.ask_text(prompt)?;
        match parse_typed_datetime(&answer) {
            Ok(dt) => return Ok(dt),
            Err(e) => interaction.notify(&e.to_string()),
        }
    }
}

/// Show the draft and loop until the operator accepts it or asks to restart.
pub fn confirm(
    draft: EventDraft,
    zone: Tz,
    interaction: &mut dyn Interaction,
) -> DraftResult<Confirmation> {
    let mut draft = draft;
    let options: Vec<String> = ["accept", "year", "month", "day", "hour", "minute", "replace", "restart"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    loop {
        interaction.present(&draft);
        let answer = interaction.ask_choice(ConfirmChoice::PROMPT, &options)?;

        match ConfirmChoice::parse(&answer) {
            ConfirmChoice::Accept => return Ok(Confirmation::Accepted(draft)),
            ConfirmChoice::Restart => return Ok(Confirmation::Restart),
            ConfirmChoice::Adjust(component) => {
                let current = local_naive(&draft.start, zone)?;
                let prompt = format!(
                    "New {} (currently {})",
                    component.label(),
                    component.get(&current)
                );
                let answer = interaction.ask_text(&prompt)?;
                let result = answer
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| DraftError::InvalidManualInput(format!("'{}' is not a number", answer.trim())))
                    .and_then(|value| adjust(&draft, component, value, zone));
                match result {
                    Ok(adjusted) => draft = adjusted,
                    Err(e) => interaction.notify(&e.to_string()),
                }
            }
            ConfirmChoice::Replace => {
                let start = ask_datetime(interaction, "Start (YYYY-MM-DD HH:MM:SS)")?;
                let end = ask_datetime(interaction, "End (YYYY-MM-DD HH:MM:SS)")?;
                draft = replace_times(&draft, start, end, zone);
            }
            ConfirmChoice::Invalid => {
                interaction.notify(&format!("'{}' is not one of the options", answer.trim()));
            }
        }
    }
}
