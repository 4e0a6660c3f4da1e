/// Default cap on recovery attempts (alternate backends + invalid choices) per item.
pub const DEFAULT_RETRY_CAP: u32 = 3;

/// Minutes added or subtracted when an endpoint has to be synthesized.
pub const INFERRED_DURATION_MINUTES: i64 = 30;

/// Zone used for naive times when config says nothing else.
pub const DEFAULT_TIMEZONE: &str = "Europe/Berlin";

/// Items older than this are skipped unattended and confirmed interactively.
pub const DEFAULT_MAX_AGE_DAYS: i64 = 7;

/// Reply fragments that mean the backend could not serve the request with
/// its current resources, regardless of which provider sent them.
pub const DEFAULT_EXHAUSTION_MARKERS: &[&str] = &[
    "model requires more system memory",
    "out of memory",
    "RESOURCE_EXHAUSTED",
];

/// Calendar field limits enforced before publication.
pub const MAX_SUMMARY_CHARS: usize = 1024;
pub const MAX_DESCRIPTION_CHARS: usize = 8192;

/// Format accepted for typed date/times.
pub const MANUAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
