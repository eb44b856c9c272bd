use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

/// Fields converted to the store's temporal type when they hold text.
pub const DATE_FIELDS: &[&str] = &[
    "createdAt",
    "updatedAt",
    "conductedDate",
    "scheduledDate",
    "deliveryDate",
    "completionDate",
];

/// Extended and basic forms, with or without seconds.
const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y%m%dT%H%M%S%.f",
    "%Y%m%dT%H%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

/// A local date-time followed by `Z` or a `±hh[[:]mm]` offset.
static ZONED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<local>.+[T ].+?)(?P<zone>[Zz]|(?P<sign>[+-])(?P<hh>\d{2})(?::?(?P<mm>\d{2}))?)$")
        .unwrap()
});

static HOUR_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<date>\d{4}-\d{2}-\d{2}|\d{8})[T ](?P<hour>\d{2})$").unwrap()
});

pub fn is_date_field(name: &str) -> bool {
    DATE_FIELDS.contains(&name)
}

/// Parse ISO-8601 text. Text without a zone is taken as UTC; a bare date
/// means midnight UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(caps) = ZONED_RE.captures(s) {
        if let Some(local) = parse_local(&caps["local"]) {
            let offset = zone_offset(&caps)?;
            return local
                .and_local_timezone(offset)
                .single()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    parse_local(s).map(|naive| naive.and_utc())
}

fn zone_offset(caps: &regex::Captures<'_>) -> Option<FixedOffset> {
    let Some(sign) = caps.name("sign") else {
        return FixedOffset::east_opt(0);
    };
    let hours: i32 = caps["hh"].parse().ok()?;
    let minutes: i32 = match caps.name("mm") {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let seconds = hours * 3600 + minutes * 60;
    FixedOffset::east_opt(if sign.as_str() == "-" { -seconds } else { seconds })
}

fn parse_local(s: &str) -> Option<NaiveDateTime> {
    if let Some(naive) = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(naive);
    }
    // chrono needs minutes to build a time
    if let Some(caps) = HOUR_ONLY_RE.captures(s) {
        let hour: u32 = caps["hour"].parse().ok()?;
        return parse_date(&caps["date"])?.and_hms_opt(hour, 0, 0);
    }
    parse_date(s)?.and_hms_opt(0, 0, 0)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// A date field left as text because it could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWarning {
    pub field: String,
    pub raw: String,
}
