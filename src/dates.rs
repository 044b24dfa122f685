//! Calendar date helpers shared by the scheduler and the reminder resolver.
//!
//! Dates travel as `YYYY-MM-DD` strings through the stores and the JSON
//! payloads; invoices written by older clients may carry full RFC 3339
//! timestamps instead, so parsing accepts both.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime};

use crate::error::ValidationError;

const SECONDS_PER_DAY: i64 = 86_400;

/// Parses a `YYYY-MM-DD` or RFC 3339 string into a calendar date.
pub fn parse_date(field: &'static str, value: &str) -> Result<Date, ValidationError> {
    let s = value.trim();
    if let Ok(d) = Date::parse(s, format_description!("[year]-[month]-[day]")) {
        return Ok(d);
    }
    OffsetDateTime::parse(s, &Rfc3339)
        .map(|dt| dt.date())
        .map_err(|_| ValidationError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

/// Parses a date or timestamp as an instant; bare dates mean midnight UTC.
fn parse_instant(field: &'static str, value: &str) -> Result<OffsetDateTime, ValidationError> {
    let s = value.trim();
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(dt);
    }
    parse_date(field, s).map(|d| d.midnight().assume_utc())
}

pub fn format_ymd(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}

/// Adds whole days, saturating at the supported calendar range.
pub fn add_days(d: Date, days: i64) -> Date {
    d.checked_add(Duration::days(days)).unwrap_or(if days < 0 {
        Date::MIN
    } else {
        Date::MAX
    })
}

/// Adds calendar months, clipping the day to the last day of the target
/// month (Jan 31 + 1 month = Feb 28/29). Saturates at the calendar range.
pub fn add_months(d: Date, months: i32) -> Date {
    let index = d.year() * 12 + i32::from(u8::from(d.month())) - 1 + months;
    let year = index.div_euclid(12);
    let month_number = (index.rem_euclid(12) + 1) as u8;

    let Ok(month) = Month::try_from(month_number) else {
        return d;
    };
    let day = d.day().min(time::util::days_in_year_month(year, month));

    Date::from_calendar_date(year, month, day).unwrap_or(if months < 0 {
        Date::MIN
    } else {
        Date::MAX
    })
}

/// Whole days from `start` to `end`, rounded up when the inputs carry a time
/// of day. Negative spans are returned as-is.
pub fn days_between_ceil(
    start_field: &'static str,
    start: &str,
    end_field: &'static str,
    end: &str,
) -> Result<i64, ValidationError> {
    let a = parse_instant(start_field, start)?;
    let b = parse_instant(end_field, end)?;
    let secs = (b - a).whole_seconds();
    Ok(-((-secs).div_euclid(SECONDS_PER_DAY)))
}

/// Serde adapter storing a [`Date`] as `YYYY-MM-DD`.
pub mod ymd {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_ymd(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_date("date", &raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter storing an optional [`Date`] as `YYYY-MM-DD` or null.
pub mod ymd_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Option<Date>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.serialize_some(&super::format_ymd(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Date>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => super::parse_date("date", s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
