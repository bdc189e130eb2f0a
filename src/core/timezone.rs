use chrono::{DateTime, FixedOffset, Months, NaiveDate, Utc};

use crate::core::{AppError, Result};

/// India Standard Time offset (UTC+5:30)
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// All timestamps are stored as UTC; calendar decisions (due dates, fiscal
/// years, schedule dates) are taken in India Standard Time.
pub struct TimezoneConverter;

impl TimezoneConverter {
    fn ist() -> FixedOffset {
        FixedOffset::east_opt(IST_OFFSET_SECS).expect("Valid offset")
    }

    /// Convert UTC timestamp to India Standard Time
    pub fn utc_to_ist(utc_time: DateTime<Utc>) -> DateTime<FixedOffset> {
        utc_time.with_timezone(&Self::ist())
    }

    /// Calendar date in India for a UTC timestamp
    pub fn ist_date(utc_time: DateTime<Utc>) -> NaiveDate {
        Self::utc_to_ist(utc_time).date_naive()
    }

    /// Format timestamp as ISO 8601 UTC for API responses
    pub fn format_iso8601_utc(utc_time: DateTime<Utc>) -> String {
        utc_time.to_rfc3339()
    }
}

/// Add calendar months to a timestamp
///
/// Days past the end of the target month clamp to its last day
/// (Jan 31 + 1 month = Feb 28/29).
pub fn add_months(time: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    time.checked_add_months(Months::new(months))
        .ok_or_else(|| AppError::validation("Failed to calculate due date"))
}

/// Add calendar months to a date, clamping like [`add_months`]
pub fn add_months_to_date(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| AppError::validation("Failed to calculate schedule date"))
}
