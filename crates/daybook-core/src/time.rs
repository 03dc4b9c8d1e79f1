//! Query ranges for calendar fetches.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The local day `date` in `tz`: local midnight to the next local midnight.
    ///
    /// When midnight falls in a DST gap the first valid instant after it is used.
    pub fn for_date<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Self {
        let next = date.succ_opt().unwrap_or(NaiveDate::MAX);
        Self {
            start: local_midnight(date, tz),
            end: local_midnight(next, tz),
        }
    }
}

fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight: NaiveDateTime = date.and_time(chrono::NaiveTime::MIN);
    // Step forward in 15-minute increments to skip a DST gap.
    (0..=8)
        .map(|step| midnight + Duration::minutes(15 * step))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn for_date_utc() {
        let window = TimeWindow::for_date(date(2025, 2, 5), &Utc);
        assert_eq!(window.start, utc(2025, 2, 5, 0, 0, 0));
        assert_eq!(window.end, utc(2025, 2, 6, 0, 0, 0));
    }

    #[test]
    fn for_date_with_offset() {
        let paris = FixedOffset::east_opt(3600).unwrap();
        let window = TimeWindow::for_date(date(2025, 2, 5), &paris);
        assert_eq!(window.start, utc(2025, 2, 4, 23, 0, 0));
        assert_eq!(window.end, utc(2025, 2, 5, 23, 0, 0));
        assert_eq!(window.end - window.start, Duration::hours(24));
    }
}
