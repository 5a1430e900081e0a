//! Times of day and dose-time windows.
//!
//! A [`DayTime`] is an offset from local midnight with millisecond
//! resolution and no timezone. A [`TimeWindow`] pairs two of them; when its
//! end is numerically before its begin the window crosses midnight.

use crate::{Error, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MILLIS_PER_DAY: i64 = 86_400_000;
const MILLIS_PER_HOUR: i64 = 3_600_000;
const MILLIS_PER_MINUTE: i64 = 60_000;
const MILLIS_PER_SECOND: i64 = 1_000;

/// Milliseconds since local midnight.
///
/// Normally within `[0, 86_400_000)`. Values of 24h and beyond exist only
/// when explicitly requested with `allow_overflow`, to express a window end
/// that lies on the following day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayTime {
    millis: i64,
}

impl DayTime {
    pub const MIDNIGHT: DayTime = DayTime { millis: 0 };

    pub fn new(millis: i64, allow_overflow: bool) -> Result<Self> {
        if millis < 0 || (!allow_overflow && millis >= MILLIS_PER_DAY) {
            return Err(Error::InvalidDayTime(format!(
                "{} ms is outside a single day",
                millis
            )));
        }
        Ok(DayTime { millis })
    }

    pub fn from_hms(hour: u32, minute: u32, second: u32) -> Result<Self> {
        if hour >= 24 || minute >= 60 || second >= 60 {
            return Err(Error::InvalidDayTime(format!(
                "{:02}:{:02}:{:02}",
                hour, minute, second
            )));
        }
        Self::new(
            hour as i64 * MILLIS_PER_HOUR
                + minute as i64 * MILLIS_PER_MINUTE
                + second as i64 * MILLIS_PER_SECOND,
            false,
        )
    }

    /// Time-of-day part of a wall-clock time. Leap seconds fold into the
    /// last millisecond of their second.
    pub fn from_time(time: NaiveTime) -> Self {
        let millis = (time.nanosecond() / 1_000_000).min(999) as i64;
        DayTime {
            millis: time.num_seconds_from_midnight() as i64 * MILLIS_PER_SECOND + millis,
        }
    }

    /// Infallible constructor for literal values known to be in range.
    pub(crate) const fn hm(hour: i64, minute: i64) -> Self {
        DayTime {
            millis: hour * MILLIS_PER_HOUR + minute * MILLIS_PER_MINUTE,
        }
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// Whether this value reaches into the following day.
    pub fn is_overflowed(&self) -> bool {
        self.millis >= MILLIS_PER_DAY
    }

    pub fn checked_add_millis(self, delta: i64, allow_overflow: bool) -> Result<Self> {
        Self::new(self.millis + delta, allow_overflow)
    }

    /// Fold an overflowed value back into a single day.
    pub fn wrapped(self) -> Self {
        DayTime {
            millis: self.millis.rem_euclid(MILLIS_PER_DAY),
        }
    }

    /// The wall-clock moment this offset denotes on `date`. Overflowed
    /// values land on the following day.
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::MIN) + Duration::milliseconds(self.millis)
    }
}

impl fmt::Display for DayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.millis / MILLIS_PER_HOUR;
        let minutes = self.millis % MILLIS_PER_HOUR / MILLIS_PER_MINUTE;
        let seconds = self.millis % MILLIS_PER_MINUTE / MILLIS_PER_SECOND;
        let millis = self.millis % MILLIS_PER_SECOND;
        write!(f, "{:02}:{:02}", hours, minutes)?;
        if seconds != 0 || millis != 0 {
            write!(f, ":{:02}", seconds)?;
        }
        if millis != 0 {
            write!(f, ".{:03}", millis)?;
        }
        Ok(())
    }
}

impl FromStr for DayTime {
    type Err = Error;

    /// Accepts `H:mm`, `HH:mm`, `HH:mm:ss` and `HH:mm:ss.SSS`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidDayTime(format!("cannot parse {:?}", s));
        let field = |part: &str, width: std::ops::RangeInclusive<usize>| -> Result<u32> {
            if !width.contains(&part.len()) || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };

        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.split(':').collect();
        let (hour, minute, second, millis) = match parts.as_slice() {
            [h, m] => (field(h, 1..=2)?, field(m, 2..=2)?, 0, 0),
            [h, m, rest] => {
                let (sec, ms) = match rest.split_once('.') {
                    Some((sec, ms)) => (field(sec, 2..=2)?, field(ms, 3..=3)?),
                    None => (field(rest, 2..=2)?, 0),
                };
                (field(h, 1..=2)?, field(m, 2..=2)?, sec, ms)
            }
            _ => return Err(invalid()),
        };

        let base = Self::from_hms(hour, minute, second)?;
        base.checked_add_millis(millis as i64, false)
    }
}

impl TryFrom<String> for DayTime {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DayTime> for String {
    fn from(t: DayTime) -> String {
        t.to_string()
    }
}

/// The active interval of one dose-time, `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeWindow {
    begin: DayTime,
    end: DayTime,
}

impl TimeWindow {
    /// Both bounds must lie within a single day; wrapping is expressed by
    /// `end < begin`.
    pub fn new(begin: DayTime, end: DayTime) -> Result<Self> {
        if begin.is_overflowed() || end.is_overflowed() {
            return Err(Error::InvalidDayTime(format!(
                "window {}-{} must use times within one day",
                begin, end
            )));
        }
        Ok(TimeWindow { begin, end })
    }

    pub(crate) const fn between(begin: DayTime, end: DayTime) -> Self {
        TimeWindow { begin, end }
    }

    pub fn begin(&self) -> DayTime {
        self.begin
    }

    pub fn end(&self) -> DayTime {
        self.end
    }

    /// Whether the window crosses midnight.
    pub fn wraps(&self) -> bool {
        self.end < self.begin
    }

    /// Half-open membership; wrap-around only counts when `allow_wrap` is set.
    pub fn contains(&self, t: DayTime, allow_wrap: bool) -> bool {
        if allow_wrap && self.wraps() {
            t >= self.begin || t < self.end
        } else {
            self.begin <= t && t < self.end
        }
    }

    /// The end expressed relative to the begin's day, i.e. past 24h when
    /// the window wraps.
    pub fn end_unwrapped(&self) -> DayTime {
        if self.wraps() {
            DayTime {
                millis: self.end.millis + MILLIS_PER_DAY,
            }
        } else {
            self.end
        }
    }

    pub fn duration_millis(&self) -> i64 {
        self.end_unwrapped().millis - self.begin.millis
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.begin, self.end)
    }
}

impl FromStr for TimeWindow {
    type Err = Error;

    /// Parses `"HH:mm-HH:mm"`.
    fn from_str(s: &str) -> Result<Self> {
        let (begin, end) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidDayTime(format!("window {:?} needs begin-end", s)))?;
        TimeWindow::new(begin.parse()?, end.parse()?)
    }
}

impl TryFrom<String> for TimeWindow {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TimeWindow> for String {
    fn from(w: TimeWindow) -> String {
        w.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> DayTime {
        s.parse().unwrap()
    }

    #[test]
    fn test_rejects_out_of_day_without_overflow_flag() {
        assert!(DayTime::new(MILLIS_PER_DAY, false).is_err());
        assert!(DayTime::new(-1, true).is_err());
        let late = DayTime::new(MILLIS_PER_DAY + MILLIS_PER_HOUR, true).unwrap();
        assert!(late.is_overflowed());
        assert_eq!(late.wrapped(), t("01:00"));
    }

    #[test]
    fn test_parse_and_format() {
        assert_eq!(t("7:05").millis(), 7 * MILLIS_PER_HOUR + 5 * MILLIS_PER_MINUTE);
        assert_eq!(t("07:05").to_string(), "07:05");
        assert_eq!(t("23:59:30").to_string(), "23:59:30");
        assert_eq!(t("00:00:00.250").to_string(), "00:00:00.250");
        assert_eq!(t("12:00:00").to_string(), "12:00");

        for bad in ["24:00", "12:60", "12", "12:5", "ab:cd", "12:00:00:00", "12:00:00.5"] {
            assert!(bad.parse::<DayTime>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_round_trip() {
        for s in ["00:00", "06:30", "23:59:59.999", "13:00:01"] {
            let parsed = t(s);
            assert_eq!(parsed.to_string().parse::<DayTime>().unwrap(), parsed);
        }
    }

    #[test]
    fn test_from_time_and_on_date() {
        let time = NaiveTime::from_hms_milli_opt(21, 15, 3, 40).unwrap();
        let dt = DayTime::from_time(time);
        assert_eq!(dt.to_string(), "21:15:03.040");

        let date = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        assert_eq!(dt.on(date), date.and_time(time));

        let next_day = DayTime::new(MILLIS_PER_DAY + MILLIS_PER_HOUR, true).unwrap();
        assert_eq!(
            next_day.on(date),
            NaiveDate::from_ymd_opt(2024, 2, 29)
                .unwrap()
                .and_hms_opt(1, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_window_contains_non_wrapping() {
        let w: TimeWindow = "06:00-10:00".parse().unwrap();
        assert!(!w.wraps());
        assert!(w.contains(t("06:00"), true));
        assert!(w.contains(t("09:59:59.999"), false));
        assert!(!w.contains(t("10:00"), true));
        assert!(!w.contains(t("05:59"), true));
        assert_eq!(w.duration_millis(), 4 * MILLIS_PER_HOUR);
    }

    #[test]
    fn test_window_contains_wrapping() {
        let w: TimeWindow = "22:00-02:00".parse().unwrap();
        assert!(w.wraps());
        assert!(w.contains(t("23:00"), true));
        assert!(w.contains(t("00:30"), true));
        assert!(!w.contains(t("02:00"), true));
        assert!(!w.contains(t("12:00"), true));
        // Without wrap permission the interval is empty.
        assert!(!w.contains(t("23:00"), false));
        assert!(!w.contains(t("00:30"), false));
        assert_eq!(w.end_unwrapped().millis(), 26 * MILLIS_PER_HOUR);
        assert_eq!(w.duration_millis(), 4 * MILLIS_PER_HOUR);
    }

    #[test]
    fn test_window_text_round_trip() {
        let w: TimeWindow = "21:00-01:30".parse().unwrap();
        assert_eq!(w.to_string(), "21:00-01:30");
        assert!("21:00".parse::<TimeWindow>().is_err());
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, "\"21:00-01:30\"");
    }
}
