//! Dose-time resolution.
//!
//! Given a wall-clock moment and the four configured windows, decide which
//! dose-time is active, which calendar date the moment belongs to, and which
//! dose-time comes next. A night window that crosses midnight attributes its
//! after-midnight tail to the previous day.

use crate::daytime::{DayTime, TimeWindow, MILLIS_PER_DAY};
use crate::{Error, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four daily dose periods, in chronological order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DoseTime {
    Morning,
    Noon,
    Evening,
    Night,
}

impl DoseTime {
    pub const ALL: [DoseTime; 4] = [
        DoseTime::Morning,
        DoseTime::Noon,
        DoseTime::Evening,
        DoseTime::Night,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The last slot of the day, the only one allowed to wrap.
    pub fn is_last(self) -> bool {
        self == DoseTime::Night
    }

    pub fn name(self) -> &'static str {
        match self {
            DoseTime::Morning => "morning",
            DoseTime::Noon => "noon",
            DoseTime::Evening => "evening",
            DoseTime::Night => "night",
        }
    }
}

impl fmt::Display for DoseTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DoseTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "morning" => Ok(DoseTime::Morning),
            "noon" => Ok(DoseTime::Noon),
            "evening" => Ok(DoseTime::Evening),
            "night" => Ok(DoseTime::Night),
            other => Err(Error::Other(format!("unknown dose time: {}", other))),
        }
    }
}

/// The four dose-time windows, validated as an ordered day cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DoseTimeWindows {
    windows: [TimeWindow; 4],
}

impl DoseTimeWindows {
    /// Validate and wrap the windows (indexed morning→night).
    ///
    /// Rules:
    /// - morning, noon and evening are non-empty and do not wrap
    /// - begins strictly increase, and no window runs into the next one
    /// - night may wrap past midnight, but not beyond morning's begin
    pub fn new(windows: [TimeWindow; 4]) -> Result<Self> {
        let bad = |msg: String| Err(Error::UnattributableMoment(msg));

        for slot in &DoseTime::ALL[..3] {
            let w = windows[slot.index()];
            if w.end() <= w.begin() {
                return bad(format!("{} window {} must not wrap or be empty", slot, w));
            }
        }

        for pair in DoseTime::ALL.windows(2) {
            let (cur, next) = (windows[pair[0].index()], windows[pair[1].index()]);
            if next.begin() < cur.end() {
                return bad(format!(
                    "{} window {} overlaps {} window {}",
                    pair[0], cur, pair[1], next
                ));
            }
        }

        let night = windows[DoseTime::Night.index()];
        let morning = windows[DoseTime::Morning.index()];
        if night.begin() == night.end() {
            return bad(format!("night window {} is empty", night));
        }
        if night.wraps() && night.end() > morning.begin() {
            return bad(format!(
                "night window {} runs past morning begin {}",
                night,
                morning.begin()
            ));
        }

        Ok(DoseTimeWindows { windows })
    }

    pub fn get(&self, slot: DoseTime) -> TimeWindow {
        self.windows[slot.index()]
    }
}

impl Default for DoseTimeWindows {
    /// 06:00-10:00, 11:00-14:00, 17:00-20:00, 21:00-01:00.
    fn default() -> Self {
        DoseTimeWindows {
            windows: [
                TimeWindow::between(DayTime::hm(6, 0), DayTime::hm(10, 0)),
                TimeWindow::between(DayTime::hm(11, 0), DayTime::hm(14, 0)),
                TimeWindow::between(DayTime::hm(17, 0), DayTime::hm(20, 0)),
                TimeWindow::between(DayTime::hm(21, 0), DayTime::hm(1, 0)),
            ],
        }
    }
}

/// Everything known about one moment. Recomputed per query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DoseTimeInfo {
    pub now: NaiveDateTime,
    /// Calendar date the moment is attributed to.
    pub active_date: NaiveDate,
    /// Date used to group history for display.
    pub display_date: NaiveDate,
    pub active: Option<DoseTime>,
    pub next: DoseTime,
    pub next_date: NaiveDate,
    /// When the active dose-time ends, if one is active.
    pub active_end: Option<NaiveDateTime>,
    /// When the next dose-time begins.
    pub next_begin: NaiveDateTime,
}

impl DoseTimeInfo {
    /// The next dose-time boundary after `now`, for the alarm collaborator.
    pub fn next_wakeup(&self) -> NaiveDateTime {
        match self.active_end {
            Some(end) if end < self.next_begin => end,
            _ => self.next_begin,
        }
    }

    /// Slots of the active date that have already ended.
    ///
    /// When the next dose-time falls on the active date, that is every slot
    /// before it; otherwise every slot of the day. The active slot never
    /// counts as ended.
    pub fn ended_slots(&self) -> Vec<DoseTime> {
        DoseTime::ALL
            .iter()
            .copied()
            .filter(|slot| self.next_date > self.active_date || *slot < self.next)
            .filter(|slot| Some(*slot) != self.active)
            .collect()
    }
}

/// Resolves moments against a validated window set.
#[derive(Clone, Debug, Default)]
pub struct DoseTimeResolver {
    windows: DoseTimeWindows,
}

impl DoseTimeResolver {
    pub fn new(windows: DoseTimeWindows) -> Self {
        Self { windows }
    }

    pub fn windows(&self) -> &DoseTimeWindows {
        &self.windows
    }

    /// The dose-time whose window contains `now`, if any.
    pub fn active_dose_time(&self, now: NaiveDateTime) -> Option<DoseTime> {
        let t = DayTime::from_time(now.time());
        DoseTime::ALL
            .iter()
            .copied()
            .find(|slot| self.windows.get(*slot).contains(t, slot.is_last()))
    }

    /// Calendar date `now` belongs to.
    pub fn active_date(&self, now: NaiveDateTime) -> NaiveDate {
        let t = DayTime::from_time(now.time());
        let night = self.windows.get(DoseTime::Night);
        if night.wraps() && t < night.end() {
            now.date() - Duration::days(1)
        } else {
            now.date()
        }
    }

    /// Next dose-time strictly after `now` within a 48h lookahead.
    pub fn next_dose_time(&self, now: NaiveDateTime) -> Result<(DoseTime, NaiveDate)> {
        let today = now.date();
        [today, today + Duration::days(1)]
            .into_iter()
            .flat_map(|date| DoseTime::ALL.into_iter().map(move |slot| (slot, date)))
            .map(|(slot, date)| (self.windows.get(slot).begin().on(date), slot, date))
            .filter(|(begin, _, _)| *begin > now)
            .min_by_key(|(begin, _, _)| *begin)
            .map(|(_, slot, date)| (slot, date))
            .ok_or_else(|| {
                Error::UnattributableMoment(format!("no dose time begins within 48h of {}", now))
            })
    }

    /// Resolve everything about `now`.
    pub fn resolve(&self, now: NaiveDateTime) -> Result<DoseTimeInfo> {
        let active = self.active_dose_time(now);
        let active_date = self.active_date(now);
        let (next, next_date) = self.next_dose_time(now)?;

        let display_date = if self.before_dead_zone_midpoint(now) {
            next_date - Duration::days(1)
        } else {
            active_date
        };

        let active_end = active.map(|slot| {
            let window = self.windows.get(slot);
            let date = if slot.is_last() { active_date } else { now.date() };
            window.end_unwrapped().on(date)
        });
        let next_begin = self.windows.get(next).begin().on(next_date);

        let info = DoseTimeInfo {
            now,
            active_date,
            display_date,
            active,
            next,
            next_date,
            active_end,
            next_begin,
        };
        tracing::debug!(
            "Resolved {}: active={:?} date={} next={} on {}",
            now,
            info.active,
            info.active_date,
            info.next,
            info.next_date
        );
        Ok(info)
    }

    /// Whether `now` lies in the gap between night's end and morning's
    /// begin, in the half closer to the previous night.
    fn before_dead_zone_midpoint(&self, now: NaiveDateTime) -> bool {
        let night_end = self.windows.get(DoseTime::Night).end().millis();
        let morning_begin = self.windows.get(DoseTime::Morning).begin().millis();
        let gap = (morning_begin - night_end).rem_euclid(MILLIS_PER_DAY);
        let elapsed = (DayTime::from_time(now.time()).millis() - night_end).rem_euclid(MILLIS_PER_DAY);
        elapsed < gap && elapsed * 2 < gap
    }
}
