//! Repeat rules and the schedule evaluator.
//!
//! The evaluator answers one question: how much of a medication is due in
//! each dose-time on a given calendar date. It is pure and never looks at
//! the clock; callers pass a date already attributed by the resolver.

use crate::dose_time::DoseTime;
use crate::{Error, Fraction, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const CYCLE_LENGTH_DAYS: i64 = 28;
const CYCLE_ON_DAYS: i64 = 21;

// ============================================================================
// Per-slot doses
// ============================================================================

/// One quantity per dose-time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotDoses {
    pub morning: Fraction,
    pub noon: Fraction,
    pub evening: Fraction,
    pub night: Fraction,
}

impl SlotDoses {
    pub const ZERO: SlotDoses = SlotDoses {
        morning: Fraction::ZERO,
        noon: Fraction::ZERO,
        evening: Fraction::ZERO,
        night: Fraction::ZERO,
    };

    pub fn new(doses: [Fraction; 4]) -> Self {
        let [morning, noon, evening, night] = doses;
        SlotDoses {
            morning,
            noon,
            evening,
            night,
        }
    }

    /// The same quantity in every slot.
    pub fn uniform(dose: Fraction) -> Self {
        Self::new([dose; 4])
    }

    pub fn get(&self, slot: DoseTime) -> Fraction {
        match slot {
            DoseTime::Morning => self.morning,
            DoseTime::Noon => self.noon,
            DoseTime::Evening => self.evening,
            DoseTime::Night => self.night,
        }
    }

    pub fn total(&self) -> Result<Fraction> {
        Fraction::checked_sum(&[self.morning, self.noon, self.evening, self.night])
    }

    pub fn is_zero(&self) -> bool {
        DoseTime::ALL.iter().all(|s| self.get(*s).is_zero())
    }
}

impl fmt::Display for SlotDoses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}, {}", self.morning, self.noon, self.evening, self.night)
    }
}

impl FromStr for SlotDoses {
    type Err = Error;

    /// Four comma-separated fractions, morning first: `"1/2,0,1,0"`.
    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.parse::<Fraction>())
            .collect::<Result<Vec<_>>>()?;
        let doses: [Fraction; 4] = parts.try_into().map_err(|v: Vec<Fraction>| {
            Error::InvalidFraction(format!("expected 4 doses, got {}", v.len()))
        })?;
        if doses.iter().any(|d| d.is_negative()) {
            return Err(Error::InvalidFraction(format!("negative dose in {:?}", s)));
        }
        Ok(SlotDoses::new(doses))
    }
}

// ============================================================================
// Repeat rules
// ============================================================================

/// Set of weekdays, bit 0 = Monday through bit 6 = Sunday.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdayMask(u8);

impl WeekdayMask {
    pub const NONE: WeekdayMask = WeekdayMask(0);
    pub const EVERY_DAY: WeekdayMask = WeekdayMask(0x7F);

    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits & !Self::EVERY_DAY.0 != 0 {
            return Err(Error::InvalidRepeatArgument(format!(
                "weekday mask {:#04x} has bits beyond Sunday",
                bits
            )));
        }
        Ok(WeekdayMask(bits))
    }

    pub fn from_weekdays<I: IntoIterator<Item = Weekday>>(days: I) -> Self {
        WeekdayMask(
            days.into_iter()
                .fold(0, |bits, day| bits | 1 << day.num_days_from_monday()),
        )
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }
}

impl FromStr for WeekdayMask {
    type Err = Error;

    /// Comma-separated weekday names, e.g. `"mon,wed,fri"`. Empty means none.
    fn from_str(s: &str) -> Result<Self> {
        let days = s
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| {
                d.parse::<Weekday>().map_err(|_| {
                    Error::InvalidRepeatArgument(format!("unknown weekday {:?}", d))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(WeekdayMask::from_weekdays(days))
    }
}

impl fmt::Display for WeekdayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .iter()
        .filter(|d| self.contains(**d))
        .map(|d| d.to_string().to_lowercase())
        .collect();
        write!(f, "{}", names.join(","))
    }
}

/// A date range with its own per-slot doses. Both ends inclusive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseInterval {
    pub begin: NaiveDate,
    pub end: NaiveDate,
    pub doses: SlotDoses,
}

impl DoseInterval {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.begin <= date && date <= self.end
    }
}

/// Which calendar dates a medication is scheduled on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepeatRule {
    Daily,
    /// Never scheduled; doses are only entered by hand.
    AsNeeded,
    EveryNDays { origin: NaiveDate, n: u32 },
    Weekdays { mask: WeekdayMask },
    #[serde(rename = "cycle_21_on_7_off")]
    Cycle21On7Off { origin: NaiveDate },
    /// The first interval containing a date supplies that date's doses.
    CustomIntervals { intervals: Vec<DoseInterval> },
}

impl Default for RepeatRule {
    fn default() -> Self {
        RepeatRule::Daily
    }
}

impl RepeatRule {
    /// Check the rule's arguments.
    pub fn validate(&self) -> Result<()> {
        match self {
            RepeatRule::EveryNDays { n, .. } if *n < 2 => Err(Error::InvalidRepeatArgument(
                format!("every-N-days needs n >= 2, got {}", n),
            )),
            RepeatRule::Weekdays { mask } => WeekdayMask::from_bits(mask.bits()).map(|_| ()),
            RepeatRule::CustomIntervals { intervals } => {
                match intervals.iter().find(|i| i.begin > i.end) {
                    Some(i) => Err(Error::InvalidRepeatArgument(format!(
                        "interval {}..{} ends before it begins",
                        i.begin, i.end
                    ))),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Whether the rule schedules anything on `date`. Dates before a
    /// rule's origin are never scheduled.
    pub fn is_scheduled_on(&self, date: NaiveDate) -> Result<bool> {
        self.validate()?;
        let scheduled = match self {
            RepeatRule::Daily => true,
            RepeatRule::AsNeeded => false,
            RepeatRule::EveryNDays { origin, n } => {
                let days = days_between(*origin, date);
                days >= 0 && days % *n as i64 == 0
            }
            RepeatRule::Weekdays { mask } => mask.contains(date.weekday()),
            RepeatRule::Cycle21On7Off { origin } => {
                let days = days_between(*origin, date);
                days >= 0 && days % CYCLE_LENGTH_DAYS < CYCLE_ON_DAYS
            }
            RepeatRule::CustomIntervals { intervals } => {
                intervals.iter().any(|i| i.contains(date))
            }
        };
        Ok(scheduled)
    }
}

impl fmt::Display for RepeatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatRule::Daily => write!(f, "daily"),
            RepeatRule::AsNeeded => write!(f, "as needed"),
            RepeatRule::EveryNDays { origin, n } => write!(f, "every {} days from {}", n, origin),
            RepeatRule::Weekdays { mask } if mask.bits() == 0 => write!(f, "never"),
            RepeatRule::Weekdays { mask } => write!(f, "on {}", mask),
            RepeatRule::Cycle21On7Off { origin } => write!(f, "21 on / 7 off from {}", origin),
            RepeatRule::CustomIntervals { intervals } => {
                write!(f, "custom ({} intervals)", intervals.len())
            }
        }
    }
}

fn days_between(origin: NaiveDate, date: NaiveDate) -> i64 {
    (date - origin).num_days()
}

// ============================================================================
// Evaluator
// ============================================================================

/// Scheduled doses for `date` under `rule`, given the medication's static
/// per-slot doses. Unscheduled dates yield zero in every slot.
pub fn scheduled_doses(rule: &RepeatRule, base: &SlotDoses, date: NaiveDate) -> Result<SlotDoses> {
    if !rule.is_scheduled_on(date)? {
        return Ok(SlotDoses::ZERO);
    }
    let doses = match rule {
        RepeatRule::CustomIntervals { intervals } => intervals
            .iter()
            .find(|i| i.contains(date))
            .map(|i| i.doses)
            .unwrap_or(SlotDoses::ZERO),
        _ => *base,
    };
    Ok(doses)
}

/// Scheduled dose for a single slot.
pub fn scheduled_dose(
    rule: &RepeatRule,
    base: &SlotDoses,
    date: NaiveDate,
    slot: DoseTime,
) -> Result<Fraction> {
    Ok(scheduled_doses(rule, base, date)?.get(slot))
}
