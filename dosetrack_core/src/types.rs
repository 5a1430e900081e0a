//! Core domain types for the dosetrack system.
//!
//! - Medications with per-slot doses, repeat rule and remaining supply
//! - Dose events recording that a dose was taken

use crate::dose_time::DoseTime;
use crate::schedule::{self, RepeatRule, SlotDoses};
use crate::{Fraction, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Medication
// ============================================================================

/// A medication the patient takes, with its schedule and supply.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Medication {
    pub id: Uuid,
    pub name: String,
    /// Static dose per slot, used by every rule except custom intervals.
    pub doses: SlotDoses,
    #[serde(default)]
    pub repeat: RepeatRule,
    #[serde(default)]
    pub supply: Fraction,
    /// Units added by one refill.
    #[serde(default)]
    pub refill_size: u32,
    /// Whether ended dose-times are recorded automatically.
    #[serde(default)]
    pub auto_create: bool,
    /// Last date whose dose-times were all handled by automatic recording.
    #[serde(default)]
    pub last_auto_processed: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Medication {
    pub fn new(name: impl Into<String>, doses: SlotDoses, repeat: RepeatRule) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            doses,
            repeat,
            supply: Fraction::ZERO,
            refill_size: 0,
            auto_create: false,
            last_auto_processed: None,
            active: true,
        }
    }

    /// Scheduled doses on an already attributed date.
    pub fn scheduled_doses(&self, date: NaiveDate) -> Result<SlotDoses> {
        schedule::scheduled_doses(&self.repeat, &self.doses, date)
    }

    /// Add one refill to the supply and return the new supply. Supply is
    /// left unchanged if the sum does not fit.
    pub fn refill(&mut self) -> Result<Fraction> {
        self.supply = self.supply.checked_add(Fraction::from(self.refill_size))?;
        Ok(self.supply)
    }

    /// Turn on automatic recording.
    ///
    /// The first enable sets the last processed date to `initial`, which is
    /// where backfill will resume from. Re-enabling keeps the existing date.
    pub fn enable_auto_create(&mut self, initial: NaiveDate) {
        self.auto_create = true;
        if self.last_auto_processed.is_none() {
            self.last_auto_processed = Some(initial);
        }
    }

    pub fn disable_auto_create(&mut self) {
        self.auto_create = false;
    }

    /// First date, starting at `from`, on which the remaining supply cannot
    /// cover a scheduled dose. `None` if supply lasts `max_days` or nothing
    /// is ever scheduled.
    pub fn estimated_run_out(&self, from: NaiveDate, max_days: u32) -> Result<Option<NaiveDate>> {
        let mut remaining = self.supply;
        for offset in 0..max_days as i64 {
            let date = from + Duration::days(offset);
            let doses = self.scheduled_doses(date)?;
            for slot in DoseTime::ALL {
                let dose = doses.get(slot);
                if dose.is_zero() {
                    continue;
                }
                if remaining < dose {
                    return Ok(Some(date));
                }
                remaining = remaining.checked_sub(dose)?;
            }
        }
        Ok(None)
    }
}

// ============================================================================
// Dose events
// ============================================================================

/// A recorded dose, created automatically or by the patient.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoseEvent {
    pub id: Uuid,
    pub medication_id: Uuid,
    /// Attributed date, which may differ from the calendar date of
    /// `recorded_at` for a night dose taken after midnight.
    pub date: NaiveDate,
    pub dose_time: DoseTime,
    pub quantity: Fraction,
    pub auto_created: bool,
    pub recorded_at: NaiveDateTime,
}

impl DoseEvent {
    pub fn auto(
        medication_id: Uuid,
        date: NaiveDate,
        dose_time: DoseTime,
        quantity: Fraction,
        recorded_at: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            medication_id,
            date,
            dose_time,
            quantity,
            auto_created: true,
            recorded_at,
        }
    }

    pub fn manual(
        medication_id: Uuid,
        date: NaiveDate,
        dose_time: DoseTime,
        quantity: Fraction,
        recorded_at: NaiveDateTime,
    ) -> Self {
        Self {
            auto_created: false,
            ..Self::auto(medication_id, date, dose_time, quantity, recorded_at)
        }
    }

    /// Whether this event records `(medication, date, slot)`.
    pub fn matches(&self, medication_id: &Uuid, date: NaiveDate, dose_time: DoseTime) -> bool {
        self.medication_id == *medication_id && self.date == date && self.dose_time == dose_time
    }

    /// Exact sum of the quantities of `events`.
    pub fn total<'a, I>(events: I) -> Result<Fraction>
    where
        I: IntoIterator<Item = &'a DoseEvent>,
    {
        let mut total = Fraction::ZERO;
        for event in events {
            total = total.checked_add(event.quantity)?;
        }
        Ok(total)
    }
}
