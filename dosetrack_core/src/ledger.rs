//! Automatic dose bookkeeping.
//!
//! When a dose-time ends, the ledger records the scheduled dose as taken and
//! takes it out of the remaining supply. After downtime it walks forward
//! from each medication's last processed date and fills in every ended
//! dose-time it missed. Old history can be pruned without touching supply.
//!
//! The ledger assumes at most one writer per medication. Callers running
//! several ledgers against the same store must serialize calls for the same
//! medication themselves.

use crate::dose_time::{DoseTime, DoseTimeInfo, DoseTimeResolver};
use crate::store::{Clock, LedgerStore};
use crate::{DoseEvent, Error, Fraction, Medication, Result};
use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Why an ended dose-time was not recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    AutoCreateDisabled,
    Inactive,
    NothingScheduled,
    /// Supply is below the scheduled dose. Nothing is taken, not even a
    /// partial dose.
    InsufficientSupply,
    AlreadyRecorded,
}

/// Result of handling one ended dose-time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    Recorded(DoseEvent),
    Skipped(SkipReason),
}

impl ProcessOutcome {
    pub fn recorded(&self) -> Option<&DoseEvent> {
        match self {
            ProcessOutcome::Recorded(event) => Some(event),
            ProcessOutcome::Skipped(_) => None,
        }
    }
}

/// Summary of one backfill run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackfillReport {
    pub medication_id: Uuid,
    /// Whole days walked before the active date.
    pub days_walked: u32,
    pub recorded: Vec<DoseEvent>,
    /// Total supply taken by `recorded`.
    pub consumed: Fraction,
    pub last_processed: Option<NaiveDate>,
}

/// Summary of one prune run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Events dated before this were eligible; `None` when retention is unlimited.
    pub cutoff: Option<NaiveDate>,
    pub deleted: usize,
    pub oldest: Option<NaiveDate>,
    pub newest: Option<NaiveDate>,
}

/// How long dose history is kept.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetentionHorizon {
    OneMonth,
    TwoMonths,
    #[default]
    SixMonths,
    OneYear,
    Unlimited,
}

impl RetentionHorizon {
    pub fn months(self) -> Option<u32> {
        match self {
            RetentionHorizon::OneMonth => Some(1),
            RetentionHorizon::TwoMonths => Some(2),
            RetentionHorizon::SixMonths => Some(6),
            RetentionHorizon::OneYear => Some(12),
            RetentionHorizon::Unlimited => None,
        }
    }

    /// First date that is kept, counted back from `today`.
    pub fn cutoff(self, today: NaiveDate) -> Option<NaiveDate> {
        self.months()
            .and_then(|m| today.checked_sub_months(Months::new(m)))
    }
}

impl FromStr for RetentionHorizon {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "one_month" | "1m" => Ok(RetentionHorizon::OneMonth),
            "two_months" | "2m" => Ok(RetentionHorizon::TwoMonths),
            "six_months" | "6m" => Ok(RetentionHorizon::SixMonths),
            "one_year" | "1y" => Ok(RetentionHorizon::OneYear),
            "unlimited" => Ok(RetentionHorizon::Unlimited),
            other => Err(Error::Config(format!("unknown retention horizon: {}", other))),
        }
    }
}

/// Dose bookkeeping over injected collaborators.
pub struct DoseLedger<C, S> {
    clock: C,
    resolver: DoseTimeResolver,
    store: S,
}

impl<C: Clock, S: LedgerStore> DoseLedger<C, S> {
    pub fn new(clock: C, resolver: DoseTimeResolver, store: S) -> Self {
        Self {
            clock,
            resolver,
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn resolver(&self) -> &DoseTimeResolver {
        &self.resolver
    }

    /// Resolve the clock's current moment.
    pub fn dose_time_info(&self) -> Result<DoseTimeInfo> {
        self.resolver.resolve(self.clock.now())
    }

    /// Handle the end of `slot` on `date` for one medication.
    ///
    /// Records the scheduled dose unless auto-create is off, the medication
    /// is inactive, nothing is scheduled, supply would go negative, or the
    /// slot already has an event. Safe to call repeatedly.
    pub fn process_dose_time_end(
        &mut self,
        medication_id: &Uuid,
        date: NaiveDate,
        slot: DoseTime,
    ) -> Result<ProcessOutcome> {
        let mut medication = self.load(medication_id)?;
        self.record_slot(&mut medication, date, slot)
    }

    /// [`Self::process_dose_time_end`] for every medication, in id order.
    pub fn process_dose_time_end_all(
        &mut self,
        date: NaiveDate,
        slot: DoseTime,
    ) -> Result<Vec<(Uuid, ProcessOutcome)>> {
        let mut outcomes = Vec::new();
        for mut medication in self.store.medications()? {
            let outcome = self.record_slot(&mut medication, date, slot)?;
            outcomes.push((medication.id, outcome));
        }
        Ok(outcomes)
    }

    /// Record every ended dose-time since the last processed date.
    ///
    /// Days after the last processed date and before the active date are
    /// processed slot by slot; on the active date only the slots that have
    /// already ended. Running it again records nothing new.
    ///
    /// Fails with [`Error::MissingLastProcessedDate`] when auto-create is on
    /// but the date was never initialized.
    pub fn backfill_missing(&mut self, medication_id: &Uuid) -> Result<BackfillReport> {
        let info = self.dose_time_info()?;
        let mut medication = self.load(medication_id)?;

        let mut report = BackfillReport {
            medication_id: *medication_id,
            days_walked: 0,
            recorded: Vec::new(),
            consumed: Fraction::ZERO,
            last_processed: medication.last_auto_processed,
        };

        if !medication.auto_create {
            tracing::debug!("Auto-create disabled for {}, nothing to backfill", medication.name);
            return Ok(report);
        }

        let last = medication
            .last_auto_processed
            .ok_or_else(|| Error::MissingLastProcessedDate(medication_id.to_string()))?;

        let mut date = last + Duration::days(1);
        while date < info.active_date {
            for slot in DoseTime::ALL {
                self.collect(&mut medication, date, slot, &mut report)?;
            }
            report.days_walked += 1;
            date += Duration::days(1);
        }

        let ended = info.ended_slots();
        for slot in &ended {
            self.collect(&mut medication, info.active_date, *slot, &mut report)?;
        }

        // Days with nothing to record still count as processed.
        let completed = if ended.len() == DoseTime::ALL.len() {
            info.active_date
        } else {
            info.active_date - Duration::days(1)
        };
        if medication.last_auto_processed < Some(completed) {
            medication.last_auto_processed = Some(completed);
            self.store.save_medication(&medication)?;
        }
        report.last_processed = medication.last_auto_processed;

        tracing::info!(
            "Backfilled {}: {} days walked, {} doses recorded ({} consumed), processed through {:?}",
            medication.name,
            report.days_walked,
            report.recorded.len(),
            report.consumed,
            report.last_processed
        );
        Ok(report)
    }

    /// [`Self::backfill_missing`] for every auto-enabled medication.
    pub fn backfill_all(&mut self) -> Result<Vec<BackfillReport>> {
        let ids: Vec<Uuid> = self
            .store
            .medications()?
            .into_iter()
            .filter(|m| m.auto_create)
            .map(|m| m.id)
            .collect();
        ids.iter().map(|id| self.backfill_missing(id)).collect()
    }

    /// Delete dose events dated before `today - retention`.
    ///
    /// Supply is never restored: history is an audit trail, supply changes
    /// are permanent.
    pub fn prune_history(&mut self, retention: RetentionHorizon) -> Result<PruneReport> {
        let today = self.clock.now().date();
        let cutoff = match retention.cutoff(today) {
            Some(cutoff) => cutoff,
            None => return Ok(PruneReport::default()),
        };

        let deleted = self
            .store
            .delete_between(NaiveDate::MIN, cutoff - Duration::days(1))?;
        let report = PruneReport {
            cutoff: Some(cutoff),
            deleted: deleted.len(),
            oldest: deleted.iter().map(|e| e.date).min(),
            newest: deleted.iter().map(|e| e.date).max(),
        };
        tracing::info!(
            "Pruned {} dose events before {} (oldest {:?}, newest {:?})",
            report.deleted,
            cutoff,
            report.oldest,
            report.newest
        );
        Ok(report)
    }

    fn load(&self, medication_id: &Uuid) -> Result<Medication> {
        self.store
            .medication(medication_id)?
            .ok_or_else(|| Error::UnknownMedication(medication_id.to_string()))
    }

    fn collect(
        &mut self,
        medication: &mut Medication,
        date: NaiveDate,
        slot: DoseTime,
        report: &mut BackfillReport,
    ) -> Result<()> {
        if let ProcessOutcome::Recorded(event) = self.record_slot(medication, date, slot)? {
            report.consumed = report.consumed.checked_add(event.quantity)?;
            report.recorded.push(event);
        }
        Ok(())
    }

    /// Core decision for one `(medication, date, slot)`. On success
    /// `medication` reflects what was committed.
    fn record_slot(
        &mut self,
        medication: &mut Medication,
        date: NaiveDate,
        slot: DoseTime,
    ) -> Result<ProcessOutcome> {
        let skip = |reason: SkipReason| -> Result<ProcessOutcome> {
            tracing::debug!("{} {} {}: skipped ({:?})", medication.name, date, slot, reason);
            Ok(ProcessOutcome::Skipped(reason))
        };

        if !medication.auto_create {
            return skip(SkipReason::AutoCreateDisabled);
        }
        if !medication.active {
            return skip(SkipReason::Inactive);
        }

        let dose = medication.scheduled_doses(date)?.get(slot);
        if dose.is_zero() {
            return skip(SkipReason::NothingScheduled);
        }

        let remaining = medication.supply.checked_sub(dose)?;
        if remaining.is_negative() {
            return skip(SkipReason::InsufficientSupply);
        }

        if self.store.event_exists(&medication.id, date, slot)? {
            return skip(SkipReason::AlreadyRecorded);
        }

        let mut updated = medication.clone();
        updated.supply = remaining;
        // A day is complete once its night slot is recorded; an earlier slot
        // only vouches for the day before.
        updated.last_auto_processed = Some(if slot.is_last() {
            date
        } else {
            date - Duration::days(1)
        });

        let event = DoseEvent::auto(medication.id, date, slot, dose, self.clock.now());
        self.store.commit_auto_dose(&updated, &event)?;
        *medication = updated;

        tracing::info!(
            "Recorded {} of {} for {} {} (supply now {})",
            dose,
            medication.name,
            date,
            slot,
            medication.supply
        );
        Ok(ProcessOutcome::Recorded(event))
    }
}
