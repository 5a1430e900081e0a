//! Collaborator seams: clock, medication store and dose-event store.
//!
//! The ledger only talks to these traits. [`MemoryStore`] backs tests and
//! embedders; [`crate::file_store::FileStore`] backs the CLI.

use crate::dose_time::DoseTime;
use crate::{DoseEvent, Error, Medication, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Source of the current local wall-clock time.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// The host's local clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock frozen at one moment.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}

/// Medication records keyed by id.
pub trait MedicationStore {
    fn medication(&self, id: &Uuid) -> Result<Option<Medication>>;

    /// All medications, ordered by id.
    fn medications(&self) -> Result<Vec<Medication>>;

    /// Insert or replace.
    fn save_medication(&mut self, medication: &Medication) -> Result<()>;

    /// Returns whether a record was removed.
    fn remove_medication(&mut self, id: &Uuid) -> Result<bool>;
}

/// Dose-event records.
pub trait DoseEventStore {
    fn create_event(&mut self, event: &DoseEvent) -> Result<()>;

    fn event_exists(&self, medication_id: &Uuid, date: NaiveDate, dose_time: DoseTime)
        -> Result<bool>;

    /// Events dated within `[from, to]`, ordered by date then dose-time.
    fn events_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DoseEvent>>;

    /// Delete events dated within `[from, to]` and return them.
    fn delete_between(&mut self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DoseEvent>>;

    /// Returns whether a record was removed.
    fn delete_event(&mut self, id: &Uuid) -> Result<bool>;
}

/// Both stores, with an all-or-nothing commit for automatic doses.
pub trait LedgerStore: MedicationStore + DoseEventStore {
    /// Persist an auto-created event together with the medication whose
    /// supply it consumed.
    ///
    /// The default implementation creates the event first and removes it
    /// again if the medication cannot be saved, so a failure leaves neither
    /// change behind.
    ///
    /// A crash between the two writes leaves the event without its supply
    /// decrement. The slot then counts as recorded and is never charged, so
    /// supply can be over-reported by one dose but is never taken twice.
    fn commit_auto_dose(&mut self, medication: &Medication, event: &DoseEvent) -> Result<()> {
        self.create_event(event)?;
        if let Err(e) = self.save_medication(medication) {
            if let Err(undo) = self.delete_event(&event.id) {
                tracing::error!("Failed to roll back dose event {}: {}", event.id, undo);
            }
            return Err(e);
        }
        Ok(())
    }
}

/// In-memory stores.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    medications: BTreeMap<Uuid, Medication>,
    events: Vec<DoseEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in insertion order.
    pub fn events(&self) -> &[DoseEvent] {
        &self.events
    }

    pub fn with_medication(mut self, medication: Medication) -> Self {
        self.medications.insert(medication.id, medication);
        self
    }
}

impl MedicationStore for MemoryStore {
    fn medication(&self, id: &Uuid) -> Result<Option<Medication>> {
        Ok(self.medications.get(id).cloned())
    }

    fn medications(&self) -> Result<Vec<Medication>> {
        Ok(self.medications.values().cloned().collect())
    }

    fn save_medication(&mut self, medication: &Medication) -> Result<()> {
        self.medications.insert(medication.id, medication.clone());
        Ok(())
    }

    fn remove_medication(&mut self, id: &Uuid) -> Result<bool> {
        Ok(self.medications.remove(id).is_some())
    }
}

impl DoseEventStore for MemoryStore {
    fn create_event(&mut self, event: &DoseEvent) -> Result<()> {
        if self.events.iter().any(|e| e.id == event.id) {
            return Err(Error::Store(format!("dose event {} already exists", event.id)));
        }
        self.events.push(event.clone());
        Ok(())
    }

    fn event_exists(
        &self,
        medication_id: &Uuid,
        date: NaiveDate,
        dose_time: DoseTime,
    ) -> Result<bool> {
        Ok(self
            .events
            .iter()
            .any(|e| e.matches(medication_id, date, dose_time)))
    }

    fn events_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DoseEvent>> {
        Ok(sorted_in_range(self.events.iter(), from, to))
    }

    fn delete_between(&mut self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DoseEvent>> {
        let (deleted, kept): (Vec<_>, Vec<_>) = self
            .events
            .drain(..)
            .partition(|e| from <= e.date && e.date <= to);
        self.events = kept;
        Ok(deleted)
    }

    fn delete_event(&mut self, id: &Uuid) -> Result<bool> {
        let before = self.events.len();
        self.events.retain(|e| e.id != *id);
        Ok(self.events.len() != before)
    }
}

impl LedgerStore for MemoryStore {}

/// Events within `[from, to]`, ordered by date, dose-time, then record time.
pub(crate) fn sorted_in_range<'a, I>(events: I, from: NaiveDate, to: NaiveDate) -> Vec<DoseEvent>
where
    I: IntoIterator<Item = &'a DoseEvent>,
{
    let mut selected: Vec<DoseEvent> = events
        .into_iter()
        .filter(|e| from <= e.date && e.date <= to)
        .cloned()
        .collect();
    selected.sort_by_key(|e| (e.date, e.dose_time, e.recorded_at));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Fraction, RepeatRule, SlotDoses};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn event(medication_id: Uuid, d: u32, slot: DoseTime) -> DoseEvent {
        DoseEvent::auto(
            medication_id,
            day(d),
            slot,
            Fraction::ONE,
            day(d).and_hms_opt(12, 0, 0).unwrap(),
        )
    }

    /// Store whose medication writes always fail.
    struct FailingSave(MemoryStore);

    impl MedicationStore for FailingSave {
        fn medication(&self, id: &Uuid) -> Result<Option<Medication>> {
            self.0.medication(id)
        }
        fn medications(&self) -> Result<Vec<Medication>> {
            self.0.medications()
        }
        fn save_medication(&mut self, _: &Medication) -> Result<()> {
            Err(Error::Store("read-only".into()))
        }
        fn remove_medication(&mut self, id: &Uuid) -> Result<bool> {
            self.0.remove_medication(id)
        }
    }

    impl DoseEventStore for FailingSave {
        fn create_event(&mut self, event: &DoseEvent) -> Result<()> {
            self.0.create_event(event)
        }
        fn event_exists(&self, id: &Uuid, date: NaiveDate, slot: DoseTime) -> Result<bool> {
            self.0.event_exists(id, date, slot)
        }
        fn events_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DoseEvent>> {
            self.0.events_between(from, to)
        }
        fn delete_between(&mut self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DoseEvent>> {
            self.0.delete_between(from, to)
        }
        fn delete_event(&mut self, id: &Uuid) -> Result<bool> {
            self.0.delete_event(id)
        }
    }

    impl LedgerStore for FailingSave {}

    #[test]
    fn test_events_between_is_inclusive_and_sorted() {
        let id = Uuid::new_v4();
        let mut store = MemoryStore::new();
        store.create_event(&event(id, 3, DoseTime::Night)).unwrap();
        store.create_event(&event(id, 1, DoseTime::Noon)).unwrap();
        store.create_event(&event(id, 3, DoseTime::Morning)).unwrap();
        store.create_event(&event(id, 5, DoseTime::Morning)).unwrap();

        let found = store.events_between(day(1), day(3)).unwrap();
        let keys: Vec<_> = found.iter().map(|e| (e.date, e.dose_time)).collect();
        assert_eq!(
            keys,
            vec![
                (day(1), DoseTime::Noon),
                (day(3), DoseTime::Morning),
                (day(3), DoseTime::Night)
            ]
        );
    }

    #[test]
    fn test_delete_between_returns_deleted() {
        let id = Uuid::new_v4();
        let mut store = MemoryStore::new();
        for d in 1..=4 {
            store.create_event(&event(id, d, DoseTime::Morning)).unwrap();
        }
        let deleted = store.delete_between(day(2), day(3)).unwrap();
        assert_eq!(deleted.len(), 2);
        assert_eq!(store.events().len(), 2);
        assert!(!store.event_exists(&id, day(2), DoseTime::Morning).unwrap());
        assert!(store.event_exists(&id, day(4), DoseTime::Morning).unwrap());
    }

    #[test]
    fn test_duplicate_event_id_rejected() {
        let mut store = MemoryStore::new();
        let e = event(Uuid::new_v4(), 1, DoseTime::Morning);
        store.create_event(&e).unwrap();
        assert!(matches!(store.create_event(&e), Err(Error::Store(_))));
    }

    #[test]
    fn test_commit_rolls_back_event_when_save_fails() {
        let med = Medication::new("Aspirin", SlotDoses::ZERO, RepeatRule::Daily);
        let mut store = FailingSave(MemoryStore::new().with_medication(med.clone()));
        let e = event(med.id, 1, DoseTime::Morning);

        let err = store.commit_auto_dose(&med, &e).unwrap_err();
        assert!(err.is_retryable());
        assert!(store.0.events().is_empty());
    }

    #[test]
    fn test_medications_sorted_by_id() {
        let mut store = MemoryStore::new();
        for name in ["a", "b", "c"] {
            store
                .save_medication(&Medication::new(name, SlotDoses::ZERO, RepeatRule::Daily))
                .unwrap();
        }
        let ids: Vec<Uuid> = store.medications().unwrap().iter().map(|m| m.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
