#![forbid(unsafe_code)]

//! Core domain model and business logic for dosetrack.
//!
//! This crate provides:
//! - Exact fractional dose arithmetic
//! - Dose-time windows and resolution of moments to (date, dose-time)
//! - Repeat rules deciding what is scheduled on a date
//! - The dose ledger: automatic recording, backfill and history pruning
//! - Store traits with in-memory and file-backed implementations

pub mod types;
pub mod error;
pub mod fraction;
pub mod daytime;
pub mod dose_time;
pub mod schedule;
pub mod store;
pub mod ledger;
pub mod file_store;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use fraction::Fraction;
pub use daytime::{DayTime, TimeWindow};
pub use dose_time::{DoseTime, DoseTimeInfo, DoseTimeResolver, DoseTimeWindows};
pub use schedule::{DoseInterval, RepeatRule, SlotDoses, WeekdayMask};
pub use store::{Clock, DoseEventStore, FixedClock, LedgerStore, MedicationStore, MemoryStore, SystemClock};
pub use ledger::{BackfillReport, DoseLedger, ProcessOutcome, PruneReport, RetentionHorizon, SkipReason};
pub use file_store::FileStore;
pub use config::Config;
