//! File-backed stores for the CLI.
//!
//! Layout under the data directory:
//! - `medications.json`: all medications, rewritten atomically on each save
//! - `dose_events.jsonl`: one dose event per line, appended under an
//!   exclusive lock; deletions rewrite the file atomically
//!
//! Unparseable event lines are skipped with a warning. An unparseable
//! medications file is an error, since silently starting empty would lose
//! supply counts on the next save.

use crate::dose_time::DoseTime;
use crate::store::{sorted_in_range, DoseEventStore, LedgerStore, MedicationStore};
use crate::{DoseEvent, Error, Medication, Result};
use chrono::NaiveDate;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

const MEDICATIONS_FILE: &str = "medications.json";
const EVENTS_FILE: &str = "dose_events.jsonl";

/// Medication and dose-event stores rooted at one directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn medications_path(&self) -> PathBuf {
        self.dir.join(MEDICATIONS_FILE)
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    /// Find a medication by exact name, ignoring case.
    pub fn medication_by_name(&self, name: &str) -> Result<Option<Medication>> {
        Ok(self
            .read_medications()?
            .into_values()
            .find(|m| m.name.eq_ignore_ascii_case(name)))
    }

    fn read_medications(&self) -> Result<BTreeMap<Uuid, Medication>> {
        let path = self.medications_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let file = File::open(&path)?;
        file.lock_shared()?;
        let mut contents = String::new();
        let read = BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let medications: Vec<Medication> = serde_json::from_str(&contents).map_err(|e| {
            Error::Store(format!("medications file {:?} is corrupt: {}", path, e))
        })?;
        Ok(medications.into_iter().map(|m| (m.id, m)).collect())
    }

    fn write_medications(&self, medications: &BTreeMap<Uuid, Medication>) -> Result<()> {
        let list: Vec<&Medication> = medications.values().collect();
        let contents = serde_json::to_vec_pretty(&list)?;
        write_atomic(&self.medications_path(), &contents)?;
        tracing::debug!("Saved {} medications", list.len());
        Ok(())
    }

    fn read_events(&self) -> Result<Vec<DoseEvent>> {
        let path = self.events_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)?;
        file.lock_shared()?;

        let reader = BufReader::new(&file);
        let mut events = Vec::new();
        for (line_num, line_result) in reader.lines().enumerate() {
            let line = match line_result {
                Ok(line) => line,
                Err(e) => {
                    file.unlock()?;
                    return Err(e.into());
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DoseEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!("Skipping dose event at line {}: {}", line_num + 1, e);
                }
            }
        }

        file.unlock()?;
        tracing::debug!("Read {} dose events", events.len());
        Ok(events)
    }

    fn rewrite_events(&self, events: &[DoseEvent]) -> Result<()> {
        let mut contents = Vec::new();
        for event in events {
            serde_json::to_writer(&mut contents, event)?;
            contents.push(b'\n');
        }
        write_atomic(&self.events_path(), &contents)
    }
}

/// Whether the file is non-empty and lacks a trailing newline.
fn ends_mid_line(mut file: &File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Write to a temp file next to `path`, sync, then rename over it.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Store(format!("{:?} has no parent directory", path)))?;
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file().lock_exclusive()?;
    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        writer.write_all(contents)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

impl MedicationStore for FileStore {
    fn medication(&self, id: &Uuid) -> Result<Option<Medication>> {
        Ok(self.read_medications()?.remove(id))
    }

    fn medications(&self) -> Result<Vec<Medication>> {
        Ok(self.read_medications()?.into_values().collect())
    }

    fn save_medication(&mut self, medication: &Medication) -> Result<()> {
        let mut all = self.read_medications()?;
        all.insert(medication.id, medication.clone());
        self.write_medications(&all)
    }

    fn remove_medication(&mut self, id: &Uuid) -> Result<bool> {
        let mut all = self.read_medications()?;
        if all.remove(id).is_none() {
            return Ok(false);
        }
        self.write_medications(&all)?;
        Ok(true)
    }
}

impl DoseEventStore for FileStore {
    fn create_event(&mut self, event: &DoseEvent) -> Result<()> {
        if self.read_events()?.iter().any(|e| e.id == event.id) {
            return Err(Error::Store(format!("dose event {} already exists", event.id)));
        }
        std::fs::create_dir_all(&self.dir)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.events_path())?;
        file.lock_exclusive()?;

        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let written = ends_mid_line(&file).and_then(|partial| {
            let mut writer = std::io::BufWriter::new(&file);
            if partial {
                // Terminate a line left behind by an interrupted append.
                writer.write_all(b"\n")?;
            }
            writer.write_all(line.as_bytes())?;
            writer.flush()
        });
        file.unlock()?;
        written?;

        tracing::debug!("Appended dose event {}", event.id);
        Ok(())
    }

    fn event_exists(
        &self,
        medication_id: &Uuid,
        date: NaiveDate,
        dose_time: DoseTime,
    ) -> Result<bool> {
        Ok(self
            .read_events()?
            .iter()
            .any(|e| e.matches(medication_id, date, dose_time)))
    }

    fn events_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DoseEvent>> {
        Ok(sorted_in_range(&self.read_events()?, from, to))
    }

    fn delete_between(&mut self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DoseEvent>> {
        let (deleted, kept): (Vec<_>, Vec<_>) = self
            .read_events()?
            .into_iter()
            .partition(|e| from <= e.date && e.date <= to);
        if !deleted.is_empty() {
            self.rewrite_events(&kept)?;
        }
        Ok(deleted)
    }

    fn delete_event(&mut self, id: &Uuid) -> Result<bool> {
        let mut events = self.read_events()?;
        let before = events.len();
        events.retain(|e| e.id != *id);
        if events.len() == before {
            return Ok(false);
        }
        self.rewrite_events(&events)?;
        Ok(true)
    }
}

impl LedgerStore for FileStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Fraction, RepeatRule, SlotDoses};
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn event(medication_id: Uuid, d: u32, slot: DoseTime) -> DoseEvent {
        DoseEvent::auto(
            medication_id,
            day(d),
            slot,
            Fraction::new(1, 2).unwrap(),
            day(d).and_hms_opt(9, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_medication_save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::new(dir.path().join("data"));

        let mut med = Medication::new("Levothyroxine", SlotDoses::ZERO, RepeatRule::Daily);
        med.supply = Fraction::new(61, 2).unwrap();
        store.save_medication(&med).unwrap();

        let loaded = store.medication(&med.id).unwrap().unwrap();
        assert_eq!(loaded, med);
        assert_eq!(
            store.medication_by_name("levothyroxine").unwrap().map(|m| m.id),
            Some(med.id)
        );

        assert!(store.remove_medication(&med.id).unwrap());
        assert!(!store.remove_medication(&med.id).unwrap());
        assert!(store.medications().unwrap().is_empty());
    }

    #[test]
    fn test_missing_files_are_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.medications().unwrap().is_empty());
        assert!(store.events_between(day(1), day(31)).unwrap().is_empty());
    }

    #[test]
    fn test_events_append_and_delete() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::new(dir.path());
        let id = Uuid::new_v4();
        for d in 1..=5 {
            store.create_event(&event(id, d, DoseTime::Morning)).unwrap();
        }
        assert!(store.event_exists(&id, day(3), DoseTime::Morning).unwrap());
        assert!(!store.event_exists(&id, day(3), DoseTime::Night).unwrap());

        let deleted = store.delete_between(day(1), day(2)).unwrap();
        assert_eq!(deleted.len(), 2);
        let remaining = store.events_between(day(1), day(31)).unwrap();
        assert_eq!(remaining.len(), 3);
        assert_eq!(remaining[0].date, day(3));

        assert!(store.delete_event(&remaining[0].id).unwrap());
        assert_eq!(store.events_between(day(1), day(31)).unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_event_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::new(dir.path());
        let id = Uuid::new_v4();
        store.create_event(&event(id, 1, DoseTime::Morning)).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(store.events_path())
            .unwrap();
        writeln!(file, "{{ not json").unwrap();
        drop(file);

        store.create_event(&event(id, 2, DoseTime::Morning)).unwrap();
        assert_eq!(store.events_between(day(1), day(31)).unwrap().len(), 2);
    }

    #[test]
    fn test_append_after_partial_line() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::new(dir.path());
        let id = Uuid::new_v4();
        std::fs::write(store.events_path(), r#"{"id":"trunc"#).unwrap();

        store.create_event(&event(id, 1, DoseTime::Evening)).unwrap();
        assert!(store.event_exists(&id, day(1), DoseTime::Evening).unwrap());
    }

    #[test]
    fn test_corrupt_medications_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        std::fs::write(store.medications_path(), "[ broken").unwrap();
        assert!(matches!(store.medications(), Err(Error::Store(_))));
    }

    #[test]
    fn test_atomic_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::new(dir.path());
        let med = Medication::new("Aspirin", SlotDoses::ZERO, RepeatRule::Daily);
        store.save_medication(&med).unwrap();
        store.create_event(&event(med.id, 1, DoseTime::Noon)).unwrap();
        store.delete_between(day(1), day(1)).unwrap();

        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![EVENTS_FILE, MEDICATIONS_FILE]);
    }
}
