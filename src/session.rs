//! Local caches of the backend collections and the solve recorder.
//!
//! Caches change only after the backend confirmed an operation. Late
//! responses are checked against per-collection epochs so a save that
//! started before a clear cannot bring back data the user removed.

use chrono::{SecondsFormat, Utc};

use crate::cubes::CubeTypeList;
use crate::model::{NewSolve, RecordMap, Settings, SolveEntry, UNKNOWN_CUBE};
use crate::storage::{Snapshot, StorageError};

/// Wall-clock timestamp in the shape the backend stores, e.g.
/// `2024-05-01T10:00:00.000Z`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// What the recorder knew when the save request went out.
#[derive(Clone, Debug, PartialEq)]
pub struct SaveTicket {
    pub cube: String,
    pub ms: u64,
    pub is_record: bool,
    /// Saved from the pending unknown slot after a cube was picked.
    pub from_pending: bool,
    times_epoch: u64,
    records_epoch: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecordDecision {
    Save { ticket: SaveTicket, solve: NewSolve },
    /// Unknown cube with saving disabled; the duration is kept as pending.
    NotSaved,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SaveOutcome {
    Saved {
        new_record: bool,
        /// Updated map to persist with `POST /records`.
        records_to_save: Option<RecordMap>,
        /// The history changed under the request; fetch it again.
        resync_times: bool,
    },
    Failed(String),
}

#[derive(Debug, Default)]
pub struct Session {
    times: Vec<SolveEntry>,
    records: RecordMap,
    cubes: CubeTypeList,
    settings: Settings,
    selected: Option<String>,
    pending_unknown: Option<u64>,
    times_epoch: u64,
    records_epoch: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn times(&self) -> &[SolveEntry] {
        &self.times
    }

    pub fn records(&self) -> &RecordMap {
        &self.records
    }

    pub fn cubes(&self) -> &CubeTypeList {
        &self.cubes
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pending_unknown(&self) -> Option<u64> {
        self.pending_unknown
    }

    /// Cube type new solves are recorded under.
    pub fn current_cube(&self) -> &str {
        self.selected.as_deref().unwrap_or(UNKNOWN_CUBE)
    }

    /// Selects `cube` and hands back a pending unknown solve, if any, to be
    /// saved under it. Picking the unknown sentinel keeps the pending solve.
    pub fn select_cube(&mut self, cube: &str) -> Option<u64> {
        if cube == UNKNOWN_CUBE {
            self.selected = None;
            return None;
        }
        self.selected = Some(cube.to_string());
        self.pending_unknown.take()
    }

    /// Applies the pre-flight part of recording: record check and the
    /// unknown-cube short circuit. Nothing in the cache changes yet.
    pub fn begin_record(&mut self, cube: &str, ms: u64, timestamp: String) -> RecordDecision {
        self.begin(cube, ms, timestamp, false)
    }

    pub fn begin_pending_record(&mut self, cube: &str, ms: u64, timestamp: String) -> RecordDecision {
        self.begin(cube, ms, timestamp, true)
    }

    fn begin(&mut self, cube: &str, ms: u64, timestamp: String, from_pending: bool) -> RecordDecision {
        if cube == UNKNOWN_CUBE && !self.settings.enabled_features.save_unknown_solves {
            self.pending_unknown = Some(ms);
            return RecordDecision::NotSaved;
        }
        let is_record = self.records.is_improvement(cube, ms);
        let ticket = SaveTicket {
            cube: cube.to_string(),
            ms,
            is_record,
            from_pending,
            times_epoch: self.times_epoch,
            records_epoch: self.records_epoch,
        };
        let solve = NewSolve {
            cube: cube.to_string(),
            ms,
            record: is_record,
            timestamp,
        };
        RecordDecision::Save { ticket, solve }
    }

    pub fn finish_record(
        &mut self,
        ticket: &SaveTicket,
        result: Result<SolveEntry, StorageError>,
    ) -> SaveOutcome {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => return SaveOutcome::Failed(e.to_string()),
        };

        let resync_times = ticket.times_epoch != self.times_epoch;
        if !resync_times {
            let known = entry.id.is_some() && self.times.iter().any(|t| t.id == entry.id);
            if !known {
                self.times.push(entry);
            }
        }

        let mut new_record = false;
        let mut records_to_save = None;
        if ticket.is_record
            && ticket.records_epoch == self.records_epoch
            && self.records.improve(&ticket.cube, ticket.ms)
        {
            new_record = true;
            records_to_save = Some(self.records.clone());
        }

        SaveOutcome::Saved {
            new_record,
            records_to_save,
            resync_times,
        }
    }

    pub fn times_cleared(&mut self) {
        self.times.clear();
        self.times_epoch += 1;
    }

    pub fn records_cleared(&mut self) {
        self.records.clear();
        self.records_epoch += 1;
    }

    pub fn time_deleted(&mut self, id: u64) {
        self.times.retain(|t| t.id != Some(id));
    }

    pub fn time_retyped(&mut self, id: u64, cube: &str) {
        if let Some(entry) = self.times.iter_mut().find(|t| t.id == Some(id)) {
            entry.cube = cube.to_string();
        }
    }

    pub fn cube_added(&mut self, name: &str) {
        self.cubes.add(name);
    }

    /// The backend also drops the cube's solves; the caller re-fetches them.
    pub fn cube_removed(&mut self, name: &str) {
        self.cubes.remove(name);
        self.times.retain(|t| t.cube != name);
        self.times_epoch += 1;
        if self.selected.as_deref() == Some(name) {
            self.selected = None;
        }
    }

    /// Only the list and the selection move locally; history and records
    /// are re-fetched by the caller.
    pub fn cube_renamed(&mut self, old: &str, new: &str) {
        self.cubes.rename(old, new);
        if self.selected.as_deref() == Some(old) {
            self.selected = Some(new.to_string());
        }
        self.times_epoch += 1;
        self.records_epoch += 1;
    }

    pub fn settings_saved(&mut self, settings: Settings) {
        self.settings = settings.normalized();
    }

    /// Replaces whatever the snapshot carries; missing parts keep their value.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        if let Some(settings) = snapshot.settings {
            self.settings = settings.normalized();
        }
        if let Some(cubes) = snapshot.cubes {
            self.cubes = cubes;
            if let Some(selected) = &self.selected {
                if !self.cubes.contains(selected) {
                    self.selected = None;
                }
            }
        }
        if let Some(times) = snapshot.times {
            self.replace_times(times);
        }
        if let Some(records) = snapshot.records {
            self.records = records;
        }
    }

    pub fn replace_times(&mut self, times: Vec<SolveEntry>) {
        self.times = times;
        self.times_epoch += 1;
    }

    pub fn replace_records(&mut self, records: RecordMap) {
        self.records = records;
    }

    /// Starts a bulk replacement (import); in-flight saves become stale.
    pub fn invalidate(&mut self) {
        self.times_epoch += 1;
        self.records_epoch += 1;
    }
}
