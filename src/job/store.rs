// Shared job table: many concurrent readers, one writer task per job.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use super::record::{JobKind, JobRecord};
use super::workdir::WorkDir;

struct JobEntry {
    record: JobRecord,
    work_dir: Option<WorkDir>,
    /// Set once the artifact has been handed out; later fetches see NotFound.
    claimed: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub struct DuplicateJob(pub String);

impl std::fmt::Display for DuplicateJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job {} already exists", self.0)
    }
}

impl std::error::Error for DuplicateJob {}

/// Removed entry. Dropping it deletes the job's work dir.
pub struct RemovedJob {
    pub record: JobRecord,
    pub work_dir: Option<WorkDir>,
}

impl RemovedJob {
    /// Delete the work dir now, logging instead of failing.
    pub fn dispose(self) {
        if let Some(dir) = self.work_dir {
            let _ = dir.remove();
        }
    }
}

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, JobEntry>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a Pending record. A duplicate id is logged and rejected.
    pub fn create(&self, id: &str, kind: JobKind) -> Result<(), DuplicateJob> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(id) {
            error!("refusing to create job {}: id already in use", id);
            return Err(DuplicateJob(id.to_string()));
        }
        jobs.insert(
            id.to_string(),
            JobEntry {
                record: JobRecord::new(id, kind),
                work_dir: None,
                claimed: false,
            },
        );
        debug!("job {} created ({:?})", id, kind);
        Ok(())
    }

    /// Consistent snapshot of a record.
    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.jobs.read().get(id).map(|e| e.record.clone())
    }

    /// Apply `mutate` atomically. The change is dropped when the record is
    /// terminal or the mutation would move the state backwards. Returns whether
    /// it was committed.
    pub fn update<F>(&self, id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write();
        let entry = match jobs.get_mut(id) {
            Some(e) => e,
            None => {
                debug!("update for unknown job {}", id);
                return false;
            }
        };

        let current = entry.record.state;
        if current.is_terminal() {
            debug!("job {} is {}, ignoring update", id, current);
            return false;
        }

        let mut next = entry.record.clone();
        mutate(&mut next);
        if !current.can_transition_to(next.state) {
            warn!(
                "job {} rejected transition {} -> {}",
                id, current, next.state
            );
            return false;
        }
        if next.id != entry.record.id || next.kind != entry.record.kind {
            warn!("job {} update tried to change identity", id);
            return false;
        }

        next.updated_at = Utc::now();
        entry.record = next;
        true
    }

    /// Hand ownership of the job's output directory to the store.
    pub fn attach_work_dir(&self, id: &str, dir: WorkDir) -> Result<(), WorkDir> {
        let path = std::fs::canonicalize(dir.path()).unwrap_or_else(|_| dir.path().to_path_buf());
        let mut jobs = self.jobs.write();
        match jobs.get_mut(id) {
            Some(entry) if entry.work_dir.is_none() => {
                entry.record.work_dir = Some(path);
                entry.work_dir = Some(dir);
                Ok(())
            }
            _ => Err(dir),
        }
    }

    /// Mark a completed job's artifact as handed out. Only the first caller
    /// gets the record back.
    pub fn claim_artifact(&self, id: &str) -> Option<JobRecord> {
        let mut jobs = self.jobs.write();
        let entry = jobs.get_mut(id)?;
        if entry.claimed || entry.record.artifact_path.is_none() {
            return None;
        }
        entry.claimed = true;
        Some(entry.record.clone())
    }

    pub fn is_claimed(&self, id: &str) -> bool {
        self.jobs.read().get(id).is_some_and(|e| e.claimed)
    }

    /// Remove a record. Absent ids are a no-op. The caller decides when the
    /// returned work dir is deleted.
    pub fn remove(&self, id: &str) -> Option<RemovedJob> {
        let entry = self.jobs.write().remove(id)?;
        debug!("job {} removed", id);
        Some(RemovedJob {
            record: entry.record,
            work_dir: entry.work_dir,
        })
    }

    /// Terminal jobs whose last update is older than `ttl`.
    pub fn expired(&self, ttl: Duration) -> Vec<String> {
        let ttl = match chrono::Duration::from_std(ttl) {
            Ok(d) => d,
            Err(_) => return Vec::new(),
        };
        let cutoff = Utc::now() - ttl;
        self.jobs
            .read()
            .values()
            .filter(|e| e.record.is_finished() && e.record.updated_at <= cutoff)
            .map(|e| e.record.id.clone())
            .collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.jobs.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Drop every record and delete all work dirs.
    pub fn clear(&self) {
        let drained: Vec<JobEntry> = self.jobs.write().drain().map(|(_, e)| e).collect();
        for entry in drained {
            if let Some(dir) = entry.work_dir {
                let _ = dir.remove();
            }
        }
    }
}
