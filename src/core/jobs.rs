//! In-memory batch job registry.
//!
//! One record per batch invocation, kept only for polling: nothing here is
//! persisted. The registry owns the result-history cap: the automation core
//! emits one progress event per recipient and this layer decides how many
//! to retain.

use crate::core::types::SendResult;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// Most recent results kept per job. Older entries are dropped; the counters
/// still cover the whole run.
const RESULT_HISTORY_CAP: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "error")]
pub enum JobState {
    Running,
    Done,
    Failed(String),
}

#[derive(Debug)]
pub struct JobRecord {
    pub id: Uuid,
    pub total: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
    sent: AtomicUsize,
    failed: AtomicUsize,
    state: RwLock<JobState>,
    results: Mutex<VecDeque<SendResult>>,
}

impl JobRecord {
    fn new(total: usize) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            total,
            started_at: chrono::Utc::now(),
            sent: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            state: RwLock::new(JobState::Running),
            results: Mutex::new(VecDeque::with_capacity(RESULT_HISTORY_CAP.min(total))),
        })
    }

    /// Record one per-recipient result, trimming history to the cap.
    pub fn push_result(&self, result: SendResult) {
        if result.ok {
            self.sent.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
        if results.len() == RESULT_HISTORY_CAP {
            results.pop_front();
        }
        results.push_back(result);
    }

    pub fn finish(&self) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = JobState::Done;
    }

    /// Mark the run as failed at setup level (session launch, login wait).
    pub fn fail(&self, error: impl Into<String>) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = JobState::Failed(error.into());
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            state: self
                .state
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            total: self.total,
            sent: self.sent.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            started_at: self.started_at,
            recent_results: self
                .results
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .cloned()
                .collect(),
        }
    }
}

/// Point-in-time view of a job for the polling API.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    #[serde(flatten)]
    pub state: JobState,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub recent_results: Vec<SendResult>,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, Arc<JobRecord>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, total: usize) -> Arc<JobRecord> {
        let record = JobRecord::new(total);
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.id, Arc::clone(&record));
        record
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<JobRecord>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }
}
