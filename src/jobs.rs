//! Background OCR jobs with explicit state transitions.
//!
//! A host process (a server, a bot, a queue worker) submits a document and
//! gets an id back immediately; the OCR itself runs on the Tokio runtime.
//! Job state lives behind the [`JobStore`] trait so the in-memory store can
//! be swapped for a persistent one without touching the runner.
//!
//! ```text
//! Queued ──▶ Processing ──▶ Completed(summary)
//!                      └──▶ Failed(message)
//! ```
//!
//! Nothing is lost when a job fails: the output artifact keeps every page
//! saved so far, and submitting the same source and output again resumes.

use crate::client::OcrClient;
use crate::config::OcrConfig;
use crate::error::PagewiseError;
use crate::output::SplitOcrSummary;
use crate::split_ocr::split_and_ocr;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Completed(SplitOcrSummary),
    Failed(String),
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed(_) => "completed",
            JobState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed(_) | JobState::Failed(_))
    }

    fn can_move_to(&self, next: &JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Processing)
                | (JobState::Processing, JobState::Completed(_))
                | (JobState::Processing, JobState::Failed(_))
        )
    }
}

/// One submitted OCR run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub source: PathBuf,
    pub output: PathBuf,
    pub state: JobState,
}

/// Storage for job records.
pub trait JobStore: Send + Sync {
    /// Register a new job; an id that is already present is rejected.
    fn insert(&self, job: Job) -> Result<(), PagewiseError>;

    fn get(&self, id: Uuid) -> Result<Job, PagewiseError>;

    /// Move job `id` to `next`, rejecting transitions the lifecycle forbids.
    fn transition(&self, id: Uuid, next: JobState) -> Result<Job, PagewiseError>;

    /// All jobs, oldest first.
    fn list(&self) -> Vec<Job>;

    /// Forget a finished job. Queued and processing jobs cannot be removed.
    fn remove(&self, id: Uuid) -> Result<Job, PagewiseError>;

    /// Forget every finished job; returns how many were dropped.
    fn prune_finished(&self) -> usize;
}

/// Process-local [`JobStore`].
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: Job) -> Result<(), PagewiseError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(PagewiseError::DuplicateJob {
                id: job.id.to_string(),
            });
        }
        jobs.push(job);
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Job, PagewiseError> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| PagewiseError::JobNotFound { id: id.to_string() })
    }

    fn transition(&self, id: Uuid, next: JobState) -> Result<Job, PagewiseError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| PagewiseError::JobNotFound { id: id.to_string() })?;

        if !job.state.can_move_to(&next) {
            return Err(PagewiseError::InvalidJobTransition {
                id: id.to_string(),
                from: job.state.name(),
                to: next.name(),
            });
        }
        job.state = next;
        Ok(job.clone())
    }

    fn list(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remove(&self, id: Uuid) -> Result<Job, PagewiseError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| PagewiseError::JobNotFound { id: id.to_string() })?;
        if !jobs[pos].state.is_terminal() {
            return Err(PagewiseError::JobActive {
                id: id.to_string(),
                state: jobs[pos].state.name(),
            });
        }
        Ok(jobs.remove(pos))
    }

    fn prune_finished(&self) -> usize {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|j| !j.state.is_terminal());
        before - jobs.len()
    }
}

/// Runs [`split_and_ocr`] in the background and records each transition.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    client: Arc<dyn OcrClient>,
    config: Arc<OcrConfig>,
}

impl JobRunner {
    pub fn new(store: Arc<dyn JobStore>, client: Arc<dyn OcrClient>, config: OcrConfig) -> Self {
        Self {
            store,
            client,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Register a `Queued` job and start it. Must be called inside a Tokio
    /// runtime.
    ///
    /// The returned handle resolves once the job has reached a terminal state.
    pub fn submit(
        &self,
        source: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Result<(Uuid, JoinHandle<()>), PagewiseError> {
        let job = Job {
            id: Uuid::new_v4(),
            source: source.into(),
            output: output.into(),
            state: JobState::Queued,
        };
        let id = job.id;
        self.store.insert(job.clone())?;
        info!("Queued job {} for {}", id, job.source.display());

        let runner = self.clone();
        let handle = tokio::spawn(async move { runner.run(job).await });
        Ok((id, handle))
    }

    async fn run(self, job: Job) {
        if let Err(e) = self.store.transition(job.id, JobState::Processing) {
            warn!("Job {} could not start: {}", job.id, e);
            return;
        }

        let outcome = split_and_ocr(&job.source, &job.output, &self.config, self.client.clone()).await;
        let next = match outcome {
            Ok(summary) => {
                info!(
                    "Job {} completed: {} pages processed",
                    job.id, summary.pages_processed
                );
                JobState::Completed(summary)
            }
            Err(e) => {
                warn!("Job {} failed: {}", job.id, e);
                JobState::Failed(e.to_string())
            }
        };

        if let Err(e) = self.store.transition(job.id, next) {
            warn!("Job {} finished but could not be recorded: {}", job.id, e);
        }
    }
}
