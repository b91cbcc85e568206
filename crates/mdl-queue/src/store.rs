use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use mdl_types::JobId;

use crate::error::{QueueError, QueueResult};
use crate::job::{JobEntry, JobOutcome, JobRecord, JobStatus};
use crate::journal::{JobJournal, JournalConfig, JournalRecord};

/// Durable home of admitted jobs.
///
/// `append` must not return until the job is durable, and a failed append
/// must leave nothing behind.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn append(&self, record: &JobRecord) -> QueueResult<()>;

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobEntry>>;

    /// Unfinished jobs in admission order.
    async fn pending(&self) -> QueueResult<Vec<JobRecord>>;

    /// Record a terminal outcome. Each job finishes at most once.
    async fn finish(&self, job_id: &JobId, outcome: &JobOutcome) -> QueueResult<()>;
}

/// Admission-ordered index of jobs and their status.
#[derive(Debug, Default)]
struct JobIndex {
    order: Vec<JobId>,
    jobs: HashMap<JobId, JobEntry>,
    finishing: HashSet<JobId>,
}

impl JobIndex {
    fn insert(&mut self, record: JobRecord) {
        let job_id = record.job_id;
        if self.jobs.insert(job_id, JobEntry::pending(record)).is_none() {
            self.order.push(job_id);
        }
    }

    fn check_finish(&self, job_id: &JobId) -> QueueResult<()> {
        match self.jobs.get(job_id) {
            None => Err(QueueError::UnknownJob(*job_id)),
            Some(entry) if entry.status.is_terminal() => Err(QueueError::AlreadyFinished(*job_id)),
            Some(_) => Ok(()),
        }
    }

    /// Reserve `job_id` for a finish whose journal write is in flight. A
    /// second claim fails as if the job had already finished.
    fn claim_finish(&mut self, job_id: &JobId) -> QueueResult<()> {
        self.check_finish(job_id)?;
        if !self.finishing.insert(*job_id) {
            return Err(QueueError::AlreadyFinished(*job_id));
        }
        Ok(())
    }

    fn release_finish(&mut self, job_id: &JobId) {
        self.finishing.remove(job_id);
    }

    fn finish(&mut self, job_id: &JobId, outcome: &JobOutcome) {
        self.finishing.remove(job_id);
        if let Some(entry) = self.jobs.get_mut(job_id) {
            entry.status = JobStatus::from(outcome.clone());
        }
    }

    fn pending(&self) -> Vec<JobRecord> {
        self.order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(|entry| !entry.status.is_terminal())
            .map(|entry| entry.record.clone())
            .collect()
    }
}

fn lock(index: &Mutex<JobIndex>) -> QueueResult<MutexGuard<'_, JobIndex>> {
    index.lock().map_err(|_| QueueError::LockPoisoned)
}

/// Volatile job store, for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    index: Mutex<JobIndex>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> QueueResult<usize> {
        Ok(lock(&self.index)?.order.len())
    }

    pub fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn append(&self, record: &JobRecord) -> QueueResult<()> {
        lock(&self.index)?.insert(record.clone());
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobEntry>> {
        Ok(lock(&self.index)?.jobs.get(job_id).cloned())
    }

    async fn pending(&self) -> QueueResult<Vec<JobRecord>> {
        Ok(lock(&self.index)?.pending())
    }

    async fn finish(&self, job_id: &JobId, outcome: &JobOutcome) -> QueueResult<()> {
        let mut index = lock(&self.index)?;
        index.check_finish(job_id)?;
        index.finish(job_id, outcome);
        Ok(())
    }
}

/// Job store backed by an on-disk [`JobJournal`].
///
/// The index is rebuilt from the journal on open. Every change is journaled
/// before the index sees it.
pub struct WalJobStore {
    journal: Arc<JobJournal>,
    index: Arc<Mutex<JobIndex>>,
}

impl WalJobStore {
    pub fn open(path: &Path, config: JournalConfig) -> QueueResult<Self> {
        let journal = JobJournal::open(path, config)?;
        let mut index = JobIndex::default();
        for record in journal.recover()? {
            match record {
                JournalRecord::Admitted(job) => index.insert(job),
                JournalRecord::Finished { job_id, outcome } => index.finish(&job_id, &outcome),
            }
        }
        tracing::info!(
            path = %path.display(),
            jobs = index.order.len(),
            "job journal opened"
        );
        Ok(Self {
            journal: Arc::new(journal),
            index: Arc::new(Mutex::new(index)),
        })
    }

    async fn journal(&self, record: JournalRecord) -> QueueResult<()> {
        let journal = Arc::clone(&self.journal);
        tokio::task::spawn_blocking(move || journal.append(&record))
            .await
            .map_err(|e| QueueError::Io(std::io::Error::other(e)))??;
        Ok(())
    }
}

#[async_trait]
impl JobStore for WalJobStore {
    async fn append(&self, record: &JobRecord) -> QueueResult<()> {
        self.journal(JournalRecord::Admitted(record.clone())).await?;
        lock(&self.index)?.insert(record.clone());
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobEntry>> {
        Ok(lock(&self.index)?.jobs.get(job_id).cloned())
    }

    async fn pending(&self) -> QueueResult<Vec<JobRecord>> {
        Ok(lock(&self.index)?.pending())
    }

    async fn finish(&self, job_id: &JobId, outcome: &JobOutcome) -> QueueResult<()> {
        lock(&self.index)?.claim_finish(job_id)?;
        let journaled = self
            .journal(JournalRecord::Finished {
                job_id: *job_id,
                outcome: outcome.clone(),
            })
            .await;
        let mut index = lock(&self.index)?;
        match journaled {
            Ok(()) => {
                index.finish(job_id, outcome);
                Ok(())
            }
            Err(err) => {
                index.release_finish(job_id);
                Err(err)
            }
        }
    }
}
