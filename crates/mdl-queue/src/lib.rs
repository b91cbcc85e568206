//! Submission queue for MedLedger.
//!
//! Mutating requests are not applied on arrival. They pass the admission
//! gate, are persisted as jobs, and the caller receives a job id at once.
//! A worker later applies each job to the ledger and records its outcome.
//!
//! Three job stores are provided:
//! - [`WalJobStore`]: an fsync'd, CRC-framed journal on local disk
//! - [`RedisJobStore`]: hashes and a pending list on a Redis server
//! - [`InMemoryJobStore`]: volatile, for tests and embedding

pub mod error;
pub mod job;
pub mod journal;
pub mod queue;
pub mod redis_store;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use job::{JobEntry, JobOutcome, JobRecord, JobStatus};
pub use journal::{JobJournal, JournalConfig, JournalRecord, SyncMode};
pub use queue::SubmissionQueue;
pub use redis_store::RedisJobStore;
pub use store::{InMemoryJobStore, JobStore, WalJobStore};
