use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use mdl_types::{ArgumentList, JobId, OperationName, TenantId};

use crate::error::{QueueError, QueueResult};
use crate::job::{JobOutcome, JobRecord};

/// A journal entry.
#[derive(Clone, Debug, PartialEq)]
pub enum JournalRecord {
    Admitted(JobRecord),
    Finished { job_id: JobId, outcome: JobOutcome },
}

/// On-disk form of a [`JournalRecord`].
///
/// bincode cannot carry free-form JSON, so the argument list travels as its
/// canonical JSON text.
#[derive(Serialize, Deserialize)]
enum Frame {
    Admitted {
        job_id: JobId,
        tenant: TenantId,
        operation: OperationName,
        arguments: String,
        admitted_at: DateTime<Utc>,
    },
    Finished {
        job_id: JobId,
        outcome: JobOutcome,
    },
}

impl JournalRecord {
    fn to_frame(&self) -> QueueResult<Frame> {
        Ok(match self {
            Self::Admitted(record) => {
                let value = serde_json::to_value(&record.argument_list)
                    .map_err(|e| QueueError::Serialization(e.to_string()))?;
                Frame::Admitted {
                    job_id: record.job_id,
                    tenant: record.tenant.clone(),
                    operation: record.operation_name,
                    arguments: mdl_crypto::to_canonical_string(&value)
                        .map_err(|e| QueueError::Serialization(e.to_string()))?,
                    admitted_at: record.admitted_at,
                }
            }
            Self::Finished { job_id, outcome } => Frame::Finished {
                job_id: *job_id,
                outcome: outcome.clone(),
            },
        })
    }

    fn from_frame(frame: Frame) -> QueueResult<Self> {
        Ok(match frame {
            Frame::Admitted {
                job_id,
                tenant,
                operation,
                arguments,
                admitted_at,
            } => Self::Admitted(JobRecord {
                job_id,
                tenant,
                operation_name: operation,
                argument_list: serde_json::from_str::<ArgumentList>(&arguments)
                    .map_err(|e| QueueError::Serialization(e.to_string()))?,
                admitted_at,
            }),
            Frame::Finished { job_id, outcome } => Self::Finished { job_id, outcome },
        })
    }
}

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every append; an admitted job survives power loss.
    #[default]
    EveryWrite,
    /// Flush to the OS and let it decide when to reach the disk.
    OsDefault,
}

/// Configuration for the job journal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

/// Crash-recoverable, append-only job journal.
///
/// On-disk format, repeated:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized frame)]
/// ```
///
/// Every append writes one whole frame. If the write fails the file is cut
/// back to where the frame began, so a failed admission leaves no trace. If
/// that cut fails too, the journal refuses every later append.
/// Opening a journal cuts off a torn tail left by a crash.
pub struct JobJournal {
    path: PathBuf,
    file: Mutex<JournalFile>,
    config: JournalConfig,
}

struct JournalFile {
    file: File,
    offset: u64,
    poisoned_at: Option<u64>,
}

impl JobJournal {
    /// Open (or create) a journal at the given path.
    pub fn open(path: &Path, config: JournalConfig) -> QueueResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let valid_len = scan(path, |_, _| {})?;
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "cutting torn tail from job journal"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(JournalFile {
                file,
                offset: valid_len,
                poisoned_at: None,
            }),
            config,
        })
    }

    /// Append a record. Returns the byte offset of its frame.
    pub fn append(&self, record: &JournalRecord) -> QueueResult<u64> {
        let payload = bincode::serialize(&record.to_frame()?)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| QueueError::Serialization("journal frame too large".into()))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);

        let mut w = self.lock()?;
        if let Some(offset) = w.poisoned_at {
            return Err(QueueError::JournalPoisoned { offset });
        }
        let entry_offset = w.offset;

        if let Err(err) = write_frame(&mut w.file, &frame, self.config.sync_mode) {
            warn!(offset = entry_offset, error = %err, "journal append failed, rolling back");
            if let Err(cut) = w.file.set_len(entry_offset) {
                error!(offset = entry_offset, error = %cut, "journal rollback failed; refusing appends");
                w.poisoned_at = Some(entry_offset);
            }
            return Err(err.into());
        }

        w.offset += frame.len() as u64;
        debug!(offset = entry_offset, len = payload.len(), "journal append");
        Ok(entry_offset)
    }

    /// Every intact record, in append order.
    ///
    /// Frames that fail the CRC check or cannot be decoded are logged and
    /// skipped.
    pub fn recover(&self) -> QueueResult<Vec<JournalRecord>> {
        let _guard = self.lock()?;
        let mut records = Vec::new();
        scan(&self.path, |offset, payload| {
            let decoded = bincode::deserialize::<Frame>(payload)
                .map_err(|e| QueueError::Serialization(e.to_string()))
                .and_then(JournalRecord::from_frame);
            match decoded {
                Ok(record) => records.push(record),
                Err(err) => warn!(offset, error = %err, "undecodable journal entry; skipping"),
            }
        })?;
        debug!(recovered = records.len(), "journal recovery complete");
        Ok(records)
    }

    /// Current end of the journal in bytes.
    pub fn offset(&self) -> QueueResult<u64> {
        Ok(self.lock()?.offset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, JournalFile>> {
        self.file.lock().map_err(|_| QueueError::LockPoisoned)
    }
}

fn write_frame(file: &mut File, frame: &[u8], sync_mode: SyncMode) -> io::Result<()> {
    file.write_all(frame)?;
    file.flush()?;
    if sync_mode == SyncMode::EveryWrite {
        file.sync_data()?;
    }
    Ok(())
}

/// Walk the frames of the journal at `path`, handing each CRC-valid payload
/// to `visit`. Returns the length of the well-formed prefix of the file.
fn scan(path: &Path, mut visit: impl FnMut(u64, &[u8])) -> QueueResult<u64> {
    let mut file = BufReader::new(File::open(path)?);
    let file_len = file.get_ref().metadata()?.len();
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE <= file_len {
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; HEADER_SIZE as usize];
        match file.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if length == 0 || offset + HEADER_SIZE + u64::from(length) > file_len {
            warn!(offset, length, file_len, "invalid journal entry length; stopping");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        match file.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(offset, "truncated journal entry; stopping");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc == expected_crc {
            visit(offset, &payload);
        } else {
            warn!(
                offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; skipping entry"
            );
        }
        offset += HEADER_SIZE + u64::from(length);
    }

    Ok(offset)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn admitted(id: &str) -> JournalRecord {
        JournalRecord::Admitted(JobRecord::new(
            TenantId::new("Org1MSP").unwrap(),
            OperationName::TransferAsset,
            ArgumentList::from_values(vec![json!(id), json!("Org2MSP")]),
        ))
    }

    fn open(path: &Path) -> JobJournal {
        JobJournal::open(path, JournalConfig::default()).unwrap()
    }

    #[test]
    fn append_and_recover() {
        let dir = tempfile::tempdir().unwrap();
        let journal = open(&dir.path().join("jobs.journal"));

        let first = admitted("a1");
        let JournalRecord::Admitted(record) = &first else {
            unreachable!()
        };
        let finished = JournalRecord::Finished {
            job_id: record.job_id,
            outcome: JobOutcome::Failed {
                reason: "the asset a1 does not exist".into(),
            },
        };
        journal.append(&first).unwrap();
        journal.append(&finished).unwrap();

        assert_eq!(journal.recover().unwrap(), vec![first, finished]);
    }

    #[test]
    fn recover_empty_journal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = open(&dir.path().join("empty.journal"));
        assert!(journal.recover().unwrap().is_empty());
        assert_eq!(journal.offset().unwrap(), 0);
    }

    #[test]
    fn numeric_arguments_survive_the_journal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = open(&dir.path().join("num.journal"));
        let record = JournalRecord::Admitted(JobRecord::new(
            TenantId::new("Org1MSP").unwrap(),
            OperationName::CreateTransactionAsset,
            ArgumentList::from_values(vec![json!("t1"), json!(12.75), json!(null)]),
        ));
        journal.append(&record).unwrap();
        assert_eq!(journal.recover().unwrap(), vec![record]);
    }

    #[test]
    fn crc_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.journal");
        let journal = open(&path);
        journal.append(&admitted("a1")).unwrap();
        let second = admitted("a2");
        journal.append(&second).unwrap();
        drop(journal);

        {
            let mut file = OpenOptions::new().write(true).read(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(HEADER_SIZE)).unwrap();
            file.write_all(&buf).unwrap();
            file.sync_all().unwrap();
        }

        let journal = open(&path);
        assert_eq!(journal.recover().unwrap(), vec![second]);
    }

    #[test]
    fn torn_tail_is_cut_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.journal");
        let journal = open(&path);
        let first = admitted("a1");
        journal.append(&first).unwrap();
        journal.append(&admitted("a2")).unwrap();
        let total_len = journal.offset().unwrap();
        drop(journal);

        {
            let file = OpenOptions::new().write(true).open(&path).unwrap();
            file.set_len(total_len - 4).unwrap();
        }

        let journal = open(&path);
        let after = admitted("a3");
        journal.append(&after).unwrap();
        assert_eq!(journal.recover().unwrap(), vec![first, after]);
    }

    #[test]
    fn failed_rollback_refuses_later_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stuck.journal");
        let journal = open(&path);
        let first = admitted("a1");
        journal.append(&first).unwrap();
        let end = journal.offset().unwrap();

        // A read-only handle fails both the write and the cut back.
        journal.lock().unwrap().file = File::open(&path).unwrap();
        assert!(matches!(journal.append(&admitted("a2")), Err(QueueError::Io(_))));

        journal.lock().unwrap().file = OpenOptions::new().append(true).open(&path).unwrap();
        assert!(matches!(
            journal.append(&admitted("a3")),
            Err(QueueError::JournalPoisoned { offset }) if offset == end
        ));
        assert_eq!(journal.offset().unwrap(), end);
        assert_eq!(journal.recover().unwrap(), vec![first]);
    }

    #[test]
    fn append_returns_increasing_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let config = JournalConfig {
            sync_mode: SyncMode::OsDefault,
        };
        let journal = JobJournal::open(&dir.path().join("offsets.journal"), config).unwrap();

        let off1 = journal.append(&admitted("a1")).unwrap();
        let off2 = journal.append(&admitted("a2")).unwrap();
        assert_eq!(off1, 0);
        assert!(off2 > off1);
        assert_eq!(journal.recover().unwrap().len(), 2);
    }
}
