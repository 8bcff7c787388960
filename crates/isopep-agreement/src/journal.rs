//! # Write-Ahead Journal
//!
//! Every mutating operation is bracketed by journal records:
//!
//! 1. `Intent` is appended before anything is applied.
//! 2. The operation runs against clones of the aggregate and token ledger.
//! 3. On success a `Commit` carrying the post-state snapshot and the stamped
//!    events is appended and synced; only then is the clone installed.
//!    On failure an `Abort` is appended and the clone dropped.
//!
//! Replay rebuilds state from `Commit` snapshots alone. An intent with no
//! matching commit or abort is a transition interrupted by a crash; it is
//! discarded, so escrow is never credited or paid out twice.
//!
//! Event acknowledgements are journaled as `Ack` so consumer cursors
//! survive restarts.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use isopep_core::{AgreementId, PartyId, Timestamp};

use crate::agreement::Agreement;
use crate::command::Command;
use crate::event::{AgreementEvent, EventLog};
use crate::funding::TokenLedger;
use crate::repository::Repository;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt journal at record {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("journal unavailable: {0}")]
    Unavailable(String),
}

/// One line of the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum JournalRecord {
    Intent {
        txn: u64,
        agreement_id: Option<AgreementId>,
        caller: PartyId,
        command: Command,
        at: Timestamp,
    },
    Commit {
        txn: u64,
        /// Post-state of the agreement the command touched, if any.
        agreement: Option<Box<Agreement>>,
        tokens: TokenLedger,
        events: Vec<AgreementEvent>,
    },
    Abort {
        txn: u64,
        /// Machine-readable error kind.
        kind: String,
    },
    Ack {
        consumer: String,
        seq: u64,
    },
}

impl JournalRecord {
    pub fn txn(&self) -> Option<u64> {
        match self {
            Self::Intent { txn, .. } | Self::Commit { txn, .. } | Self::Abort { txn, .. } => {
                Some(*txn)
            }
            Self::Ack { .. } => None,
        }
    }
}

/// Durable append-only record store.
pub trait Journal: Send {
    fn append(&mut self, record: &JournalRecord) -> Result<(), JournalError>;

    /// Every readable record, oldest first.
    fn records(&self) -> Result<Vec<JournalRecord>, JournalError>;
}

// ─── In-memory backend ───────────────────────────────────────────────

/// Journal kept in memory. Clones share the same records, so a test can
/// hold one handle while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    records: Arc<Mutex<Vec<JournalRecord>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<JournalRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Journal for MemoryJournal {
    fn append(&mut self, record: &JournalRecord) -> Result<(), JournalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(JournalError::Unavailable("memory journal set to fail".into()));
        }
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<JournalRecord>, JournalError> {
        Ok(self.snapshot())
    }
}

// ─── File backend ────────────────────────────────────────────────────

/// JSON-lines journal. Commits and acks are synced to disk before
/// `append` returns.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: File,
}

impl FileJournal {
    /// Open or create the journal at `path`. A torn final line left by a
    /// crash is cut off so new records start on a fresh line.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        truncate_torn_tail(&mut file, &path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Journal for FileJournal {
    fn append(&mut self, record: &JournalRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        if matches!(record, JournalRecord::Commit { .. } | JournalRecord::Ack { .. }) {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn records(&self) -> Result<Vec<JournalRecord>, JournalError> {
        let file = File::open(&self.path)?;
        let lines: Vec<String> = BufReader::new(file).lines().collect::<Result<_, _>>()?;
        let last = lines.len();
        let mut out = Vec::with_capacity(last);
        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => out.push(record),
                // A crash mid-append can leave one torn line at the tail.
                Err(e) if idx + 1 == last => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = idx + 1,
                        error = %e,
                        "ignoring torn journal tail"
                    );
                }
                Err(e) => {
                    return Err(JournalError::Corrupt {
                        line: idx + 1,
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(out)
    }
}

fn truncate_torn_tail(file: &mut File, path: &Path) -> Result<(), JournalError> {
    let mut contents = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut contents)?;
    if contents.is_empty() || contents.ends_with(b"\n") {
        return Ok(());
    }
    let keep = contents
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = contents.len() - keep,
        "truncating torn journal tail"
    );
    file.set_len(keep as u64)?;
    file.sync_data()?;
    Ok(())
}

// ─── Replay ──────────────────────────────────────────────────────────

/// What replay found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub committed: usize,
    pub aborted: usize,
    /// Intents with neither commit nor abort.
    pub discarded: usize,
    pub acks: usize,
}

/// State rebuilt from a journal.
#[derive(Debug, Clone, Default)]
pub struct Recovered {
    pub repository: Repository,
    pub tokens: TokenLedger,
    pub events: EventLog,
    pub next_txn: u64,
    pub report: ReplayReport,
}

/// Rebuild state from journal records.
pub fn replay(records: impl IntoIterator<Item = JournalRecord>) -> Result<Recovered, JournalError> {
    let mut recovered = Recovered {
        next_txn: 1,
        ..Recovered::default()
    };
    let mut open: BTreeSet<u64> = BTreeSet::new();

    for (idx, record) in records.into_iter().enumerate() {
        if let Some(txn) = record.txn() {
            recovered.next_txn = recovered.next_txn.max(txn.saturating_add(1));
        }
        match record {
            JournalRecord::Intent { txn, .. } => {
                open.insert(txn);
            }
            JournalRecord::Commit {
                txn,
                agreement,
                tokens,
                events,
            } => {
                open.remove(&txn);
                if let Some(agreement) = agreement {
                    recovered.repository.install(*agreement);
                }
                recovered.tokens = tokens;
                recovered
                    .events
                    .append(events)
                    .map_err(|e| JournalError::Corrupt {
                        line: idx + 1,
                        reason: e.to_string(),
                    })?;
                recovered.report.committed += 1;
            }
            JournalRecord::Abort { txn, .. } => {
                open.remove(&txn);
                recovered.report.aborted += 1;
            }
            JournalRecord::Ack { consumer, seq } => {
                recovered
                    .events
                    .ack(&consumer, seq)
                    .map_err(|e| JournalError::Corrupt {
                        line: idx + 1,
                        reason: e.to_string(),
                    })?;
                recovered.report.acks += 1;
            }
        }
    }

    recovered.report.discarded = open.len();
    for txn in &open {
        tracing::warn!(txn = *txn, "discarding uncommitted intent");
    }
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agreement::Terms;
    use crate::event::EventDetail;
    use crate::roles::Deployment;
    use isopep_core::Amount;

    fn party(s: &str) -> PartyId {
        PartyId::new(s).unwrap()
    }

    fn at() -> Timestamp {
        Timestamp::from_epoch_secs(1_767_225_600).unwrap()
    }

    fn intent(txn: u64) -> JournalRecord {
        JournalRecord::Intent {
            txn,
            agreement_id: None,
            caller: party("buyer"),
            command: Command::Mint {
                to: party("buyer"),
                amount: Amount::from(10),
            },
            at: at(),
        }
    }

    fn commit_with_agreement(txn: u64) -> (JournalRecord, Agreement) {
        let roles = Deployment {
            buyer: party("buyer"),
            oracle: party("oracle"),
            arbitrator: party("arbitrator"),
        }
        .role_table();
        let terms = Terms::new(100, Amount::from(2), at(), "Qm1").unwrap();
        let (a, detail) =
            Agreement::create(AgreementId::new(), roles, &party("buyer"), terms, at()).unwrap();
        let events = EventLog::new().stamp(a.id(), at(), vec![detail]);
        let record = JournalRecord::Commit {
            txn,
            agreement: Some(Box::new(a.clone())),
            tokens: TokenLedger::new(),
            events,
        };
        (record, a)
    }

    #[test]
    fn replay_installs_commits_and_discards_open_intents() {
        let (commit, a) = commit_with_agreement(1);
        let records = vec![
            intent(1),
            commit,
            intent(2),
            JournalRecord::Abort {
                txn: 2,
                kind: "UNAUTHORIZED".into(),
            },
            intent(3),
        ];
        let r = replay(records).unwrap();
        assert_eq!(
            r.report,
            ReplayReport {
                committed: 1,
                aborted: 1,
                discarded: 1,
                acks: 0
            }
        );
        assert_eq!(r.repository.current().unwrap(), &a);
        assert_eq!(r.events.len(), 1);
        assert_eq!(r.next_txn, 4);
    }

    #[test]
    fn replay_restores_cursors() {
        let (commit, _) = commit_with_agreement(1);
        let records = vec![
            intent(1),
            commit,
            JournalRecord::Ack {
                consumer: "erp".into(),
                seq: 1,
            },
        ];
        let r = replay(records).unwrap();
        assert_eq!(r.events.cursor("erp"), 1);
        assert!(r.events.pending("erp", 10).is_empty());
    }

    #[test]
    fn ack_beyond_events_is_corrupt() {
        let records = vec![JournalRecord::Ack {
            consumer: "erp".into(),
            seq: 7,
        }];
        assert!(matches!(replay(records), Err(JournalError::Corrupt { .. })));
    }

    #[test]
    fn memory_journal_shares_records_and_fails_on_demand() {
        let handle = MemoryJournal::new();
        let mut journal = handle.clone();
        journal.append(&intent(1)).unwrap();
        assert_eq!(handle.len(), 1);
        handle.set_failing(true);
        assert!(journal.append(&intent(2)).is_err());
        assert_eq!(handle.len(), 1);
    }

    #[test]
    fn file_journal_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.jsonl");
        let (commit, a) = commit_with_agreement(1);
        {
            let mut j = FileJournal::open(&path).unwrap();
            j.append(&intent(1)).unwrap();
            j.append(&commit).unwrap();
        }
        let j = FileJournal::open(&path).unwrap();
        let records = j.records().unwrap();
        assert_eq!(records.len(), 2);
        let r = replay(records).unwrap();
        assert_eq!(r.repository.current().unwrap(), &a);
        match &r.events.all()[0].detail {
            EventDetail::AgreementCreated { document_ref, .. } => assert_eq!(document_ref, "Qm1"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn torn_tail_is_cut_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        {
            let mut j = FileJournal::open(&path).unwrap();
            j.append(&intent(1)).unwrap();
        }
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"record\":\"commit\",\"tx");
        std::fs::write(&path, &raw).unwrap();

        let mut j = FileJournal::open(&path).unwrap();
        j.append(&intent(2)).unwrap();
        let txns: Vec<_> = j.records().unwrap().iter().filter_map(|r| r.txn()).collect();
        assert_eq!(txns, vec![1, 2]);
    }

    #[test]
    fn garbage_before_the_tail_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let raw = format!(
            "{}\nnot json\n{}\n",
            serde_json::to_string(&intent(1)).unwrap(),
            serde_json::to_string(&intent(2)).unwrap()
        );
        std::fs::write(&path, raw).unwrap();
        let j = FileJournal::open(&path).unwrap();
        assert!(matches!(j.records(), Err(JournalError::Corrupt { line: 2, .. })));
    }
}
