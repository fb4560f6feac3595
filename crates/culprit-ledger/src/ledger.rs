//! Durable progress ledger for one bisection run.
//!
//! The ledger lives in a single JSON document,
//! `{"test_hashes": {<commit>: {"status": .., "metric": .., ..}}}`, rewritten
//! wholesale (atomically) on every update. Commits keep the position they
//! were first recorded at; later writes replace the entry in place.

use crate::store::write_atomic;
use culprit_core::{BisectError, CandidateStatus, CommitId, EvaluationResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Latest known state of one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub status: CandidateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
}

impl LedgerEntry {
    pub fn new(status: CandidateStatus, result: Option<&EvaluationResult>) -> Self {
        match result {
            Some(r) => Self {
                status,
                metric: Some(r.metric_name.clone()),
                metric_value: r.metric_value,
                log_path: Some(r.artifact_location.clone()),
            },
            None => Self {
                status,
                metric: None,
                metric_value: None,
                log_path: None,
            },
        }
    }
}

/// Commit → entry, in first-recorded order. Re-inserting a commit replaces
/// its entry in place.
pub type TestHashes = IndexMap<CommitId, LedgerEntry>;

/// The on-disk document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerDoc {
    #[serde(default)]
    pub test_hashes: TestHashes,
}

impl LedgerDoc {
    /// Per-status tallies in [`CandidateStatus::ALL`] order, zero counts omitted.
    pub fn counts(&self) -> Vec<(CandidateStatus, usize)> {
        CandidateStatus::ALL
            .iter()
            .map(|s| {
                (
                    *s,
                    self.test_hashes.iter().filter(|(_, e)| e.status == *s).count(),
                )
            })
            .filter(|(_, n)| *n > 0)
            .collect()
    }
}

// ── ProgressLedger ──

/// File-backed ledger. One writer per file: `record` is a whole-file
/// read-modify-write with no merge protocol beyond reloading first.
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    doc: LedgerDoc,
}

impl ProgressLedger {
    /// Empty in-memory ledger bound to `path`. No I/O.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: LedgerDoc::default(),
        }
    }

    /// Bind to `path` and load whatever is already stored there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut ledger = Self::new(path);
        ledger.load();
        ledger
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a ledger file strictly. `Ok(None)` if it does not exist.
    pub fn read(path: &Path) -> anyhow::Result<Option<LedgerDoc>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let doc: LedgerDoc = serde_json::from_str(&content)?;
        Ok(Some(doc))
    }

    /// Refresh from durable storage. A missing file is a no-op; an unreadable
    /// or unparseable file is logged and leaves the in-memory ledger as it was.
    pub fn load(&mut self) {
        match Self::read(&self.path) {
            Ok(Some(doc)) => self.doc = doc,
            Ok(None) => {}
            Err(e) => {
                let err = BisectError::LedgerIo {
                    path: self.path.clone(),
                    message: e.to_string(),
                };
                tracing::warn!(error = %err, "keeping in-memory progress");
            }
        }
    }

    /// Upsert `commit` and rewrite the whole ledger. Reloads first so state
    /// written by an earlier process is carried forward.
    pub fn record(
        &mut self,
        commit: &CommitId,
        status: CandidateStatus,
        result: Option<&EvaluationResult>,
    ) -> Result<(), BisectError> {
        self.load();
        self.doc
            .test_hashes
            .insert(commit.clone(), LedgerEntry::new(status, result));
        self.flush()
    }

    fn flush(&self) -> Result<(), BisectError> {
        let io_err = |message: String| BisectError::LedgerIo {
            path: self.path.clone(),
            message,
        };
        let data = serde_json::to_string_pretty(&self.doc).map_err(|e| io_err(e.to_string()))?;
        write_atomic(&self.path, data.as_bytes()).map_err(|e| io_err(e.to_string()))?;
        tracing::debug!(path = %self.path.display(), entries = self.doc.test_hashes.len(), "ledger written");
        Ok(())
    }

    pub fn get(&self, commit: &CommitId) -> Option<&LedgerEntry> {
        self.doc.test_hashes.get(commit)
    }

    pub fn status_of(&self, commit: &CommitId) -> Option<CandidateStatus> {
        self.get(commit).map(|e| e.status)
    }

    pub fn doc(&self) -> &LedgerDoc {
        &self.doc
    }

    pub fn len(&self) -> usize {
        self.doc.test_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.test_hashes.is_empty()
    }

    /// Human-readable full report.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.doc).unwrap_or_else(|_| "{}".into())
    }
}
