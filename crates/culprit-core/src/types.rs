use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque revision token. Commits are ordered only by their position in a
/// [`CommitSequence`], never by comparing the tokens themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `n` characters, for compact display and directory names.
    pub fn short(&self, n: usize) -> &str {
        match self.0.char_indices().nth(n) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CommitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The commits a bisection searches over.
///
/// Index 0 is assumed to fail and the last index is assumed to pass when the
/// controller starts; nothing here verifies either assumption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSequence {
    commits: Vec<CommitId>,
}

impl CommitSequence {
    pub fn new(commits: Vec<CommitId>) -> Self {
        Self { commits }
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CommitId> {
        self.commits.get(index)
    }

    pub fn first(&self) -> Option<&CommitId> {
        self.commits.first()
    }

    pub fn last(&self) -> Option<&CommitId> {
        self.commits.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommitId> {
        self.commits.iter()
    }

    pub fn position(&self, commit: &CommitId) -> Option<usize> {
        self.commits.iter().position(|c| c == commit)
    }

    pub fn as_slice(&self) -> &[CommitId] {
        &self.commits
    }
}

impl FromIterator<CommitId> for CommitSequence {
    fn from_iter<I: IntoIterator<Item = CommitId>>(iter: I) -> Self {
        Self {
            commits: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a CommitSequence {
    type Item = &'a CommitId;
    type IntoIter = std::slice::Iter<'a, CommitId>;

    fn into_iter(self) -> Self::IntoIter {
        self.commits.iter()
    }
}

// ── Candidate status ──

/// Latest known status of one commit. Later writes replace earlier ones.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CandidateStatus {
    #[serde(rename = "not tested")]
    NotTested,
    #[serde(rename = "Assume FAILED")]
    AssumeFailed,
    #[serde(rename = "Assume PASS")]
    AssumePass,
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
    /// The configured metric was missing from the evaluation output.
    #[serde(rename = "INCONCLUSIVE")]
    Inconclusive,
    /// The evaluator itself failed (build, install, or benchmark step).
    #[serde(rename = "ERROR")]
    Error,
}

impl CandidateStatus {
    pub const ALL: [CandidateStatus; 7] = [
        CandidateStatus::NotTested,
        CandidateStatus::AssumeFailed,
        CandidateStatus::AssumePass,
        CandidateStatus::Pass,
        CandidateStatus::Fail,
        CandidateStatus::Inconclusive,
        CandidateStatus::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CandidateStatus::NotTested => "not tested",
            CandidateStatus::AssumeFailed => "Assume FAILED",
            CandidateStatus::AssumePass => "Assume PASS",
            CandidateStatus::Pass => "PASS",
            CandidateStatus::Fail => "FAIL",
            CandidateStatus::Inconclusive => "INCONCLUSIVE",
            CandidateStatus::Error => "ERROR",
        }
    }

    /// True once an evaluation has actually been attempted for the commit.
    pub fn is_evaluated(self) -> bool {
        matches!(
            self,
            CandidateStatus::Pass
                | CandidateStatus::Fail
                | CandidateStatus::Inconclusive
                | CandidateStatus::Error
        )
    }
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_to_ledger_strings() {
        for status in CandidateStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            let back: CandidateStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
    }

    #[test]
    fn assumptions_are_not_evaluations() {
        assert!(!CandidateStatus::NotTested.is_evaluated());
        assert!(!CandidateStatus::AssumeFailed.is_evaluated());
        assert!(!CandidateStatus::AssumePass.is_evaluated());
        assert!(CandidateStatus::Inconclusive.is_evaluated());
    }

    #[test]
    fn short_truncates_on_char_boundary() {
        let c = CommitId::new("0123456789abcdef");
        assert_eq!(c.short(7), "0123456");
        assert_eq!(CommitId::new("abc").short(7), "abc");
    }

    #[test]
    fn sequence_position_is_the_only_order() {
        let seq: CommitSequence = ["ffff", "0000", "aaaa"]
            .into_iter()
            .map(CommitId::from)
            .collect();
        assert_eq!(seq.position(&CommitId::from("0000")), Some(1));
        assert_eq!(seq.first().map(CommitId::as_str), Some("ffff"));
        assert_eq!(seq.last().map(CommitId::as_str), Some("aaaa"));
        assert_eq!(seq.len(), 3);
    }
}
