//! Resolving the commits between a passing start and a failing end.

use culprit_core::{BisectError, CommitId, CommitSequence};
use std::path::PathBuf;
use tokio::process::Command;

/// Produces the commits to search for a `(start, end]` range.
#[async_trait::async_trait]
pub trait RangeResolver: Send + Sync {
    async fn resolve(&self, start: &CommitId, end: &CommitId)
        -> Result<CommitSequence, BisectError>;
}

/// Resolves ranges with `git log --pretty=oneline <start>..<end>`.
///
/// Commits come back in git's listing order, so `<end>` sits at index 0 and
/// the oldest commit after `<start>` sits last.
pub struct GitRangeResolver {
    pub git_bin: PathBuf,
    pub src: PathBuf,
}

impl GitRangeResolver {
    pub fn new(src: impl Into<PathBuf>) -> Self {
        Self {
            git_bin: PathBuf::from("git"),
            src: src.into(),
        }
    }
}

#[async_trait::async_trait]
impl RangeResolver for GitRangeResolver {
    async fn resolve(
        &self,
        start: &CommitId,
        end: &CommitId,
    ) -> Result<CommitSequence, BisectError> {
        let range = format!("{start}..{end}");
        let output = Command::new(&self.git_bin)
            .arg("-C")
            .arg(&self.src)
            .args(["log", "--pretty=oneline", &range])
            .output()
            .await
            .map_err(|e| BisectError::RangeResolution(format!("git not available: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BisectError::RangeResolution(format!(
                "git log {range} failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let sequence = parse_oneline(&stdout)?;
        tracing::info!(range = %range, commits = sequence.len(), "resolved commit range");
        Ok(sequence)
    }
}

/// Parse `<commit-id> <description>` lines, keeping only the leading token.
///
/// Blank output is an empty sequence. Output where no line yields a commit
/// token is an error.
pub fn parse_oneline(text: &str) -> Result<CommitSequence, BisectError> {
    let mut commits = Vec::new();
    let mut rejected = 0usize;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match line.split(' ').next() {
            Some(token) if is_commit_token(token) => commits.push(CommitId::from(token)),
            _ => {
                rejected += 1;
                tracing::warn!(line, "skipping unparseable history line");
            }
        }
    }

    if commits.is_empty() && rejected > 0 {
        return Err(BisectError::RangeResolution(format!(
            "none of {rejected} history line(s) start with a commit id"
        )));
    }
    Ok(CommitSequence::new(commits))
}

fn is_commit_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Fixed sequence, for tests and dry runs.
pub struct StaticRangeResolver {
    result: Result<Vec<CommitId>, String>,
}

impl StaticRangeResolver {
    pub fn new<I, S>(commits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CommitId>,
    {
        Self {
            result: Ok(commits.into_iter().map(Into::into).collect()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
        }
    }
}

#[async_trait::async_trait]
impl RangeResolver for StaticRangeResolver {
    async fn resolve(
        &self,
        _start: &CommitId,
        _end: &CommitId,
    ) -> Result<CommitSequence, BisectError> {
        match &self.result {
            Ok(commits) => Ok(CommitSequence::new(commits.clone())),
            Err(message) => Err(BisectError::RangeResolution(message.clone())),
        }
    }
}
