pub mod pipeline;

use anyhow::Result;
use culprit_core::{CommitId, MetricSample, ResultBundle};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Builds, installs, and benchmarks one candidate commit.
///
/// Implementations replace whatever artifact was installed before, must be
/// safe to re-run for the same commit, and are expected to take minutes.
/// Implemented by [`pipeline::PipelineEvaluator`] (shell steps) and
/// [`MockEvaluator`] (tests).
#[async_trait::async_trait]
pub trait CandidateEvaluator: Send + Sync {
    /// Evaluate `commit`, keeping raw output under `output_dir`.
    async fn evaluate(&self, commit: &CommitId, output_dir: &Path) -> Result<ResultBundle>;
}

/// One scripted evaluation outcome.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Metrics(Vec<MetricSample>),
    Failure(String),
}

/// Mock evaluator for testing. Pops scripted outcomes per commit on each
/// call; with nothing scripted (or exhausted) it reports no metrics.
pub struct MockEvaluator {
    results: Mutex<HashMap<CommitId, Vec<MockOutcome>>>,
    calls: Mutex<Vec<CommitId>>,
}

impl Default for MockEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEvaluator {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_results(&self, commit: &str, results: Vec<MockOutcome>) {
        if let Ok(mut map) = self.results.lock() {
            map.insert(CommitId::from(commit), results);
        }
    }

    /// Script a single evaluation reporting `name = value`.
    pub fn set_metric(&self, commit: &str, name: &str, value: f64) {
        self.set_results(
            commit,
            vec![MockOutcome::Metrics(vec![MetricSample::new(name, value)])],
        );
    }

    /// Commits evaluated so far, in call order.
    pub fn calls(&self) -> Vec<CommitId> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl CandidateEvaluator for MockEvaluator {
    async fn evaluate(&self, commit: &CommitId, output_dir: &Path) -> Result<ResultBundle> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(commit.clone());
        }

        let next = match self.results.lock() {
            Ok(mut map) => map
                .get_mut(commit)
                .filter(|v| !v.is_empty())
                .map(|v| v.remove(0)),
            Err(_) => None,
        };

        match next {
            Some(MockOutcome::Failure(message)) => anyhow::bail!(message),
            Some(MockOutcome::Metrics(metrics)) => Ok(ResultBundle {
                metrics,
                location: output_dir.display().to_string(),
            }),
            None => Ok(ResultBundle {
                metrics: Vec::new(),
                location: output_dir.display().to_string(),
            }),
        }
    }
}
