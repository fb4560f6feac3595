//! Benchmark result files and the classified outcome of one probe.
//!
//! A result file is JSON of the shape
//! `{"benchmark_result": {"metrics": [{"name": .., "value": ..}, ..]}}`.
//! Metrics are searched linearly and the first entry with a matching name
//! wins, even when a later entry carries the same name.

use crate::acceptance::AcceptanceBand;
use crate::types::CandidateStatus;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One `{name, value}` pair reported by a benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: serde_json::json!(value),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResultFile {
    #[serde(default)]
    benchmark_result: BenchmarkResult,
}

#[derive(Debug, Default, Deserialize)]
struct BenchmarkResult {
    #[serde(default)]
    metrics: Vec<MetricSample>,
}

/// Parse the metrics out of a result document.
pub fn parse_result(json: &str) -> Result<Vec<MetricSample>> {
    let file: ResultFile = serde_json::from_str(json).context("invalid result JSON")?;
    Ok(file.benchmark_result.metrics)
}

/// Read and parse a result file from disk.
pub fn read_result_file(path: &Path) -> Result<Vec<MetricSample>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading result file {}", path.display()))?;
    parse_result(&content).with_context(|| format!("parsing result file {}", path.display()))
}

/// Value of the first metric named `name`. A zero is a real value; a
/// non-numeric value counts as missing.
pub fn find_metric(metrics: &[MetricSample], name: &str) -> Option<f64> {
    metrics
        .iter()
        .find(|m| m.name == name)
        .and_then(|m| m.value.as_f64())
}

/// What a candidate evaluator hands back: every reported metric plus where
/// the raw output of the evaluation lives.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBundle {
    pub metrics: Vec<MetricSample>,
    pub location: String,
}

impl ResultBundle {
    pub fn metric(&self, name: &str) -> Option<f64> {
        find_metric(&self.metrics, name)
    }
}

/// Classified outcome of one probe. Persisted into the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub metric_name: String,
    pub metric_value: Option<f64>,
    /// `None` when the metric was missing from the output.
    pub passed: Option<bool>,
    pub artifact_location: String,
}

impl EvaluationResult {
    pub fn from_bundle(bundle: &ResultBundle, metric: &str, band: &AcceptanceBand) -> Self {
        let metric_value = bundle.metric(metric);
        Self {
            metric_name: metric.to_string(),
            metric_value,
            passed: band.classify(metric_value),
            artifact_location: bundle.location.clone(),
        }
    }

    pub fn status(&self) -> CandidateStatus {
        match self.passed {
            Some(true) => CandidateStatus::Pass,
            Some(false) => CandidateStatus::Fail,
            None => CandidateStatus::Inconclusive,
        }
    }
}
