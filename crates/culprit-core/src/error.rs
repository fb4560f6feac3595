use crate::types::{CandidateStatus, CommitId};
use std::path::PathBuf;

/// Failures a bisection run can surface.
///
/// A missing metric is not an error by itself: it is an inconclusive
/// classification, and only becomes [`BisectError::Inconclusive`] when the
/// run is configured to abort on it.
#[derive(Debug, thiserror::Error)]
pub enum BisectError {
    #[error("cannot resolve commit range: {0}")]
    RangeResolution(String),

    #[error("ledger I/O failed for {}: {message}", path.display())]
    LedgerIo { path: PathBuf, message: String },

    #[error("evaluating {commit} failed after {attempts} attempt(s): {message}")]
    Evaluator {
        commit: CommitId,
        attempts: u32,
        message: String,
    },

    #[error("endpoint {commit} was assumed {expected} but evaluated as {observed}")]
    EndpointAssumption {
        commit: CommitId,
        expected: CandidateStatus,
        observed: CandidateStatus,
    },

    #[error("metric \"{metric}\" not found for {commit}")]
    Inconclusive { commit: CommitId, metric: String },

    #[error("bisection interrupted before convergence")]
    Cancelled,
}
