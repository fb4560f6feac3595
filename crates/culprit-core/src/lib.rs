pub mod acceptance;
pub mod error;
pub mod result;
pub mod types;

pub use acceptance::{classify, AcceptanceBand};
pub use error::BisectError;
pub use result::{
    find_metric, parse_result, read_result_file, EvaluationResult, MetricSample, ResultBundle,
};
pub use types::{CandidateStatus, CommitId, CommitSequence};
