pub mod config;
pub mod controller;
pub mod evaluator;
pub mod event_log;
pub mod range;
pub mod shell;

pub use config::{load_config, parse_config, BisectConfig, BuildEnv, InconclusivePolicy, PipelineSpec};
pub use controller::{BisectOptions, BisectOutcome, Bisector, ControllerState, Probe, SearchInterval};
pub use evaluator::pipeline::PipelineEvaluator;
pub use evaluator::{CandidateEvaluator, MockEvaluator, MockOutcome};
pub use range::{parse_oneline, GitRangeResolver, RangeResolver, StaticRangeResolver};
