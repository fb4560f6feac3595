//! The bisection controller.
//!
//! `Init → Seeding → Probing → Converged`. The commit range is resolved once,
//! every commit is seeded into the ledger, and then the search repeatedly
//! probes the midpoint of `(low, high)` until the probe lands on a boundary.
//! `low` always points at the most recent known-failing index and `high` at
//! the most recent known-passing one; the culprit is `low` at convergence.

use crate::config::{BisectConfig, InconclusivePolicy};
use crate::evaluator::CandidateEvaluator;
use crate::event_log::{Event, EventLogger};
use crate::range::RangeResolver;
use culprit_core::{
    AcceptanceBand, BisectError, CandidateStatus, CommitId, CommitSequence, EvaluationResult,
};
use culprit_ledger::{ProgressLedger, RunPaths};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Knobs for one run, usually derived from a [`BisectConfig`].
#[derive(Debug, Clone)]
pub struct BisectOptions {
    pub metric: String,
    pub band: AcceptanceBand,
    pub inconclusive: InconclusivePolicy,
    pub max_attempts: u32,
    pub verify_endpoints: bool,
    /// Keep evaluated entries of an existing ledger and continue from them.
    pub resume: bool,
}

impl BisectOptions {
    pub fn new(metric: impl Into<String>, band: AcceptanceBand) -> Self {
        Self {
            metric: metric.into(),
            band,
            inconclusive: InconclusivePolicy::default(),
            max_attempts: 1,
            verify_endpoints: false,
            resume: false,
        }
    }

    pub fn from_config(config: &BisectConfig) -> Self {
        Self {
            metric: config.metric.clone(),
            band: config.band(),
            inconclusive: config.inconclusive,
            max_attempts: config.max_attempts,
            verify_endpoints: config.verify_endpoints,
            resume: false,
        }
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    fn counts_as_failing(&self, status: CandidateStatus) -> bool {
        match status {
            CandidateStatus::Fail | CandidateStatus::AssumeFailed => true,
            CandidateStatus::Inconclusive => self.inconclusive == InconclusivePolicy::Fail,
            _ => false,
        }
    }

    fn counts_as_passing(&self, status: CandidateStatus) -> bool {
        match status {
            CandidateStatus::Pass | CandidateStatus::AssumePass => true,
            CandidateStatus::Inconclusive => self.inconclusive == InconclusivePolicy::Pass,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Init,
    Seeding,
    Probing,
    Converged,
}

// ── Search interval ──

/// Binary-search window over a [`CommitSequence`].
///
/// `low < probe < high` holds until the interval converges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchInterval {
    pub low: usize,
    pub high: usize,
    pub probe: usize,
}

impl SearchInterval {
    /// `low` is known (or assumed) failing, `high` passing.
    pub fn new(low: usize, high: usize) -> Self {
        Self {
            low,
            high,
            probe: low + high.saturating_sub(low) / 2,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.probe == self.low || self.probe == self.high
    }

    /// The probe passed: bisect toward `low`.
    pub fn narrow_pass(&mut self) {
        self.high = self.probe;
        self.probe = self.low + (self.probe - self.low) / 2;
    }

    /// The probe failed: bisect toward `high`.
    pub fn narrow_fail(&mut self) {
        self.low = self.probe;
        self.probe = self.high - (self.high - self.probe) / 2;
    }
}

// ── Outcome ──

/// One evaluated candidate.
#[derive(Debug, Clone)]
pub struct Probe {
    pub index: usize,
    pub commit: CommitId,
    pub status: CandidateStatus,
    pub result: EvaluationResult,
}

#[derive(Debug, Clone)]
pub struct BisectOutcome {
    pub culprit: CommitId,
    pub culprit_index: usize,
    pub sequence: CommitSequence,
    /// Every evaluation that reached a result, endpoint checks included.
    pub probes: Vec<Probe>,
}

impl BisectOutcome {
    pub fn evaluations(&self) -> usize {
        self.probes.len()
    }
}

// ── Controller ──

pub struct Bisector<'a> {
    options: BisectOptions,
    resolver: &'a dyn RangeResolver,
    evaluator: &'a dyn CandidateEvaluator,
    paths: RunPaths,
    ledger: ProgressLedger,
    events: EventLogger,
    cancel: CancellationToken,
    state: ControllerState,
}

impl<'a> Bisector<'a> {
    /// Ledger and event log live in `paths.run_dir`; any existing ledger
    /// there is loaded.
    pub fn new(
        options: BisectOptions,
        resolver: &'a dyn RangeResolver,
        evaluator: &'a dyn CandidateEvaluator,
        paths: RunPaths,
    ) -> Self {
        Self {
            ledger: ProgressLedger::open(&paths.tracker_json),
            events: EventLogger::new(&paths.events_jsonl),
            options,
            resolver,
            evaluator,
            paths,
            cancel: CancellationToken::new(),
            state: ControllerState::Init,
        }
    }

    /// Checked between probes; an evaluation in flight always finishes.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    /// Find the first commit in `(start, end]` that violates the band.
    pub async fn run(
        &mut self,
        start: &CommitId,
        end: &CommitId,
    ) -> Result<BisectOutcome, BisectError> {
        self.state = ControllerState::Init;
        let sequence = self.resolver.resolve(start, end).await?;
        if sequence.is_empty() {
            let reason = format!("no commits between {start} and {end}");
            self.events.record(Event::Aborted {
                reason: reason.clone(),
            });
            return Err(BisectError::RangeResolution(reason));
        }
        let last = sequence.len() - 1;
        tracing::info!(
            candidates = sequence.len(),
            metric = %self.options.metric,
            band = %self.options.band,
            resume = self.options.resume,
            "starting bisection"
        );
        self.events.record(Event::BisectStart {
            start: start.to_string(),
            end: end.to_string(),
            candidates: sequence.len(),
            resumed: self.options.resume,
        });

        self.state = ControllerState::Seeding;
        self.seed(&sequence)?;

        let mut probes = Vec::new();
        if self.options.verify_endpoints && last > 0 {
            self.verify_endpoints(&sequence, &mut probes).await?;
        }

        self.state = ControllerState::Probing;
        let mut interval = if self.options.resume {
            self.resume_interval(&sequence)
        } else {
            SearchInterval::new(0, last)
        };

        while !interval.is_converged() {
            if self.cancel.is_cancelled() {
                self.events.record(Event::Aborted {
                    reason: "cancelled".into(),
                });
                return Err(BisectError::Cancelled);
            }

            let index = interval.probe;
            let commit = &sequence.as_slice()[index];
            let probe = self.probe(index, commit).await?;

            let passed = match probe.result.passed {
                Some(passed) => passed,
                None => match self.options.inconclusive {
                    InconclusivePolicy::Fail => false,
                    InconclusivePolicy::Pass => true,
                    InconclusivePolicy::Abort => {
                        self.events.record(Event::Aborted {
                            reason: format!("metric missing for {commit}"),
                        });
                        return Err(BisectError::Inconclusive {
                            commit: commit.clone(),
                            metric: self.options.metric.clone(),
                        });
                    }
                },
            };
            if passed {
                interval.narrow_pass();
            } else {
                interval.narrow_fail();
            }
            tracing::debug!(
                low = interval.low,
                high = interval.high,
                next = interval.probe,
                "interval narrowed"
            );
            probes.push(probe);
        }

        self.state = ControllerState::Converged;
        let culprit = sequence.as_slice()[interval.low].clone();
        tracing::info!(
            index = interval.low,
            commit = %culprit,
            evaluations = probes.len(),
            "culprit found"
        );
        self.events.record(Event::Converged {
            index: interval.low,
            commit: culprit.to_string(),
            evaluations: probes.len(),
        });

        Ok(BisectOutcome {
            culprit,
            culprit_index: interval.low,
            sequence,
            probes,
        })
    }

    /// Mark every commit untested, then record the endpoint assumptions.
    /// When resuming, evaluated entries are left alone.
    fn seed(&mut self, sequence: &CommitSequence) -> Result<(), BisectError> {
        for commit in sequence {
            if self.options.resume && self.ledger.get(commit).is_some() {
                continue;
            }
            self.ledger.record(commit, CandidateStatus::NotTested, None)?;
        }

        let first = &sequence.as_slice()[0];
        self.assume(first, CandidateStatus::AssumeFailed)?;
        if sequence.len() > 1 {
            let last = &sequence.as_slice()[sequence.len() - 1];
            self.assume(last, CandidateStatus::AssumePass)?;
        }
        Ok(())
    }

    fn assume(&mut self, commit: &CommitId, status: CandidateStatus) -> Result<(), BisectError> {
        let evaluated = self
            .ledger
            .status_of(commit)
            .is_some_and(CandidateStatus::is_evaluated);
        if self.options.resume && evaluated {
            return Ok(());
        }
        self.ledger.record(commit, status, None)
    }

    /// Evaluate both endpoints and fail fast if either contradicts its
    /// assumption.
    async fn verify_endpoints(
        &mut self,
        sequence: &CommitSequence,
        probes: &mut Vec<Probe>,
    ) -> Result<(), BisectError> {
        let last = sequence.len() - 1;
        for (index, expected) in [(0, CandidateStatus::Fail), (last, CandidateStatus::Pass)] {
            let commit = &sequence.as_slice()[index];
            if self.options.resume && self.ledger.status_of(commit) == Some(expected) {
                continue;
            }
            let probe = self.probe(index, commit).await?;
            if probe.status != expected {
                self.events.record(Event::Aborted {
                    reason: format!("endpoint {commit} is {}", probe.status),
                });
                return Err(BisectError::EndpointAssumption {
                    commit: commit.clone(),
                    expected,
                    observed: probe.status,
                });
            }
            probes.push(probe);
        }
        Ok(())
    }

    /// Rebuild the interval from the ledger: the lowest passing index above
    /// zero bounds the search from above, the highest failing index below it
    /// from below.
    fn resume_interval(&self, sequence: &CommitSequence) -> SearchInterval {
        let last = sequence.len() - 1;
        let status = |i: usize| self.ledger.status_of(&sequence.as_slice()[i]);

        let high = (1..=last)
            .find(|&i| status(i).is_some_and(|s| self.options.counts_as_passing(s)))
            .unwrap_or(last);
        let low = (0..high)
            .rev()
            .find(|&i| status(i).is_some_and(|s| self.options.counts_as_failing(s)))
            .unwrap_or(0);

        tracing::info!(low, high, "resuming from recorded progress");
        SearchInterval::new(low, high)
    }

    /// Evaluate one candidate, retrying up to `max_attempts`, and record the
    /// classified result. Exhausted retries record `ERROR` and abort.
    async fn probe(&mut self, index: usize, commit: &CommitId) -> Result<Probe, BisectError> {
        let attempts = self.options.max_attempts.max(1);
        let mut last_error = String::new();
        let mut last_dir = String::new();

        for attempt in 1..=attempts {
            tracing::info!(index, commit = %commit, attempt, "probing");
            self.events.record(Event::ProbeStart {
                index,
                commit: commit.to_string(),
                attempt,
            });
            let started = Instant::now();
            let output_dir = self.paths.execution_dir(commit);
            last_dir = output_dir.display().to_string();

            let bundle = match self.evaluator.evaluate(commit, &output_dir).await {
                Ok(bundle) => bundle,
                Err(e) => {
                    last_error = format!("{e:#}");
                    if self.cancel.is_cancelled() {
                        // the interrupt most likely killed this attempt too
                        tracing::warn!(commit = %commit, attempt, error = %last_error, "evaluation interrupted");
                        self.events.record(Event::Aborted {
                            reason: "cancelled".into(),
                        });
                        return Err(BisectError::Cancelled);
                    }
                    tracing::warn!(commit = %commit, attempt, error = %last_error, "evaluation failed");
                    continue;
                }
            };

            let result = EvaluationResult::from_bundle(&bundle, &self.options.metric, &self.options.band);
            let status = result.status();
            if status == CandidateStatus::Inconclusive {
                tracing::warn!(
                    commit = %commit,
                    metric = %self.options.metric,
                    "metric not found in evaluation output"
                );
            }
            self.ledger.record(commit, status, Some(&result))?;
            tracing::info!(
                index,
                commit = %commit,
                status = %status,
                metric_value = ?result.metric_value,
                "probe finished"
            );
            self.events.record(Event::ProbeFinished {
                index,
                commit: commit.to_string(),
                status,
                metric_value: result.metric_value,
                duration_ms: started.elapsed().as_millis() as u64,
            });
            return Ok(Probe {
                index,
                commit: commit.clone(),
                status,
                result,
            });
        }

        let failed = EvaluationResult {
            metric_name: self.options.metric.clone(),
            metric_value: None,
            passed: None,
            artifact_location: last_dir,
        };
        self.ledger
            .record(commit, CandidateStatus::Error, Some(&failed))?;
        self.events.record(Event::Aborted {
            reason: format!("evaluation of {commit} failed: {last_error}"),
        });
        Err(BisectError::Evaluator {
            commit: commit.clone(),
            attempts,
            message: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{MockEvaluator, MockOutcome};
    use crate::range::StaticRangeResolver;
    use culprit_core::MetricSample;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    /// Indices `0..=culprit` score 20 (outside `[0, 10]`), the rest score 5.
    fn regression_at(n: usize, culprit: usize) -> MockEvaluator {
        let mock = MockEvaluator::new();
        for (i, id) in ids(n).iter().enumerate() {
            let score = if i <= culprit { 20.0 } else { 5.0 };
            mock.set_metric(id, "score", score);
        }
        mock
    }

    fn options() -> BisectOptions {
        BisectOptions::new("score", AcceptanceBand::new(Some(0.0), Some(10.0)))
    }

    fn status(ledger: &ProgressLedger, id: &str) -> Option<CandidateStatus> {
        ledger.status_of(&CommitId::from(id))
    }

    async fn run(
        opts: BisectOptions,
        resolver: &StaticRangeResolver,
        mock: &MockEvaluator,
        dir: &std::path::Path,
    ) -> (Result<BisectOutcome, BisectError>, ProgressLedger) {
        let paths = RunPaths::discover(dir);
        let mut bisector = Bisector::new(opts, resolver, mock, paths.clone());
        let result = bisector.run(&"start".into(), &"end".into()).await;
        (result, ProgressLedger::open(&paths.tracker_json))
    }

    fn ceil_log2(n: usize) -> usize {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }

    #[test]
    fn interval_arithmetic() {
        let mut iv = SearchInterval::new(0, 7);
        assert_eq!(iv.probe, 3);
        iv.narrow_fail();
        assert_eq!((iv.low, iv.high, iv.probe), (3, 7, 5));
        iv.narrow_pass();
        assert_eq!((iv.low, iv.high, iv.probe), (3, 5, 4));
        iv.narrow_pass();
        assert_eq!((iv.low, iv.high, iv.probe), (3, 4, 3));
        assert!(iv.is_converged());
    }

    #[test]
    fn interval_converges_on_every_transition() {
        for n in 2..=200usize {
            for k in 0..n - 1 {
                let mut iv = SearchInterval::new(0, n - 1);
                let mut steps = 0;
                while !iv.is_converged() {
                    assert!(iv.low < iv.probe && iv.probe < iv.high);
                    if iv.probe > k {
                        iv.narrow_pass();
                    } else {
                        iv.narrow_fail();
                    }
                    steps += 1;
                }
                assert_eq!(iv.low, k, "n={n} k={k}");
                assert!(steps <= ceil_log2(n), "n={n} k={k} steps={steps}");
            }
        }
    }

    #[tokio::test]
    async fn eight_commit_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(ids(8));
        let mock = regression_at(8, 3);

        let (result, ledger) = run(options(), &resolver, &mock, dir.path()).await;
        let outcome = result.unwrap();

        assert_eq!(outcome.culprit.as_str(), "c3");
        assert_eq!(outcome.culprit_index, 3);
        let probed: Vec<_> = outcome.probes.iter().map(|p| p.index).collect();
        assert_eq!(probed, vec![3, 5, 4]);
        assert_eq!(
            mock.calls(),
            vec![CommitId::from("c3"), CommitId::from("c5"), CommitId::from("c4")]
        );

        assert_eq!(ledger.len(), 8);
        assert_eq!(status(&ledger, "c0"), Some(CandidateStatus::AssumeFailed));
        assert_eq!(status(&ledger, "c7"), Some(CandidateStatus::AssumePass));
        assert_eq!(status(&ledger, "c3"), Some(CandidateStatus::Fail));
        assert_eq!(status(&ledger, "c5"), Some(CandidateStatus::Pass));
        assert_eq!(status(&ledger, "c4"), Some(CandidateStatus::Pass));
        for id in ["c1", "c2", "c6"] {
            assert_eq!(status(&ledger, id), Some(CandidateStatus::NotTested));
        }
        let c3 = ledger.get(&CommitId::from("c3")).unwrap();
        assert_eq!(c3.metric.as_deref(), Some("score"));
        assert_eq!(c3.metric_value, Some(20.0));
        assert!(c3.log_path.as_deref().unwrap().contains("executions"));
    }

    #[tokio::test]
    async fn converges_within_log_bound() {
        for n in 2..=17usize {
            for k in 0..n - 1 {
                let dir = tempfile::tempdir().unwrap();
                let resolver = StaticRangeResolver::new(ids(n));
                let mock = regression_at(n, k);
                let (result, _) = run(options(), &resolver, &mock, dir.path()).await;
                let outcome = result.unwrap();
                assert_eq!(outcome.culprit_index, k, "n={n} k={k}");
                assert!(outcome.evaluations() <= ceil_log2(n), "n={n} k={k}");
                let mut seen = mock.calls();
                let total = seen.len();
                seen.dedup();
                assert_eq!(seen.len(), total, "a commit was probed twice");
            }
        }
    }

    #[tokio::test]
    async fn empty_range_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(Vec::<String>::new());
        let mock = MockEvaluator::new();
        let (result, ledger) = run(options(), &resolver, &mock, dir.path()).await;

        assert!(matches!(result, Err(BisectError::RangeResolution(_))));
        assert!(mock.calls().is_empty());
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn resolver_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::failing("bad revision");
        let mock = MockEvaluator::new();
        let (result, _) = run(options(), &resolver, &mock, dir.path()).await;
        match result {
            Err(BisectError::RangeResolution(msg)) => assert_eq!(msg, "bad revision"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn single_commit_is_its_own_culprit() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(["only"]);
        let mock = MockEvaluator::new();
        let (result, ledger) = run(options(), &resolver, &mock, dir.path()).await;

        let outcome = result.unwrap();
        assert_eq!(outcome.culprit.as_str(), "only");
        assert_eq!(outcome.evaluations(), 0);
        assert_eq!(status(&ledger, "only"), Some(CandidateStatus::AssumeFailed));
    }

    #[tokio::test]
    async fn missing_metric_recorded_as_inconclusive_and_narrows_as_fail() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(ids(8));
        let mock = MockEvaluator::new(); // never reports "score"

        let (result, ledger) = run(options(), &resolver, &mock, dir.path()).await;
        let outcome = result.unwrap();

        let probed: Vec<_> = outcome.probes.iter().map(|p| p.index).collect();
        assert_eq!(probed, vec![3, 5, 6]);
        assert_eq!(outcome.culprit_index, 6);
        for id in ["c3", "c5", "c6"] {
            assert_eq!(status(&ledger, id), Some(CandidateStatus::Inconclusive));
            assert_eq!(ledger.get(&CommitId::from(id)).unwrap().metric_value, None);
        }
    }

    #[tokio::test]
    async fn inconclusive_pass_policy_narrows_down() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(ids(8));
        let mock = MockEvaluator::new();
        let mut opts = options();
        opts.inconclusive = InconclusivePolicy::Pass;

        let (result, _) = run(opts, &resolver, &mock, dir.path()).await;
        let outcome = result.unwrap();
        let probed: Vec<_> = outcome.probes.iter().map(|p| p.index).collect();
        assert_eq!(probed, vec![3, 1]);
        assert_eq!(outcome.culprit_index, 0);
    }

    #[tokio::test]
    async fn inconclusive_abort_policy_stops_with_ledger_intact() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(ids(8));
        let mock = MockEvaluator::new();
        let mut opts = options();
        opts.inconclusive = InconclusivePolicy::Abort;

        let (result, ledger) = run(opts, &resolver, &mock, dir.path()).await;
        assert!(matches!(result, Err(BisectError::Inconclusive { .. })));
        assert_eq!(mock.calls().len(), 1);
        assert_eq!(status(&ledger, "c3"), Some(CandidateStatus::Inconclusive));
        assert_eq!(ledger.len(), 8);
    }

    #[tokio::test]
    async fn evaluator_failure_records_error_and_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(ids(8));
        let mock = regression_at(8, 3);
        mock.set_results(
            "c3",
            vec![
                MockOutcome::Failure("bazel build failed".into()),
                MockOutcome::Failure("bazel build failed again".into()),
            ],
        );
        let mut opts = options();
        opts.max_attempts = 2;

        let (result, ledger) = run(opts, &resolver, &mock, dir.path()).await;
        match result {
            Err(BisectError::Evaluator {
                commit,
                attempts,
                message,
            }) => {
                assert_eq!(commit.as_str(), "c3");
                assert_eq!(attempts, 2);
                assert!(message.contains("again"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(mock.calls().len(), 2);
        assert_eq!(status(&ledger, "c3"), Some(CandidateStatus::Error));
        assert_eq!(status(&ledger, "c0"), Some(CandidateStatus::AssumeFailed));
    }

    #[tokio::test]
    async fn evaluator_retry_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(ids(8));
        let mock = regression_at(8, 3);
        mock.set_results(
            "c3",
            vec![
                MockOutcome::Failure("flaky".into()),
                MockOutcome::Metrics(vec![MetricSample::new("score", 20.0)]),
            ],
        );
        let mut opts = options();
        opts.max_attempts = 2;

        let (result, ledger) = run(opts, &resolver, &mock, dir.path()).await;
        assert_eq!(result.unwrap().culprit_index, 3);
        assert_eq!(status(&ledger, "c3"), Some(CandidateStatus::Fail));
    }

    #[tokio::test]
    async fn verified_endpoints_are_recorded_as_results() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(ids(8));
        let mock = regression_at(8, 3);
        let mut opts = options();
        opts.verify_endpoints = true;

        let (result, ledger) = run(opts, &resolver, &mock, dir.path()).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.culprit_index, 3);
        assert_eq!(outcome.evaluations(), 5);
        assert_eq!(status(&ledger, "c0"), Some(CandidateStatus::Fail));
        assert_eq!(status(&ledger, "c7"), Some(CandidateStatus::Pass));
    }

    #[tokio::test]
    async fn endpoint_contradiction_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(ids(8));
        let mock = regression_at(8, 3);
        mock.set_metric("c0", "score", 5.0); // passes where a failure was assumed
        let mut opts = options();
        opts.verify_endpoints = true;

        let (result, ledger) = run(opts, &resolver, &mock, dir.path()).await;
        match result {
            Err(BisectError::EndpointAssumption {
                commit,
                expected,
                observed,
            }) => {
                assert_eq!(commit.as_str(), "c0");
                assert_eq!(expected, CandidateStatus::Fail);
                assert_eq!(observed, CandidateStatus::Pass);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(mock.calls(), vec![CommitId::from("c0")]);
        assert_eq!(status(&ledger, "c0"), Some(CandidateStatus::Pass));
    }

    #[tokio::test]
    async fn resume_skips_already_tested_commits() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(ids(8));

        // first run dies evaluating c5
        let crashing = regression_at(8, 3);
        crashing.set_results("c5", vec![MockOutcome::Failure("machine rebooted".into())]);
        let (result, _) = run(options(), &resolver, &crashing, dir.path()).await;
        assert!(matches!(result, Err(BisectError::Evaluator { .. })));

        let healthy = regression_at(8, 3);
        let (result, ledger) = run(
            options().with_resume(true),
            &resolver,
            &healthy,
            dir.path(),
        )
        .await;
        let outcome = result.unwrap();

        assert_eq!(outcome.culprit_index, 3);
        assert_eq!(
            healthy.calls(),
            vec![CommitId::from("c5"), CommitId::from("c4")]
        );
        assert_eq!(status(&ledger, "c3"), Some(CandidateStatus::Fail));
        assert_eq!(status(&ledger, "c5"), Some(CandidateStatus::Pass));
        assert_eq!(status(&ledger, "c0"), Some(CandidateStatus::AssumeFailed));
    }

    #[tokio::test]
    async fn fresh_run_reseeds_existing_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(ids(4));
        let mock = regression_at(4, 1);
        let (first, _) = run(options(), &resolver, &mock, dir.path()).await;
        first.unwrap();

        let again = regression_at(4, 1);
        let (second, ledger) = run(options(), &resolver, &again, dir.path()).await;
        assert_eq!(second.unwrap().culprit_index, 1);
        assert_eq!(again.calls().len(), mock.calls().len());
        assert_eq!(ledger.len(), 4);
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_probe() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(ids(8));
        let mock = regression_at(8, 3);
        let paths = RunPaths::discover(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut bisector =
            Bisector::new(options(), &resolver, &mock, paths.clone()).with_cancel(cancel);
        let result = bisector.run(&"a".into(), &"b".into()).await;

        assert!(matches!(result, Err(BisectError::Cancelled)));
        assert_eq!(bisector.state(), ControllerState::Probing);
        assert!(mock.calls().is_empty());
        assert_eq!(bisector.ledger().len(), 8);
    }

    /// Cancels the run from inside an evaluation, like Ctrl-C arriving
    /// while a build is running.
    struct InterruptedEvaluator {
        cancel: CancellationToken,
        score: Option<f64>,
        calls: std::sync::Mutex<Vec<CommitId>>,
    }

    #[async_trait::async_trait]
    impl CandidateEvaluator for InterruptedEvaluator {
        async fn evaluate(
            &self,
            commit: &CommitId,
            output_dir: &std::path::Path,
        ) -> anyhow::Result<culprit_core::ResultBundle> {
            self.calls.lock().unwrap().push(commit.clone());
            self.cancel.cancel();
            match self.score {
                Some(v) => Ok(culprit_core::ResultBundle {
                    metrics: vec![MetricSample::new("score", v)],
                    location: output_dir.display().to_string(),
                }),
                None => anyhow::bail!("build step exited 130: interrupted"),
            }
        }
    }

    async fn run_interrupted(
        score: Option<f64>,
        dir: &std::path::Path,
    ) -> (Result<BisectOutcome, BisectError>, usize, ProgressLedger) {
        let resolver = StaticRangeResolver::new(ids(8));
        let cancel = CancellationToken::new();
        let evaluator = InterruptedEvaluator {
            cancel: cancel.clone(),
            score,
            calls: std::sync::Mutex::new(Vec::new()),
        };
        let mut opts = options();
        opts.max_attempts = 3;
        let paths = RunPaths::discover(dir);
        let mut bisector =
            Bisector::new(opts, &resolver, &evaluator, paths.clone()).with_cancel(cancel);
        let result = bisector.run(&"a".into(), &"b".into()).await;
        let calls = evaluator.calls.lock().unwrap().len();
        (result, calls, ProgressLedger::open(&paths.tracker_json))
    }

    #[tokio::test]
    async fn interrupted_attempt_is_not_retried_or_marked_error() {
        let dir = tempfile::tempdir().unwrap();
        let (result, calls, ledger) = run_interrupted(None, dir.path()).await;

        assert!(matches!(result, Err(BisectError::Cancelled)), "{result:?}");
        assert_eq!(calls, 1);
        assert_eq!(status(&ledger, "c3"), Some(CandidateStatus::NotTested));
    }

    #[tokio::test]
    async fn evaluation_in_flight_at_cancel_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let (result, calls, ledger) = run_interrupted(Some(20.0), dir.path()).await;

        assert!(matches!(result, Err(BisectError::Cancelled)), "{result:?}");
        assert_eq!(calls, 1);
        assert_eq!(status(&ledger, "c3"), Some(CandidateStatus::Fail));
    }

    #[tokio::test]
    async fn state_reaches_converged_and_events_are_logged() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = StaticRangeResolver::new(ids(8));
        let mock = regression_at(8, 3);
        let paths = RunPaths::discover(dir.path());
        let mut bisector = Bisector::new(options(), &resolver, &mock, paths.clone());
        assert_eq!(bisector.state(), ControllerState::Init);

        bisector.run(&"a".into(), &"b".into()).await.unwrap();
        assert_eq!(bisector.state(), ControllerState::Converged);

        let events = std::fs::read_to_string(&paths.events_jsonl).unwrap();
        let types: Vec<String> = events
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                v["type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(types.first().map(String::as_str), Some("bisect_start"));
        assert_eq!(types.last().map(String::as_str), Some("converged"));
        assert_eq!(types.iter().filter(|t| *t == "probe_finished").count(), 3);
    }
}
