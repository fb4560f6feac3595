use anyhow::{bail, Context, Result};
use clap::Args;
use culprit_core::{BisectError, CommitId};
use culprit_finder::{
    load_config, BisectConfig, BisectOptions, Bisector, GitRangeResolver, InconclusivePolicy,
    PipelineEvaluator,
};
use culprit_ledger::{RunLock, RunPaths};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::logging;

#[derive(Debug, Args)]
pub struct FindArgs {
    /// Last commit known to pass (excluded from the search)
    #[arg(long)]
    pub start: String,
    /// Commit known to fail
    #[arg(long)]
    pub end: String,
    /// Source checkout the pipeline runs in
    #[arg(long, default_value = ".")]
    pub src: PathBuf,
    /// Metric to test (default: exp_per_second)
    #[arg(long)]
    pub metric: Option<String>,
    /// Lowest acceptable metric value
    #[arg(long, allow_negative_numbers = true)]
    pub low: Option<f64>,
    /// Highest acceptable metric value
    #[arg(long, allow_negative_numbers = true)]
    pub high: Option<f64>,
    /// YAML run file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory new run directories are created in
    #[arg(long, default_value = "culprit_output")]
    pub output_dir: PathBuf,
    /// Continue an interrupted run from its directory
    #[arg(long, value_name = "RUN_DIR")]
    pub resume: Option<PathBuf>,
    /// What a missing metric counts as: fail, pass, or abort
    #[arg(long)]
    pub inconclusive: Option<InconclusivePolicy>,
    /// Evaluation attempts per commit before giving up
    #[arg(long)]
    pub max_attempts: Option<u32>,
    /// Evaluate both ends of the range before searching
    #[arg(long)]
    pub verify_endpoints: bool,
    #[arg(long)]
    pub build_cmd: Option<String>,
    #[arg(long)]
    pub install_cmd: Option<String>,
    #[arg(long)]
    pub benchmark_cmd: Option<String>,
    /// Debug-level logging on stderr
    #[arg(long, short)]
    pub verbose: bool,
}

/// Run-file values first, then flags on top.
pub fn resolve_config(args: &FindArgs) -> Result<BisectConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => BisectConfig::default(),
    };
    apply_overrides(&mut config, args);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut BisectConfig, args: &FindArgs) {
    if let Some(metric) = &args.metric {
        config.metric = metric.clone();
    }
    if args.low.is_some() {
        config.low = args.low;
    }
    if args.high.is_some() {
        config.high = args.high;
    }
    if let Some(policy) = args.inconclusive {
        config.inconclusive = policy;
    }
    if let Some(n) = args.max_attempts {
        config.max_attempts = n;
    }
    if args.verify_endpoints {
        config.verify_endpoints = true;
    }
    if let Some(cmd) = &args.build_cmd {
        config.pipeline.build = Some(cmd.clone());
    }
    if let Some(cmd) = &args.install_cmd {
        config.pipeline.install = Some(cmd.clone());
    }
    if let Some(cmd) = &args.benchmark_cmd {
        config.pipeline.benchmark = Some(cmd.clone());
    }
}

fn run_paths(args: &FindArgs) -> Result<RunPaths> {
    match &args.resume {
        Some(dir) => {
            let paths = RunPaths::discover(dir);
            if !paths.has_ledger() {
                bail!(
                    "nothing to resume: {} has no tracker.json",
                    paths.run_dir.display()
                );
            }
            Ok(paths)
        }
        None => Ok(RunPaths::fresh(&args.output_dir)),
    }
}

/// Execute `culprit find`
pub fn execute(args: &FindArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let src = std::fs::canonicalize(&args.src)
        .with_context(|| format!("source checkout {} not found", args.src.display()))?;

    let paths = run_paths(args)?;
    paths.ensure_layout()?;
    let _lock = RunLock::acquire(&paths)?;
    logging::init(&paths.log_jsonl, args.verbose)?;
    tracing::debug!(log = %paths.log_jsonl.display(), run_dir = %paths.run_dir.display(), "run directory ready");

    // Handle Ctrl+C between probes
    let cancel = CancellationToken::new();
    ctrlc_cancel(cancel.clone());

    let mut stdout = std::io::stdout().lock();
    bisect(args, &config, &src, &paths, cancel, &mut stdout)
}

/// Run the search and write the report to `out`. The ledger is printed
/// whether or not the search converged.
fn bisect(
    args: &FindArgs,
    config: &BisectConfig,
    src: &Path,
    paths: &RunPaths,
    cancel: CancellationToken,
    out: &mut dyn Write,
) -> Result<()> {
    let resolver = GitRangeResolver::new(src);
    let evaluator = PipelineEvaluator::new(config.pipeline.clone(), src);
    let options = BisectOptions::from_config(config).with_resume(args.resume.is_some());

    let mut bisector =
        Bisector::new(options, &resolver, &evaluator, paths.clone()).with_cancel(cancel);
    let start = CommitId::from(args.start.as_str());
    let end = CommitId::from(args.end.as_str());

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(bisector.run(&start, &end));

    writeln!(out, "Full report:\n{}", bisector.ledger().to_pretty_json())?;
    match outcome {
        Ok(outcome) => {
            writeln!(
                out,
                "Culprit is [{}] {}",
                outcome.culprit_index, outcome.culprit
            )?;
            Ok(())
        }
        Err(BisectError::Cancelled) => {
            eprintln!("{}", resume_hint(args, &paths.run_dir));
            Err(BisectError::Cancelled.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn resume_hint(args: &FindArgs, run_dir: &Path) -> String {
    format!(
        "Interrupted. Resume with: culprit find --start {} --end {} --resume {}",
        args.start,
        args.end,
        run_dir.display()
    )
}

fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}
