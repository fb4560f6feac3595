use culprit_core::CommitId;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// All well-known paths of one bisection run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub run_dir: PathBuf,
    pub tracker_json: PathBuf,
    pub events_jsonl: PathBuf,
    pub log_jsonl: PathBuf,
    pub lock_file: PathBuf,
    pub executions_dir: PathBuf,
}

impl RunPaths {
    /// Derive all paths from a run directory. Pure computation, no I/O.
    pub fn discover(run_dir: impl Into<PathBuf>) -> Self {
        let run_dir = run_dir.into();
        Self {
            tracker_json: run_dir.join("tracker.json"),
            events_jsonl: run_dir.join("events.jsonl"),
            log_jsonl: run_dir.join("log.jsonl"),
            lock_file: run_dir.join("LOCK"),
            executions_dir: run_dir.join("executions"),
            run_dir,
        }
    }

    /// Paths for a fresh run under `output_root`, named after the current time.
    pub fn fresh(output_root: &Path) -> Self {
        Self::discover(output_root.join(run_dir_name(OffsetDateTime::now_utc())))
    }

    /// Create the run directory layout. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        for dir in [&self.run_dir, &self.executions_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Whether a ledger has been written for this run.
    pub fn has_ledger(&self) -> bool {
        self.tracker_json.is_file()
    }

    /// Directory for one evaluation of `commit`. Every call yields a new
    /// timestamped directory, so retries never overwrite earlier output.
    pub fn execution_dir(&self, commit: &CommitId) -> PathBuf {
        let safe: String = commit
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.executions_dir.join(format!(
            "{}-{safe}",
            timestamp_id(OffsetDateTime::now_utc())
        ))
    }
}

/// `culprit_find-2019-08-01-12-30-05-123456`
pub fn run_dir_name(at: OffsetDateTime) -> String {
    format!("culprit_find-{}", timestamp_id(at))
}

/// Microsecond timestamp usable as a path component.
pub fn timestamp_id(at: OffsetDateTime) -> String {
    let fmt = time::macros::format_description!(
        "[year]-[month]-[day]-[hour]-[minute]-[second]-[subsecond digits:6]"
    );
    at.format(fmt)
        .unwrap_or_else(|_| at.unix_timestamp_nanos().to_string())
}
