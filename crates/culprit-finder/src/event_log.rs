//! Structured event logging for bisection runs.
//!
//! Writes append-only JSONL to `<run_dir>/events.jsonl`, one line per
//! controller milestone, for tools that follow a run while it is in progress.

use culprit_core::CandidateStatus;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A bisection event. Serialized as tagged JSON (`"type": "probe_start"`, etc.).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    BisectStart {
        start: String,
        end: String,
        candidates: usize,
        resumed: bool,
    },
    ProbeStart {
        index: usize,
        commit: String,
        attempt: u32,
    },
    ProbeFinished {
        index: usize,
        commit: String,
        status: CandidateStatus,
        metric_value: Option<f64>,
        duration_ms: u64,
    },
    Converged {
        index: usize,
        commit: String,
        evaluations: usize,
    },
    Aborted {
        reason: String,
    },
}

/// Wrapper that adds sequence number and timestamp to each event.
#[derive(Debug, Serialize)]
pub struct FullEvent {
    pub seq: u32,
    pub ts: String,
    #[serde(flatten)]
    pub event: Event,
}

/// Append-only JSONL event writer.
pub struct EventLogger {
    jsonl_path: PathBuf,
    seq: u32,
}

impl EventLogger {
    pub fn new(jsonl_path: impl Into<PathBuf>) -> Self {
        Self {
            jsonl_path: jsonl_path.into(),
            seq: 0,
        }
    }

    /// Record an event. Best-effort: silently ignores write failures.
    pub fn record(&mut self, event: Event) {
        let full = FullEvent {
            seq: self.seq,
            ts: now_rfc3339(),
            event,
        };
        self.seq += 1;

        if let Ok(line) = serde_json::to_string(&full) {
            let _ = append_line(&self.jsonl_path, &line);
        }
    }
}

/// Append a single line to a file, creating parent dirs if needed.
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
