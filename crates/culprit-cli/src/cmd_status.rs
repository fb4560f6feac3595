use anyhow::{Context, Result};
use culprit_ledger::{LedgerDoc, ProgressLedger, RunPaths};
use std::fmt::Write as _;
use std::path::Path;

/// Execute `culprit status <RUN_DIR>`
pub fn execute(run_dir: &Path, json: bool) -> Result<()> {
    let paths = RunPaths::discover(run_dir);
    let doc = ProgressLedger::read(&paths.tracker_json)
        .with_context(|| format!("reading {}", paths.tracker_json.display()))?
        .with_context(|| format!("no ledger in {}", run_dir.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print!("{}", render(&doc));
    }
    Ok(())
}

fn render(doc: &LedgerDoc) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} commits", doc.test_hashes.len());
    for (status, n) in doc.counts() {
        let _ = writeln!(out, "  {:<14} {n}", status.as_str());
    }
    let _ = writeln!(out);
    for (i, (commit, entry)) in doc.test_hashes.iter().enumerate() {
        let value = entry
            .metric_value
            .map(|v| format!(" {}={v}", entry.metric.as_deref().unwrap_or("metric")))
            .unwrap_or_default();
        let _ = writeln!(out, "[{i}] {} {}{value}", commit.short(12), entry.status);
    }
    out
}
