//! Running pipeline steps through the platform shell.

use crate::config::BuildEnv;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::process::Command;

const STDERR_TAIL_BYTES: usize = 2000;

/// Shell program and args for the current platform.
#[cfg(windows)]
pub fn shell_cmd(cmd: &str) -> (String, Vec<String>) {
    ("cmd.exe".into(), vec!["/C".into(), cmd.into()])
}

#[cfg(not(windows))]
pub fn shell_cmd(cmd: &str) -> (String, Vec<String>) {
    ("sh".into(), vec!["-c".into(), cmd.into()])
}

/// Credentials that show up in build and benchmark logs: tokens in the
/// environment dump of a failing configure, basic-auth clone URLs, cloud keys.
const SECRET_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)\b([a-z0-9_]*(?:password|passwd|secret|token|api_?key))(\s*[=:]\s*)\S+", "$1$2[MASKED]"),
    (r"(?i)(authorization:\s*(?:bearer|basic|token))\s+\S+", "$1 [MASKED]"),
    (r"(https?://[^/\s:@]+):[^@\s/]+@", "$1:[MASKED]@"),
    (r"\bAKIA[0-9A-Z]{16}\b", "[MASKED]"),
    (r"\bgh[pousr]_[A-Za-z0-9]{20,}\b", "[MASKED]"),
];

fn secret_patterns() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        SECRET_PATTERNS
            .iter()
            .filter_map(|(p, r)| Regex::new(p).ok().map(|re| (re, *r)))
            .collect()
    })
}

/// Mask credentials before step output reaches an error or the ledger.
pub fn mask_secrets(text: &str) -> String {
    let mut result = text.to_string();
    for (re, replacement) in secret_patterns() {
        result = re.replace_all(&result, *replacement).into_owned();
    }
    result
}

/// Last `max` bytes of `text`, cut on a char boundary.
fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Run one step to completion. No timeout: a hanging step hangs the caller.
///
/// Both output streams are written to `log_path`. A non-zero exit becomes an
/// error carrying the exit code and the (masked) tail of stderr.
pub async fn run_step(
    step: &str,
    cmd: &str,
    cwd: &Path,
    env: &BuildEnv,
    log_path: &Path,
) -> Result<Duration> {
    let start = Instant::now();
    let (shell, args) = shell_cmd(cmd);

    let mut command = Command::new(&shell);
    command
        .args(&args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group: a terminal Ctrl-C reaches culprit, not the build.
    #[cfg(unix)]
    command.process_group(0);
    for (key, value) in env.iter() {
        command.env(key, value);
    }

    tracing::debug!(step, cmd, cwd = %cwd.display(), "running step");
    let output = command
        .output()
        .await
        .with_context(|| format!("{step} step could not be spawned: {cmd}"))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        log_path,
        format!("$ {cmd}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}\n"),
    )
    .with_context(|| format!("writing {}", log_path.display()))?;

    if !output.status.success() {
        let masked = mask_secrets(&stderr);
        bail!(
            "{step} step exited {}: {}",
            output.status.code().unwrap_or(-1),
            tail(&masked, STDERR_TAIL_BYTES).trim()
        );
    }
    Ok(start.elapsed())
}
