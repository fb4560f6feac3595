use crate::paths::RunPaths;
use anyhow::{bail, Context};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

/// Single-writer guard for a run directory.
///
/// Holds an exclusive `fs2` lock on `<run_dir>/LOCK` for as long as the
/// value lives. The file also carries the holder's pid so a second `find`
/// on the same run can say who has it.
pub struct RunLock {
    _file: File,
}

impl RunLock {
    /// Non-blocking: fails at once if another process owns the run.
    pub fn acquire(paths: &RunPaths) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&paths.run_dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&paths.lock_file)
            .with_context(|| format!("opening {}", paths.lock_file.display()))?;

        if file.try_lock_exclusive().is_err() {
            let mut holder = String::new();
            let _ = file.read_to_string(&mut holder);
            bail!(
                "run {} is in use ({})",
                paths.run_dir.display(),
                describe_holder(&holder)
            );
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "pid={}", std::process::id())?;
        file.flush()?;

        Ok(Self { _file: file })
    }
}

fn describe_holder(contents: &str) -> String {
    contents
        .lines()
        .find_map(|l| l.strip_prefix("pid="))
        .map(|pid| format!("held by pid {}", pid.trim()))
        .unwrap_or_else(|| "held by another process".into())
}
