use crate::config::{BuildEnv, PipelineSpec};
use crate::evaluator::CandidateEvaluator;
use crate::shell::run_step;
use anyhow::{bail, Result};
use culprit_core::{read_result_file, CommitId, ResultBundle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Evaluates candidates by running the configured shell steps in the source
/// checkout: checkout, configure (first evaluation only), build, install,
/// benchmark. The benchmark must leave a result file in the output directory.
pub struct PipelineEvaluator {
    spec: PipelineSpec,
    src: PathBuf,
    configured: AtomicBool,
}

impl PipelineEvaluator {
    pub fn new(spec: PipelineSpec, src: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            src: src.into(),
            configured: AtomicBool::new(false),
        }
    }

    fn expand(&self, template: &str, commit: &CommitId, output_dir: &Path) -> String {
        template
            .replace("{commit}", commit.as_str())
            .replace("{src}", &self.src.display().to_string())
            .replace("{output_dir}", &output_dir.display().to_string())
    }

    /// Environment for one evaluation: the configured variables plus the
    /// commit and output directory.
    fn step_env(&self, commit: &CommitId, output_dir: &Path) -> BuildEnv {
        let mut env = self.spec.env.clone();
        env.set("CULPRIT_COMMIT", commit.as_str());
        env.set("CULPRIT_OUTPUT_DIR", output_dir.display().to_string());
        env
    }
}

#[async_trait::async_trait]
impl CandidateEvaluator for PipelineEvaluator {
    async fn evaluate(&self, commit: &CommitId, output_dir: &Path) -> Result<ResultBundle> {
        let Some(benchmark) = self.spec.benchmark.as_deref() else {
            bail!("no benchmark command configured");
        };
        std::fs::create_dir_all(output_dir)?;
        let env = self.step_env(commit, output_dir);

        let configure = if self.configured.load(Ordering::SeqCst) {
            None
        } else {
            self.spec.configure.as_deref()
        };
        let steps = [
            ("checkout", self.spec.checkout.as_deref()),
            ("configure", configure),
            ("build", self.spec.build.as_deref()),
            ("install", self.spec.install.as_deref()),
            ("benchmark", Some(benchmark)),
        ];

        for (step, template) in steps {
            let Some(template) = template else { continue };
            let cmd = self.expand(template, commit, output_dir);
            let log_path = output_dir.join(format!("{step}.log"));
            let elapsed = run_step(step, &cmd, &self.src, &env, &log_path).await?;
            tracing::info!(step, commit = %commit, elapsed_ms = elapsed.as_millis() as u64, "step finished");
            if step == "configure" {
                self.configured.store(true, Ordering::SeqCst);
            }
        }

        let result_path = output_dir.join(&self.spec.result_file);
        let metrics = read_result_file(&result_path)?;
        Ok(ResultBundle {
            metrics,
            location: output_dir.display().to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const RESULT: &str = r#"{"benchmark_result":{"metrics":[{"name":"score","value":%s}]}}"#;

    fn spec(benchmark: &str) -> PipelineSpec {
        PipelineSpec {
            checkout: None,
            benchmark: Some(benchmark.into()),
            ..Default::default()
        }
    }

    fn write_result(value: &str) -> String {
        format!("printf '{RESULT}' {value} > {{output_dir}}/result.json")
    }

    #[tokio::test]
    async fn runs_steps_and_parses_result() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut spec = spec(&write_result("5"));
        spec.build = Some("echo building {commit} > {src}/built.txt".into());
        let eval = PipelineEvaluator::new(spec, src.path());

        let bundle = eval
            .evaluate(&CommitId::from("abc123"), out.path())
            .await
            .unwrap();
        assert_eq!(bundle.metric("score"), Some(5.0));
        assert_eq!(bundle.location, out.path().display().to_string());
        assert_eq!(
            std::fs::read_to_string(src.path().join("built.txt")).unwrap(),
            "building abc123\n"
        );
        assert!(out.path().join("build.log").exists());
        assert!(out.path().join("benchmark.log").exists());
    }

    #[tokio::test]
    async fn build_env_reaches_steps() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut spec = spec(&format!(
            "printf '{RESULT}' \"$OMP_NUM_THREADS\" > \"$CULPRIT_OUTPUT_DIR/result.json\""
        ));
        spec.env.set("OMP_NUM_THREADS", "34");
        let eval = PipelineEvaluator::new(spec, src.path());

        let bundle = eval.evaluate(&CommitId::from("c1"), out.path()).await.unwrap();
        assert_eq!(bundle.metric("score"), Some(34.0));
    }

    #[tokio::test]
    async fn failing_build_is_an_error() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut spec = spec(&write_result("1"));
        spec.build = Some("echo 'undefined symbol' >&2; exit 2".into());
        let eval = PipelineEvaluator::new(spec, src.path());

        let err = eval
            .evaluate(&CommitId::from("c1"), out.path())
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("build step exited 2"), "{err}");
        assert!(!out.path().join("result.json").exists());
    }

    #[tokio::test]
    async fn missing_result_file_is_an_error() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let eval = PipelineEvaluator::new(spec("true"), src.path());
        let err = eval
            .evaluate(&CommitId::from("c1"), out.path())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("result.json"));
    }

    #[tokio::test]
    async fn configure_runs_once() {
        let src = tempfile::tempdir().unwrap();
        let mut spec = spec(&write_result("1"));
        spec.configure = Some("echo x >> {src}/configured".into());
        let eval = PipelineEvaluator::new(spec, src.path());

        for commit in ["c1", "c2"] {
            let out = tempfile::tempdir().unwrap();
            eval.evaluate(&CommitId::from(commit), out.path())
                .await
                .unwrap();
        }
        let runs = std::fs::read_to_string(src.path().join("configured")).unwrap();
        assert_eq!(runs.lines().count(), 1);
    }
}
