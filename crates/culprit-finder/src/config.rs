use anyhow::{bail, Context, Result};
use culprit_core::AcceptanceBand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// What to do with a probe whose metric was missing from the output.
///
/// The probe is always recorded as `INCONCLUSIVE`; the policy only decides
/// which way the search interval narrows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InconclusivePolicy {
    /// Narrow as if the probe failed.
    #[default]
    Fail,
    /// Narrow as if the probe passed.
    Pass,
    /// Stop the run.
    Abort,
}

impl FromStr for InconclusivePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(Self::Fail),
            "pass" => Ok(Self::Pass),
            "abort" => Ok(Self::Abort),
            other => Err(format!(
                "unknown inconclusive policy \"{other}\" (expected fail, pass, or abort)"
            )),
        }
    }
}

/// Environment handed explicitly to every pipeline step. The culprit process
/// environment itself is never modified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildEnv(BTreeMap<String, String>);

impl BuildEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Shell templates for building, installing, and benchmarking one commit.
///
/// Templates expand `{commit}`, `{src}`, and `{output_dir}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default = "default_checkout")]
    pub checkout: Option<String>,
    /// Runs once, before the first build of the process.
    #[serde(default)]
    pub configure: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub install: Option<String>,
    #[serde(default)]
    pub benchmark: Option<String>,
    /// Relative to the evaluation's output directory.
    #[serde(default = "default_result_file")]
    pub result_file: String,
    #[serde(default)]
    pub env: BuildEnv,
}

impl Default for PipelineSpec {
    fn default() -> Self {
        Self {
            checkout: default_checkout(),
            configure: None,
            build: None,
            install: None,
            benchmark: None,
            result_file: default_result_file(),
            env: BuildEnv::default(),
        }
    }
}

/// A bisection run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BisectConfig {
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub inconclusive: InconclusivePolicy,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub verify_endpoints: bool,
    #[serde(default)]
    pub pipeline: PipelineSpec,
}

impl Default for BisectConfig {
    fn default() -> Self {
        Self {
            metric: default_metric(),
            low: None,
            high: None,
            inconclusive: InconclusivePolicy::default(),
            max_attempts: default_max_attempts(),
            verify_endpoints: false,
            pipeline: PipelineSpec::default(),
        }
    }
}

impl BisectConfig {
    pub fn band(&self) -> AcceptanceBand {
        AcceptanceBand::new(self.low, self.high)
    }

    /// Check constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.metric.trim().is_empty() {
            bail!("metric name must not be empty");
        }
        let band = self.band();
        if !band.is_valid() {
            bail!("invalid acceptance band {band}: low must not exceed high");
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        match self.pipeline.benchmark.as_deref() {
            Some(cmd) if !cmd.trim().is_empty() => {}
            _ => bail!("no benchmark command configured (set pipeline.benchmark or --benchmark-cmd)"),
        }
        if self.pipeline.result_file.trim().is_empty() {
            bail!("pipeline.result_file must not be empty");
        }
        Ok(())
    }
}

fn default_metric() -> String {
    "exp_per_second".into()
}

fn default_max_attempts() -> u32 {
    1
}

fn default_checkout() -> Option<String> {
    Some("git checkout --force {commit}".into())
}

fn default_result_file() -> String {
    "result.json".into()
}

/// Load a run file from YAML.
pub fn load_config(path: &Path) -> Result<BisectConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_config(&content).with_context(|| format!("loading {}", path.display()))
}

/// Parse a run file. Validation happens after command-line overrides.
pub fn parse_config(yaml: &str) -> Result<BisectConfig> {
    serde_yaml::from_str(yaml).context("run file schema validation failed")
}
