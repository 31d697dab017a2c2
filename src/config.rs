use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::similarity::DEFAULT_SIMILARITY_THRESHOLD;

const CONFIG_SCHEMA: &str = include_str!("../debug_genie.schema.json");

/// Non-secret tuning. Secrets never live here; see [`crate::credentials`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default = "default_crm_api_version")]
    pub api_version: String,
    #[serde(default = "default_crm_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_version: default_crm_api_version(),
            request_timeout_ms: default_crm_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default = "default_llm_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            temperature: default_llm_temperature(),
            max_output_tokens: None,
            request_timeout_ms: default_llm_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Ask the model once more, with a stricter reminder, after a parse or schema failure.
    #[serde(default)]
    pub strict_retry: bool,
    #[serde(default)]
    pub similar_cases: SimilarCasesConfig,
}

/// Compares the ticket against recently worked cases and shows the closest one to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarCasesConfig {
    #[serde(default = "default_enabled_true")]
    pub enabled: bool,
    #[serde(default = "default_similar_lookback")]
    pub lookback: usize,
    #[serde(default = "default_similar_threshold")]
    pub threshold: f64,
}

impl Default for SimilarCasesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback: default_similar_lookback(),
            threshold: default_similar_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default = "default_logging_rotation")]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_enabled_true")]
    pub stderr_warn_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            rotation: default_logging_rotation(),
            retention_days: default_logging_retention_days(),
            stderr_warn_enabled: true,
        }
    }
}

fn default_crm_api_version() -> String {
    "v59.0".to_string()
}

fn default_crm_request_timeout_ms() -> u64 {
    15_000
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_llm_temperature() -> f64 {
    0.2
}

fn default_llm_request_timeout_ms() -> u64 {
    30_000
}

fn default_similar_lookback() -> usize {
    50
}

fn default_similar_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_enabled_true() -> bool {
    true
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_logging_rotation() -> LoggingRotation {
    LoggingRotation::Daily
}

fn default_logging_retention_days() -> usize {
    14
}

impl Config {
    /// Reads a JSONC file, checks it against the embedded schema, then fills defaults.
    /// A relative `logging.dir` is taken relative to the file, not the working directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let document: Value = json5::from_str(&raw)
            .with_context(|| format!("config {} is not valid JSONC", path.display()))?;

        check_schema(&document).with_context(|| format!("config {} rejected", path.display()))?;

        let mut config: Config =
            serde_json::from_value(document).context("config does not match expected shape")?;
        if config.logging.dir.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.logging.dir = base.join(&config.logging.dir);
        }
        Ok(config)
    }

    /// An explicit path must exist; the default path is optional.
    pub fn load_or_default(explicit: Option<&Path>, default_path: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None if default_path.exists() => Self::load(default_path),
            None => Ok(Self::default()),
        }
    }
}

fn check_schema(document: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(CONFIG_SCHEMA).context("embedded config schema is not JSON")?;
    let validator = JSONSchema::compile(&schema)
        .map_err(|err| anyhow!("embedded config schema does not compile: {err}"))?;

    if let Err(violations) = validator.validate(document) {
        let details = violations
            .map(|violation| format!("{} at '{}'", violation, violation.instance_path))
            .collect::<Vec<_>>();
        return Err(anyhow!("schema violations: {}", details.join("; ")));
    }
    Ok(())
}
