//! # Configuration
//!
//! Two kinds of configuration feed a deployment:
//!
//! * [`ModelConfig`]: the quantization exponents of one compiled model, read
//!   from the JSON artifact that ships next to it (`<model_dir>/<model>.json`).
//! * [`DeploymentConfig`]: how many engines to open, the buffer layout, and
//!   the dispatch and serving knobs. Every field has a default so a partial
//!   JSON file is enough.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::dispatch::RoundMode;
use crate::error::{DispatchError, Result};
use crate::quantization::OverflowPolicy;

/// Quantization exponents of a compiled model.
///
/// The artifact is a JSON array of records; the first record is the one the
/// runtime uses. Extra fields in the record are ignored.
///
/// ```
/// use teppan::config::ModelConfig;
///
/// let model = ModelConfig::from_json(r#"[{"lstm_in_float2fix": 5, "lstm_out_fix2float": 7}]"#).unwrap();
/// assert_eq!(model.input_exponent, 5);
/// assert_eq!(model.output_exponent, 7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Exponent applied when scaling float input into fixed point
    #[serde(rename = "lstm_in_float2fix")]
    pub input_exponent: i32,

    /// Exponent applied when scaling fixed point output back into float
    #[serde(rename = "lstm_out_fix2float")]
    pub output_exponent: i32,
}

impl ModelConfig {
    /// Parses the artifact contents.
    pub fn from_json(contents: &str) -> Result<Self> {
        let records: Vec<ModelConfig> = serde_json::from_str(contents)?;
        records.into_iter()
            .next()
            .ok_or_else(|| DispatchError::Config("model artifact contains no records".to_string()))
    }

    /// Path of the artifact for `model` inside `model_dir`.
    pub fn artifact_path(model_dir: impl AsRef<Path>, model: &str) -> PathBuf {
        model_dir.as_ref().join(format!("{model}.json"))
    }

    /// Reads and parses `<model_dir>/<model>.json`.
    pub fn load(model_dir: impl AsRef<Path>, model: &str) -> Result<Self> {
        let path = Self::artifact_path(model_dir, model);
        let contents = fs::read_to_string(&path).map_err(|e| {
            DispatchError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }
}

/// The set of engines opened at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workload name each engine is opened for
    pub workload: String,

    /// Number of engines, one per device id starting at 0
    pub instances: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workload: "openie".to_string(),
            instances: 1,
        }
    }
}

/// Widths of the buffers exchanged with the engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Feature width of one input frame as the model defines it
    pub model_input_width: usize,

    /// Zero channels appended to every input frame for the hardware
    pub hardware_pad_channels: usize,

    /// Feature width of one output frame
    pub output_width: usize,
}

impl LayoutConfig {
    pub fn padded_width(&self) -> usize {
        self.model_input_width + self.hardware_pad_channels
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            model_input_width: 200,
            hardware_pad_channels: 24,
            output_width: 300,
        }
    }
}

/// How a batch is driven through the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on a single hardware call, unbounded when absent
    pub call_timeout_ms: Option<u64>,

    pub round_mode: RoundMode,

    pub overflow_policy: OverflowPolicy,
}

impl DispatchConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

/// Settings of the request coalescing front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingConfig {
    /// Most requests merged into one encoder batch
    pub max_batch: usize,

    /// How long the worker sleeps between checks when idle
    pub poll_interval_ms: u64,
}

impl ServingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            max_batch: 32,
            poll_interval_ms: 100,
        }
    }
}

/// Everything needed to stand up an encoder.
///
/// ```
/// use teppan::config::DeploymentConfig;
///
/// let config = DeploymentConfig::from_json(r#"{"pool": {"instances": 2}}"#).unwrap();
/// assert_eq!(config.pool.instances, 2);
/// assert_eq!(config.pool.workload, "openie");
/// assert_eq!(config.layout.padded_width(), 224);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Name of the model artifact, without extension
    pub model: String,

    /// Directory holding model artifacts
    pub model_dir: PathBuf,

    pub pool: PoolConfig,

    pub layout: LayoutConfig,

    pub dispatch: DispatchConfig,

    pub serving: ServingConfig,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            model: "openie".to_string(),
            model_dir: PathBuf::from("model"),
            pool: PoolConfig::default(),
            layout: LayoutConfig::default(),
            dispatch: DispatchConfig::default(),
            serving: ServingConfig::default(),
        }
    }
}

impl DeploymentConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: DeploymentConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Loads the model artifact this deployment points at.
    pub fn model_config(&self) -> Result<ModelConfig> {
        ModelConfig::load(&self.model_dir, &self.model)
    }

    /// Rejects settings that would make dispatch impossible.
    pub fn validate(&self) -> Result<()> {
        if self.pool.instances == 0 {
            return Err(DispatchError::Config("pool.instances must be at least 1".to_string()));
        }
        if self.pool.workload.is_empty() {
            return Err(DispatchError::Config("pool.workload must not be empty".to_string()));
        }
        if self.layout.model_input_width == 0 || self.layout.output_width == 0 {
            return Err(DispatchError::Config("layout widths must be positive".to_string()));
        }
        if self.serving.max_batch == 0 {
            return Err(DispatchError::Config("serving.max_batch must be at least 1".to_string()));
        }
        if self.dispatch.call_timeout_ms == Some(0) {
            return Err(DispatchError::Config("dispatch.call_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}
