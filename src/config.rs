// In: src/config.rs

//! The single source of truth for pipeline configuration.
//!
//! A `PipelineConfig` is created once at the application boundary (a JSON document
//! handed over the C ABI, a Python string, or a struct literal in Rust) and consumed
//! by `Pipeline::new`. The stage graph it describes is fixed for the lifetime of the
//! pipeline; there is no API for adding stages afterwards.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StagepipeError};
use crate::pipeline::StagePayloadType;

//==================================================================================
// I. Core Configuration Enums & Structs
//==================================================================================

/// What `move_as_is` does when some of the requested ids are not resident anywhere.
///
/// `move_and_pack_frames` ignores this setting: packing is always all-or-nothing.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingIdPolicy {
    /// **Default:** unknown ids are logged and skipped, the remaining ids are moved.
    #[default]
    Skip,

    /// Any unknown id fails the whole call and nothing is moved.
    Abort,
}

/// One node of the stage graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    pub name: String,
    /// Whether the stage holds independent frames or batches.
    pub payload: StagePayloadType,
}

impl StageConfig {
    pub fn new(name: &str, payload: StagePayloadType) -> Self {
        Self {
            name: name.to_owned(),
            payload,
        }
    }
}

//==================================================================================
// II. The Unified PipelineConfig
//==================================================================================

/// The complete description of a pipeline: its name, its ordered stage graph and
/// the policies that govern movement.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Human-readable name, used only in log lines.
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// The stages in graph order. Order matters: `move_as_is` with an empty id
    /// list pulls from the stage immediately preceding the destination.
    #[serde(default)]
    pub stages: Vec<StageConfig>,

    #[serde(default)]
    pub missing_id_policy: MissingIdPolicy,

    /// Log level applied by `observability::init_logging` when the boundary layer
    /// initialises logging on behalf of this pipeline. Accepts the `log` crate names
    /// (`error`, `warn`, `info`, `debug`, `trace`, `off`).
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            stages: Vec::new(),
            missing_id_policy: MissingIdPolicy::default(),
            log_level: None,
        }
    }
}

impl PipelineConfig {
    /// Parses a JSON document and validates the result.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Builder-style helper used heavily by tests and the Rust API.
    pub fn with_stage(mut self, name: &str, payload: StagePayloadType) -> Self {
        self.stages.push(StageConfig::new(name, payload));
        self
    }

    pub fn with_missing_id_policy(mut self, policy: MissingIdPolicy) -> Self {
        self.missing_id_policy = policy;
        self
    }

    /// Checks the invariants `Pipeline::new` relies on: every stage has a non-empty
    /// name and no name is used twice.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.stages.len());
        for stage in &self.stages {
            if stage.name.is_empty() {
                return Err(StagepipeError::InvalidConfig(
                    "stage names must not be empty".to_string(),
                ));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(StagepipeError::DuplicateStage(stage.name.clone()));
            }
        }
        if let Some(level) = &self.log_level {
            if level.parse::<log::LevelFilter>().is_err() {
                return Err(StagepipeError::InvalidConfig(format!(
                    "unknown log level '{}'",
                    level
                )));
            }
        }
        Ok(())
    }
}

/// Provides a sensible default for `name` for serde.
fn default_pipeline_name() -> String {
    "pipeline".to_string()
}
