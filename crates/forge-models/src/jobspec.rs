//! Operator-facing JobSpec JSON schema (CLI surface).
//!
//! The JobSpec is versioned and closed: unknown fields are rejected at
//! parse time. Semantic validation (paths, routing, profile coherence)
//! happens in the engine; this type only owns shape and version.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::ResolveEdition;

/// Current JobSpec schema version.
pub const JOBSPEC_VERSION: &str = "2.0";

/// Errors raised while parsing a JobSpec document.
#[derive(Debug, Error)]
pub enum JobSpecError {
    #[error("invalid JobSpec JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported jobspec_version '{found}' (requires >= {required})")]
    UnsupportedVersion { found: String, required: String },
}

fn default_version() -> String {
    JOBSPEC_VERSION.to_string()
}

/// A declarative job request, loaded from JSON by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    #[serde(default = "default_version")]
    pub jobspec_version: String,
    pub sources: Vec<PathBuf>,
    pub output_directory: PathBuf,
    pub codec: String,
    pub container: String,
    pub resolution: String,
    pub naming_template: String,
    pub proxy_profile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_preset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_resolve_edition: Option<ResolveEdition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps_explicit: Option<f64>,
}

impl JobSpec {
    /// Parse a JobSpec from JSON, enforcing the version floor.
    pub fn from_json(json: &str) -> Result<Self, JobSpecError> {
        let spec: JobSpec = serde_json::from_str(json)?;
        if !version_supported(&spec.jobspec_version) {
            return Err(JobSpecError::UnsupportedVersion {
                found: spec.jobspec_version,
                required: JOBSPEC_VERSION.to_string(),
            });
        }
        Ok(spec)
    }

    /// Serialize back to JSON with stable key ordering.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("JobSpec serialization cannot fail")
    }
}

/// A version is supported when its major component is >= 2.
fn version_supported(version: &str) -> bool {
    version
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .is_some_and(|major| major >= 2)
}
