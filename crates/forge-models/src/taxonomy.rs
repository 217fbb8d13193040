//! Failure taxonomy.
//!
//! Every operator-visible failure carries a machine-readable tag. The tag
//! travels with the error to logs, HTTP responses and persisted task state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable dotted tags for validation, execution and license failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureTag {
    /// Container/codec pair rejected or unknown.
    SourceUnsupported,
    /// Codec not valid in the requested container.
    CodecContainerMismatch,
    /// Proxy profile's engine differs from the routing engine.
    ProxyProfileMismatch,
    /// Source path is missing or not a regular file.
    SourceMissingOrNotFile,
    /// Multi-clip job without a uniquifying naming token.
    NamingTemplateAmbiguous,
    /// Resolve required but not reachable.
    ResolveAvailability,
    /// Named Resolve render preset not present.
    ResolvePresetMissing,
    /// Detected Resolve edition does not satisfy the requirement.
    EditionMismatch,
    /// Encoder subprocess failed or produced no output.
    EngineFailure,
    /// Job was running when the process restarted.
    InterruptedByRestart,
    /// Operator-initiated cancellation.
    Cancelled,
    /// License worker cap refused admission.
    WorkerLimitExceeded,
}

impl FailureTag {
    /// Dotted string form, e.g. `validation.source_unsupported`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureTag::SourceUnsupported => "validation.source_unsupported",
            FailureTag::CodecContainerMismatch => "validation.codec_container_mismatch",
            FailureTag::ProxyProfileMismatch => "validation.proxy_profile_mismatch",
            FailureTag::SourceMissingOrNotFile => "validation.source_missing_or_not_file",
            FailureTag::NamingTemplateAmbiguous => "validation.naming_template_ambiguous",
            FailureTag::ResolveAvailability => "validation.resolve_availability",
            FailureTag::ResolvePresetMissing => "validation.resolve_preset_missing",
            FailureTag::EditionMismatch => "validation.edition_mismatch",
            FailureTag::EngineFailure => "execution.engine_failure",
            FailureTag::InterruptedByRestart => "execution.interrupted_by_restart",
            FailureTag::Cancelled => "execution.cancelled",
            FailureTag::WorkerLimitExceeded => "license.worker_limit_exceeded",
        }
    }

    /// Whether the tag belongs to the validation family (nothing persisted).
    pub fn is_validation(&self) -> bool {
        self.as_str().starts_with("validation.")
    }
}

impl std::fmt::Display for FailureTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A rejected job request. Nothing is persisted when this is returned.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{tag}: {message}")]
pub struct ValidationError {
    pub tag: FailureTag,
    pub message: String,
    /// Operator guidance, when a concrete alternative exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
}

impl ValidationError {
    pub fn new(tag: FailureTag, message: impl Into<String>) -> Self {
        Self {
            tag,
            message: message.into(),
            recommended_action: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.recommended_action = Some(action.into());
        self
    }
}
