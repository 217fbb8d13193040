//! DaVinci Resolve adapter.
//!
//! Resolve is driven through an out-of-process scripting bridge
//! (`FORGE_RESOLVE_BRIDGE` or `forge-resolve-bridge` on PATH) that speaks
//! JSON over stdin/stdout. Availability is checked exactly once per job, no
//! retries. Progress is indeterminate by contract: Resolve does not stream a
//! usable percent, so stages advance but percent is never invented.

use std::path::PathBuf;
use std::process::Stdio;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use forge_models::{
    DeliveryStage, Engine, FailureTag, ResolveEdition, SkipMetadata, ValidationError,
};

use crate::engine::{
    EncodeEngine, EncodeFuture, EncodePlan, ExecutionOutcome, ExecutionResult, ProgressFn,
    ProgressSample,
};

/// Bound on the availability probe.
const PROBE_TIMEOUT_SECS: u64 = 10;

/// Presets listed in a preset-missing error before truncation.
pub const MAX_LISTED_PRESETS: usize = 10;

/// Environment variable pointing at the scripting bridge executable.
pub const BRIDGE_ENV: &str = "FORGE_RESOLVE_BRIDGE";

/// Result of the once-per-job availability check.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveAvailability {
    pub available: bool,
    /// Why Resolve is unavailable; None when available.
    pub reason: Option<String>,
    pub version: Option<String>,
    pub edition: Option<ResolveEdition>,
    pub render_presets: Vec<String>,
    pub bridge: Option<PathBuf>,
}

impl ResolveAvailability {
    fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: Some(reason.into()),
            version: None,
            edition: None,
            render_presets: Vec::new(),
            bridge: None,
        }
    }
}

/// JSON payload returned by `<bridge> probe`.
#[derive(Debug, Deserialize)]
struct BridgeProbe {
    version: Option<String>,
    edition: Option<String>,
    #[serde(default)]
    render_presets: Vec<String>,
}

/// JSON payload sent to `<bridge> render` on stdin.
#[derive(Debug, Serialize)]
struct BridgeRenderRequest<'a> {
    source: &'a str,
    output: &'a str,
    preset: Option<&'a str>,
    container: &'a str,
    codec: &'a str,
}

fn find_bridge() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(BRIDGE_ENV) {
        let path = PathBuf::from(path);
        return path.is_file().then_some(path);
    }
    which::which("forge-resolve-bridge").ok()
}

/// Probe Resolve availability through the scripting bridge.
///
/// Invoked exactly once per job by the ingestion path; an unavailable
/// Resolve fails the job immediately with zero tasks created.
pub async fn check_resolve_availability() -> ResolveAvailability {
    let Some(bridge) = find_bridge() else {
        return ResolveAvailability::unavailable(
            "Resolve scripting bridge not found (set FORGE_RESOLVE_BRIDGE or install forge-resolve-bridge)",
        );
    };

    let probe = Command::new(&bridge)
        .arg("probe")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let output = match tokio::time::timeout(
        std::time::Duration::from_secs(PROBE_TIMEOUT_SECS),
        probe,
    )
    .await
    {
        Err(_) => {
            return ResolveAvailability::unavailable(format!(
                "Resolve availability probe timed out after {PROBE_TIMEOUT_SECS}s"
            ))
        }
        Ok(Err(err)) => {
            return ResolveAvailability::unavailable(format!(
                "failed to run Resolve bridge {}: {err}",
                bridge.display()
            ))
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        return ResolveAvailability::unavailable(format!(
            "Resolve bridge probe exited with code {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let probe: BridgeProbe = match serde_json::from_slice(&output.stdout) {
        Ok(probe) => probe,
        Err(err) => {
            return ResolveAvailability::unavailable(format!(
                "Resolve bridge probe returned invalid JSON: {err}"
            ))
        }
    };

    debug!(version = ?probe.version, edition = ?probe.edition, "resolve probe ok");
    ResolveAvailability {
        available: true,
        reason: None,
        version: probe.version,
        edition: probe.edition.as_deref().and_then(ResolveEdition::parse),
        render_presets: probe.render_presets,
        bridge: Some(bridge),
    }
}

/// Validate that the requested render preset exists.
///
/// The error lists the available presets, truncated at a fixed maximum.
pub fn validate_render_preset(
    requested: &str,
    available: &[String],
) -> Result<(), ValidationError> {
    if available.iter().any(|p| p == requested) {
        return Ok(());
    }

    let mut listed: Vec<&str> = available
        .iter()
        .take(MAX_LISTED_PRESETS)
        .map(String::as_str)
        .collect();
    listed.sort_unstable();
    let suffix = if available.len() > MAX_LISTED_PRESETS {
        format!(" (and {} more)", available.len() - MAX_LISTED_PRESETS)
    } else {
        String::new()
    };

    Err(ValidationError::new(
        FailureTag::ResolvePresetMissing,
        format!(
            "Resolve render preset '{requested}' not found; available: [{}]{suffix}",
            listed.join(", ")
        ),
    ))
}

/// Check the job's edition requirement against the detected edition.
///
/// Returns skip metadata when the job must be skipped; `Either` never skips.
pub fn edition_gate(
    required: ResolveEdition,
    availability: &ResolveAvailability,
) -> Option<SkipMetadata> {
    let detected = availability.edition.unwrap_or(ResolveEdition::Studio);
    if required.accepts(detected) {
        return None;
    }
    Some(SkipMetadata {
        reason: format!("resolve_{}_not_installed", required.as_str()),
        detected_edition: detected.as_str().to_string(),
        required_edition: required.as_str().to_string(),
        resolve_version: availability.version.clone(),
    })
}

/// Resolve encode adapter, constructed from a successful availability check.
#[derive(Debug, Clone)]
pub struct ResolveAdapter {
    bridge: PathBuf,
    version: Option<String>,
}

impl ResolveAdapter {
    pub fn new(availability: &ResolveAvailability) -> Option<Self> {
        Some(Self {
            bridge: availability.bridge.clone()?,
            version: availability.version.clone(),
        })
    }

    fn encoder_id(&self) -> String {
        match &self.version {
            Some(v) => format!("resolve:{v}"),
            None => "resolve".to_string(),
        }
    }

    async fn run(
        &self,
        plan: EncodePlan,
        mut cancel: watch::Receiver<bool>,
        progress: ProgressFn,
    ) -> ExecutionResult {
        let started_at = Utc::now();

        let fail = |reason: String| ExecutionResult {
            outcome: ExecutionOutcome::Failed {
                reason,
                tag: FailureTag::EngineFailure,
            },
            output_path: None,
            argv: Vec::new(),
            started_at,
            completed_at: Utc::now(),
            encoder: Some(self.encoder_id()),
        };

        progress(indeterminate(&plan, DeliveryStage::Starting));

        let source = plan.source.to_string_lossy();
        let output = plan.output.to_string_lossy();
        let request = BridgeRenderRequest {
            source: &source,
            output: &output,
            preset: plan.resolve_preset.as_deref(),
            container: plan.container.as_str(),
            codec: plan.codec.as_str(),
        };
        let body = serde_json::to_vec(&request).expect("render request serializes");

        let mut child = match Command::new(&self.bridge)
            .arg("render")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => return fail(format!("failed to spawn Resolve bridge: {err}")),
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(&body).await {
                let _ = child.kill().await;
                return fail(format!("failed to send render request: {err}"));
            }
            // Closing stdin signals end-of-request.
        }

        progress(indeterminate(&plan, DeliveryStage::Encoding));

        let status = tokio::select! {
            status = child.wait() => status,
            _ = flag_raised(&mut cancel) => {
                info!(task_id = %plan.task_id, "cancellation requested, stopping Resolve render");
                let _ = child.kill().await;
                if plan.output.exists() {
                    if let Err(err) = std::fs::remove_file(&plan.output) {
                        warn!("failed to remove partial Resolve output: {err}");
                    }
                }
                return ExecutionResult {
                    outcome: ExecutionOutcome::Cancelled,
                    output_path: None,
                    argv: Vec::new(),
                    started_at,
                    completed_at: Utc::now(),
                    encoder: Some(self.encoder_id()),
                };
            }
        };

        let status = match status {
            Ok(status) => status,
            Err(err) => return fail(format!("waiting on Resolve bridge failed: {err}")),
        };

        if !status.success() {
            return fail(format!(
                "Resolve render exited with code {}",
                status.code().unwrap_or(-1)
            ));
        }

        match std::fs::metadata(&plan.output) {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                return fail(format!(
                    "output_missing: {} absent or empty after Resolve render",
                    plan.output.display()
                ))
            }
        }

        progress(indeterminate(&plan, DeliveryStage::Finalizing));

        ExecutionResult {
            outcome: ExecutionOutcome::Success,
            output_path: Some(plan.output.clone()),
            argv: Vec::new(),
            started_at,
            completed_at: Utc::now(),
            encoder: Some(self.encoder_id()),
        }
    }
}

impl EncodeEngine for ResolveAdapter {
    fn engine(&self) -> Engine {
        Engine::Resolve
    }

    fn encode(
        &self,
        plan: EncodePlan,
        cancel: watch::Receiver<bool>,
        progress: ProgressFn,
    ) -> EncodeFuture<'_> {
        Box::pin(self.run(plan, cancel, progress))
    }
}

/// Stage-only progress: percent stays None, honestly.
fn indeterminate(plan: &EncodePlan, stage: DeliveryStage) -> ProgressSample {
    ProgressSample {
        task_id: plan.task_id.clone(),
        stage,
        percent: None,
        eta_seconds: None,
        encode_fps: None,
    }
}

async fn flag_raised(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_preset_validation_ok() {
        assert!(validate_render_preset("ProxyMedium", &presets(&["ProxyMedium", "H264Master"])).is_ok());
    }

    #[test]
    fn test_preset_validation_lists_available() {
        let err = validate_render_preset("Nope", &presets(&["A", "B"])).unwrap_err();
        assert_eq!(err.tag, FailureTag::ResolvePresetMissing);
        assert!(err.message.contains("Nope"));
        assert!(err.message.contains("A, B"));
    }

    #[test]
    fn test_preset_listing_is_truncated() {
        let many: Vec<String> = (0..25).map(|i| format!("Preset{i:02}")).collect();
        let err = validate_render_preset("Nope", &many).unwrap_err();
        assert!(err.message.contains("and 15 more"));
    }

    #[test]
    fn test_edition_gate_mismatch_produces_skip_metadata() {
        let availability = ResolveAvailability {
            available: true,
            reason: None,
            version: Some("18.6.4".to_string()),
            edition: Some(ResolveEdition::Studio),
            render_presets: Vec::new(),
            bridge: Some(PathBuf::from("/usr/local/bin/forge-resolve-bridge")),
        };

        let skip = edition_gate(ResolveEdition::Free, &availability).unwrap();
        assert_eq!(skip.reason, "resolve_free_not_installed");
        assert_eq!(skip.detected_edition, "studio");
        assert_eq!(skip.required_edition, "free");
        assert_eq!(skip.resolve_version.as_deref(), Some("18.6.4"));
    }

    #[test]
    fn test_edition_either_never_skips() {
        let availability = ResolveAvailability {
            available: true,
            reason: None,
            version: None,
            edition: Some(ResolveEdition::Free),
            render_presets: Vec::new(),
            bridge: None,
        };
        assert!(edition_gate(ResolveEdition::Either, &availability).is_none());
        assert!(edition_gate(ResolveEdition::Free, &availability).is_none());
    }
}
