//! JobSpec and request validation.
//!
//! Rejects malformed jobs before any side effect. Every refusal carries a
//! taxonomy tag and, where a concrete alternative exists, a recommended
//! action.

use std::path::Path;

use forge_media::{check_coherence, find_profile, has_uniquifying_token, route, EngineRoute, MediaInfo, ProxyProfile};
use forge_models::{
    AudioCodec, AudioSettings, Container, DeliverSettings, Engine, FailureTag, FileSettings,
    FpsMode, JobSpec, ResolutionPolicy, ValidationError, VideoCodec, VideoSettings,
};

/// Reject empty source lists, missing paths and non-regular files.
pub fn validate_sources(sources: &[impl AsRef<Path>]) -> Result<(), ValidationError> {
    if sources.is_empty() {
        return Err(ValidationError::new(
            FailureTag::SourceMissingOrNotFile,
            "source_paths is empty; a job needs at least one clip",
        ));
    }

    for source in sources {
        let source = source.as_ref();
        if !source.is_absolute() {
            return Err(ValidationError::new(
                FailureTag::SourceMissingOrNotFile,
                format!("source path is not absolute: {}", source.display()),
            ));
        }
        if !source.exists() {
            return Err(ValidationError::new(
                FailureTag::SourceMissingOrNotFile,
                format!("source path does not exist: {}", source.display()),
            ));
        }
        if !source.is_file() {
            return Err(ValidationError::new(
                FailureTag::SourceMissingOrNotFile,
                format!("source path is not a regular file: {}", source.display()),
            ));
        }
    }
    Ok(())
}

/// The output directory must exist and be writable before any job is built.
pub fn validate_output_dir(dir: &Path) -> Result<(), ValidationError> {
    if !dir.is_dir() {
        return Err(ValidationError::new(
            FailureTag::SourceMissingOrNotFile,
            format!("output directory does not exist: {}", dir.display()),
        ));
    }
    let writable = std::fs::metadata(dir)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false);
    if !writable {
        return Err(ValidationError::new(
            FailureTag::SourceMissingOrNotFile,
            format!("output directory is not writable: {}", dir.display()),
        ));
    }
    Ok(())
}

/// Multi-clip jobs need a uniquifying token; single-clip jobs are exempt.
pub fn validate_naming_template(template: &str, clip_count: usize) -> Result<(), ValidationError> {
    if clip_count > 1 && !has_uniquifying_token(template) {
        return Err(ValidationError::new(
            FailureTag::NamingTemplateAmbiguous,
            format!(
                "naming template '{template}' has no uniquifying token for a {clip_count}-clip job"
            ),
        )
        .with_action("add {index} or {source_name} to the template"));
    }
    Ok(())
}

/// Route one source through the capability matrix.
///
/// The container is the (normalised) file extension; the codec comes from
/// the ingest probe. Camera RAW wrappers route without needing a probe.
pub fn route_source(path: &Path, info: Option<&MediaInfo>) -> Result<Engine, ValidationError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    let codec = info.map(|i| i.codec.as_str()).unwrap_or("");
    let decision = route(&ext, codec);

    // Probe-less sources are only acceptable when the wrapper alone decides.
    if info.is_none() && !matches!(decision, EngineRoute::Resolve) {
        return Err(ValidationError::new(
            FailureTag::SourceUnsupported,
            format!(
                "could not probe {}; the file may be corrupt or its format unsupported",
                path.display()
            ),
        )
        .with_action("verify the file plays locally, or route camera RAW to Resolve"));
    }

    match decision {
        EngineRoute::Ffmpeg => Ok(Engine::Ffmpeg),
        EngineRoute::Resolve => Ok(Engine::Resolve),
        EngineRoute::Rejected {
            reason,
            recommended_action,
        } => Err(ValidationError::new(FailureTag::SourceUnsupported, reason)
            .with_action(recommended_action)),
        EngineRoute::Unknown { reason } => Err(ValidationError::new(
            FailureTag::SourceUnsupported,
            reason,
        )
        .with_action("transcode to a standard delivery codec or use Resolve for camera RAW")),
    }
}

/// The profile's declared engine must equal the engine the source routes to.
pub fn validate_profile_engine(
    profile: &ProxyProfile,
    routed: Engine,
) -> Result<(), ValidationError> {
    if profile.engine == routed {
        return Ok(());
    }
    Err(ValidationError::new(
        FailureTag::ProxyProfileMismatch,
        format!(
            "profile '{}' declares engine '{}' but the source routes to '{}'",
            profile.id, profile.engine, routed
        ),
    )
    .with_action(format!("pick a profile bound to engine '{routed}'")))
}

/// Look up a profile id, failing with the taxonomy tag.
pub fn require_profile(id: &str) -> Result<&'static ProxyProfile, ValidationError> {
    find_profile(id).ok_or_else(|| {
        ValidationError::new(
            FailureTag::ProxyProfileMismatch,
            format!("unknown proxy profile '{id}'"),
        )
    })
}

/// Build deliver settings from a parsed JobSpec, enforcing codec/container
/// coherence and profile existence. Path checks are separate.
pub fn settings_from_jobspec(spec: &JobSpec) -> Result<DeliverSettings, ValidationError> {
    let codec = VideoCodec::parse(&spec.codec).ok_or_else(|| {
        ValidationError::new(
            FailureTag::CodecContainerMismatch,
            format!("unknown delivery codec '{}'", spec.codec),
        )
    })?;
    let container = Container::parse(&spec.container).ok_or_else(|| {
        ValidationError::new(
            FailureTag::CodecContainerMismatch,
            format!("unknown container '{}'", spec.container),
        )
    })?;
    check_coherence(codec, container)?;

    let resolution = ResolutionPolicy::parse(&spec.resolution).ok_or_else(|| {
        ValidationError::new(
            FailureTag::CodecContainerMismatch,
            format!("unknown resolution policy '{}'", spec.resolution),
        )
    })?;

    let profile = require_profile(&spec.proxy_profile)?;

    let fps = match spec.fps_mode.as_deref() {
        None | Some("source") => FpsMode::Source,
        Some("explicit") => {
            let fps = spec.fps_explicit.ok_or_else(|| {
                ValidationError::new(
                    FailureTag::CodecContainerMismatch,
                    "fps_mode 'explicit' requires fps_explicit",
                )
            })?;
            FpsMode::Explicit { fps }
        }
        Some(other) => {
            return Err(ValidationError::new(
                FailureTag::CodecContainerMismatch,
                format!("unknown fps_mode '{other}'"),
            ))
        }
    };

    Ok(DeliverSettings {
        output_dir: spec.output_directory.clone(),
        video: VideoSettings { codec },
        audio: AudioSettings {
            codec: AudioCodec::Aac,
        },
        file: FileSettings {
            container,
            naming_template: spec.naming_template.clone(),
            prefix: None,
            suffix: None,
            preserve_source_dirs: false,
            preserve_dir_levels: 0,
        },
        resolution,
        fps,
        engine: Some(profile.engine),
    })
}
