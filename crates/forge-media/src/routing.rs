//! Capability matrix: static source acceptance and engine routing.
//!
//! A pure function maps (normalised container, normalised codec) to an
//! engine. There is no implicit fallback in either direction: standard
//! delivery codecs go to FFmpeg, camera-proprietary formats go to Resolve,
//! and anything else fails conservatively with an explicit message.

use forge_models::{Container, Engine, FailureTag, ValidationError, VideoCodec};

/// Routing decision for a (container, codec) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineRoute {
    Ffmpeg,
    Resolve,
    /// The pair is recognised and refused.
    Rejected {
        reason: String,
        recommended_action: String,
    },
    /// The pair is not in the matrix; refused conservatively.
    Unknown { reason: String },
}

impl EngineRoute {
    /// The engine this route resolves to, if any.
    pub fn engine(&self) -> Option<Engine> {
        match self {
            EngineRoute::Ffmpeg => Some(Engine::Ffmpeg),
            EngineRoute::Resolve => Some(Engine::Resolve),
            _ => None,
        }
    }
}

/// Lowercase and strip a single leading dot.
fn normalise(s: &str) -> String {
    s.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Camera-proprietary codec names that require Resolve.
const RAW_CODECS: &[&str] = &[
    "arriraw",
    "redcode",
    "braw",
    "prores_raw",
    "prores raw",
    "cinemadng",
    "x-ocn",
    "xocn",
];

/// Containers that are themselves camera RAW wrappers.
const RAW_CONTAINERS: &[&str] = &["r3d", "ari", "arri", "braw", "crm", "cine", "dng", "cdng"];

/// Standard delivery containers FFmpeg handles.
const FFMPEG_CONTAINERS: &[&str] = &["mp4", "mov", "mkv", "mxf"];

/// Map a (container, codec) pair to an engine.
///
/// Input is normalised (lowercased, leading dot stripped) before lookup, so
/// `.MOV`/`ProRes` and `mov`/`prores` are equivalent.
pub fn route(container: &str, codec: &str) -> EngineRoute {
    let container = normalise(container);
    let codec = normalise(codec);

    // Camera RAW goes to Resolve, by codec or by wrapper.
    if RAW_CODECS.contains(&codec.as_str()) || RAW_CONTAINERS.contains(&container.as_str()) {
        return EngineRoute::Resolve;
    }

    if codec.is_empty() || codec == "none" {
        return EngineRoute::Rejected {
            reason: format!("no video stream detected in '{container}' source"),
            recommended_action: "verify the file contains a video track".to_string(),
        };
    }

    let Some(video_codec) = VideoCodec::parse(&codec) else {
        return EngineRoute::Unknown {
            reason: format!(
                "unknown codec/container pair ({codec}, {container}); refusing to guess an engine"
            ),
        };
    };

    if !FFMPEG_CONTAINERS.contains(&container.as_str()) {
        return EngineRoute::Unknown {
            reason: format!(
                "unknown codec/container pair ({codec}, {container}); refusing to guess an engine"
            ),
        };
    }

    let parsed_container = Container::parse(&container)
        .expect("FFMPEG_CONTAINERS entries always parse");

    match check_coherence(video_codec, parsed_container) {
        Ok(()) => EngineRoute::Ffmpeg,
        Err(err) => EngineRoute::Rejected {
            reason: err.message,
            recommended_action: err.recommended_action.unwrap_or_default(),
        },
    }
}

/// Valid containers per delivery codec.
///
/// DNxHD is MXF-only (MOV carriage is non-standard); DNxHR accepts MOV or
/// MXF; ProRes is MOV-only; H.264/H.265 accept MP4, MOV and MKV.
pub fn valid_containers(codec: VideoCodec) -> &'static [Container] {
    match codec {
        VideoCodec::H264 | VideoCodec::H265 => {
            &[Container::Mp4, Container::Mov, Container::Mkv]
        }
        VideoCodec::Prores => &[Container::Mov],
        VideoCodec::Dnxhr => &[Container::Mov, Container::Mxf],
        VideoCodec::Dnxhd => &[Container::Mxf],
    }
}

/// Enforce the codec/container coherence table.
///
/// Violations produce deterministic error strings that name both sides and
/// suggest the correct pairing.
pub fn check_coherence(codec: VideoCodec, container: Container) -> Result<(), ValidationError> {
    let valid = valid_containers(codec);
    if valid.contains(&container) {
        return Ok(());
    }

    let alternatives: Vec<&str> = valid.iter().map(|c| c.as_str()).collect();
    Err(ValidationError::new(
        FailureTag::CodecContainerMismatch,
        format!(
            "codec '{}' is not valid in container '{}'",
            codec.as_str(),
            container.as_str()
        ),
    )
    .with_action(format!(
        "use container '{}' for codec '{}'",
        alternatives.join("' or '"),
        codec.as_str()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_delivery_routes_to_ffmpeg() {
        assert_eq!(route("mp4", "h264"), EngineRoute::Ffmpeg);
        assert_eq!(route("mkv", "hevc"), EngineRoute::Ffmpeg);
        assert_eq!(route("mov", "prores"), EngineRoute::Ffmpeg);
        assert_eq!(route("mxf", "dnxhd"), EngineRoute::Ffmpeg);
        assert_eq!(route("mov", "dnxhr"), EngineRoute::Ffmpeg);
    }

    #[test]
    fn test_normalisation() {
        assert_eq!(route(".MOV", "ProRes"), EngineRoute::Ffmpeg);
        assert_eq!(route(".MP4", "H.264"), EngineRoute::Ffmpeg);
    }

    #[test]
    fn test_camera_raw_routes_to_resolve() {
        assert_eq!(route("r3d", "redcode"), EngineRoute::Resolve);
        assert_eq!(route("braw", "braw"), EngineRoute::Resolve);
        assert_eq!(route("ari", "arriraw"), EngineRoute::Resolve);
        assert_eq!(route("mov", "prores_raw"), EngineRoute::Resolve);
        assert_eq!(route("dng", "cinemadng"), EngineRoute::Resolve);
        assert_eq!(route("mxf", "x-ocn"), EngineRoute::Resolve);
    }

    #[test]
    fn test_dnxhd_in_mov_is_rejected_with_action() {
        match route("mov", "dnxhd") {
            EngineRoute::Rejected {
                reason,
                recommended_action,
            } => {
                assert!(reason.contains("dnxhd"));
                assert!(reason.contains("mov"));
                assert!(recommended_action.contains("mxf"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_prores_outside_mov_is_rejected() {
        assert!(matches!(route("mp4", "prores"), EngineRoute::Rejected { .. }));
        assert!(matches!(route("mkv", "prores"), EngineRoute::Rejected { .. }));
    }

    #[test]
    fn test_unknown_pair_fails_conservatively() {
        match route("webm", "vp9") {
            EngineRoute::Unknown { reason } => {
                assert!(reason.contains("vp9"));
                assert!(reason.contains("webm"));
            }
            other => panic!("expected unknown, got {other:?}"),
        }
        assert!(matches!(route("avi", "cinepak"), EngineRoute::Unknown { .. }));
    }

    #[test]
    fn test_no_video_stream_rejected() {
        assert!(matches!(route("mov", "none"), EngineRoute::Rejected { .. }));
        assert!(matches!(route("mov", ""), EngineRoute::Rejected { .. }));
    }

    #[test]
    fn test_coherence_table() {
        assert!(check_coherence(VideoCodec::H264, Container::Mkv).is_ok());
        assert!(check_coherence(VideoCodec::Dnxhr, Container::Mxf).is_ok());

        let err = check_coherence(VideoCodec::Dnxhd, Container::Mov).unwrap_err();
        assert_eq!(err.tag, FailureTag::CodecContainerMismatch);
        assert!(err.message.contains("dnxhd"));
        assert!(err.message.contains("mov"));
        assert!(err.recommended_action.unwrap().contains("mxf"));
    }
}
