//! Proxy-profile registry.
//!
//! A profile binds a symbolic id to an engine, codec, container, resolution
//! policy and any further engine parameters. The validator requires the
//! profile's engine to equal the engine the source routes to.

use forge_models::{Container, Engine, ResolutionPolicy, VideoCodec};

/// A named, engine-bound bundle of encoding parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyProfile {
    pub id: &'static str,
    pub engine: Engine,
    pub codec: VideoCodec,
    pub container: Container,
    pub resolution: ResolutionPolicy,
    /// Extra encoder arguments appended verbatim to the FFmpeg argv.
    pub extra_args: &'static [&'static str],
    pub description: &'static str,
}

/// The static registry. Ordering is stable for deterministic listings.
const PROFILES: &[ProxyProfile] = &[
    ProxyProfile {
        id: "proxy_h264_low",
        engine: Engine::Ffmpeg,
        codec: VideoCodec::H264,
        container: Container::Mp4,
        resolution: ResolutionPolicy::Half,
        extra_args: &["-crf", "28", "-preset", "faster"],
        description: "Half-size H.264 viewing copy, low bitrate",
    },
    ProxyProfile {
        id: "proxy_h264_medium",
        engine: Engine::Ffmpeg,
        codec: VideoCodec::H264,
        container: Container::Mp4,
        resolution: ResolutionPolicy::Half,
        extra_args: &["-crf", "22", "-preset", "medium"],
        description: "Half-size H.264 viewing copy, medium bitrate",
    },
    ProxyProfile {
        id: "proxy_h265_medium",
        engine: Engine::Ffmpeg,
        codec: VideoCodec::H265,
        container: Container::Mp4,
        resolution: ResolutionPolicy::Half,
        extra_args: &["-crf", "26", "-preset", "medium", "-tag:v", "hvc1"],
        description: "Half-size H.265 viewing copy",
    },
    ProxyProfile {
        id: "proxy_prores_proxy",
        engine: Engine::Ffmpeg,
        codec: VideoCodec::Prores,
        container: Container::Mov,
        resolution: ResolutionPolicy::Half,
        extra_args: &["-profile:v", "0"],
        description: "ProRes 422 Proxy for editorial",
    },
    ProxyProfile {
        id: "proxy_dnxhr_lb",
        engine: Engine::Ffmpeg,
        codec: VideoCodec::Dnxhr,
        container: Container::Mov,
        resolution: ResolutionPolicy::Half,
        extra_args: &["-profile:v", "dnxhr_lb"],
        description: "DNxHR LB for Avid-adjacent workflows",
    },
    ProxyProfile {
        id: "proxy_prores_proxy_resolve",
        engine: Engine::Resolve,
        codec: VideoCodec::Prores,
        container: Container::Mov,
        resolution: ResolutionPolicy::Half,
        extra_args: &[],
        description: "ProRes 422 Proxy rendered through Resolve (camera RAW sources)",
    },
    ProxyProfile {
        id: "proxy_dnxhr_resolve",
        engine: Engine::Resolve,
        codec: VideoCodec::Dnxhr,
        container: Container::Mxf,
        resolution: ResolutionPolicy::Half,
        extra_args: &[],
        description: "DNxHR LB rendered through Resolve (camera RAW sources)",
    },
];

/// Look up a profile by id.
pub fn find_profile(id: &str) -> Option<&'static ProxyProfile> {
    PROFILES.iter().find(|p| p.id == id)
}

/// All registered profiles in stable order.
pub fn list_profiles() -> &'static [ProxyProfile] {
    PROFILES
}
