//! Capability-based engine selection.

use crate::error::ArError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    #[serde(rename = "surface-tracking", alias = "webxr")]
    SurfaceTracking,
    #[serde(rename = "planar-fallback", alias = "canvas_fallback")]
    PlanarFallback,
}

pub const DEFAULT_ENGINE_PRIORITY: [EngineKind; 2] =
    [EngineKind::SurfaceTracking, EngineKind::PlanarFallback];

impl EngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::SurfaceTracking => "surface-tracking",
            EngineKind::PlanarFallback => "planar-fallback",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = ArError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "surface-tracking" | "webxr" => Ok(EngineKind::SurfaceTracking),
            "planar-fallback" | "canvas_fallback" => Ok(EngineKind::PlanarFallback),
            other => Err(ArError::InvalidConfig(format!("unknown engine '{other}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineOverride {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "surface-tracking", alias = "webxr")]
    SurfaceTracking,
    #[serde(rename = "planar-fallback", alias = "canvas_fallback")]
    PlanarFallback,
}

impl EngineOverride {
    pub fn engine(self) -> Option<EngineKind> {
        match self {
            EngineOverride::Auto => None,
            EngineOverride::SurfaceTracking => Some(EngineKind::SurfaceTracking),
            EngineOverride::PlanarFallback => Some(EngineKind::PlanarFallback),
        }
    }
}

/// Per-candidate feasibility check against the runtime environment.
///
/// Implementations may suspend (an immersive session query is a promise on
/// the web). Any error is read as "unavailable", never as fatal.
#[allow(async_fn_in_trait)]
pub trait CapabilityProbe {
    async fn probe(&self, kind: EngineKind) -> Result<bool, ArError>;
}

/// Facts an environment reports; the rules for each engine live here so
/// every front-end applies the same feasibility test.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnvironmentFacts {
    pub secure_context: bool,
    pub camera_api: bool,
    pub canvas_2d: bool,
    pub immersive_ar: bool,
}

impl EnvironmentFacts {
    pub fn supports(&self, kind: EngineKind) -> bool {
        match kind {
            EngineKind::SurfaceTracking => self.secure_context && self.immersive_ar,
            EngineKind::PlanarFallback => self.secure_context && self.camera_api && self.canvas_2d,
        }
    }
}

async fn is_available<P: CapabilityProbe>(probe: &P, kind: EngineKind) -> bool {
    match probe.probe(kind).await {
        Ok(available) => available,
        Err(e) => {
            log::warn!("[capability] probe for {} failed: {}", kind, e);
            false
        }
    }
}

/// Pick the engine for this session: an available override wins, otherwise
/// the first available entry of `priority`. `None` means unsupported device.
pub async fn select_engine<P: CapabilityProbe>(
    probe: &P,
    priority: &[EngineKind],
    engine_override: EngineOverride,
) -> Option<EngineKind> {
    if let Some(kind) = engine_override.engine() {
        if is_available(probe, kind).await {
            log::info!("[capability] using override {}", kind);
            return Some(kind);
        }
        log::info!("[capability] override {} unavailable, using priority list", kind);
    }
    for &kind in priority {
        if is_available(probe, kind).await {
            log::info!("[capability] selected {}", kind);
            return Some(kind);
        }
    }
    log::warn!("[capability] no engine available");
    None
}
