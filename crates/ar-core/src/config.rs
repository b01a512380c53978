//! Options handed over by the catalog layer, plus the profiles derived from them.

use crate::assets::normalize_sources;
use crate::capability::{EngineKind, EngineOverride, DEFAULT_ENGINE_PRIORITY};
use crate::constants::{BRIGHTNESS_MAX, BRIGHTNESS_MIN};
use crate::error::ArError;
use crate::status::StatusLabels;
use fnv::FnvHashMap;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum OcclusionMode {
    #[default]
    #[serde(rename = "depth-then-segmentation")]
    DepthThenSegmentation,
    #[serde(rename = "segmentation-only", alias = "segmentation")]
    SegmentationOnly,
    #[serde(rename = "segmentation-plus-objects", alias = "objects")]
    SegmentationPlusObjects,
    #[serde(rename = "off")]
    Off,
}

impl OcclusionMode {
    pub fn allows_depth(self) -> bool {
        self == OcclusionMode::DepthThenSegmentation
    }

    pub fn uses_detector(self) -> bool {
        self == OcclusionMode::SegmentationPlusObjects
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum PerformanceMode {
    #[serde(rename = "quality", alias = "high")]
    Quality,
    #[default]
    #[serde(rename = "balanced", alias = "medium")]
    Balanced,
    #[serde(rename = "battery-saver", alias = "low")]
    BatterySaver,
}

/// Budgets that follow from a [`PerformanceMode`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerformanceProfile {
    /// Minimum time between two segmentation runs.
    pub segmentation_interval: Duration,
    /// Scale applied to the camera frame before it is fed to the models.
    pub input_scale: f32,
    /// Longest side of the planar fallback's render buffers, in pixels.
    pub fallback_max_side: u32,
}

impl PerformanceMode {
    pub fn profile(self) -> PerformanceProfile {
        match self {
            PerformanceMode::Quality => PerformanceProfile {
                segmentation_interval: Duration::from_millis(250),
                input_scale: 1.0,
                fallback_max_side: 960,
            },
            PerformanceMode::Balanced => PerformanceProfile {
                segmentation_interval: Duration::from_millis(400),
                input_scale: 0.75,
                fallback_max_side: 720,
            },
            PerformanceMode::BatterySaver => PerformanceProfile {
                segmentation_interval: Duration::from_millis(800),
                input_scale: 0.5,
                fallback_max_side: 480,
            },
        }
    }
}

pub const DEFAULT_SEGMENTER_URLS: [&str; 1] = [
    "https://storage.googleapis.com/mediapipe-models/image_segmenter/selfie_segmenter/float32/latest/selfie_segmenter.tflite",
];
pub const DEFAULT_DETECTOR_URLS: [&str; 2] = [
    "https://storage.googleapis.com/mediapipe-models/object_detector/lite-model/float16/latest/lite-model.tflite",
    "https://storage.googleapis.com/mediapipe-models/object_detector/efficientdet_lite0/float16/latest/efficientdet_lite0.tflite",
];

pub const DEFAULT_FOREGROUND_CLASSES: [&str; 9] = [
    "person",
    "chair",
    "couch",
    "sofa",
    "dining table",
    "potted plant",
    "tv",
    "bed",
    "bench",
];

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelSources {
    pub segmenter: Vec<String>,
    pub detector: Vec<String>,
}

impl Default for ModelSources {
    fn default() -> Self {
        Self {
            segmenter: DEFAULT_SEGMENTER_URLS.iter().map(|s| s.to_string()).collect(),
            detector: DEFAULT_DETECTOR_URLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub image_url: String,
    pub width_cm: f32,
    pub height_cm: f32,
    pub tiling: bool,
    pub repeat_x: u32,
    pub repeat_y: u32,
    pub brightness: f32,
    pub engine_override: EngineOverride,
    #[serde(deserialize_with = "engine_priority")]
    pub engine_priority: Vec<EngineKind>,
    pub occlusion_mode: OcclusionMode,
    pub performance_mode: PerformanceMode,
    pub model_sources: ModelSources,
    pub foreground_classes: Vec<String>,
    pub max_texture_resolution: u32,
    pub debug: bool,
    pub strings: FnvHashMap<String, String>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            image_url: String::new(),
            width_cm: 100.0,
            height_cm: 250.0,
            tiling: false,
            repeat_x: 1,
            repeat_y: 1,
            brightness: 1.0,
            engine_override: EngineOverride::Auto,
            engine_priority: DEFAULT_ENGINE_PRIORITY.to_vec(),
            occlusion_mode: OcclusionMode::default(),
            performance_mode: PerformanceMode::default(),
            model_sources: ModelSources::default(),
            foreground_classes: DEFAULT_FOREGROUND_CLASSES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_texture_resolution: 4096,
            debug: false,
            strings: FnvHashMap::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PriorityInput {
    List(Vec<String>),
    Csv(String),
}

/// Accepts a list or a comma-separated string; unknown names are dropped and
/// an empty result falls back to the default order.
fn engine_priority<'de, D>(deserializer: D) -> Result<Vec<EngineKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let names = match PriorityInput::deserialize(deserializer)? {
        PriorityInput::List(list) => list,
        PriorityInput::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };
    Ok(parse_priority(names.iter().map(String::as_str)))
}

pub fn parse_priority<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<EngineKind> {
    let mut out: Vec<EngineKind> = Vec::with_capacity(2);
    for name in names {
        match name.parse::<EngineKind>() {
            Ok(kind) if !out.contains(&kind) => out.push(kind),
            Ok(_) => {}
            Err(_) => log::debug!("[config] ignoring engine '{}'", name.trim()),
        }
    }
    if out.is_empty() {
        DEFAULT_ENGINE_PRIORITY.to_vec()
    } else {
        out
    }
}

impl PreviewConfig {
    pub fn from_json(json: &str) -> Result<Self, ArError> {
        serde_json::from_str::<PreviewConfig>(json)
            .map(PreviewConfig::sanitized)
            .map_err(|e| ArError::InvalidConfig(e.to_string()))
    }

    /// Clamp numeric options into usable ranges and normalize model URLs.
    pub fn sanitized(mut self) -> Self {
        self.image_url = self.image_url.trim().to_string();
        self.width_cm = finite_or(self.width_cm, 100.0).max(10.0);
        self.height_cm = finite_or(self.height_cm, 250.0).max(10.0);
        self.repeat_x = self.repeat_x.clamp(1, 20);
        self.repeat_y = self.repeat_y.clamp(1, 20);
        self.brightness = finite_or(self.brightness, 1.0).clamp(BRIGHTNESS_MIN, BRIGHTNESS_MAX);
        self.max_texture_resolution = self.max_texture_resolution.clamp(256, 8192);
        if self.engine_priority.is_empty() {
            self.engine_priority = DEFAULT_ENGINE_PRIORITY.to_vec();
        }
        self.model_sources.segmenter = normalize_sources(&self.model_sources.segmenter);
        self.model_sources.detector = normalize_sources(&self.model_sources.detector);
        let defaults = ModelSources::default();
        if self.model_sources.segmenter.is_empty() {
            self.model_sources.segmenter = defaults.segmenter;
        }
        if self.model_sources.detector.is_empty() {
            self.model_sources.detector = defaults.detector;
        }
        self.foreground_classes = self
            .foreground_classes
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        self
    }

    pub fn wallpaper(&self) -> WallpaperSpec {
        let (tile_x, tile_y) = if self.tiling {
            (self.repeat_x.max(1), self.repeat_y.max(1))
        } else {
            (1, 1)
        };
        WallpaperSpec {
            image_url: self.image_url.clone(),
            width_m: self.width_cm / 100.0,
            height_m: self.height_cm / 100.0,
            tile_x,
            tile_y,
            brightness: self.brightness,
        }
    }

    pub fn labels(&self) -> StatusLabels {
        StatusLabels::new(self.strings.clone())
    }

    pub fn profile(&self) -> PerformanceProfile {
        self.performance_mode.profile()
    }
}

fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

/// Immutable description of the product being previewed.
#[derive(Clone, Debug, PartialEq)]
pub struct WallpaperSpec {
    pub image_url: String,
    pub width_m: f32,
    pub height_m: f32,
    pub tile_x: u32,
    pub tile_y: u32,
    pub brightness: f32,
}

impl WallpaperSpec {
    /// Physical width over height.
    pub fn aspect(&self) -> f32 {
        self.width_m / self.height_m.max(f32::EPSILON)
    }
}

impl Default for WallpaperSpec {
    fn default() -> Self {
        PreviewConfig::default().wallpaper()
    }
}
