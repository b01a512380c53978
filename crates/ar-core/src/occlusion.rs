//! Occlusion pipeline: a per-pixel "real world is in front" signal from
//! either the depth sensor or a segmentation model.
//!
//! The strategy is picked once per session, depth first when the mode allows
//! it and the sensor is there. Failures never propagate: the pipeline falls
//! back to "no occlusion" and says so through its status.

use crate::config::{OcclusionMode, PerformanceProfile};
use crate::constants::{
    DETECTION_BOX_MARGIN, DETECTION_SCORE_THRESHOLD, MASK_DILATION_RADIUS, MASK_FEATHER_RADIUS,
    SEGMENTATION_CONFIDENCE_THRESHOLD, SEGMENTATION_OBJECTS_THRESHOLD,
};
use crate::depth::DepthFrame;
use crate::error::ArError;
use crate::image::{budget_size, RgbaImage};
use crate::mask::{same_label, Mask, TemporalSmoother};
use crate::status::{StatusEvent, StatusLabels, StatusState, Subsystem};
use instant::Instant;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OcclusionKind {
    Depth,
    Segmentation,
    None,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OcclusionBuffer {
    Empty,
    Depth(DepthFrame),
    Mask(Mask),
}

/// Result of one [`OcclusionPipeline::estimate`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct OcclusionFrame {
    pub kind: OcclusionKind,
    pub buffer: OcclusionBuffer,
    pub resolution: (u32, u32),
    pub scale_to_meters: Option<f32>,
}

impl OcclusionFrame {
    pub fn none(width: u32, height: u32) -> Self {
        Self {
            kind: OcclusionKind::None,
            buffer: OcclusionBuffer::Empty,
            resolution: (width, height),
            scale_to_meters: None,
        }
    }

    pub fn mask(&self) -> Option<&Mask> {
        match &self.buffer {
            OcclusionBuffer::Mask(m) => Some(m),
            _ => None,
        }
    }

    pub fn depth(&self) -> Option<&DepthFrame> {
        match &self.buffer {
            OcclusionBuffer::Depth(d) => Some(d),
            _ => None,
        }
    }
}

/// Axis-aligned rectangle in normalized `[0, 1]` image coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl NormRect {
    pub fn clamped(self) -> Self {
        Self {
            x0: self.x0.clamp(0.0, 1.0),
            y0: self.y0.clamp(0.0, 1.0),
            x1: self.x1.clamp(0.0, 1.0),
            y1: self.y1.clamp(0.0, 1.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectionBox {
    pub label: String,
    pub rect: NormRect,
    pub confidence: f32,
}

impl DetectionBox {
    /// Normalize a pixel-space `[x, y, width, height]` box from a frame of
    /// `source` size.
    pub fn from_pixels(label: impl Into<String>, bbox: [f32; 4], source: (u32, u32), confidence: f32) -> Self {
        let [x, y, w, h] = bbox;
        let (sw, sh) = (source.0.max(1) as f32, source.1.max(1) as f32);
        Self {
            label: label.into(),
            rect: NormRect {
                x0: x / sw,
                y0: y / sh,
                x1: (x + w) / sw,
                y1: (y + h) / sh,
            }
            .clamped(),
            confidence,
        }
    }

    pub fn expanded(&self, margin: f32) -> NormRect {
        NormRect {
            x0: self.rect.x0 - margin,
            y0: self.rect.y0 - margin,
            x1: self.rect.x1 + margin,
            y1: self.rect.y1 + margin,
        }
        .clamped()
    }
}

/// What a segmenter hands back.
#[derive(Clone, Debug, PartialEq)]
pub enum SegmentationOutput {
    /// Foreground probability per pixel.
    Confidence {
        width: u32,
        height: u32,
        values: Vec<f32>,
    },
    /// Category index per pixel plus the model's label table.
    Categories {
        width: u32,
        height: u32,
        data: Vec<u8>,
        labels: Vec<String>,
    },
}

pub trait Segmenter {
    fn segment(&mut self, frame: &RgbaImage, timestamp_ms: f64) -> Result<SegmentationOutput, ArError>;
}

pub trait ObjectDetector {
    fn detect(&mut self, frame: &RgbaImage, timestamp_ms: f64) -> Result<Vec<DetectionBox>, ArError>;
}

/// Minimum-interval gate allowing at most one inference in flight.
#[derive(Clone, Debug)]
pub struct InferenceGate {
    interval: Duration,
    last_start: Option<Instant>,
    in_flight: bool,
}

impl InferenceGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: None,
            in_flight: false,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        if self.in_flight {
            return false;
        }
        match self.last_start {
            None => true,
            Some(t) => now.saturating_duration_since(t) >= self.interval,
        }
    }

    /// Claim the slot if due.
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.in_flight = true;
        self.last_start = Some(now);
        true
    }

    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    Loading,
    Ready,
    Unavailable,
}

/// Tunables for the segmentation strategy.
#[derive(Clone, Debug)]
pub struct SegmentationSettings {
    pub threshold: f32,
    pub dilation: usize,
    pub feather: usize,
    pub box_margin: f32,
    pub min_score: f32,
    pub input_scale: f32,
    pub interval: Duration,
    pub foreground: Vec<String>,
}

impl SegmentationSettings {
    pub fn new(mode: OcclusionMode, profile: &PerformanceProfile, foreground: &[String]) -> Self {
        Self {
            threshold: if mode.uses_detector() {
                SEGMENTATION_OBJECTS_THRESHOLD
            } else {
                SEGMENTATION_CONFIDENCE_THRESHOLD
            },
            dilation: MASK_DILATION_RADIUS,
            feather: MASK_FEATHER_RADIUS,
            box_margin: DETECTION_BOX_MARGIN,
            min_score: DETECTION_SCORE_THRESHOLD,
            input_scale: profile.input_scale,
            interval: profile.segmentation_interval,
            foreground: foreground.to_vec(),
        }
    }
}

/// Segmentation strategy with detector supplement, dilation, temporal
/// smoothing and feathering. Between runs the last mask is reused.
pub struct SegmentationOcclusion {
    settings: SegmentationSettings,
    segmenter: Option<Box<dyn Segmenter>>,
    detector: Option<Box<dyn ObjectDetector>>,
    wants_detector: bool,
    state: ModelState,
    gate: InferenceGate,
    temporal: TemporalSmoother,
    cached: Option<Mask>,
    runs: u64,
}

impl SegmentationOcclusion {
    pub fn new(settings: SegmentationSettings, wants_detector: bool) -> Self {
        let gate = InferenceGate::new(settings.interval);
        Self {
            settings,
            segmenter: None,
            detector: None,
            wants_detector,
            state: ModelState::Loading,
            gate,
            temporal: TemporalSmoother::default(),
            cached: None,
            runs: 0,
        }
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn wants_detector(&self) -> bool {
        self.wants_detector
    }

    /// Install the loaded models. A missing detector only drops the box
    /// supplement.
    pub fn set_models(
        &mut self,
        segmenter: Box<dyn Segmenter>,
        detector: Option<Box<dyn ObjectDetector>>,
    ) {
        self.segmenter = Some(segmenter);
        self.detector = if self.wants_detector { detector } else { None };
        self.state = ModelState::Ready;
        log::info!(
            "[occlusion] segmentation ready (detector: {})",
            self.detector.is_some()
        );
    }

    pub fn mark_unavailable(&mut self, err: &ArError) {
        log::warn!("[occlusion] segmentation unavailable: {}", err);
        self.segmenter = None;
        self.detector = None;
        self.state = ModelState::Unavailable;
    }

    pub fn latest(&self) -> Option<&Mask> {
        self.cached.as_ref()
    }

    /// Turn one model output plus boxes into the next cached mask.
    pub fn ingest(
        &mut self,
        output: SegmentationOutput,
        boxes: &[DetectionBox],
    ) -> Result<(), ArError> {
        let mut mask = match output {
            SegmentationOutput::Confidence { width, height, values } => {
                Mask::from_confidence(width, height, &values, self.settings.threshold)
            }
            SegmentationOutput::Categories {
                width,
                height,
                data,
                labels,
            } => Mask::from_categories(width, height, &data, &labels, &self.settings.foreground),
        }
        .ok_or(ArError::Degenerate("segmentation size mismatch"))?;

        let kept: Vec<DetectionBox> = boxes
            .iter()
            .filter(|b| b.confidence >= self.settings.min_score)
            .filter(|b| self.settings.foreground.iter().any(|f| same_label(f, &b.label)))
            .cloned()
            .collect();
        mask.merge_boxes(&kept, self.settings.box_margin);
        mask.dilate(self.settings.dilation);
        self.cached = Some(self.temporal.apply(&mask));
        self.runs += 1;
        Ok(())
    }

    fn run_models(&mut self, frame: &RgbaImage, timestamp_ms: f64) -> Result<(), ArError> {
        let (w, h) = (
            ((frame.width() as f32 * self.settings.input_scale).round() as u32).max(1),
            ((frame.height() as f32 * self.settings.input_scale).round() as u32).max(1),
        );
        let input = frame.resampled(w, h);
        let Some(segmenter) = self.segmenter.as_mut() else {
            return Ok(());
        };
        let output = segmenter.segment(&input, timestamp_ms)?;
        let boxes = match self.detector.as_mut() {
            Some(detector) => detector.detect(&input, timestamp_ms).unwrap_or_else(|e| {
                log::warn!("[occlusion] detector failed: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        self.ingest(output, &boxes)
    }

    pub fn estimate(
        &mut self,
        frame: Option<&RgbaImage>,
        width: u32,
        height: u32,
        now: Instant,
        timestamp_ms: f64,
    ) -> OcclusionFrame {
        if self.state == ModelState::Ready {
            if let Some(frame) = frame.filter(|f| !f.is_empty()) {
                if self.gate.try_begin(now) {
                    if let Err(e) = self.run_models(frame, timestamp_ms) {
                        log::warn!("[occlusion] segmentation run failed: {}", e);
                    }
                    self.gate.finish();
                }
            }
        }
        match &self.cached {
            Some(mask) => {
                let out = mask.resampled(width, height).feathered(self.settings.feather);
                OcclusionFrame {
                    kind: OcclusionKind::Segmentation,
                    buffer: OcclusionBuffer::Mask(out),
                    resolution: (width, height),
                    scale_to_meters: None,
                }
            }
            None => OcclusionFrame::none(width, height),
        }
    }

    pub fn reset(&mut self) {
        self.cached = None;
        self.temporal.reset();
        self.gate = InferenceGate::new(self.settings.interval);
    }
}

/// Depth strategy. The frame is passed through in its raw encoding; the
/// compare happens per fragment at render time.
#[derive(Default)]
pub struct DepthOcclusion {
    frames: u64,
    misses: u64,
}

impl DepthOcclusion {
    pub fn estimate(&mut self, depth: Option<&DepthFrame>, width: u32, height: u32) -> OcclusionFrame {
        match depth {
            Some(frame) => {
                self.frames += 1;
                OcclusionFrame {
                    kind: OcclusionKind::Depth,
                    buffer: OcclusionBuffer::Depth(frame.clone()),
                    resolution: (frame.width, frame.height),
                    scale_to_meters: Some(frame.raw_to_meters),
                }
            }
            None => {
                self.misses += 1;
                OcclusionFrame::none(width, height)
            }
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames where the sensor had no reading for the view.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

enum Strategy {
    Depth(DepthOcclusion),
    Segmentation(SegmentationOcclusion),
    Off,
}

/// Inputs available to the pipeline this frame.
#[derive(Clone, Copy, Default)]
pub struct SourceFrame<'a> {
    pub camera: Option<&'a RgbaImage>,
    pub depth: Option<&'a DepthFrame>,
    pub timestamp_ms: f64,
}

pub struct OcclusionPipeline {
    mode: OcclusionMode,
    strategy: Strategy,
    max_side: u32,
}

impl OcclusionPipeline {
    /// Pick the strategy for this session.
    pub fn new(
        mode: OcclusionMode,
        depth_available: bool,
        settings: SegmentationSettings,
        max_side: u32,
    ) -> Self {
        let strategy = match mode {
            OcclusionMode::Off => Strategy::Off,
            OcclusionMode::DepthThenSegmentation if depth_available => {
                Strategy::Depth(DepthOcclusion::default())
            }
            _ => Strategy::Segmentation(SegmentationOcclusion::new(settings, mode.uses_detector())),
        };
        let pipeline = Self {
            mode,
            strategy,
            max_side,
        };
        log::info!("[occlusion] mode {:?}, strategy {:?}", mode, pipeline.kind());
        pipeline
    }

    pub fn mode(&self) -> OcclusionMode {
        self.mode
    }

    pub fn kind(&self) -> OcclusionKind {
        match self.strategy {
            Strategy::Depth(_) => OcclusionKind::Depth,
            Strategy::Segmentation(_) => OcclusionKind::Segmentation,
            Strategy::Off => OcclusionKind::None,
        }
    }

    /// True while the segmentation strategy is waiting for its models.
    pub fn needs_models(&self) -> bool {
        matches!(&self.strategy, Strategy::Segmentation(s) if s.state() == ModelState::Loading)
    }

    pub fn segmentation(&mut self) -> Option<&mut SegmentationOcclusion> {
        match &mut self.strategy {
            Strategy::Segmentation(s) => Some(s),
            _ => None,
        }
    }

    /// Segmentation models failed to load.
    pub fn models_failed(&mut self, err: &ArError) {
        if let Strategy::Segmentation(s) = &mut self.strategy {
            s.mark_unavailable(err);
        }
    }

    pub fn estimate(
        &mut self,
        source: SourceFrame<'_>,
        width: u32,
        height: u32,
        now: Instant,
    ) -> OcclusionFrame {
        let (w, h) = budget_size(width, height, self.max_side);
        match &mut self.strategy {
            Strategy::Depth(d) => d.estimate(source.depth, w, h),
            Strategy::Segmentation(s) => s.estimate(source.camera, w, h, now, source.timestamp_ms),
            Strategy::Off => OcclusionFrame::none(w, h),
        }
    }

    pub fn status(&self, labels: &StatusLabels) -> StatusEvent {
        let (key, state) = match &self.strategy {
            Strategy::Off => ("status_occlusion_off", StatusState::Neutral),
            Strategy::Depth(_) => ("status_depth", StatusState::Success),
            Strategy::Segmentation(s) => match s.state() {
                ModelState::Loading => ("status_segmentation_loading", StatusState::Pending),
                ModelState::Ready => ("status_segmentation", StatusState::Success),
                ModelState::Unavailable => ("status_occlusion_unavailable", StatusState::Warning),
            },
        };
        StatusEvent::new(Subsystem::Occlusion, labels.get(key), state)
    }

    pub fn reset(&mut self) {
        if let Strategy::Segmentation(s) = &mut self.strategy {
            s.reset();
        }
    }
}
