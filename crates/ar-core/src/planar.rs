//! Planar fallback engine: camera background, four draggable anchors and a
//! homography warp, composited with the occlusion mask on the CPU.

use crate::assets::{AssetLoader, ModelBundle, ModelRequest};
use crate::camera::{acquire, CameraSource, CameraStream};
use crate::capability::EngineKind;
use crate::compositor::{compose_frame, render_wallpaper, WarpStyle};
use crate::config::{OcclusionMode, PreviewConfig, WallpaperSpec};
use crate::error::ArError;
use crate::image::{budget_size, BufferArena, Rgba, RgbaImage};
use crate::occlusion::{OcclusionPipeline, SegmentationSettings, SourceFrame};
use crate::quad::{AnchorDrag, QuadAnchors};
use crate::session::{Engine, Lease, PointerPhase, SessionToken, UserAction};
use crate::status::{StatusEvent, StatusLabels, StatusSink, StatusState, Subsystem};
use glam::Vec2;
use instant::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawOutcome {
    Drawn,
    /// The quad could not be solved; the output is the plain background.
    SkippedDegenerate,
    NotReady,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub drawn: u64,
    pub skipped: u64,
}

pub struct PlanarEngine {
    wallpaper_spec: WallpaperSpec,
    wallpaper: RgbaImage,
    canvas: Vec2,
    max_side: u32,
    anchors: QuadAnchors,
    drag: AnchorDrag,
    arena: BufferArena,
    pipeline: Option<OcclusionPipeline>,
    stats: DrawStats,
}

impl PlanarEngine {
    /// The pipeline is only built when occlusion is on; the fallback has no
    /// depth sensor.
    pub fn new(config: &PreviewConfig) -> Self {
        let profile = config.profile();
        let pipeline = (config.occlusion_mode != OcclusionMode::Off).then(|| {
            OcclusionPipeline::new(
                config.occlusion_mode,
                false,
                SegmentationSettings::new(config.occlusion_mode, &profile, &config.foreground_classes),
                profile.fallback_max_side,
            )
        });
        Self {
            wallpaper_spec: config.wallpaper(),
            wallpaper: RgbaImage::new(0, 0),
            canvas: Vec2::ZERO,
            max_side: profile.fallback_max_side,
            anchors: QuadAnchors::new([Vec2::ZERO; 4]),
            drag: AnchorDrag::new(),
            arena: BufferArena::new(),
            pipeline,
            stats: DrawStats::default(),
        }
    }

    pub fn set_wallpaper(&mut self, image: RgbaImage) {
        self.wallpaper = image;
    }

    pub fn anchors(&self) -> &QuadAnchors {
        &self.anchors
    }

    pub fn set_anchors(&mut self, anchors: QuadAnchors) {
        self.anchors = anchors;
    }

    pub fn canvas(&self) -> Vec2 {
        self.canvas
    }

    pub fn stats(&self) -> DrawStats {
        self.stats
    }

    pub fn pipeline(&self) -> Option<&OcclusionPipeline> {
        self.pipeline.as_ref()
    }

    pub fn pipeline_mut(&mut self) -> Option<&mut OcclusionPipeline> {
        self.pipeline.as_mut()
    }

    pub fn render_size(&self) -> (u32, u32) {
        budget_size(self.canvas.x as u32, self.canvas.y as u32, self.max_side)
    }

    /// New canvas size in CSS pixels. Anchors scale along; the first call
    /// places the default quad.
    pub fn resize(&mut self, width: f32, height: f32) {
        let next = Vec2::new(width.max(1.0), height.max(1.0));
        if self.canvas == Vec2::ZERO {
            self.canvas = next;
            self.reset_corners();
            return;
        }
        if next != self.canvas {
            self.anchors = self.anchors.scaled(next / self.canvas);
            self.canvas = next;
        }
    }

    pub fn reset_corners(&mut self) {
        self.anchors = QuadAnchors::default_for(self.wallpaper_spec.aspect(), self.canvas);
        self.drag.pointer_up();
    }

    pub fn fit_width(&mut self) {
        self.anchors = self.anchors.fit_width(self.wallpaper_spec.aspect(), self.canvas);
    }

    pub fn fit_height(&mut self) {
        self.anchors = self.anchors.fit_height(self.wallpaper_spec.aspect(), self.canvas);
    }

    pub fn pointer(&mut self, phase: PointerPhase, p: Vec2) -> bool {
        match phase {
            PointerPhase::Down => self.drag.pointer_down(&self.anchors, p),
            PointerPhase::Move => self.drag.pointer_move(&mut self.anchors, p),
            PointerPhase::Up => {
                let was = self.drag.active().is_some();
                self.drag.pointer_up();
                was
            }
        }
    }

    /// Index of the anchor being dragged.
    pub fn active_anchor(&self) -> Option<usize> {
        self.drag.active()
    }

    /// Compose one frame into the output buffer.
    pub fn draw(&mut self, camera: &RgbaImage, now: Instant, timestamp_ms: f64) -> DrawOutcome {
        if camera.is_empty() || self.canvas == Vec2::ZERO {
            return DrawOutcome::NotReady;
        }
        let (w, h) = self.render_size();
        self.arena.ensure_size(w, h);
        self.arena.video = camera.resampled(w, h);

        let to_render = Vec2::new(w as f32, h as f32) / self.canvas;
        let quad = self.anchors.scaled(to_render);
        let style = WarpStyle {
            tiles: (self.wallpaper_spec.tile_x, self.wallpaper_spec.tile_y),
            brightness: self.wallpaper_spec.brightness,
            opacity: 1.0,
        };
        if let Err(e) = render_wallpaper(&mut self.arena.wallpaper, &self.wallpaper, &quad, style) {
            log::debug!("[planar] skipping draw: {}", e);
            self.arena.output.copy_from(&self.arena.video);
            self.stats.skipped += 1;
            return DrawOutcome::SkippedDegenerate;
        }

        let mask = match self.pipeline.as_mut() {
            Some(pipeline) => {
                let source = SourceFrame {
                    camera: Some(&self.arena.video),
                    depth: None,
                    timestamp_ms,
                };
                pipeline.estimate(source, w, h, now).mask().cloned()
            }
            None => None,
        };
        self.arena.mask = mask.unwrap_or_default();
        let mask_ref = (!self.arena.mask.is_empty()).then_some(&self.arena.mask);
        compose_frame(
            &mut self.arena.output,
            &self.arena.video,
            &mut self.arena.wallpaper,
            mask_ref,
        );
        self.stats.drawn += 1;
        DrawOutcome::Drawn
    }

    pub fn output(&self) -> &RgbaImage {
        &self.arena.output
    }

    /// The composited frame without interaction overlays.
    pub fn snapshot(&self) -> Option<RgbaImage> {
        (!self.arena.output.is_empty()).then(|| self.arena.output.clone())
    }

    pub fn occlusion_status(&self, labels: &StatusLabels) -> StatusEvent {
        match &self.pipeline {
            Some(p) => p.status(labels),
            None => StatusEvent::new(
                Subsystem::Occlusion,
                labels.get("status_occlusion_off"),
                StatusState::Neutral,
            ),
        }
    }
}

/// Swatch shown when the product image cannot be loaded.
fn placeholder_wallpaper() -> RgbaImage {
    RgbaImage::filled(2, 2, Rgba::new(220, 220, 220, 255))
}

/// [`PlanarEngine`] bound to a camera and an asset loader.
pub struct PlanarSession<C: CameraSource, L: AssetLoader> {
    engine: PlanarEngine,
    camera: C,
    loader: L,
    config: PreviewConfig,
    labels: StatusLabels,
    stream: Option<Lease<C::Stream>>,
    frame: RgbaImage,
    started_at: Option<Instant>,
}

impl<C: CameraSource, L: AssetLoader> PlanarSession<C, L> {
    pub fn new(config: PreviewConfig, camera: C, loader: L) -> Self {
        Self {
            engine: PlanarEngine::new(&config),
            labels: config.labels(),
            camera,
            loader,
            config,
            stream: None,
            frame: RgbaImage::new(0, 0),
            started_at: None,
        }
    }

    pub fn engine(&self) -> &PlanarEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PlanarEngine {
        &mut self.engine
    }

    pub fn has_stream(&self) -> bool {
        self.stream.as_ref().is_some_and(Lease::is_held)
    }

    fn report(&self, status: &mut dyn StatusSink) {
        status.emit(self.engine.occlusion_status(&self.labels));
    }
}

impl<C: CameraSource, L: AssetLoader> Engine for PlanarSession<C, L> {
    fn kind(&self) -> EngineKind {
        EngineKind::PlanarFallback
    }

    async fn start(&mut self, token: &SessionToken, status: &mut dyn StatusSink) -> Result<(), ArError> {
        let image = self.loader.load_image(&self.config.image_url).await;
        token.check()?;
        let wallpaper = match image {
            Ok(img) if !img.is_empty() => img,
            Ok(_) => {
                log::warn!("[planar] wallpaper image is empty");
                placeholder_wallpaper()
            }
            Err(e) => {
                log::warn!("[planar] wallpaper image failed: {}", e);
                placeholder_wallpaper()
            }
        };
        self.engine.set_wallpaper(wallpaper);

        let stream = acquire(&self.camera, token).await?;
        let stream = Lease::new(stream);
        let (w, h) = stream.get().and_then(|s| s.size()).unwrap_or((1280, 720));
        self.engine.resize(w as f32, h as f32);
        let (rw, rh) = self.engine.render_size();
        self.frame = RgbaImage::new(rw, rh);
        self.stream = Some(stream);

        status.emit(StatusEvent::new(
            Subsystem::Engine,
            self.labels.get("engine_planar"),
            StatusState::Success,
        ));
        status.emit(StatusEvent::new(
            Subsystem::Plane,
            self.labels.get("status_quad"),
            StatusState::Neutral,
        ));
        status.emit(StatusEvent::new(
            Subsystem::Lighting,
            self.labels.get("status_lighting_unavailable"),
            StatusState::Neutral,
        ));
        self.report(status);
        log::info!("[planar] started at {}x{}", w, h);
        Ok(())
    }

    fn on_frame(&mut self, now: Instant, status: &mut dyn StatusSink) {
        let Some(stream) = self.stream.as_mut().and_then(Lease::get_mut) else {
            return;
        };
        let (rw, rh) = self.engine.render_size();
        self.frame.ensure_size(rw, rh);
        if !stream.grab(&mut self.frame) {
            return;
        }
        let started = *self.started_at.get_or_insert(now);
        let timestamp_ms = now.saturating_duration_since(started).as_secs_f64() * 1000.0;
        self.engine.draw(&self.frame, now, timestamp_ms);
        self.report(status);
    }

    fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            log::info!("[planar] camera released");
        }
    }

    fn apply(&mut self, action: UserAction) -> bool {
        match action {
            UserAction::Reset => {
                self.engine.reset_corners();
                true
            }
            UserAction::FitWidth => {
                self.engine.fit_width();
                true
            }
            UserAction::FitHeight => {
                self.engine.fit_height();
                true
            }
            UserAction::Pointer(phase, p) => self.engine.pointer(phase, p),
            _ => false,
        }
    }

    fn snapshot(&self) -> Option<RgbaImage> {
        self.engine.snapshot()
    }

    fn model_request(&self) -> Option<ModelRequest> {
        let pipeline = self.engine.pipeline()?;
        if !pipeline.needs_models() {
            return None;
        }
        Some(ModelRequest {
            segmenter: self.config.model_sources.segmenter.clone(),
            detector: pipeline
                .mode()
                .uses_detector()
                .then(|| self.config.model_sources.detector.clone()),
        })
    }

    fn install_models(&mut self, models: Result<ModelBundle, ArError>, status: &mut dyn StatusSink) {
        let Some(pipeline) = self.engine.pipeline_mut() else {
            return;
        };
        match models {
            Ok(bundle) => {
                if let Some(seg) = pipeline.segmentation() {
                    seg.set_models(bundle.segmenter, bundle.detector);
                }
            }
            Err(e) => pipeline.models_failed(&e),
        }
        self.report(status);
    }
}
