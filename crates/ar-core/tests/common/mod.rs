// Shared fakes for the core integration tests: a scripted capability probe,
// camera, asset loader and segmenter.

#![allow(dead_code)]

use ar_core::assets::AssetLoader;
use ar_core::camera::{CameraConstraints, CameraSource, CameraStream, PermissionState};
use ar_core::image::{Rgba, RgbaImage};
use ar_core::*;
use instant::Instant;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::result::Result;

pub struct FakeProbe {
    pub surface: bool,
    pub planar: bool,
    pub surface_throws: bool,
    pub calls: Cell<usize>,
}

impl FakeProbe {
    pub fn new(surface: bool, planar: bool) -> Self {
        Self {
            surface,
            planar,
            surface_throws: false,
            calls: Cell::new(0),
        }
    }
}

impl CapabilityProbe for FakeProbe {
    async fn probe(&self, kind: EngineKind) -> Result<bool, ArError> {
        self.calls.set(self.calls.get() + 1);
        match kind {
            EngineKind::SurfaceTracking if self.surface_throws => {
                Err(ArError::TransientDevice("isSessionSupported threw".into()))
            }
            EngineKind::SurfaceTracking => Ok(self.surface),
            EngineKind::PlanarFallback => Ok(self.planar),
        }
    }
}

pub const BACKGROUND: Rgba = Rgba::new(10, 20, 200, 255);
pub const PAPER: Rgba = Rgba::new(200, 180, 40, 255);

#[derive(Clone)]
pub struct FakeCamera {
    pub permission: Rc<Cell<PermissionState>>,
    /// Errors returned by successive `open` calls before one succeeds.
    pub failures: Rc<RefCell<Vec<ArError>>>,
    pub attempts: Rc<Cell<usize>>,
    pub released: Rc<Cell<usize>>,
    pub size: (u32, u32),
}

impl FakeCamera {
    pub fn new(permission: PermissionState) -> Self {
        Self {
            permission: Rc::new(Cell::new(permission)),
            failures: Rc::new(RefCell::new(Vec::new())),
            attempts: Rc::new(Cell::new(0)),
            released: Rc::new(Cell::new(0)),
            size: (160, 120),
        }
    }

    pub fn failing(self, errors: Vec<ArError>) -> Self {
        *self.failures.borrow_mut() = errors;
        self
    }
}

pub struct FakeStream {
    size: (u32, u32),
    released: Rc<Cell<usize>>,
    stopped: bool,
}

impl Release for FakeStream {
    fn release(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.released.set(self.released.get() + 1);
        }
    }
}

impl CameraStream for FakeStream {
    fn size(&self) -> Option<(u32, u32)> {
        Some(self.size)
    }

    fn grab(&mut self, into: &mut RgbaImage) -> bool {
        if self.stopped {
            return false;
        }
        into.pixels_mut().fill(BACKGROUND);
        true
    }
}

impl CameraSource for FakeCamera {
    type Stream = FakeStream;

    async fn permission(&self) -> PermissionState {
        self.permission.get()
    }

    async fn open(&self, _constraints: &CameraConstraints) -> Result<FakeStream, ArError> {
        let attempt = self.attempts.get();
        self.attempts.set(attempt + 1);
        if self.permission.get() == PermissionState::Denied {
            return Err(ArError::from_dom_exception("NotAllowedError", "denied"));
        }
        if let Some(err) = self.failures.borrow().get(attempt).cloned() {
            return Err(err);
        }
        Ok(FakeStream {
            size: self.size,
            released: Rc::clone(&self.released),
            stopped: false,
        })
    }
}

/// Marks the left half of every frame as foreground.
pub struct HalfSegmenter {
    pub calls: Rc<Cell<usize>>,
}

impl Segmenter for HalfSegmenter {
    fn segment(&mut self, frame: &RgbaImage, _timestamp_ms: f64) -> Result<SegmentationOutput, ArError> {
        self.calls.set(self.calls.get() + 1);
        let (w, h) = (frame.width(), frame.height());
        let values = (0..w * h)
            .map(|i| if i % w < w / 2 { 1.0 } else { 0.0 })
            .collect();
        Ok(SegmentationOutput::Confidence {
            width: w,
            height: h,
            values,
        })
    }
}

#[derive(Clone)]
pub struct FakeLoader {
    pub image: RgbaImage,
    pub segment_calls: Rc<Cell<usize>>,
    pub models_fail: bool,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            image: RgbaImage::filled(8, 20, PAPER),
            segment_calls: Rc::new(Cell::new(0)),
            models_fail: false,
        }
    }
}

impl AssetLoader for FakeLoader {
    async fn load_image(&self, _url: &str) -> Result<RgbaImage, ArError> {
        Ok(self.image.clone())
    }

    async fn load_segmenter(&self, url: &str) -> Result<Box<dyn Segmenter>, ArError> {
        if self.models_fail {
            return Err(ArError::ModelLoad(format!("{url} unreachable")));
        }
        Ok(Box::new(HalfSegmenter {
            calls: Rc::clone(&self.segment_calls),
        }))
    }

    async fn load_detector(&self, url: &str) -> Result<Box<dyn ObjectDetector>, ArError> {
        Err(ArError::ModelLoad(format!("{url} unreachable")))
    }
}

/// Stand-in for the immersive engine; these tests never select it.
pub struct NoSurface;

impl Engine for NoSurface {
    fn kind(&self) -> EngineKind {
        EngineKind::SurfaceTracking
    }

    async fn start(&mut self, _token: &SessionToken, _status: &mut dyn StatusSink) -> Result<(), ArError> {
        Err(ArError::CapabilityAbsent)
    }

    fn on_frame(&mut self, _now: Instant, _status: &mut dyn StatusSink) {}

    fn stop(&mut self) {}

    fn apply(&mut self, _action: UserAction) -> bool {
        false
    }
}

pub struct Factory {
    pub config: PreviewConfig,
    pub camera: FakeCamera,
    pub loader: FakeLoader,
    pub planar_built: Rc<Cell<usize>>,
    pub surface_built: Rc<Cell<usize>>,
}

impl Factory {
    pub fn new(config: PreviewConfig, camera: FakeCamera, loader: FakeLoader) -> Self {
        Self {
            config,
            camera,
            loader,
            planar_built: Rc::new(Cell::new(0)),
            surface_built: Rc::new(Cell::new(0)),
        }
    }
}

impl EngineFactory for Factory {
    type Surface = NoSurface;
    type Planar = PlanarSession<FakeCamera, FakeLoader>;

    fn surface(&self) -> NoSurface {
        self.surface_built.set(self.surface_built.get() + 1);
        NoSurface
    }

    fn planar(&self) -> Self::Planar {
        self.planar_built.set(self.planar_built.get() + 1);
        PlanarSession::new(self.config.clone(), self.camera.clone(), self.loader.clone())
    }
}

pub fn config(json: &str) -> PreviewConfig {
    PreviewConfig::from_json(json).unwrap()
}

pub fn orchestrator(factory: Factory) -> Orchestrator<Factory> {
    let priority = factory.config.engine_priority.clone();
    let engine_override = factory.config.engine_override;
    let labels = factory.config.labels();
    Orchestrator::new(factory, priority, engine_override, labels)
}

pub fn planar_of(orch: &Orchestrator<Factory>) -> &PlanarSession<FakeCamera, FakeLoader> {
    match orch.engine() {
        Some(ActiveEngine::Planar(p)) => p,
        _ => panic!("planar engine expected"),
    }
}
