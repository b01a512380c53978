//! Session lifecycle: cancellation, resource leases, the engine interface and
//! the orchestrator that owns exactly one engine.

use crate::assets::{ModelBundle, ModelRequest};
use crate::camera::PermissionState;
use crate::capability::{select_engine, CapabilityProbe, EngineKind, EngineOverride};
use crate::error::ArError;
use crate::image::RgbaImage;
use crate::status::{StatusBoard, StatusEvent, StatusLabels, StatusSink, StatusState, Subsystem};
use glam::Vec2;
use instant::Instant;
use std::cell::Cell;
use std::rc::Rc;

/// Owner side of the "session active" flag.
#[derive(Debug)]
pub struct SessionGuard {
    active: Rc<Cell<bool>>,
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionGuard {
    pub fn new() -> Self {
        Self {
            active: Rc::new(Cell::new(true)),
        }
    }

    pub fn token(&self) -> SessionToken {
        SessionToken {
            active: Rc::clone(&self.active),
        }
    }

    pub fn cancel(&self) {
        self.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// Checked after every await of a startup sequence.
#[derive(Clone, Debug)]
pub struct SessionToken {
    active: Rc<Cell<bool>>,
}

impl SessionToken {
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn check(&self) -> Result<(), ArError> {
        if self.active.get() {
            Ok(())
        } else {
            Err(ArError::SessionCancelled)
        }
    }
}

/// A platform resource with an explicit, idempotent teardown.
pub trait Release {
    fn release(&mut self);
}

/// Scoped ownership of a [`Release`] resource; released once, at the latest
/// on drop.
pub struct Lease<T: Release> {
    inner: Option<T>,
}

impl<T: Release> Lease<T> {
    pub fn new(inner: T) -> Self {
        Self { inner: Some(inner) }
    }

    pub fn get(&self) -> Option<&T> {
        self.inner.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.inner.as_mut()
    }

    pub fn is_held(&self) -> bool {
        self.inner.is_some()
    }

    pub fn release(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.release();
        }
    }
}

impl<T: Release> Drop for Lease<T> {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    /// Up, cancel and leave all end a drag.
    Up,
}

/// User-facing actions exposed to the host page.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UserAction {
    Confirm,
    Reset,
    FitWidth,
    FitHeight,
    /// Scale-to-fill on the detected wall.
    FitWall,
    Scale(i32),
    Rotate(i32),
    Nudge(i32, i32),
    Pointer(PointerPhase, Vec2),
}

/// The capability set every engine offers.
#[allow(async_fn_in_trait)]
pub trait Engine {
    fn kind(&self) -> EngineKind;

    /// Linear startup sequence. Must check `token` after every await.
    async fn start(&mut self, token: &SessionToken, status: &mut dyn StatusSink) -> Result<(), ArError>;

    fn on_frame(&mut self, now: Instant, status: &mut dyn StatusSink);

    /// Synchronously release every platform resource. Idempotent.
    fn stop(&mut self);

    /// Returns true when the action changed anything.
    fn apply(&mut self, action: UserAction) -> bool;

    fn snapshot(&self) -> Option<RgbaImage> {
        None
    }

    fn model_request(&self) -> Option<ModelRequest> {
        None
    }

    fn install_models(&mut self, _models: Result<ModelBundle, ArError>, _status: &mut dyn StatusSink) {}
}

/// The one engine a session runs, chosen at runtime.
pub enum ActiveEngine<S, P> {
    Surface(S),
    Planar(P),
}

impl<S: Engine, P: Engine> Engine for ActiveEngine<S, P> {
    fn kind(&self) -> EngineKind {
        match self {
            ActiveEngine::Surface(e) => e.kind(),
            ActiveEngine::Planar(e) => e.kind(),
        }
    }

    async fn start(&mut self, token: &SessionToken, status: &mut dyn StatusSink) -> Result<(), ArError> {
        match self {
            ActiveEngine::Surface(e) => e.start(token, status).await,
            ActiveEngine::Planar(e) => e.start(token, status).await,
        }
    }

    fn on_frame(&mut self, now: Instant, status: &mut dyn StatusSink) {
        match self {
            ActiveEngine::Surface(e) => e.on_frame(now, status),
            ActiveEngine::Planar(e) => e.on_frame(now, status),
        }
    }

    fn stop(&mut self) {
        match self {
            ActiveEngine::Surface(e) => e.stop(),
            ActiveEngine::Planar(e) => e.stop(),
        }
    }

    fn apply(&mut self, action: UserAction) -> bool {
        match self {
            ActiveEngine::Surface(e) => e.apply(action),
            ActiveEngine::Planar(e) => e.apply(action),
        }
    }

    fn snapshot(&self) -> Option<RgbaImage> {
        match self {
            ActiveEngine::Surface(e) => e.snapshot(),
            ActiveEngine::Planar(e) => e.snapshot(),
        }
    }

    fn model_request(&self) -> Option<ModelRequest> {
        match self {
            ActiveEngine::Surface(e) => e.model_request(),
            ActiveEngine::Planar(e) => e.model_request(),
        }
    }

    fn install_models(&mut self, models: Result<ModelBundle, ArError>, status: &mut dyn StatusSink) {
        match self {
            ActiveEngine::Surface(e) => e.install_models(models, status),
            ActiveEngine::Planar(e) => e.install_models(models, status),
        }
    }
}

/// Builds engines on demand; each call yields a fresh instance.
pub trait EngineFactory {
    type Surface: Engine;
    type Planar: Engine;

    fn surface(&self) -> Self::Surface;

    fn planar(&self) -> Self::Planar;
}

/// Forwards to a sink through the board, so only changes reach the host.
struct Relay<'a> {
    board: &'a mut StatusBoard,
    sink: &'a mut dyn StatusSink,
}

impl StatusSink for Relay<'_> {
    fn emit(&mut self, event: StatusEvent) {
        self.board.relay(event, &mut *self.sink);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Unsupported,
    Starting,
    Running,
    /// Camera permission denied; waiting for a change notification.
    Blocked,
    Failed,
    Stopped,
}

pub struct Orchestrator<F: EngineFactory> {
    factory: F,
    priority: Vec<EngineKind>,
    engine_override: EngineOverride,
    labels: StatusLabels,
    board: StatusBoard,
    selected: Option<EngineKind>,
    probed: bool,
    engine: Option<ActiveEngine<F::Surface, F::Planar>>,
    guard: SessionGuard,
    phase: SessionPhase,
}

impl<F: EngineFactory> Orchestrator<F> {
    pub fn new(
        factory: F,
        priority: Vec<EngineKind>,
        engine_override: EngineOverride,
        labels: StatusLabels,
    ) -> Self {
        Self {
            factory,
            priority,
            engine_override,
            labels,
            board: StatusBoard::new(),
            selected: None,
            probed: false,
            engine: None,
            guard: SessionGuard::new(),
            phase: SessionPhase::Idle,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    pub fn selected(&self) -> Option<EngineKind> {
        self.selected
    }

    pub fn engine(&self) -> Option<&ActiveEngine<F::Surface, F::Planar>> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut ActiveEngine<F::Surface, F::Planar>> {
        self.engine.as_mut()
    }

    pub fn status(&self, id: Subsystem) -> Option<&StatusEvent> {
        self.board.get(id)
    }

    fn emit(&mut self, sink: &mut dyn StatusSink, key: &str, state: StatusState) {
        let event = StatusEvent::new(Subsystem::Engine, self.labels.get(key), state);
        self.board.relay(event, sink);
    }

    /// Probe once, then start the selected engine. Returns whether the
    /// render loop may start.
    pub async fn run<P: CapabilityProbe>(&mut self, probe: &P, sink: &mut dyn StatusSink) -> bool {
        if !self.probed {
            self.selected = select_engine(probe, &self.priority, self.engine_override).await;
            self.probed = true;
        }
        let Some(kind) = self.selected else {
            log::warn!("[engine] unsupported device");
            self.phase = SessionPhase::Unsupported;
            self.emit(sink, "unsupported_device", StatusState::Error);
            return false;
        };
        self.start_engine(kind, sink).await
    }

    async fn start_engine(&mut self, kind: EngineKind, sink: &mut dyn StatusSink) -> bool {
        self.teardown();
        self.guard = SessionGuard::new();
        let token = self.guard.token();
        self.phase = SessionPhase::Starting;
        self.emit(sink, "engine_starting", StatusState::Pending);

        let mut engine = match kind {
            EngineKind::SurfaceTracking => ActiveEngine::Surface(self.factory.surface()),
            EngineKind::PlanarFallback => ActiveEngine::Planar(self.factory.planar()),
        };
        log::info!("[engine] starting {}", kind);
        let result = {
            let mut relay = Relay {
                board: &mut self.board,
                sink: &mut *sink,
            };
            engine.start(&token, &mut relay).await
        };
        match result {
            Ok(()) => {
                self.engine = Some(engine);
                self.phase = SessionPhase::Running;
                true
            }
            Err(ArError::SessionCancelled) => {
                log::info!("[engine] start cancelled");
                engine.stop();
                self.phase = SessionPhase::Stopped;
                false
            }
            Err(e) => {
                log::warn!("[engine] {} failed to start: {}", kind, e);
                engine.stop();
                let key = crate::camera::failure_label(&e);
                self.phase = if matches!(e, ArError::PermissionDenied(_)) {
                    SessionPhase::Blocked
                } else {
                    SessionPhase::Failed
                };
                self.emit(sink, key, StatusState::Error);
                false
            }
        }
    }

    /// React to a camera permission change. A grant while blocked restarts
    /// the same engine; returns true when the render loop may start.
    pub async fn on_permission_change(&mut self, state: PermissionState, sink: &mut dyn StatusSink) -> bool {
        match (state, self.phase, self.selected) {
            (PermissionState::Granted, SessionPhase::Blocked, Some(kind)) => {
                log::info!("[engine] camera permission granted, restarting");
                self.start_engine(kind, sink).await
            }
            (PermissionState::Denied, _, _) => {
                if self.phase == SessionPhase::Running {
                    self.teardown();
                }
                if self.phase != SessionPhase::Unsupported {
                    self.phase = SessionPhase::Blocked;
                    self.emit(sink, "camera_blocked", StatusState::Error);
                }
                false
            }
            _ => false,
        }
    }

    /// One display refresh. Does nothing unless running.
    pub fn frame(&mut self, now: Instant, sink: &mut dyn StatusSink) {
        if self.phase != SessionPhase::Running || !self.guard.is_active() {
            return;
        }
        if let Some(engine) = self.engine.as_mut() {
            let mut relay = Relay {
                board: &mut self.board,
                sink: &mut *sink,
            };
            engine.on_frame(now, &mut relay);
        }
    }

    pub fn apply(&mut self, action: UserAction) -> bool {
        if self.phase != SessionPhase::Running {
            return false;
        }
        self.engine.as_mut().is_some_and(|e| e.apply(action))
    }

    pub fn snapshot(&self) -> Option<RgbaImage> {
        self.engine.as_ref().and_then(|e| e.snapshot())
    }

    pub fn model_request(&self) -> Option<ModelRequest> {
        if self.phase != SessionPhase::Running {
            return None;
        }
        self.engine.as_ref().and_then(|e| e.model_request())
    }

    pub fn install_models(&mut self, models: Result<ModelBundle, ArError>, sink: &mut dyn StatusSink) {
        if self.phase != SessionPhase::Running {
            return;
        }
        if let Some(engine) = self.engine.as_mut() {
            let mut relay = Relay {
                board: &mut self.board,
                sink: &mut *sink,
            };
            engine.install_models(models, &mut relay);
        }
    }

    /// Token of the current session, for work that outlives a borrow.
    pub fn token(&self) -> SessionToken {
        self.guard.token()
    }

    fn teardown(&mut self) {
        self.guard.cancel();
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
        }
    }

    /// End the session: cancel pending startup work and release resources.
    pub fn stop(&mut self) {
        self.teardown();
        if self.phase != SessionPhase::Unsupported {
            self.phase = SessionPhase::Stopped;
        }
        log::info!("[engine] session stopped");
    }
}
