use crate::engines::{PlanarView, SharedOrchestrator};
use crate::overlay::StatusTray;
use ar_core::ActiveEngine;
use instant::Instant;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys as web;

/// Window animation loop for the planar engine. The immersive engine runs
/// on the XR session's own frames instead.
pub struct FrameContext {
    pub orch: SharedOrchestrator,
    pub tray: StatusTray,
    pub view: Rc<PlanarView>,
}

impl FrameContext {
    /// One refresh. Returns false once there is nothing left to drive.
    pub fn frame(&mut self) -> bool {
        let Ok(mut orch) = self.orch.try_borrow_mut() else {
            return true;
        };
        if !orch.is_running() || !matches!(orch.engine(), Some(ActiveEngine::Planar(_))) {
            return false;
        }
        orch.frame(Instant::now(), &mut self.tray);
        if let Some(ActiveEngine::Planar(p)) = orch.engine() {
            self.view.present(p.engine());
        }
        true
    }
}

/// Drive `frame_ctx` from requestAnimationFrame until it reports done.
/// `active` keeps a second loop from starting while one runs.
pub fn start_loop(frame_ctx: Rc<RefCell<FrameContext>>, active: Rc<Cell<bool>>) {
    if active.replace(true) {
        return;
    }
    let tick: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
    let tick_clone = tick.clone();
    let active_tick = active.clone();
    *tick.borrow_mut() = Some(Closure::wrap(Box::new(move || {
        if !frame_ctx.borrow_mut().frame() {
            active_tick.set(false);
            log::info!("[frame] loop stopped");
            // breaks the closure's self-reference
            tick_clone.borrow_mut().take();
            return;
        }
        if let (Some(w), Some(cb)) = (web::window(), tick_clone.borrow().as_ref()) {
            _ = w.request_animation_frame(cb.as_ref().unchecked_ref());
        }
    }) as Box<dyn FnMut()>));
    if let (Some(w), Some(cb)) = (web::window(), tick.borrow().as_ref()) {
        _ = w.request_animation_frame(cb.as_ref().unchecked_ref());
    }
    log::info!("[frame] loop started");
}
