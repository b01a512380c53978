use crate::engines::{ImmersiveEngine, PlanarPreview, SharedOrchestrator};
use crate::input;
use ar_core::{ActiveEngine, PointerPhase, UserAction};
use glam::Vec2;
use std::cell::Cell;
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys as web;

#[derive(Clone)]
pub struct InputWiring {
    /// Receives pointerdown; the planar canvas or the overlay root.
    pub target: web::HtmlElement,
    /// Planar preview canvas, for mapping into engine pixels.
    pub canvas: web::HtmlCanvasElement,
    pub orch: SharedOrchestrator,
    pub dragging: Rc<Cell<bool>>,
}

pub fn wire_input_handlers(w: InputWiring) {
    wire_pointerdown(&w);
    wire_pointermove(&w);
    for event in ["pointerup", "pointercancel"] {
        wire_pointer_end(&w, event, true);
    }
    wire_pointer_end(&w, "pointerleave", false);
}

/// Planar engines take engine pixels; the immersive engine takes client
/// pixels of the full-screen overlay.
fn surface_point(
    w: &InputWiring,
    ev: &web::PointerEvent,
    engine: &ActiveEngine<ImmersiveEngine, PlanarPreview>,
) -> Option<Vec2> {
    let client = Vec2::new(ev.client_x() as f32, ev.client_y() as f32);
    match engine {
        ActiveEngine::Planar(p) => {
            let rect = w.canvas.get_bounding_client_rect();
            input::client_to_surface(
                client,
                Vec2::new(rect.left() as f32, rect.top() as f32),
                Vec2::new(rect.width() as f32, rect.height() as f32),
                p.engine().canvas(),
            )
        }
        ActiveEngine::Surface(_) => Some(client),
    }
}

fn send(w: &InputWiring, ev: &web::PointerEvent, phase: PointerPhase) -> bool {
    let Ok(mut orch) = w.orch.try_borrow_mut() else {
        return false;
    };
    let Some(p) = orch.engine().and_then(|e| surface_point(w, ev, e)) else {
        return false;
    };
    orch.apply(UserAction::Pointer(phase, p))
}

fn wire_pointerdown(w: &InputWiring) {
    let w = w.clone();
    let target = w.target.clone();
    let closure = Closure::wrap(Box::new(move |ev: web::PointerEvent| {
        if send(&w, &ev, PointerPhase::Down) {
            w.dragging.set(true);
            _ = w.target.set_pointer_capture(ev.pointer_id());
            ev.prevent_default();
        }
    }) as Box<dyn FnMut(_)>);
    _ = target.add_event_listener_with_callback("pointerdown", closure.as_ref().unchecked_ref());
    closure.forget();
}

fn wire_pointermove(w: &InputWiring) {
    let w = w.clone();
    let closure = Closure::wrap(Box::new(move |ev: web::PointerEvent| {
        if !w.dragging.get() {
            return;
        }
        if send(&w, &ev, PointerPhase::Move) {
            ev.prevent_default();
        }
    }) as Box<dyn FnMut(_)>);
    if let Some(wnd) = web::window() {
        _ = wnd.add_event_listener_with_callback("pointermove", closure.as_ref().unchecked_ref());
    }
    closure.forget();
}

/// Up, cancel and leave all end a drag.
fn wire_pointer_end(w: &InputWiring, event: &str, on_window: bool) {
    let w = w.clone();
    let target = w.target.clone();
    let closure = Closure::wrap(Box::new(move |ev: web::PointerEvent| {
        if !w.dragging.replace(false) {
            return;
        }
        send(&w, &ev, PointerPhase::Up);
        _ = w.target.release_pointer_capture(ev.pointer_id());
    }) as Box<dyn FnMut(_)>);
    if on_window {
        if let Some(wnd) = web::window() {
            _ = wnd.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
        }
    } else {
        _ = target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
    }
    closure.forget();
}
