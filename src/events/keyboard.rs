use crate::engines::SharedOrchestrator;
use crate::input;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys as web;

/// Shortcuts for the action buttons; see [`input::action_for_key`].
pub fn wire_global_keydown(orch: SharedOrchestrator) {
    let closure = Closure::wrap(Box::new(move |ev: web::KeyboardEvent| {
        if ev.ctrl_key() || ev.meta_key() || ev.alt_key() {
            return;
        }
        let Some(action) = input::action_for_key(&ev.key()) else {
            return;
        };
        if super::apply(&orch, action) {
            ev.prevent_default();
        }
    }) as Box<dyn FnMut(_)>);
    if let Some(window) = web::window() {
        _ = window.add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
    }
    closure.forget();
}
