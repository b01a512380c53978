use crate::constants::{GUIDANCE_ID, STATUS_EVENT};
use crate::tray;
use ar_core::{StatusEvent, StatusSink};
use wasm_bindgen::JsValue;
use web_sys as web;

#[inline]
pub fn show(document: &web::Document, id: &str) {
    if let Some(el) = document.get_element_by_id(id) {
        _ = el.class_list().remove_1("hidden");
        // fallback for environments without CSS class
        _ = el.set_attribute("style", "");
    }
}

#[inline]
pub fn hide(document: &web::Document, id: &str) {
    if let Some(el) = document.get_element_by_id(id) {
        _ = el.class_list().add_1("hidden");
        // fallback
        _ = el.set_attribute("style", "display:none");
    }
}

/// Replace the guidance line; an empty message hides it.
pub fn show_guidance(document: &web::Document, message: &str) {
    if let Some(el) = document.get_element_by_id(GUIDANCE_ID) {
        el.set_text_content(Some(message));
    }
    if message.is_empty() {
        hide(document, GUIDANCE_ID);
    } else {
        show(document, GUIDANCE_ID);
    }
}

/// Status sink backed by the host page: updates the tray element of each
/// subsystem and re-dispatches the event as `arwp:status` on `window`.
pub struct StatusTray {
    document: web::Document,
}

impl StatusTray {
    pub fn new(document: web::Document) -> Self {
        Self { document }
    }

    fn render(&self, event: &StatusEvent) {
        let Some(el) = self.document.get_element_by_id(&tray::element_id(event.id)) else {
            return;
        };
        let classes = el.class_list();
        for state in tray::ALL_STATES {
            _ = classes.remove_1(&tray::state_class(state));
        }
        _ = classes.add_1(&tray::state_class(event.state));
        el.set_text_content(Some(&event.label));
        _ = el.set_attribute("data-state", event.state.as_str());
    }

    fn dispatch(&self, event: &StatusEvent) {
        let Some(window) = web::window() else {
            return;
        };
        let detail = js_sys::JSON::parse(&event.to_json()).unwrap_or(JsValue::NULL);
        let init = web::CustomEventInit::new();
        init.set_detail(&detail);
        if let Ok(ev) = web::CustomEvent::new_with_event_init_dict(STATUS_EVENT, &init) {
            _ = window.dispatch_event(&ev);
        }
    }
}

impl StatusSink for StatusTray {
    fn emit(&mut self, event: StatusEvent) {
        self.render(&event);
        self.dispatch(&event);
        if tray::is_blocking(event.id, event.state) {
            show_guidance(&self.document, &event.label);
        }
    }
}
