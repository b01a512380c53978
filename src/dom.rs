use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys as web;

/// Look up an element by id and cast it to the expected type.
pub fn element_by_id<T: JsCast>(document: &web::Document, id: &str) -> anyhow::Result<T> {
    document
        .get_element_by_id(id)
        .ok_or_else(|| anyhow::anyhow!("missing #{}", id))?
        .dyn_into::<T>()
        .map_err(|e| anyhow::anyhow!("#{} has the wrong type: {:?}", id, e))
}

#[inline]
pub fn add_click_listener(
    document: &web::Document,
    element_id: &str,
    mut handler: impl FnMut() + 'static,
) -> bool {
    let Some(el) = document.get_element_by_id(element_id) else {
        return false;
    };
    let closure = Closure::wrap(Box::new(move || handler()) as Box<dyn FnMut()>);
    _ = el.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
    closure.forget();
    true
}

pub fn is_secure_context() -> bool {
    web::window().is_some_and(|w| w.is_secure_context())
}

/// `navigator.mediaDevices.getUserMedia` is reachable.
pub fn has_camera_api() -> bool {
    let Some(w) = web::window() else {
        return false;
    };
    match w.navigator().media_devices() {
        Ok(devices) => js_sys::Reflect::has(&devices, &"getUserMedia".into()).unwrap_or(false),
        Err(_) => false,
    }
}

pub fn has_canvas_2d(document: &web::Document) -> bool {
    let Ok(el) = document.create_element("canvas") else {
        return false;
    };
    let Ok(canvas) = el.dyn_into::<web::HtmlCanvasElement>() else {
        return false;
    };
    matches!(canvas.get_context("2d"), Ok(Some(_)))
}

/// DOMException name and message, or a debug rendering for anything else.
pub fn js_error_parts(err: &wasm_bindgen::JsValue) -> (String, String) {
    if let Some(ex) = err.dyn_ref::<web::DomException>() {
        return (ex.name(), ex.message());
    }
    if let Some(e) = err.dyn_ref::<js_sys::Error>() {
        return (String::from(e.name()), String::from(e.message()));
    }
    (String::new(), format!("{:?}", err))
}

/// Convert a rejected promise or thrown value into the core taxonomy.
pub fn to_ar_error(err: &wasm_bindgen::JsValue) -> ar_core::ArError {
    let (name, message) = js_error_parts(err);
    ar_core::ArError::from_dom_exception(&name, &message)
}
