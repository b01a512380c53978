use crate::dom;
use ar_core::camera::{CameraConstraints, CameraSource, CameraStream, PermissionState};
use ar_core::session::Release;
use ar_core::{ArError, RgbaImage};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys as web;

/// `getUserMedia` behind the core camera interface.
#[derive(Clone)]
pub struct WebCamera {
    document: web::Document,
}

impl WebCamera {
    pub fn new(document: web::Document) -> Self {
        Self { document }
    }

    fn video_element(&self, stream: &web::MediaStream) -> Result<web::HtmlVideoElement, ArError> {
        let video = self
            .document
            .create_element("video")
            .and_then(|el| el.dyn_into::<web::HtmlVideoElement>().map_err(JsValue::from))
            .map_err(|e| dom::to_ar_error(&e))?;
        video.set_muted(true);
        video.set_autoplay(true);
        _ = video.set_attribute("playsinline", "");
        video.set_src_object(Some(stream));
        Ok(video)
    }

    fn scratch_canvas(&self) -> Result<(web::HtmlCanvasElement, web::CanvasRenderingContext2d), ArError> {
        let unavailable = |what: &str| ArError::TransientDevice(format!("frame grabber: {what}"));
        let canvas = self
            .document
            .create_element("canvas")
            .ok()
            .and_then(|el| el.dyn_into::<web::HtmlCanvasElement>().ok())
            .ok_or_else(|| unavailable("no canvas"))?;
        let options = js_sys::Object::new();
        _ = js_sys::Reflect::set(&options, &"willReadFrequently".into(), &JsValue::TRUE);
        let ctx = canvas
            .get_context_with_context_options("2d", &options)
            .ok()
            .flatten()
            .and_then(|c| c.dyn_into::<web::CanvasRenderingContext2d>().ok())
            .ok_or_else(|| unavailable("no 2d context"))?;
        Ok((canvas, ctx))
    }
}

/// Read `state` off a `PermissionStatus`.
fn permission_state(status: &JsValue) -> PermissionState {
    js_sys::Reflect::get(status, &"state".into())
        .ok()
        .and_then(|s| s.as_string())
        .map(|s| PermissionState::parse(&s))
        .unwrap_or(PermissionState::Unknown)
}

async fn query_camera_permission() -> Result<web::PermissionStatus, JsValue> {
    let window = web::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let permissions = window.navigator().permissions()?;
    let descriptor = js_sys::Object::new();
    js_sys::Reflect::set(&descriptor, &"name".into(), &"camera".into())?;
    let status = JsFuture::from(permissions.query(&descriptor)?).await?;
    status.dyn_into::<web::PermissionStatus>()
}

/// Call `on_change` whenever the camera permission changes. Browsers that
/// cannot query the camera permission never call it.
pub async fn watch_permission(mut on_change: impl FnMut(PermissionState) + 'static) {
    let status = match query_camera_permission().await {
        Ok(s) => s,
        Err(e) => {
            log::warn!("[camera] permission query unavailable: {:?}", e);
            return;
        }
    };
    let status_for_cb = status.clone();
    let closure = Closure::wrap(Box::new(move || {
        let state = permission_state(&status_for_cb);
        log::info!("[camera] permission changed to {:?}", state);
        on_change(state);
    }) as Box<dyn FnMut()>);
    status.set_onchange(Some(closure.as_ref().unchecked_ref()));
    closure.forget();
}

impl CameraSource for WebCamera {
    type Stream = VideoStream;

    async fn permission(&self) -> PermissionState {
        match query_camera_permission().await {
            Ok(status) => permission_state(&status),
            Err(_) => PermissionState::Unknown,
        }
    }

    async fn open(&self, constraints: &CameraConstraints) -> Result<VideoStream, ArError> {
        let window = web::window().ok_or(ArError::CapabilityAbsent)?;
        let devices = window
            .navigator()
            .media_devices()
            .map_err(|e| dom::to_ar_error(&e))?;
        let json = constraints.to_json().to_string();
        let constraints: web::MediaStreamConstraints = js_sys::JSON::parse(&json)
            .map_err(|e| ArError::InvalidConfig(format!("constraints: {:?}", e)))?
            .unchecked_into();
        let promise = devices
            .get_user_media_with_constraints(&constraints)
            .map_err(|e| dom::to_ar_error(&e))?;
        let stream: web::MediaStream = JsFuture::from(promise)
            .await
            .map_err(|e| dom::to_ar_error(&e))?
            .unchecked_into();

        let video = self.video_element(&stream)?;
        let (canvas, ctx) = self.scratch_canvas()?;
        let mut opened = VideoStream {
            video,
            stream,
            canvas,
            ctx,
            released: false,
        };
        // Wait for the first frame so the native size is known.
        if let Ok(playing) = opened.video.play() {
            if let Err(e) = JsFuture::from(playing).await {
                let err = dom::to_ar_error(&e);
                opened.release();
                return Err(err);
            }
        }
        Ok(opened)
    }
}

/// A live camera track rendered through an off-DOM video element.
pub struct VideoStream {
    video: web::HtmlVideoElement,
    stream: web::MediaStream,
    canvas: web::HtmlCanvasElement,
    ctx: web::CanvasRenderingContext2d,
    released: bool,
}

impl CameraStream for VideoStream {
    fn size(&self) -> Option<(u32, u32)> {
        let (w, h) = (self.video.video_width(), self.video.video_height());
        (w > 0 && h > 0).then_some((w, h))
    }

    fn grab(&mut self, into: &mut RgbaImage) -> bool {
        // HAVE_CURRENT_DATA
        if self.released || self.video.ready_state() < 2 || into.is_empty() {
            return false;
        }
        let (w, h) = (into.width(), into.height());
        if self.canvas.width() != w {
            self.canvas.set_width(w);
        }
        if self.canvas.height() != h {
            self.canvas.set_height(h);
        }
        if self
            .ctx
            .draw_image_with_html_video_element_and_dw_and_dh(&self.video, 0.0, 0.0, w as f64, h as f64)
            .is_err()
        {
            return false;
        }
        let Ok(data) = self.ctx.get_image_data(0.0, 0.0, w as f64, h as f64) else {
            return false;
        };
        let bytes = data.data();
        let dst: &mut [u8] = bytemuck::cast_slice_mut(into.pixels_mut());
        if bytes.len() != dst.len() {
            return false;
        }
        dst.copy_from_slice(&bytes);
        true
    }
}

impl Release for VideoStream {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for track in self.stream.get_tracks().iter() {
            if let Ok(track) = track.dyn_into::<web::MediaStreamTrack>() {
                track.stop();
            }
        }
        _ = self.video.pause();
        self.video.set_src_object(None);
        log::info!("[camera] tracks stopped");
    }
}
