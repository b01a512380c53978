//! Surface tracking engine on a WebXR `immersive-ar` session.
//!
//! The session's own animation frame drives the orchestrator through a
//! [`FrameHook`]; the current `XRFrame` is parked in a shared slot for the
//! duration of that call so [`Engine::on_frame`] can read it.

use super::gl::{DrawParams, OcclusionInput, WallpaperRenderer};
use super::FrameHook;
use crate::constants::{
    CONTAINER_ID, FAR_PLANE_M, NEAR_PLANE_M, RETICLE_SIZE_M, XR_DEPTH_FEATURE, XR_DEPTH_FORMATS,
    XR_DEPTH_USAGE, XR_OPTIONAL_FEATURES, XR_REQUIRED_FEATURES,
};
use crate::dom;
use crate::input;
use crate::vision::WebAssetLoader;
use ar_core::assets::{AssetLoader, ModelBundle, ModelRequest};
use ar_core::constants::{DEPTH_BIAS_METERS, DEPTH_SOFT_BAND_METERS};
use ar_core::depth::{DepthEncoding, DepthFrame};
use ar_core::lighting::LightEstimator;
use ar_core::session::{Engine, Lease, PointerPhase, Release, SessionToken, UserAction};
use ar_core::{
    ArError, EngineKind, InferenceGate, OcclusionKind, OcclusionMode, OcclusionPipeline, Pose,
    PreviewConfig, RgbaImage, SegmentationSettings, SourceFrame, StatusEvent, StatusLabels, StatusSink,
    StatusState, Subsystem, SurfaceTracker, WallpaperSpec,
};
use glam::{Mat4, Vec2, Vec3, Vec4};
use instant::Instant;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys as web;
use web_sys::WebGl2RenderingContext as Gl;

fn prop(target: &JsValue, key: &str) -> Option<JsValue> {
    js_sys::Reflect::get(target, &key.into())
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

fn number(target: &JsValue, key: &str) -> Option<f64> {
    prop(target, key).and_then(|v| v.as_f64())
}

/// Call `target[name](...args)`.
fn invoke(target: &JsValue, name: &str, args: &[&JsValue]) -> Result<JsValue, JsValue> {
    let func: js_sys::Function = prop(target, name)
        .ok_or_else(|| JsValue::from_str(&format!("missing '{name}'")))?
        .dyn_into()?;
    let array = js_sys::Array::new();
    for a in args {
        array.push(a);
    }
    js_sys::Reflect::apply(&func, target, &array)
}

async fn invoke_async(target: &JsValue, name: &str, args: &[&JsValue]) -> Result<JsValue, JsValue> {
    let promise: js_sys::Promise = invoke(target, name, args)?.dyn_into()?;
    JsFuture::from(promise).await
}

fn string_array(items: &[&str]) -> js_sys::Array {
    items.iter().map(|s| JsValue::from_str(s)).collect()
}

fn mat4(values: &[f32]) -> Option<Mat4> {
    let cols: &[f32; 16] = values.try_into().ok()?;
    let m = Mat4::from_cols_array(cols);
    m.is_finite().then_some(m)
}

fn transform_matrix(transform: &JsValue) -> Option<Mat4> {
    let matrix: js_sys::Float32Array = prop(transform, "matrix")?.dyn_into().ok()?;
    mat4(&matrix.to_vec())
}

fn session_init(mode: OcclusionMode, document: &web::Document) -> web::XrSessionInit {
    let init = js_sys::Object::new();
    let mut optional: Vec<&str> = XR_OPTIONAL_FEATURES.to_vec();
    if mode.allows_depth() {
        optional.push(XR_DEPTH_FEATURE);
        let depth = js_sys::Object::new();
        _ = js_sys::Reflect::set(&depth, &"usagePreference".into(), &string_array(&XR_DEPTH_USAGE));
        _ = js_sys::Reflect::set(&depth, &"dataFormatPreference".into(), &string_array(&XR_DEPTH_FORMATS));
        _ = js_sys::Reflect::set(&init, &"depthSensing".into(), &depth);
    }
    _ = js_sys::Reflect::set(&init, &"requiredFeatures".into(), &string_array(&XR_REQUIRED_FEATURES));
    _ = js_sys::Reflect::set(&init, &"optionalFeatures".into(), &string_array(&optional));
    if let Some(root) = document.get_element_by_id(CONTAINER_ID) {
        let overlay = js_sys::Object::new();
        _ = js_sys::Reflect::set(&overlay, &"root".into(), &root);
        _ = js_sys::Reflect::set(&init, &"domOverlay".into(), &overlay);
    }
    init.unchecked_into()
}

/// `session.enabledFeatures`, where the browser reports it.
fn enabled_features(session: &web::XrSession) -> Option<Vec<String>> {
    let list: js_sys::Array = prop(session, "enabledFeatures")?.dyn_into().ok()?;
    Some(list.iter().filter_map(|f| f.as_string()).collect())
}

fn feature_granted(enabled: &Option<Vec<String>>, name: &str) -> bool {
    enabled.as_ref().map_or(true, |list| list.iter().any(|f| f == name))
}

/// Raw layout the session settled on. The getters throw when depth sensing
/// was not granted.
fn negotiated_depth(session: &web::XrSession) -> Option<DepthEncoding> {
    let usage = prop(session, "depthUsage")?.as_string()?;
    if usage != "cpu-optimized" {
        log::warn!("[xr] depth usage '{}' is not readable on the CPU", usage);
        return None;
    }
    let format = prop(session, "depthDataFormat")?.as_string()?;
    DepthEncoding::from_format(&format)
}

type RafClosure = Closure<dyn FnMut(f64, web::XrFrame)>;

/// The live session plus every callback registered on it.
pub struct XrSessionHandle {
    session: web::XrSession,
    hit_source: Option<JsValue>,
    raf: Rc<RefCell<Option<RafClosure>>>,
    raf_id: Rc<Cell<u32>>,
    ended: Rc<Cell<bool>>,
    listeners: Vec<(&'static str, Closure<dyn FnMut()>)>,
}

impl XrSessionHandle {
    fn new(session: web::XrSession) -> Self {
        Self {
            session,
            hit_source: None,
            raf: Rc::new(RefCell::new(None)),
            raf_id: Rc::new(Cell::new(0)),
            ended: Rc::new(Cell::new(false)),
            listeners: Vec::new(),
        }
    }

    fn listen(&mut self, event: &'static str, handler: impl FnMut() + 'static) {
        let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut()>);
        _ = self
            .session
            .add_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
        self.listeners.push((event, closure));
    }

    /// Park each frame in `slot`, run `hook`, and queue the next frame.
    fn start_loop(&self, slot: Rc<RefCell<Option<web::XrFrame>>>, hook: FrameHook) {
        let raf = self.raf.clone();
        let raf_id = self.raf_id.clone();
        let ended = self.ended.clone();
        *self.raf.borrow_mut() = Some(Closure::wrap(Box::new(move |_t: f64, frame: web::XrFrame| {
            if ended.get() {
                return;
            }
            let session = frame.session();
            *slot.borrow_mut() = Some(frame);
            if let Some(hook) = hook.borrow_mut().as_mut() {
                hook();
            }
            slot.borrow_mut().take();
            if ended.get() {
                return;
            }
            if let Some(cb) = raf.borrow().as_ref() {
                raf_id.set(session.request_animation_frame(cb.as_ref().unchecked_ref()));
            }
        }) as Box<dyn FnMut(f64, web::XrFrame)>));
        if let Some(cb) = self.raf.borrow().as_ref() {
            self.raf_id
                .set(self.session.request_animation_frame(cb.as_ref().unchecked_ref()));
        }
    }
}

impl Release for XrSessionHandle {
    fn release(&mut self) {
        let already_ended = self.ended.replace(true);
        if let Some(source) = self.hit_source.take() {
            _ = invoke(&source, "cancel", &[]);
        }
        self.session.cancel_animation_frame(self.raf_id.get());
        self.raf.borrow_mut().take();
        for (event, closure) in self.listeners.drain(..) {
            _ = self
                .session
                .remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
        }
        if !already_ended {
            _ = self.session.end();
        }
        log::info!("[xr] session released");
    }
}

/// GL and XR objects that exist for the lifetime of one session.
struct XrScene {
    gl: Gl,
    layer: web::XrWebGlLayer,
    renderer: WallpaperRenderer,
    local: web::XrReferenceSpace,
    light_probe: Option<JsValue>,
    binding: Option<JsValue>,
    readback: Option<web::WebGlFramebuffer>,
    depth: Option<DepthEncoding>,
}

/// Last rendered view, kept for pointer unprojection.
#[derive(Clone, Copy)]
struct ViewState {
    view: Mat4,
    projection: Mat4,
}

pub struct ImmersiveEngine {
    config: PreviewConfig,
    spec: WallpaperSpec,
    labels: StatusLabels,
    document: web::Document,
    loader: WebAssetLoader,
    frame_hook: FrameHook,
    end_hook: FrameHook,
    frame_slot: Rc<RefCell<Option<web::XrFrame>>>,
    confirm_requested: Rc<Cell<bool>>,
    handle: Option<Lease<XrSessionHandle>>,
    scene: Option<XrScene>,
    tracker: SurfaceTracker,
    light: LightEstimator,
    pipeline: Option<OcclusionPipeline>,
    camera_gate: InferenceGate,
    camera_frame: RgbaImage,
    started_at: Option<Instant>,
    last_view: Option<ViewState>,
    drag_from: Option<Vec3>,
}

impl ImmersiveEngine {
    pub fn new(
        config: PreviewConfig,
        document: web::Document,
        loader: WebAssetLoader,
        frame_hook: FrameHook,
        end_hook: FrameHook,
    ) -> Self {
        let spec = config.wallpaper();
        Self {
            labels: config.labels(),
            tracker: SurfaceTracker::new(&spec),
            camera_gate: InferenceGate::new(config.profile().segmentation_interval),
            spec,
            config,
            document,
            loader,
            frame_hook,
            end_hook,
            frame_slot: Rc::new(RefCell::new(None)),
            confirm_requested: Rc::new(Cell::new(false)),
            handle: None,
            scene: None,
            light: LightEstimator::default(),
            pipeline: None,
            camera_frame: RgbaImage::new(0, 0),
            started_at: None,
            last_view: None,
            drag_from: None,
        }
    }

    fn report(&self, status: &mut dyn StatusSink) {
        status.emit(self.tracker.status(&self.labels));
        status.emit(match &self.pipeline {
            Some(p) => p.status(&self.labels),
            None => StatusEvent::new(
                Subsystem::Occlusion,
                self.labels.get("status_occlusion_off"),
                StatusState::Neutral,
            ),
        });
        status.emit(self.light.status(&self.labels));
    }

    fn create_gl(&self) -> Result<Gl, ArError> {
        let fail = |what: String| ArError::TransientDevice(format!("webgl2: {what}"));
        let canvas = self
            .document
            .create_element("canvas")
            .ok()
            .and_then(|el| el.dyn_into::<web::HtmlCanvasElement>().ok())
            .ok_or_else(|| fail("no canvas".into()))?;
        let options = js_sys::Object::new();
        _ = js_sys::Reflect::set(&options, &"xrCompatible".into(), &JsValue::TRUE);
        _ = js_sys::Reflect::set(&options, &"alpha".into(), &JsValue::TRUE);
        _ = js_sys::Reflect::set(&options, &"premultipliedAlpha".into(), &JsValue::TRUE);
        canvas
            .get_context_with_context_options("webgl2", &options)
            .map_err(|e| fail(format!("{:?}", e)))?
            .ok_or_else(|| fail("context unavailable".into()))?
            .dyn_into::<Gl>()
            .map_err(|e| fail(format!("{:?}", e)))
    }

    /// Wallpaper texture; the renderer's neutral swatch stays on failure.
    async fn load_wallpaper(&self, renderer: &WallpaperRenderer, token: &SessionToken) -> Result<(), ArError> {
        let image = self.loader.load_image(&self.config.image_url).await;
        token.check()?;
        match image {
            Ok(img) => {
                if let Err(e) = renderer.set_wallpaper(&img) {
                    log::warn!("[xr] wallpaper upload failed: {}", e);
                }
            }
            Err(e) => log::warn!("[xr] wallpaper image failed: {}", e),
        }
        Ok(())
    }

    fn build_pipeline(&self, depth: Option<DepthEncoding>, camera_access: bool) -> Option<OcclusionPipeline> {
        let mode = self.config.occlusion_mode;
        if mode == OcclusionMode::Off {
            return None;
        }
        let profile = self.config.profile();
        let mut pipeline = OcclusionPipeline::new(
            mode,
            depth.is_some(),
            SegmentationSettings::new(mode, &profile, &self.config.foreground_classes),
            profile.fallback_max_side,
        );
        if pipeline.kind() == OcclusionKind::Segmentation && !camera_access {
            pipeline.models_failed(&ArError::CapabilityAbsent);
        }
        Some(pipeline)
    }

    fn timestamp_ms(&mut self, now: Instant) -> f64 {
        let started = *self.started_at.get_or_insert(now);
        now.saturating_duration_since(started).as_secs_f64() * 1000.0
    }

    /// Wall point under a pointer, in world space.
    fn pointer_on_wall(&self, p: Vec2) -> Option<Vec3> {
        let view = self.last_view?;
        let basis = self.tracker.basis()?;
        let window = web::window()?;
        let size = Vec2::new(
            window.inner_width().ok()?.as_f64()? as f32,
            window.inner_height().ok()?.as_f64()? as f32,
        );
        let ndc = input::pixel_to_ndc(p, size);
        let inv = (view.projection * view.view).inverse();
        let (origin, dir) = input::screen_to_world_ray(ndc, inv)?;
        input::ray_plane(origin, dir, basis.origin, basis.normal)
    }

    fn pointer(&mut self, phase: PointerPhase, p: Vec2) -> bool {
        match phase {
            PointerPhase::Down => {
                self.drag_from = self.pointer_on_wall(p);
                self.drag_from.is_some()
            }
            PointerPhase::Move => {
                let (Some(from), Some(to)) = (self.drag_from, self.pointer_on_wall(p)) else {
                    return false;
                };
                self.tracker.drag(to - from);
                self.drag_from = Some(to);
                true
            }
            PointerPhase::Up => self.drag_from.take().is_some(),
        }
    }

    fn track(&mut self, frame: &web::XrFrame, scene: &XrScene, timestamp_ms: f64) {
        let hit = self
            .handle
            .as_ref()
            .and_then(Lease::get)
            .and_then(|h| h.hit_source.as_ref())
            .and_then(|source| invoke(frame, "getHitTestResults", &[source]).ok())
            .and_then(|results| js_sys::Array::from(&results).iter().next())
            .and_then(|first| invoke(&first, "getPose", &[&scene.local]).ok())
            .and_then(|pose| prop(&pose, "transform"))
            .and_then(|t| transform_matrix(&t))
            .and_then(|m| Pose::from_matrix(&m.to_cols_array(), timestamp_ms));
        self.tracker.on_hit(hit);

        if let Some(planes) = prop(frame, "detectedPlanes") {
            if let Ok(Some(iter)) = js_sys::try_iter(&planes) {
                for plane in iter.flatten() {
                    let Some(space) = prop(&plane, "planeSpace") else {
                        continue;
                    };
                    let Some(pose) = frame.get_pose(space.unchecked_ref(), &scene.local) else {
                        continue;
                    };
                    let Some(pose) = transform_matrix(&pose.transform())
                        .and_then(|m| Pose::from_matrix(&m.to_cols_array(), timestamp_ms))
                    else {
                        continue;
                    };
                    let polygon: Vec<Vec2> = prop(&plane, "polygon")
                        .map(|p| js_sys::Array::from(&p))
                        .map(|points| {
                            points
                                .iter()
                                .filter_map(|pt| Some(Vec2::new(number(&pt, "x")? as f32, number(&pt, "z")? as f32)))
                                .collect()
                        })
                        .unwrap_or_default();
                    self.tracker.observe_plane(&pose, &polygon);
                }
            }
        }

        if let Some(probe) = scene.light_probe.as_ref() {
            let intensity = invoke(frame, "getLightEstimate", &[probe])
                .ok()
                .filter(|e| !e.is_null() && !e.is_undefined())
                .and_then(|e| prop(&e, "primaryLightIntensity"));
            if let Some(i) = intensity {
                let channel = |k: &str| number(&i, k).unwrap_or(f64::NAN) as f32;
                self.light.update([channel("x"), channel("y"), channel("z")]);
            }
        }
    }

    /// Copy the camera image into `camera_frame`. Rows come back bottom-up.
    fn read_camera(&mut self, scene: &mut XrScene, view: &web::XrView) -> bool {
        let Some(binding) = scene.binding.as_ref() else {
            return false;
        };
        let Some(camera) = prop(view, "camera") else {
            return false;
        };
        let (w, h) = (
            number(&camera, "width").unwrap_or(0.0) as u32,
            number(&camera, "height").unwrap_or(0.0) as u32,
        );
        if w == 0 || h == 0 {
            return false;
        }
        let Some(texture) = invoke(binding, "getCameraImage", &[&camera])
            .ok()
            .and_then(|t| t.dyn_into::<web::WebGlTexture>().ok())
        else {
            return false;
        };
        let gl = &scene.gl;
        if scene.readback.is_none() {
            scene.readback = gl.create_framebuffer();
        }
        let Some(fb) = scene.readback.as_ref() else {
            return false;
        };
        self.camera_frame.ensure_size(w, h);
        gl.bind_framebuffer(Gl::FRAMEBUFFER, Some(fb));
        gl.framebuffer_texture_2d(Gl::FRAMEBUFFER, Gl::COLOR_ATTACHMENT0, Gl::TEXTURE_2D, Some(&texture), 0);
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(self.camera_frame.pixels_mut());
        let ok = gl
            .read_pixels_with_opt_u8_array(0, 0, w as i32, h as i32, Gl::RGBA, Gl::UNSIGNED_BYTE, Some(bytes))
            .is_ok();
        gl.framebuffer_texture_2d(Gl::FRAMEBUFFER, Gl::COLOR_ATTACHMENT0, Gl::TEXTURE_2D, None, 0);
        if ok {
            self.camera_frame.flip_vertical();
        }
        ok
    }

    /// Occlusion input for one view, with its texture uploaded.
    fn occlusion_for_view(
        &mut self,
        frame: &web::XrFrame,
        scene: &mut XrScene,
        view: &web::XrView,
        size: (u32, u32),
        now: Instant,
        timestamp_ms: f64,
    ) -> OcclusionInput {
        let kind = match self.pipeline.as_ref() {
            Some(p) => p.kind(),
            None => return OcclusionInput::None,
        };
        match kind {
            OcclusionKind::Depth => {
                let mut uv_transform = Mat4::IDENTITY;
                let depth = scene.depth.and_then(|encoding| {
                    let info = invoke(frame, "getDepthInformation", &[view])
                        .ok()
                        .filter(|i| !i.is_null() && !i.is_undefined())?;
                    let width = number(&info, "width")? as u32;
                    let height = number(&info, "height")? as u32;
                    let data = js_sys::Uint8Array::new(&prop(&info, "data")?).to_vec();
                    let scale = number(&info, "rawValueToMeters").map(|s| s as f32);
                    if let Some(m) = prop(&info, "normDepthBufferFromNormView").and_then(|t| transform_matrix(&t)) {
                        uv_transform = m;
                    }
                    DepthFrame::new(width, height, encoding, scale, data)
                        .map_err(|e| log::debug!("[xr] {}", e))
                        .ok()
                });
                let Some(pipeline) = self.pipeline.as_mut() else {
                    return OcclusionInput::None;
                };
                let source = SourceFrame {
                    camera: None,
                    depth: depth.as_ref(),
                    timestamp_ms,
                };
                let out = pipeline.estimate(source, size.0, size.1, now);
                match out.depth() {
                    Some(d) if scene.renderer.set_depth(d).is_ok() => OcclusionInput::Depth {
                        encoding: d.encoding,
                        raw_to_meters: d.raw_to_meters,
                        uv_transform,
                    },
                    _ => OcclusionInput::None,
                }
            }
            OcclusionKind::Segmentation => {
                let wants_camera = self.pipeline.as_ref().is_some_and(|p| !p.needs_models())
                    && self.camera_gate.try_begin(now);
                let grabbed = wants_camera && self.read_camera(scene, view);
                if wants_camera {
                    self.camera_gate.finish();
                }
                let Some(pipeline) = self.pipeline.as_mut() else {
                    return OcclusionInput::None;
                };
                let source = SourceFrame {
                    camera: grabbed.then_some(&self.camera_frame),
                    depth: None,
                    timestamp_ms,
                };
                let out = pipeline.estimate(source, size.0, size.1, now);
                match out.mask() {
                    Some(m) if scene.renderer.set_mask(m).is_ok() => OcclusionInput::Mask,
                    _ => OcclusionInput::None,
                }
            }
            OcclusionKind::None => OcclusionInput::None,
        }
    }

    fn render(&mut self, frame: &web::XrFrame, scene: &mut XrScene, now: Instant, timestamp_ms: f64) {
        let Some(viewer) = frame.get_viewer_pose(&scene.local) else {
            return;
        };
        let gl = scene.gl.clone();
        gl.bind_framebuffer(Gl::FRAMEBUFFER, scene.layer.framebuffer().as_ref());
        gl.clear_color(0.0, 0.0, 0.0, 0.0);
        gl.clear(Gl::COLOR_BUFFER_BIT | Gl::DEPTH_BUFFER_BIT);

        let brightness = self.light.apply(self.spec.brightness);
        let model = self.tracker.model_matrix();
        let reticle = self.tracker.reticle().map(|pose| {
            pose.matrix() * Mat4::from_scale(Vec3::new(RETICLE_SIZE_M, RETICLE_SIZE_M, 1.0))
        });

        for view in viewer.views().iter() {
            let view: web::XrView = view.unchecked_into();
            let Some(viewport) = scene.layer.get_viewport(&view) else {
                continue;
            };
            let (Some(projection), Some(view_matrix)) = (
                mat4(&view.projection_matrix()),
                transform_matrix(&view.transform().inverse()),
            ) else {
                continue;
            };
            self.last_view = Some(ViewState {
                view: view_matrix,
                projection,
            });
            let size = (viewport.width().max(1) as u32, viewport.height().max(1) as u32);
            let occlusion = self.occlusion_for_view(frame, scene, &view, size, now, timestamp_ms);

            // the camera readback may have rebound the framebuffer
            gl.bind_framebuffer(Gl::FRAMEBUFFER, scene.layer.framebuffer().as_ref());
            gl.viewport(viewport.x(), viewport.y(), viewport.width(), viewport.height());
            let mut params = DrawParams {
                model: Mat4::IDENTITY,
                view: view_matrix,
                projection,
                viewport: Vec4::new(
                    viewport.x() as f32,
                    viewport.y() as f32,
                    viewport.width() as f32,
                    viewport.height() as f32,
                ),
                tiles: Vec2::new(self.spec.tile_x as f32, self.spec.tile_y as f32),
                brightness,
                opacity: self.tracker.opacity(),
                occlusion,
                bias: DEPTH_BIAS_METERS,
                band: DEPTH_SOFT_BAND_METERS,
            };
            if let Some(model) = model {
                params.model = model;
                scene.renderer.draw(&params);
            }
            if let Some(reticle) = reticle {
                params.model = reticle;
                scene.renderer.draw_reticle(&params);
            }
        }
    }
}

impl Engine for ImmersiveEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::SurfaceTracking
    }

    async fn start(&mut self, token: &SessionToken, status: &mut dyn StatusSink) -> Result<(), ArError> {
        let window = web::window().ok_or(ArError::CapabilityAbsent)?;
        let xr = window.navigator().xr();
        let init = session_init(self.config.occlusion_mode, &self.document);
        let session = JsFuture::from(xr.request_session_with_options(web::XrSessionMode::ImmersiveAr, &init))
            .await
            .map_err(|e| dom::to_ar_error(&e))?;
        let session: web::XrSession = session.unchecked_into();
        let mut handle = Lease::new(XrSessionHandle::new(session.clone()));
        token.check()?;
        log::info!("[xr] immersive-ar session started");

        let gl = self.create_gl()?;
        JsFuture::from(gl.make_xr_compatible())
            .await
            .map_err(|e| dom::to_ar_error(&e))?;
        token.check()?;
        let layer = web::XrWebGlLayer::new_with_web_gl2_rendering_context(&session, &gl)
            .map_err(|e| dom::to_ar_error(&e))?;
        let render_state = js_sys::Object::new();
        _ = js_sys::Reflect::set(&render_state, &"baseLayer".into(), &layer);
        _ = js_sys::Reflect::set(&render_state, &"depthNear".into(), &JsValue::from_f64(NEAR_PLANE_M as f64));
        _ = js_sys::Reflect::set(&render_state, &"depthFar".into(), &JsValue::from_f64(FAR_PLANE_M as f64));
        session.update_render_state_with_state(render_state.unchecked_ref());

        let local: web::XrReferenceSpace =
            JsFuture::from(session.request_reference_space(web::XrReferenceSpaceType::Local))
                .await
                .map_err(|e| dom::to_ar_error(&e))?
                .unchecked_into();
        token.check()?;
        let viewer: web::XrReferenceSpace =
            JsFuture::from(session.request_reference_space(web::XrReferenceSpaceType::Viewer))
                .await
                .map_err(|e| dom::to_ar_error(&e))?
                .unchecked_into();
        token.check()?;

        let options = js_sys::Object::new();
        _ = js_sys::Reflect::set(&options, &"space".into(), &viewer);
        let hit_source = invoke_async(&session, "requestHitTestSource", &[&options])
            .await
            .map_err(|e| dom::to_ar_error(&e))?;
        if let Some(h) = handle.get_mut() {
            h.hit_source = Some(hit_source);
        }
        token.check()?;

        let enabled = enabled_features(&session);
        let light_probe = if feature_granted(&enabled, "light-estimation") {
            match invoke_async(&session, "requestLightProbe", &[]).await {
                Ok(probe) => Some(probe),
                Err(e) => {
                    log::info!("[xr] no light probe: {:?}", e);
                    None
                }
            }
        } else {
            None
        };
        token.check()?;

        let depth = if self.config.occlusion_mode.allows_depth() {
            negotiated_depth(&session)
        } else {
            None
        };
        let binding = if feature_granted(&enabled, "camera-access") {
            prop(&window, "XRWebGLBinding")
                .and_then(|ctor| ctor.dyn_into::<js_sys::Function>().ok())
                .and_then(|ctor| {
                    let args: js_sys::Array = [JsValue::from(session.clone()), JsValue::from(gl.clone())]
                        .iter()
                        .collect();
                    js_sys::Reflect::construct(&ctor, &args).ok()
                })
        } else {
            None
        };
        log::info!(
            "[xr] depth {:?}, camera access {}, light probe {}",
            depth,
            binding.is_some(),
            light_probe.is_some()
        );
        self.pipeline = self.build_pipeline(depth, binding.is_some());

        let renderer = WallpaperRenderer::new(&gl).map_err(|e| ArError::TransientDevice(e.to_string()))?;
        self.load_wallpaper(&renderer, token).await?;

        if let Some(h) = handle.get_mut() {
            let confirm = self.confirm_requested.clone();
            h.listen("select", move || confirm.set(true));
            let ended = h.ended.clone();
            let end_hook = self.end_hook.clone();
            h.listen("end", move || {
                if ended.replace(true) {
                    return;
                }
                log::info!("[xr] session ended by the platform");
                if let Some(hook) = end_hook.borrow_mut().as_mut() {
                    hook();
                }
            });
            h.start_loop(self.frame_slot.clone(), self.frame_hook.clone());
        }

        self.scene = Some(XrScene {
            gl,
            layer,
            renderer,
            local,
            light_probe,
            binding,
            readback: None,
            depth,
        });
        self.handle = Some(handle);

        status.emit(StatusEvent::new(
            Subsystem::Engine,
            self.labels.get("engine_surface"),
            StatusState::Success,
        ));
        self.report(status);
        Ok(())
    }

    fn on_frame(&mut self, now: Instant, status: &mut dyn StatusSink) {
        let Some(frame) = self.frame_slot.borrow().clone() else {
            return;
        };
        let Some(mut scene) = self.scene.take() else {
            return;
        };
        let timestamp_ms = self.timestamp_ms(now);
        if self.confirm_requested.replace(false) {
            self.tracker.confirm();
        }
        self.track(&frame, &scene, timestamp_ms);
        self.render(&frame, &mut scene, now, timestamp_ms);
        self.scene = Some(scene);
        self.report(status);
    }

    fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
        self.scene = None;
        self.tracker.reset();
        self.light.reset();
        if let Some(p) = self.pipeline.as_mut() {
            p.reset();
        }
        self.last_view = None;
        self.drag_from = None;
    }

    fn apply(&mut self, action: UserAction) -> bool {
        match action {
            UserAction::Confirm => self.tracker.confirm(),
            UserAction::Reset => {
                self.tracker.reset();
                if let Some(p) = self.pipeline.as_mut() {
                    p.reset();
                }
                self.drag_from = None;
                true
            }
            UserAction::FitWall => self.tracker.fit_to_wall().is_some(),
            UserAction::Scale(steps) => {
                self.tracker.scale_by(steps);
                true
            }
            UserAction::Rotate(steps) => {
                self.tracker.rotate_by(steps);
                true
            }
            UserAction::Nudge(dx, dy) => {
                self.tracker.nudge(dx, dy);
                true
            }
            UserAction::Pointer(phase, p) => self.pointer(phase, p),
            UserAction::FitWidth | UserAction::FitHeight => false,
        }
    }

    fn model_request(&self) -> Option<ModelRequest> {
        let pipeline = self.pipeline.as_ref()?;
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
        let Some(pipeline) = self.pipeline.as_mut() else {
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
