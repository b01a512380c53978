use crate::constants::{DETECTOR_MAX_RESULTS, VISION_MODULE_SOURCES, VISION_WASM_ROOTS};
use crate::dom;
use ar_core::assets::{first_success, normalize_sources, AssetLoader};
use ar_core::constants::DETECTION_SCORE_THRESHOLD;
use ar_core::image::budget_size;
use ar_core::{ArError, DetectionBox, ObjectDetector, RgbaImage, SegmentationOutput, Segmenter};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::{Clamped, JsCast};
use wasm_bindgen_futures::JsFuture;
use web_sys as web;

#[wasm_bindgen(inline_js = "export function import_module(url) { return import(/* webpackIgnore: true */ url); }")]
extern "C" {
    #[wasm_bindgen(catch)]
    fn import_module(url: &str) -> Result<js_sys::Promise, JsValue>;
}

fn js_err(context: &str, err: &JsValue) -> ArError {
    let (name, message) = dom::js_error_parts(err);
    ArError::ModelLoad(format!("{context}: {name} {message}"))
}

fn get(target: &JsValue, key: &str) -> Result<JsValue, ArError> {
    let value = js_sys::Reflect::get(target, &key.into()).map_err(|e| js_err(key, &e))?;
    if value.is_undefined() || value.is_null() {
        return Err(ArError::ModelLoad(format!("missing '{key}'")));
    }
    Ok(value)
}

fn set(target: &JsValue, key: &str, value: &JsValue) {
    _ = js_sys::Reflect::set(target, &key.into(), value);
}

/// Call `target[name](...args)`.
fn call(target: &JsValue, name: &str, args: &[&JsValue]) -> Result<JsValue, ArError> {
    let func: js_sys::Function = get(target, name)?
        .dyn_into()
        .map_err(|_| ArError::ModelLoad(format!("'{name}' is not a function")))?;
    let array = js_sys::Array::new();
    for a in args {
        array.push(a);
    }
    js_sys::Reflect::apply(&func, target, &array).map_err(|e| js_err(name, &e))
}

async fn call_async(target: &JsValue, name: &str, args: &[&JsValue]) -> Result<JsValue, ArError> {
    let promise: js_sys::Promise = call(target, name, args)?
        .dyn_into()
        .map_err(|_| ArError::ModelLoad(format!("'{name}' did not return a promise")))?;
    JsFuture::from(promise).await.map_err(|e| js_err(name, &e))
}

fn image_data(frame: &RgbaImage) -> Result<web::ImageData, ArError> {
    web::ImageData::new_with_u8_clamped_array_and_sh(Clamped(frame.as_bytes()), frame.width(), frame.height())
        .map_err(|e| ArError::TransientDevice(format!("ImageData: {:?}", e)))
}

/// The tasks-vision module and its wasm fileset, loaded once per page.
#[derive(Default)]
struct VisionRuntime {
    module: RefCell<Option<JsValue>>,
    fileset: RefCell<Option<JsValue>>,
}

impl VisionRuntime {
    async fn module(&self) -> Result<JsValue, ArError> {
        if let Some(m) = self.module.borrow().as_ref() {
            return Ok(m.clone());
        }
        let sources: Vec<String> = VISION_MODULE_SOURCES.iter().map(|s| s.to_string()).collect();
        let module = first_success(&normalize_sources(&sources), |url| async move {
            let promise = import_module(&url).map_err(|e| js_err("import", &e))?;
            JsFuture::from(promise).await.map_err(|e| js_err("import", &e))
        })
        .await?;
        *self.module.borrow_mut() = Some(module.clone());
        Ok(module)
    }

    async fn fileset(&self) -> Result<(JsValue, JsValue), ArError> {
        let module = self.module().await?;
        if let Some(f) = self.fileset.borrow().as_ref() {
            return Ok((module, f.clone()));
        }
        let resolver = get(&module, "FilesetResolver")?;
        let roots: Vec<String> = VISION_WASM_ROOTS.iter().map(|s| s.to_string()).collect();
        let fileset = first_success(&normalize_sources(&roots), |root| {
            let resolver = resolver.clone();
            async move { call_async(&resolver, "forVisionTasks", &[&JsValue::from_str(&root)]).await }
        })
        .await?;
        *self.fileset.borrow_mut() = Some(fileset.clone());
        Ok((module, fileset))
    }
}

fn base_options(model_url: &str) -> js_sys::Object {
    let base = js_sys::Object::new();
    set(&base, "modelAssetPath", &model_url.into());
    set(&base, "delegate", &"GPU".into());
    let options = js_sys::Object::new();
    set(&options, "baseOptions", &base);
    set(&options, "runningMode", &"VIDEO".into());
    options
}

/// Video mode rejects timestamps that do not increase.
#[derive(Default)]
struct MonotonicClock {
    last: f64,
}

impl MonotonicClock {
    fn next(&mut self, timestamp_ms: f64) -> f64 {
        let t = if timestamp_ms > self.last { timestamp_ms } else { self.last + 1.0 };
        self.last = t;
        t
    }
}

pub struct VisionSegmenter {
    inner: JsValue,
    labels: Vec<String>,
    clock: MonotonicClock,
}

impl VisionSegmenter {
    fn read_result(&self, result: &JsValue) -> Result<SegmentationOutput, ArError> {
        // Multi-class models carry a label table; pick their category mask.
        if self.labels.len() > 2 {
            if let Ok(mask) = get(result, "categoryMask") {
                let width = get(&mask, "width")?.as_f64().unwrap_or(0.0) as u32;
                let height = get(&mask, "height")?.as_f64().unwrap_or(0.0) as u32;
                let data: js_sys::Uint8Array = call(&mask, "getAsUint8Array", &[])?.unchecked_into();
                return Ok(SegmentationOutput::Categories {
                    width,
                    height,
                    data: data.to_vec(),
                    labels: self.labels.clone(),
                });
            }
        }
        let masks: js_sys::Array = get(result, "confidenceMasks")?.unchecked_into();
        let mask = masks.get(masks.length().saturating_sub(1));
        let width = get(&mask, "width")?.as_f64().unwrap_or(0.0) as u32;
        let height = get(&mask, "height")?.as_f64().unwrap_or(0.0) as u32;
        let values: js_sys::Float32Array = call(&mask, "getAsFloat32Array", &[])?.unchecked_into();
        Ok(SegmentationOutput::Confidence {
            width,
            height,
            values: values.to_vec(),
        })
    }
}

impl Segmenter for VisionSegmenter {
    fn segment(&mut self, frame: &RgbaImage, timestamp_ms: f64) -> Result<SegmentationOutput, ArError> {
        let input = image_data(frame)?;
        let ts = self.clock.next(timestamp_ms);
        let result = call(&self.inner, "segmentForVideo", &[&input, &JsValue::from_f64(ts)])?;
        let output = self.read_result(&result);
        _ = call(&result, "close", &[]);
        output
    }
}

pub struct VisionDetector {
    inner: JsValue,
    clock: MonotonicClock,
}

fn read_detection(det: &JsValue, source: (u32, u32)) -> Option<DetectionBox> {
    let categories: js_sys::Array = get(det, "categories").ok()?.unchecked_into();
    let top = categories.get(0);
    let label = get(&top, "categoryName").ok()?.as_string()?;
    let score = get(&top, "score").ok()?.as_f64()? as f32;
    let bbox = get(det, "boundingBox").ok()?;
    let num = |k: &str| get(&bbox, k).ok().and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
    let rect = [num("originX"), num("originY"), num("width"), num("height")];
    Some(DetectionBox::from_pixels(label, rect, source, score))
}

impl ObjectDetector for VisionDetector {
    fn detect(&mut self, frame: &RgbaImage, timestamp_ms: f64) -> Result<Vec<DetectionBox>, ArError> {
        let input = image_data(frame)?;
        let ts = self.clock.next(timestamp_ms);
        let result = call(&self.inner, "detectForVideo", &[&input, &JsValue::from_f64(ts)])?;
        let detections: js_sys::Array = get(&result, "detections")?.unchecked_into();
        let source = (frame.width(), frame.height());
        Ok(detections
            .iter()
            .filter_map(|d| read_detection(&d, source))
            .collect())
    }
}

/// Product image and vision models, fetched by the browser.
#[derive(Clone)]
pub struct WebAssetLoader {
    document: web::Document,
    max_side: u32,
    runtime: Rc<VisionRuntime>,
}

impl WebAssetLoader {
    pub fn new(document: web::Document, max_side: u32) -> Self {
        Self {
            document,
            max_side,
            runtime: Rc::new(VisionRuntime::default()),
        }
    }

    fn rasterize(&self, img: &web::HtmlImageElement) -> Result<RgbaImage, ArError> {
        let fail = |what: String| ArError::TransientDevice(format!("wallpaper image: {what}"));
        let (w, h) = budget_size(img.natural_width(), img.natural_height(), self.max_side);
        let canvas = self
            .document
            .create_element("canvas")
            .ok()
            .and_then(|el| el.dyn_into::<web::HtmlCanvasElement>().ok())
            .ok_or_else(|| fail("no canvas".into()))?;
        canvas.set_width(w);
        canvas.set_height(h);
        let ctx = canvas
            .get_context("2d")
            .ok()
            .flatten()
            .and_then(|c| c.dyn_into::<web::CanvasRenderingContext2d>().ok())
            .ok_or_else(|| fail("no 2d context".into()))?;
        ctx.draw_image_with_html_image_element_and_dw_and_dh(img, 0.0, 0.0, w as f64, h as f64)
            .map_err(|e| fail(format!("{:?}", e)))?;
        // Throws for cross-origin images served without CORS headers.
        let data = ctx
            .get_image_data(0.0, 0.0, w as f64, h as f64)
            .map_err(|e| fail(format!("{:?}", e)))?;
        RgbaImage::from_bytes(w, h, &data.data()).ok_or_else(|| fail("size mismatch".into()))
    }
}

impl AssetLoader for WebAssetLoader {
    async fn load_image(&self, url: &str) -> Result<RgbaImage, ArError> {
        if url.is_empty() {
            return Err(ArError::InvalidConfig("no wallpaper image configured".into()));
        }
        let img = web::HtmlImageElement::new().map_err(|e| dom::to_ar_error(&e))?;
        img.set_cross_origin(Some("anonymous"));
        img.set_src(url);
        JsFuture::from(img.decode())
            .await
            .map_err(|e| ArError::TransientDevice(format!("{url}: {:?}", e)))?;
        let image = self.rasterize(&img)?;
        log::info!("[assets] wallpaper {}x{}", image.width(), image.height());
        Ok(image)
    }

    async fn load_segmenter(&self, url: &str) -> Result<Box<dyn Segmenter>, ArError> {
        let (module, fileset) = self.runtime.fileset().await?;
        let class = get(&module, "ImageSegmenter")?;
        let options = base_options(url);
        set(&options, "outputCategoryMask", &JsValue::TRUE);
        set(&options, "outputConfidenceMasks", &JsValue::TRUE);
        let inner = call_async(&class, "createFromOptions", &[&fileset, &options]).await?;
        let labels = call(&inner, "getLabels", &[])
            .ok()
            .map(|v| {
                js_sys::Array::from(&v)
                    .iter()
                    .filter_map(|l| l.as_string())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Box::new(VisionSegmenter {
            inner,
            labels,
            clock: MonotonicClock::default(),
        }))
    }

    async fn load_detector(&self, url: &str) -> Result<Box<dyn ObjectDetector>, ArError> {
        let (module, fileset) = self.runtime.fileset().await?;
        let class = get(&module, "ObjectDetector")?;
        let options = base_options(url);
        set(&options, "scoreThreshold", &JsValue::from_f64(DETECTION_SCORE_THRESHOLD as f64));
        set(&options, "maxResults", &JsValue::from_f64(DETECTOR_MAX_RESULTS as f64));
        let inner = call_async(&class, "createFromOptions", &[&fileset, &options]).await?;
        Ok(Box::new(VisionDetector {
            inner,
            clock: MonotonicClock::default(),
        }))
    }
}
