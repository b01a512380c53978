use crate::dom;
use ar_core::{ArError, CapabilityProbe, EngineKind, EnvironmentFacts};
use wasm_bindgen_futures::JsFuture;
use web_sys as web;

/// Feasibility checks against the live browser.
pub struct WebProbe {
    document: web::Document,
}

impl WebProbe {
    pub fn new(document: web::Document) -> Self {
        Self { document }
    }

    /// Resolves `navigator.xr.isSessionSupported("immersive-ar")`.
    async fn immersive_ar_supported(&self) -> Result<bool, ArError> {
        let window = web::window().ok_or(ArError::CapabilityAbsent)?;
        let navigator = window.navigator();
        if !js_sys::Reflect::has(&navigator, &"xr".into()).unwrap_or(false) {
            return Ok(false);
        }
        let xr = navigator.xr();
        let supported = JsFuture::from(xr.is_session_supported(web::XrSessionMode::ImmersiveAr))
            .await
            .map_err(|e| dom::to_ar_error(&e))?;
        Ok(supported.as_bool().unwrap_or(false))
    }

    async fn facts(&self, kind: EngineKind) -> Result<EnvironmentFacts, ArError> {
        let mut facts = EnvironmentFacts {
            secure_context: dom::is_secure_context(),
            camera_api: dom::has_camera_api(),
            canvas_2d: dom::has_canvas_2d(&self.document),
            immersive_ar: false,
        };
        if kind == EngineKind::SurfaceTracking && facts.secure_context {
            facts.immersive_ar = self.immersive_ar_supported().await?;
        }
        Ok(facts)
    }
}

impl CapabilityProbe for WebProbe {
    async fn probe(&self, kind: EngineKind) -> Result<bool, ArError> {
        let facts = self.facts(kind).await?;
        log::info!("[capability] {} -> {:?}", kind, facts);
        Ok(facts.supports(kind))
    }
}
