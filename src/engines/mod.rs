mod gl;
pub mod immersive;
pub mod planar;

use crate::camera::WebCamera;
use crate::vision::WebAssetLoader;
use ar_core::{EngineFactory, Orchestrator, PreviewConfig};
use std::cell::RefCell;
use std::rc::Rc;
use web_sys as web;

pub use immersive::ImmersiveEngine;
pub use planar::{PlanarPreview, PlanarView};

/// Callback slot filled in once the orchestrator exists.
pub type FrameHook = Rc<RefCell<Option<Box<dyn FnMut()>>>>;

pub type WebOrchestrator = Orchestrator<WebFactory>;
pub type SharedOrchestrator = Rc<RefCell<WebOrchestrator>>;

/// Builds fresh engines wired to the page's camera, loader and hooks.
pub struct WebFactory {
    config: PreviewConfig,
    document: web::Document,
    camera: WebCamera,
    loader: WebAssetLoader,
    /// Runs one orchestrator frame from inside the XR animation callback.
    pub xr_frame: FrameHook,
    /// Runs when the platform ends the immersive session on its own.
    pub xr_ended: FrameHook,
}

impl WebFactory {
    pub fn new(config: PreviewConfig, document: web::Document) -> Self {
        let loader = WebAssetLoader::new(document.clone(), config.max_texture_resolution);
        Self {
            camera: WebCamera::new(document.clone()),
            loader,
            config,
            document,
            xr_frame: Rc::new(RefCell::new(None)),
            xr_ended: Rc::new(RefCell::new(None)),
        }
    }

    pub fn loader(&self) -> WebAssetLoader {
        self.loader.clone()
    }
}

impl EngineFactory for WebFactory {
    type Surface = ImmersiveEngine;
    type Planar = PlanarPreview;

    fn surface(&self) -> ImmersiveEngine {
        ImmersiveEngine::new(
            self.config.clone(),
            self.document.clone(),
            self.loader.clone(),
            self.xr_frame.clone(),
            self.xr_ended.clone(),
        )
    }

    fn planar(&self) -> PlanarPreview {
        PlanarPreview::new(self.config.clone(), self.camera.clone(), self.loader.clone())
    }
}
