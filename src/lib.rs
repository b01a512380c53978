#![cfg(target_arch = "wasm32")]
use crate::constants::{BUTTON_SNAPSHOT, BUTTON_START, CANVAS_ID, CONFIG_GLOBAL, CONTAINER_ID};
use crate::engines::{PlanarView, SharedOrchestrator, WebFactory};
use crate::overlay::StatusTray;
use crate::vision::WebAssetLoader;
use ar_core::{ActiveEngine, Orchestrator, PreviewConfig};
use instant::Instant;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys as web;

mod camera;
mod constants;
mod dom;
mod engines;
mod events;
mod frame;
mod input;
mod overlay;
mod probe;
mod snapshot;
mod tray;
mod vision;

/// Everything the page callbacks share once `init` has run.
#[derive(Clone)]
struct App {
    document: web::Document,
    orch: SharedOrchestrator,
    frame_ctx: Rc<RefCell<frame::FrameContext>>,
    loop_active: Rc<Cell<bool>>,
    loader: WebAssetLoader,
}

/// Host configuration from `window.arwpData`; defaults when absent or invalid.
fn read_config(window: &web::Window) -> PreviewConfig {
    let raw = js_sys::Reflect::get(window, &CONFIG_GLOBAL.into()).unwrap_or(JsValue::UNDEFINED);
    if raw.is_undefined() || raw.is_null() {
        log::warn!("[config] window.{} missing, using defaults", CONFIG_GLOBAL);
        return PreviewConfig::default();
    }
    let json = match js_sys::JSON::stringify(&raw) {
        Ok(s) => String::from(s),
        Err(e) => {
            log::warn!("[config] window.{} is not serializable: {:?}", CONFIG_GLOBAL, e);
            return PreviewConfig::default();
        }
    };
    match PreviewConfig::from_json(&json) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("[config] {}; using defaults", e);
            PreviewConfig::default()
        }
    }
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Info).ok();
    log::info!("ar-web starting");

    spawn_local(async move {
        if let Err(e) = init().await {
            log::error!("init error: {:?}", e);
        }
    });
    Ok(())
}

async fn init() -> anyhow::Result<()> {
    let window = web::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| anyhow::anyhow!("no document"))?;

    let config = read_config(&window);
    if config.debug {
        log::set_max_level(log::LevelFilter::Debug);
    }
    log::info!(
        "[config] priority={:?} override={:?} occlusion={:?} performance={:?}",
        config.engine_priority,
        config.engine_override,
        config.occlusion_mode,
        config.performance_mode
    );

    let canvas: web::HtmlCanvasElement = dom::element_by_id(&document, CANVAS_ID)?;
    let view = Rc::new(PlanarView::new(&canvas)?);

    let factory = WebFactory::new(config.clone(), document.clone());
    let xr_frame = factory.xr_frame.clone();
    let xr_ended = factory.xr_ended.clone();
    let loader = factory.loader();
    let orch: SharedOrchestrator = Rc::new(RefCell::new(Orchestrator::new(
        factory,
        config.engine_priority.clone(),
        config.engine_override,
        config.labels(),
    )));

    let app = App {
        frame_ctx: Rc::new(RefCell::new(frame::FrameContext {
            orch: orch.clone(),
            tray: StatusTray::new(document.clone()),
            view,
        })),
        loop_active: Rc::new(Cell::new(false)),
        document: document.clone(),
        orch: orch.clone(),
        loader,
    };

    // XR session frames drive the orchestrator directly
    {
        let orch = orch.clone();
        let mut tray = StatusTray::new(document.clone());
        *xr_frame.borrow_mut() = Some(Box::new(move || {
            if let Ok(mut orch) = orch.try_borrow_mut() {
                orch.frame(Instant::now(), &mut tray);
            }
        }));
    }
    {
        let orch = orch.clone();
        let document = document.clone();
        *xr_ended.borrow_mut() = Some(Box::new(move || {
            log::info!("[engine] immersive session ended by the platform");
            if let Ok(mut orch) = orch.try_borrow_mut() {
                orch.stop();
            }
            overlay::show(&document, BUTTON_START);
        }));
    }

    events::wire_action_buttons(&document, &orch);
    wire_snapshot_button(&app);
    events::wire_global_keydown(orch.clone());

    let target: web::HtmlElement = match document.get_element_by_id(CONTAINER_ID) {
        Some(el) => el.dyn_into::<web::HtmlElement>().unwrap_or_else(|_| canvas.clone().into()),
        None => canvas.clone().into(),
    };
    events::wire_input_handlers(events::InputWiring {
        target,
        canvas: canvas.clone(),
        orch: orch.clone(),
        dragging: Rc::new(Cell::new(false)),
    });

    // Immersive sessions need a user gesture, so start from the button when
    // the page has one.
    let app_start = app.clone();
    if !dom::add_click_listener(&document, BUTTON_START, move || {
        spawn_local(launch(app_start.clone()));
    }) {
        spawn_local(launch(app.clone()));
    }

    let app_perm = app.clone();
    spawn_local(camera::watch_permission(move |state| {
        let app = app_perm.clone();
        spawn_local(async move {
            let Ok(mut orch) = app.orch.try_borrow_mut() else {
                log::debug!("[camera] start in progress, ignoring permission change");
                return;
            };
            let mut tray = StatusTray::new(app.document.clone());
            let started = orch.on_permission_change(state, &mut tray).await;
            drop(orch);
            if started {
                after_start(&app);
            }
        });
    }));

    Ok(())
}

async fn launch(app: App) {
    let started = {
        let Ok(mut orch) = app.orch.try_borrow_mut() else {
            log::debug!("[engine] already starting");
            return;
        };
        let probe = probe::WebProbe::new(app.document.clone());
        let mut tray = StatusTray::new(app.document.clone());
        orch.run(&probe, &mut tray).await
    };
    if started {
        after_start(&app);
    }
}

/// Begin drawing and fetch models for the session that just started.
fn after_start(app: &App) {
    overlay::hide(&app.document, BUTTON_START);
    let (planar, request, token) = {
        let Ok(orch) = app.orch.try_borrow() else {
            return;
        };
        (
            matches!(orch.engine(), Some(ActiveEngine::Planar(_))),
            orch.model_request(),
            orch.token(),
        )
    };
    if planar {
        frame::start_loop(app.frame_ctx.clone(), app.loop_active.clone());
    }
    let Some(request) = request else {
        return;
    };
    let app = app.clone();
    spawn_local(async move {
        let models = ar_core::assets::load_models(&app.loader, &request).await;
        if !token.is_active() {
            log::info!("[assets] session ended before models arrived");
            return;
        }
        match app.orch.try_borrow_mut() {
            Ok(mut orch) => {
                let mut tray = StatusTray::new(app.document.clone());
                orch.install_models(models, &mut tray);
            }
            Err(_) => log::warn!("[assets] orchestrator busy, dropping models"),
        }
    });
}

fn wire_snapshot_button(app: &App) {
    let orch = app.orch.clone();
    let document = app.document.clone();
    dom::add_click_listener(&app.document, BUTTON_SNAPSHOT, move || {
        let image = orch.try_borrow().ok().and_then(|o| o.snapshot());
        let Some(image) = image else {
            log::info!("[snapshot] nothing to export");
            return;
        };
        if let Err(e) = snapshot::export(&document, &image) {
            log::warn!("[snapshot] export failed: {:?}", e);
        }
    });
}
