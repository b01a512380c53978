/// Page wiring and rendering constants for the browser front-end.
///
/// Element ids are the contract with the host template; everything else keeps
/// magic numbers out of the engine code.
// Host page elements
pub const CONFIG_GLOBAL: &str = "arwpData";
pub const CONTAINER_ID: &str = "arwp-container";
pub const CANVAS_ID: &str = "arwp-canvas";
pub const GUIDANCE_ID: &str = "arwp-guidance";
pub const STATUS_EVENT: &str = "arwp:status";

// Action buttons (optional; missing ones are skipped)
pub const BUTTON_START: &str = "arwp-start";
pub const BUTTON_CONFIRM: &str = "arwp-confirm";
pub const BUTTON_RESET: &str = "arwp-reset";
pub const BUTTON_FIT_WIDTH: &str = "arwp-fit-width";
pub const BUTTON_FIT_HEIGHT: &str = "arwp-fit-height";
pub const BUTTON_FIT_WALL: &str = "arwp-fit-wall";
pub const BUTTON_SCALE_UP: &str = "arwp-scale-up";
pub const BUTTON_SCALE_DOWN: &str = "arwp-scale-down";
pub const BUTTON_ROTATE_LEFT: &str = "arwp-rotate-left";
pub const BUTTON_ROTATE_RIGHT: &str = "arwp-rotate-right";
pub const BUTTON_SNAPSHOT: &str = "arwp-snapshot";

pub const SNAPSHOT_MIME: &str = "image/png";
pub const SNAPSHOT_FILE_PREFIX: &str = "wallpaper-preview";

// Planar overlay drawing (CSS pixels, scaled by devicePixelRatio)
pub const HANDLE_RADIUS_PX: f64 = 9.0;
pub const OUTLINE_WIDTH_PX: f64 = 2.0;
pub const OUTLINE_COLOR: &str = "rgba(255, 255, 255, 0.9)";
pub const HANDLE_FILL: &str = "rgba(30, 136, 229, 0.85)";
pub const HANDLE_ACTIVE_FILL: &str = "rgba(255, 193, 7, 0.95)";

// Immersive session
pub const XR_REQUIRED_FEATURES: [&str; 2] = ["hit-test", "local"];
pub const XR_OPTIONAL_FEATURES: [&str; 4] =
    ["plane-detection", "dom-overlay", "light-estimation", "camera-access"];
pub const XR_DEPTH_FEATURE: &str = "depth-sensing";
// depth is read on the CPU and uploaded to our own texture
pub const XR_DEPTH_USAGE: [&str; 1] = ["cpu-optimized"];
pub const XR_DEPTH_FORMATS: [&str; 3] = ["luminance-alpha", "float32", "unsigned-short"];
pub const RETICLE_SIZE_M: f32 = 0.2;
pub const NEAR_PLANE_M: f32 = 0.05;
pub const FAR_PLANE_M: f32 = 100.0;

// Vision tasks runtime, tried in order
pub const VISION_MODULE_SOURCES: [&str; 2] = [
    "https://cdn.jsdelivr.net/npm/@mediapipe/tasks-vision@0.10.3",
    "https://unpkg.com/@mediapipe/tasks-vision@0.10.3?module",
];
pub const VISION_WASM_ROOTS: [&str; 2] = [
    "https://cdn.jsdelivr.net/npm/@mediapipe/tasks-vision@0.10.3/wasm",
    "https://unpkg.com/@mediapipe/tasks-vision@0.10.3/wasm",
];
pub const DETECTOR_MAX_RESULTS: u32 = 5;
