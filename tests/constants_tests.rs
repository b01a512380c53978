// Host-side tests for page wiring constants.
// The main crate is wasm-only, so we include the pure-Rust modules directly.

#![allow(dead_code)]
mod constants {
    include!("../src/constants.rs");
}

use constants::*;

#[test]
fn element_ids_share_the_page_prefix() {
    let ids = [
        CONTAINER_ID,
        CANVAS_ID,
        GUIDANCE_ID,
        BUTTON_START,
        BUTTON_CONFIRM,
        BUTTON_RESET,
        BUTTON_FIT_WIDTH,
        BUTTON_FIT_HEIGHT,
        BUTTON_FIT_WALL,
        BUTTON_SCALE_UP,
        BUTTON_SCALE_DOWN,
        BUTTON_ROTATE_LEFT,
        BUTTON_ROTATE_RIGHT,
        BUTTON_SNAPSHOT,
    ];
    for id in ids {
        assert!(id.starts_with("arwp-"), "{id}");
    }
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len());
}

#[test]
fn immersive_features_are_disjoint() {
    for f in XR_REQUIRED_FEATURES {
        assert!(!XR_OPTIONAL_FEATURES.contains(&f), "{f}");
    }
    assert!(!XR_OPTIONAL_FEATURES.contains(&XR_DEPTH_FEATURE));
    assert!(XR_REQUIRED_FEATURES.contains(&"hit-test"));
}

#[test]
#[allow(clippy::assertions_on_constants)]
fn render_constants_are_sane() {
    assert!(NEAR_PLANE_M > 0.0 && NEAR_PLANE_M < FAR_PLANE_M);
    assert!(RETICLE_SIZE_M > 0.0);
    assert!(HANDLE_RADIUS_PX > OUTLINE_WIDTH_PX);
    assert!(DETECTOR_MAX_RESULTS > 0);
}

#[test]
fn vision_sources_pair_module_and_wasm_roots() {
    assert_eq!(VISION_MODULE_SOURCES.len(), VISION_WASM_ROOTS.len());
    for url in VISION_MODULE_SOURCES.iter().chain(VISION_WASM_ROOTS.iter()) {
        assert!(url.starts_with("https://"), "{url}");
    }
}
