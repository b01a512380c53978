//! Tuning constants shared by the engines and the occlusion pipeline.
//!
//! These express intended behavior (time constants, thresholds, clamp limits)
//! and keep magic numbers out of the per-frame code.

// Pose smoothing
pub const POSE_SMOOTHING_ALPHA: f32 = 0.15; // smoothed = lerp(smoothed, target, α)

// Wall filter: surfaces whose normal has |y| above this are floors/ceilings
pub const WALL_NORMAL_MAX_UP: f32 = 0.35;

// Placement
pub const PREVIEW_OPACITY: f32 = 0.6;
pub const CONFIRMED_OPACITY: f32 = 1.0;
pub const MIN_WALLPAPER_METERS: f32 = 0.1;
pub const AUTO_FIT_MARGIN: f32 = 0.95; // leave a small border when filling a wall
pub const AUTO_FIT_MAX_POINTS: usize = 256;
pub const SCALE_STEP: f32 = 1.1;
pub const SCALE_MIN: f32 = 0.25;
pub const SCALE_MAX: f32 = 4.0;
pub const ROTATE_STEP_DEG: f32 = 5.0;
pub const NUDGE_STEP_METERS: f32 = 0.02;

// Depth occlusion (meters)
pub const DEPTH_BIAS_METERS: f32 = 0.03;
pub const DEPTH_SOFT_BAND_METERS: f32 = 0.04;
pub const DEPTH_INTEGER_METERS_PER_UNIT: f32 = 0.001; // millimeters when the platform is silent

// Segmentation mask post-processing
pub const SEGMENTATION_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const SEGMENTATION_OBJECTS_THRESHOLD: f32 = 0.6; // segmentation-plus-objects mode
pub const MASK_DILATION_RADIUS: usize = 4;
pub const MASK_TEMPORAL_ALPHA: f32 = 0.6; // weight of the previous frame
pub const MASK_FEATHER_RADIUS: usize = 3;
pub const DETECTION_BOX_MARGIN: f32 = 0.05; // normalized, on every side
pub const DETECTION_SCORE_THRESHOLD: f32 = 0.4;

// Planar fallback interaction
pub const ANCHOR_HIT_RADIUS_PX: f32 = 20.0;
pub const DEFAULT_QUAD_FILL: f32 = 0.6; // share of the canvas the default quad spans
pub const FIT_QUAD_FILL: f32 = 0.9;

// Lighting estimate
pub const LIGHT_SMOOTHING_ALPHA: f32 = 0.1;
pub const BRIGHTNESS_MIN: f32 = 0.2;
pub const BRIGHTNESS_MAX: f32 = 2.0;

// Geometry
pub const HOMOGRAPHY_EPS: f32 = 1e-6;
pub const COLLINEAR_EPS: f32 = 1e-4; // relative to the squared quad extent
