//! Compositing and occlusion core for the AR wallpaper preview.
//!
//! Nothing in this crate touches a browser API. The web front-end implements
//! the traits declared here (capability probe, camera source, segmenter,
//! object detector, engine) and feeds plain buffers and poses through the
//! pipelines, so every behavior below can be exercised on the host.

pub mod assets;
pub mod camera;
pub mod capability;
pub mod compositor;
pub mod config;
pub mod constants;
pub mod depth;
pub mod error;
pub mod homography;
pub mod image;
pub mod lighting;
pub mod mask;
pub mod occlusion;
pub mod planar;
pub mod plane;
pub mod pose;
pub mod quad;
pub mod session;
pub mod status;

pub use capability::*;
pub use config::*;
pub use error::*;
pub use homography::Homography;
pub use image::{BufferArena, RgbaImage};
pub use mask::Mask;
pub use occlusion::*;
pub use planar::*;
pub use plane::*;
pub use pose::*;
pub use quad::*;
pub use session::*;
pub use status::*;
