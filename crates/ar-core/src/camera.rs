//! Camera acquisition through a constraint-relaxation ladder.

use crate::error::ArError;
use crate::image::RgbaImage;
use crate::session::{Release, SessionToken};
use serde_json::{json, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FacingMode {
    Environment,
    User,
}

impl FacingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Facing {
    Exact(FacingMode),
    Ideal(FacingMode),
    Any,
}

/// One rung of the ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing: Facing,
    pub ideal_size: Option<(u32, u32)>,
}

impl CameraConstraints {
    /// Tried in order, first success wins.
    pub const LADDER: [CameraConstraints; 4] = [
        CameraConstraints {
            facing: Facing::Ideal(FacingMode::Environment),
            ideal_size: Some((1280, 720)),
        },
        CameraConstraints {
            facing: Facing::Exact(FacingMode::Environment),
            ideal_size: None,
        },
        CameraConstraints {
            facing: Facing::Ideal(FacingMode::User),
            ideal_size: None,
        },
        CameraConstraints {
            facing: Facing::Any,
            ideal_size: None,
        },
    ];

    /// The `getUserMedia` argument for this rung.
    pub fn to_json(&self) -> Value {
        let mut video = serde_json::Map::new();
        match self.facing {
            Facing::Exact(mode) => {
                video.insert("facingMode".into(), json!(mode.as_str()));
            }
            Facing::Ideal(mode) => {
                video.insert("facingMode".into(), json!({ "ideal": mode.as_str() }));
            }
            Facing::Any => {}
        }
        if let Some((w, h)) = self.ideal_size {
            video.insert("width".into(), json!({ "ideal": w }));
            video.insert("height".into(), json!({ "ideal": h }));
        }
        let video = if video.is_empty() {
            Value::Bool(true)
        } else {
            Value::Object(video)
        };
        json!({ "video": video, "audio": false })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Prompt,
    Denied,
    Unknown,
}

impl PermissionState {
    pub fn parse(s: &str) -> Self {
        match s {
            "granted" => PermissionState::Granted,
            "prompt" => PermissionState::Prompt,
            "denied" => PermissionState::Denied,
            _ => PermissionState::Unknown,
        }
    }
}

/// An open camera. Releasing stops every track and must be idempotent.
pub trait CameraStream: Release {
    /// Native frame size once known.
    fn size(&self) -> Option<(u32, u32)>;

    /// Copy the latest frame into `into`, scaled to its current size.
    fn grab(&mut self, into: &mut RgbaImage) -> bool;
}

#[allow(async_fn_in_trait)]
pub trait CameraSource {
    type Stream: CameraStream;

    async fn permission(&self) -> PermissionState;

    async fn open(&self, constraints: &CameraConstraints) -> Result<Self::Stream, ArError>;
}

/// Walk the ladder. A denied permission ends the walk at once; transient
/// failures move to the next rung. Cancellation is checked after every await.
pub async fn acquire<C: CameraSource>(source: &C, token: &SessionToken) -> Result<C::Stream, ArError> {
    let permission = source.permission().await;
    token.check()?;
    if permission == PermissionState::Denied {
        log::warn!("[camera] permission denied before request");
        return Err(ArError::PermissionDenied("camera permission denied".into()));
    }

    let mut last = ArError::TransientDevice("no camera constraints accepted".into());
    for (i, constraints) in CameraConstraints::LADDER.iter().enumerate() {
        let attempt = source.open(constraints).await;
        if let Err(e) = token.check() {
            if let Ok(mut stream) = attempt {
                stream.release();
            }
            return Err(e);
        }
        match attempt {
            Ok(stream) => {
                log::info!("[camera] opened on attempt {}", i + 1);
                return Ok(stream);
            }
            Err(e @ ArError::PermissionDenied(_)) => {
                log::warn!("[camera] {}", e);
                return Err(e);
            }
            Err(e) => {
                log::warn!("[camera] attempt {} failed: {}", i + 1, e);
                last = e;
            }
        }
    }
    Err(last)
}

/// Status label key for a camera failure.
pub fn failure_label(err: &ArError) -> &'static str {
    match err {
        ArError::PermissionDenied(_) => "camera_blocked",
        _ => "camera_unavailable",
    }
}
