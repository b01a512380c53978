use crate::constants::POSE_SMOOTHING_ALPHA;
use glam::{Mat4, Quat, Vec3};

/// One tracking sample. Consumed within the frame that produced it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
    /// Monotonic timestamp in milliseconds.
    pub timestamp_ms: f64,
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quat, timestamp_ms: f64) -> Self {
        Self {
            position,
            orientation: orientation.normalize(),
            timestamp_ms,
        }
    }

    /// Build from a column-major rigid transform such as `XRRigidTransform.matrix`.
    pub fn from_matrix(m: &[f32; 16], timestamp_ms: f64) -> Option<Self> {
        let mat = Mat4::from_cols_array(m);
        if !mat.is_finite() {
            return None;
        }
        let (_, rotation, translation) = mat.to_scale_rotation_translation();
        Some(Self::new(translation, rotation, timestamp_ms))
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.orientation.is_finite()
    }
}

/// Exponential low-pass filter over a position + orientation stream.
///
/// Owned by exactly one tracking callback; the first sample after
/// construction or [`PoseSmoother::reset`] is passed through unchanged.
#[derive(Clone, Debug)]
pub struct PoseSmoother {
    alpha: f32,
    state: Option<(Vec3, Quat)>,
}

impl Default for PoseSmoother {
    fn default() -> Self {
        Self::new(POSE_SMOOTHING_ALPHA)
    }
}

impl PoseSmoother {
    /// `alpha` is the weight of the new sample; lower means more damping.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: None,
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn is_seeded(&self) -> bool {
        self.state.is_some()
    }

    pub fn current(&self) -> Option<(Vec3, Quat)> {
        self.state
    }

    pub fn smooth(&mut self, position: Vec3, orientation: Quat) -> (Vec3, Quat) {
        let orientation = orientation.normalize();
        let next = match self.state {
            None => (position, orientation),
            Some((p, q)) => (
                p.lerp(position, self.alpha),
                q.slerp(orientation, self.alpha).normalize(),
            ),
        };
        self.state = Some(next);
        next
    }

    pub fn smooth_pose(&mut self, pose: &Pose) -> Pose {
        let (position, orientation) = self.smooth(pose.position, pose.orientation);
        Pose {
            position,
            orientation,
            timestamp_ms: pose.timestamp_ms,
        }
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}
