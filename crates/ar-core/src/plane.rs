//! Surface tracking engine core: wall filter, gravity alignment, placement
//! state machine, auto-fit and manual adjustments.
//!
//! Hit poses follow the immersive-web convention: the pose's +Y axis is the
//! surface normal. After gravity alignment a placement pose has +X along the
//! wall, +Y world up and +Z out of the wall.

use crate::config::WallpaperSpec;
use crate::constants::{
    AUTO_FIT_MARGIN, AUTO_FIT_MAX_POINTS, CONFIRMED_OPACITY, MIN_WALLPAPER_METERS,
    NUDGE_STEP_METERS, PREVIEW_OPACITY, ROTATE_STEP_DEG, SCALE_MAX, SCALE_MIN, SCALE_STEP,
    WALL_NORMAL_MAX_UP,
};
use crate::pose::{Pose, PoseSmoother};
use crate::status::{StatusEvent, StatusLabels, StatusState, Subsystem};
use glam::{Mat3, Mat4, Quat, Vec2, Vec3};
use std::collections::VecDeque;

/// Normal of the surface a hit pose lies on.
pub fn surface_normal(orientation: Quat) -> Vec3 {
    (orientation * Vec3::Y).normalize_or_zero()
}

/// Walls only: a normal whose up component exceeds the threshold is a floor
/// or ceiling.
pub fn is_wall(orientation: Quat) -> bool {
    let n = surface_normal(orientation);
    n != Vec3::ZERO && n.y.abs() <= WALL_NORMAL_MAX_UP
}

/// Rotate a hit orientation so the placement's up matches world up.
/// `None` when the normal has no horizontal component.
pub fn gravity_align(orientation: Quat) -> Option<Quat> {
    let n = surface_normal(orientation);
    let normal = Vec3::new(n.x, 0.0, n.z).try_normalize()?;
    let up = Vec3::Y;
    let right = up.cross(normal);
    Some(Quat::from_mat3(&Mat3::from_cols(right, up, normal)).normalize())
}

/// Orthonormal wall frame used to project gestures into wall-local meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneBasis {
    pub normal: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub origin: Vec3,
}

impl PlaneBasis {
    /// From a gravity-aligned placement pose.
    pub fn from_pose(pose: &Pose) -> Self {
        let q = pose.orientation;
        Self {
            normal: q * Vec3::Z,
            right: q * Vec3::X,
            up: q * Vec3::Y,
            origin: pose.position,
        }
    }

    pub fn project(&self, world: Vec3) -> Vec2 {
        self.project_direction(world - self.origin)
    }

    pub fn project_direction(&self, dir: Vec3) -> Vec2 {
        Vec2::new(dir.dot(self.right), dir.dot(self.up))
    }

    pub fn to_world(&self, local: Vec2) -> Vec3 {
        self.origin + self.right * local.x + self.up * local.y
    }
}

/// Bounding extent of observed wall points, for scale-to-fill.
#[derive(Clone, Debug, Default)]
pub struct WallExtent {
    points: VecDeque<Vec3>,
}

impl WallExtent {
    pub fn push(&mut self, p: Vec3) {
        if self.points.len() == AUTO_FIT_MAX_POINTS {
            self.points.pop_front();
        }
        self.points.push_back(p);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Width and height spanned in the wall plane, at least the minimum size.
    pub fn extent_in(&self, basis: &PlaneBasis) -> Option<Vec2> {
        if self.points.len() < 2 {
            return None;
        }
        let (lo, hi) = self.points.iter().map(|p| basis.project(*p)).fold(
            (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
            |(lo, hi), p| (lo.min(p), hi.max(p)),
        );
        let size = hi - lo;
        size.is_finite()
            .then(|| size.max(Vec2::splat(MIN_WALLPAPER_METERS)))
    }

    /// Extent of a detected plane polygon given as plane-local `(x, z)` points.
    pub fn from_polygon(points: &[Vec2]) -> Option<Vec2> {
        if points.len() < 3 {
            return None;
        }
        let (lo, hi) = points.iter().fold(
            (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
            |(lo, hi), p| (lo.min(*p), hi.max(*p)),
        );
        let size = hi - lo;
        size.is_finite()
            .then(|| size.max(Vec2::splat(MIN_WALLPAPER_METERS)))
    }
}

/// Uniform scale that fits the wallpaper inside `extent`, leaving a margin.
pub fn fit_scale(extent: Vec2, wallpaper: Vec2) -> f32 {
    let sx = extent.x / wallpaper.x.max(f32::EPSILON);
    let sy = extent.y / wallpaper.y.max(f32::EPSILON);
    sx.min(sy) * AUTO_FIT_MARGIN
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementState {
    Searching,
    Previewing,
    Confirmed,
}

impl PlacementState {
    pub fn opacity(self) -> f32 {
        match self {
            PlacementState::Confirmed => CONFIRMED_OPACITY,
            _ => PREVIEW_OPACITY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Placement confirmed; hits are ignored until reset.
    Locked,
    NoHit,
    /// Floor, ceiling or unusable orientation.
    Rejected,
    Accepted,
}

pub struct SurfaceTracker {
    wallpaper_size: Vec2,
    state: PlacementState,
    smoother: PoseSmoother,
    current: Option<Pose>,
    basis: Option<PlaneBasis>,
    locked: Option<Pose>,
    extent: WallExtent,
    plane_extent: Option<Vec2>,
    has_hit: bool,
    scale: f32,
    rotation: f32,
    offset: Vec2,
}

impl SurfaceTracker {
    pub fn new(wallpaper: &WallpaperSpec) -> Self {
        Self {
            wallpaper_size: Vec2::new(wallpaper.width_m, wallpaper.height_m),
            state: PlacementState::Searching,
            smoother: PoseSmoother::default(),
            current: None,
            basis: None,
            locked: None,
            extent: WallExtent::default(),
            plane_extent: None,
            has_hit: false,
            scale: 1.0,
            rotation: 0.0,
            offset: Vec2::ZERO,
        }
    }

    pub fn with_smoother(mut self, smoother: PoseSmoother) -> Self {
        self.smoother = smoother;
        self
    }

    pub fn state(&self) -> PlacementState {
        self.state
    }

    pub fn basis(&self) -> Option<&PlaneBasis> {
        self.basis.as_ref()
    }

    /// Smoothed placement pose; the locked one once confirmed.
    pub fn pose(&self) -> Option<Pose> {
        self.locked.or(self.current)
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn opacity(&self) -> f32 {
        self.state.opacity()
    }

    /// Feed this frame's best hit, if any.
    pub fn on_hit(&mut self, hit: Option<Pose>) -> TrackOutcome {
        self.has_hit = false;
        if self.state == PlacementState::Confirmed {
            return TrackOutcome::Locked;
        }
        let Some(hit) = hit.filter(Pose::is_finite) else {
            return TrackOutcome::NoHit;
        };
        if !is_wall(hit.orientation) {
            return TrackOutcome::Rejected;
        }
        let Some(aligned) = gravity_align(hit.orientation) else {
            return TrackOutcome::Rejected;
        };
        let smoothed = self
            .smoother
            .smooth_pose(&Pose::new(hit.position, aligned, hit.timestamp_ms));
        self.basis = Some(PlaneBasis::from_pose(&smoothed));
        self.current = Some(smoothed);
        self.extent.push(hit.position);
        self.has_hit = true;
        if self.state == PlacementState::Searching {
            log::info!("[plane] wall found at {:?}", smoothed.position);
            self.state = PlacementState::Previewing;
        }
        TrackOutcome::Accepted
    }

    /// A detected plane with its polygon in plane-local `(x, z)` meters.
    pub fn observe_plane(&mut self, plane_pose: &Pose, polygon: &[Vec2]) {
        if !is_wall(plane_pose.orientation) {
            return;
        }
        if let Some(extent) = WallExtent::from_polygon(polygon) {
            self.plane_extent = Some(extent);
        }
    }

    /// Where the reticle goes, while still looking for a placement.
    pub fn reticle(&self) -> Option<Pose> {
        if self.state == PlacementState::Confirmed || !self.has_hit {
            return None;
        }
        self.current
    }

    pub fn confirm(&mut self) -> bool {
        if self.state != PlacementState::Previewing {
            return false;
        }
        let Some(pose) = self.current else {
            return false;
        };
        self.locked = Some(pose);
        self.state = PlacementState::Confirmed;
        log::info!("[plane] placement confirmed");
        true
    }

    pub fn reset(&mut self) {
        self.state = PlacementState::Searching;
        self.smoother.reset();
        self.current = None;
        self.basis = None;
        self.locked = None;
        self.extent.clear();
        self.plane_extent = None;
        self.has_hit = false;
        self.scale = 1.0;
        self.rotation = 0.0;
        self.offset = Vec2::ZERO;
        log::info!("[plane] placement reset");
    }

    /// Estimated wall size: a detected plane if seen, else the hit spread.
    pub fn wall_extent(&self) -> Option<Vec2> {
        self.plane_extent
            .or_else(|| self.basis.and_then(|b| self.extent.extent_in(&b)))
    }

    /// Scale the wallpaper to fill the estimated wall.
    pub fn fit_to_wall(&mut self) -> Option<f32> {
        let extent = self.wall_extent()?;
        let scale = fit_scale(extent, self.wallpaper_size);
        if !scale.is_finite() || scale <= 0.0 {
            return None;
        }
        let scale = scale.clamp(SCALE_MIN, SCALE_MAX);
        self.scale = scale;
        self.offset = Vec2::ZERO;
        log::info!("[plane] fit to {:.2}x{:.2} m, scale {:.2}", extent.x, extent.y, scale);
        Some(scale)
    }

    pub fn scale_by(&mut self, steps: i32) {
        self.scale = (self.scale * SCALE_STEP.powi(steps)).clamp(SCALE_MIN, SCALE_MAX);
    }

    pub fn rotate_by(&mut self, steps: i32) {
        let r = self.rotation + (ROTATE_STEP_DEG * steps as f32).to_radians();
        self.rotation = (r + std::f32::consts::PI).rem_euclid(std::f32::consts::TAU) - std::f32::consts::PI;
    }

    /// Move along the wall by a world-space displacement.
    pub fn drag(&mut self, world_delta: Vec3) {
        if let Some(basis) = self.basis {
            let d = basis.project_direction(world_delta);
            if d.is_finite() {
                self.offset += d;
            }
        }
    }

    pub fn nudge(&mut self, dx: i32, dy: i32) {
        self.offset += Vec2::new(dx as f32, dy as f32) * NUDGE_STEP_METERS;
    }

    /// World transform of a unit quad centered at the origin in its XY plane.
    pub fn model_matrix(&self) -> Option<Mat4> {
        let pose = self.pose()?;
        let size = self.wallpaper_size * self.scale;
        Some(
            pose.matrix()
                * Mat4::from_translation(self.offset.extend(0.0))
                * Mat4::from_rotation_z(self.rotation)
                * Mat4::from_scale(Vec3::new(size.x, size.y, 1.0)),
        )
    }

    pub fn status(&self, labels: &StatusLabels) -> StatusEvent {
        let (key, state) = match self.state {
            PlacementState::Searching => ("status_searching", StatusState::Pending),
            PlacementState::Previewing => ("status_previewing", StatusState::Neutral),
            PlacementState::Confirmed => ("status_confirmed", StatusState::Success),
        };
        StatusEvent::new(Subsystem::Plane, labels.get(key), state)
    }
}
