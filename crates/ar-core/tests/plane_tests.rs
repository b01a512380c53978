// Host-side tests for the surface tracker: wall filter, placement state
// machine, auto-fit and manual adjustments.

use ar_core::*;
use glam::{Quat, Vec2, Vec3};

struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 40) as f32) / (1u64 << 24) as f32
    }

    fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }

    /// Unit normal with the given up component and a random heading.
    fn normal_with_up(&mut self, up: f32) -> Vec3 {
        let heading = self.range(0.0, std::f32::consts::TAU);
        let flat = (1.0 - up * up).max(0.0).sqrt();
        Vec3::new(flat * heading.cos(), up, flat * heading.sin())
    }
}

/// A hit whose +Y axis is `normal`.
fn hit(position: Vec3, normal: Vec3) -> Pose {
    Pose::new(position, Quat::from_rotation_arc(Vec3::Y, normal.normalize()), 0.0)
}

fn tracker() -> SurfaceTracker {
    SurfaceTracker::new(&PreviewConfig::default().wallpaper())
}

#[test]
fn floors_and_ceilings_are_rejected_anywhere() {
    let mut rng = Lcg(5);
    let mut t = tracker();
    for i in 0..300 {
        let up = rng.range(0.4, 1.0) * if i % 2 == 0 { 1.0 } else { -1.0 };
        let n = rng.normal_with_up(up);
        let p = Vec3::new(rng.range(-50.0, 50.0), rng.range(-50.0, 50.0), rng.range(-50.0, 50.0));
        assert!(!is_wall(Quat::from_rotation_arc(Vec3::Y, n)));
        assert_eq!(t.on_hit(Some(hit(p, n))), TrackOutcome::Rejected, "n={n}");
    }
    assert_eq!(t.state(), PlacementState::Searching);
    assert!(t.pose().is_none());
}

#[test]
fn walls_are_accepted_and_gravity_aligned() {
    let mut rng = Lcg(8);
    for _ in 0..100 {
        let up = rng.range(-0.3, 0.3);
        let n = rng.normal_with_up(up);
        let mut t = tracker();
        assert_eq!(t.on_hit(Some(hit(Vec3::new(0.0, 1.0, -2.0), n))), TrackOutcome::Accepted);
        assert_eq!(t.state(), PlacementState::Previewing);
        let q = t.pose().unwrap().orientation;
        assert!((q * Vec3::Y).distance(Vec3::Y) < 1e-3, "up stays world up");
        let out = q * Vec3::Z;
        assert!(out.y.abs() < 1e-3);
        assert!(out.dot(Vec3::new(n.x, 0.0, n.z).normalize()) > 0.999);
    }
}

#[test]
fn missing_or_broken_hits_keep_the_state() {
    let mut t = tracker();
    assert_eq!(t.on_hit(None), TrackOutcome::NoHit);
    let bad = Pose {
        position: Vec3::new(f32::NAN, 0.0, 0.0),
        orientation: Quat::IDENTITY,
        timestamp_ms: 0.0,
    };
    assert_eq!(t.on_hit(Some(bad)), TrackOutcome::NoHit);
    assert_eq!(t.state(), PlacementState::Searching);
    assert!(!t.confirm());
}

#[test]
fn confirm_locks_the_placement() {
    let mut t = tracker();
    t.on_hit(Some(hit(Vec3::new(0.0, 1.0, -2.0), Vec3::Z)));
    assert!(t.reticle().is_some());
    assert!((t.opacity() - 0.6).abs() < 1e-6);
    assert!(t.confirm());
    assert_eq!(t.state(), PlacementState::Confirmed);
    assert!((t.opacity() - 1.0).abs() < 1e-6);
    assert!(t.reticle().is_none());

    let locked = t.pose().unwrap();
    assert_eq!(
        t.on_hit(Some(hit(Vec3::new(3.0, 1.0, -5.0), Vec3::X))),
        TrackOutcome::Locked
    );
    assert_eq!(t.pose().unwrap(), locked);
    assert!(!t.confirm());
}

#[test]
fn reset_returns_to_searching_and_reseeds() {
    let mut t = tracker();
    t.on_hit(Some(hit(Vec3::new(0.0, 1.0, -2.0), Vec3::Z)));
    t.on_hit(Some(hit(Vec3::new(0.5, 1.0, -2.0), Vec3::Z)));
    t.confirm();
    t.scale_by(3);
    t.nudge(2, 2);
    t.reset();
    assert_eq!(t.state(), PlacementState::Searching);
    assert!(t.pose().is_none());
    assert_eq!(t.scale(), 1.0);
    assert_eq!(t.offset(), Vec2::ZERO);

    let p = Vec3::new(4.0, 0.5, 1.0);
    t.on_hit(Some(hit(p, Vec3::NEG_X)));
    assert_eq!(t.pose().unwrap().position, p);
}

#[test]
fn smoothing_follows_hits_gradually() {
    let mut t = tracker();
    t.on_hit(Some(hit(Vec3::ZERO, Vec3::Z)));
    t.on_hit(Some(hit(Vec3::new(1.0, 0.0, 0.0), Vec3::Z)));
    let x = t.pose().unwrap().position.x;
    assert!((x - 0.15).abs() < 1e-5);
}

#[test]
fn fit_to_wall_uses_hit_spread() {
    let mut t = tracker();
    assert!(t.fit_to_wall().is_none());
    for (x, y) in [(-1.5, 0.0), (1.5, 0.0), (0.0, 2.0), (0.3, 1.1)] {
        t.on_hit(Some(hit(Vec3::new(x, y, -2.0), Vec3::Z)));
    }
    let extent = t.wall_extent().unwrap();
    assert!((extent - Vec2::new(3.0, 2.0)).length() < 1e-4);
    // wallpaper defaults to 1.0 x 2.5 m
    let scale = t.fit_to_wall().unwrap();
    assert!((scale - 0.8 * 0.95).abs() < 1e-4);
    assert!((t.scale() - scale).abs() < 1e-6);
}

#[test]
fn detected_plane_overrides_hit_spread() {
    let mut t = tracker();
    t.on_hit(Some(hit(Vec3::new(0.0, 0.0, -2.0), Vec3::Z)));
    t.on_hit(Some(hit(Vec3::new(1.0, 1.0, -2.0), Vec3::Z)));
    let polygon = [
        Vec2::new(-2.0, -0.75),
        Vec2::new(2.0, -0.75),
        Vec2::new(2.0, 0.75),
        Vec2::new(-2.0, 0.75),
    ];
    t.observe_plane(&hit(Vec3::new(0.0, 1.0, -2.0), Vec3::Z), &polygon);
    assert!((t.wall_extent().unwrap() - Vec2::new(4.0, 1.5)).length() < 1e-5);
    let scale = t.fit_to_wall().unwrap();
    assert!((scale - 0.6 * 0.95).abs() < 1e-4);

    // floors never count
    let mut other = tracker();
    other.observe_plane(&hit(Vec3::ZERO, Vec3::Y), &polygon);
    assert!(other.wall_extent().is_none());
}

#[test]
fn fit_stays_within_scale_limits() {
    let square = |half: f32| {
        [
            Vec2::new(-half, -half),
            Vec2::new(half, -half),
            Vec2::new(half, half),
            Vec2::new(-half, half),
        ]
    };
    let wall = hit(Vec3::new(0.0, 1.0, -2.0), Vec3::Z);

    let mut t = tracker();
    t.observe_plane(&wall, &square(10.0));
    assert_eq!(t.fit_to_wall(), Some(4.0));
    assert!((t.scale() - 4.0).abs() < 1e-6);

    let mut t = tracker();
    t.observe_plane(&wall, &square(0.05));
    assert_eq!(t.fit_to_wall(), Some(0.25));
    assert!((t.scale() - 0.25).abs() < 1e-6);
}

#[test]
fn single_hit_has_no_extent() {
    let mut t = tracker();
    t.on_hit(Some(hit(Vec3::new(0.0, 1.0, -2.0), Vec3::Z)));
    assert!(t.wall_extent().is_none());
    assert!(t.fit_to_wall().is_none());
}

#[test]
fn adjustments_are_clamped_and_wrapped() {
    let mut t = tracker();
    t.scale_by(100);
    assert!((t.scale() - 4.0).abs() < 1e-6);
    t.scale_by(-1000);
    assert!((t.scale() - 0.25).abs() < 1e-6);

    t.rotate_by(72);
    assert!(t.rotation().abs() < 1e-4);
    t.rotate_by(40);
    assert!((t.rotation() - (-160.0_f32).to_radians()).abs() < 1e-4);

    t.nudge(1, -2);
    assert!((t.offset() - Vec2::new(0.02, -0.04)).length() < 1e-6);
}

#[test]
fn drag_projects_onto_the_wall() {
    let mut t = tracker();
    t.drag(Vec3::ONE);
    assert_eq!(t.offset(), Vec2::ZERO, "no wall yet");
    t.on_hit(Some(hit(Vec3::new(0.0, 1.0, -2.0), Vec3::Z)));
    t.drag(Vec3::new(0.1, 0.2, 0.5));
    assert!((t.offset() - Vec2::new(0.1, 0.2)).length() < 1e-5);
}

#[test]
fn model_matrix_spans_the_wallpaper() {
    let mut t = tracker();
    assert!(t.model_matrix().is_none());
    let p = Vec3::new(0.0, 1.0, -2.0);
    t.on_hit(Some(hit(p, Vec3::Z)));
    t.confirm();
    let m = t.model_matrix().unwrap();
    let corner = m.transform_point3(Vec3::new(0.5, 0.5, 0.0));
    assert!(corner.distance(p + Vec3::new(0.5, 1.25, 0.0)) < 1e-4);
}

#[test]
fn status_follows_placement() {
    let labels = StatusLabels::default();
    let mut t = tracker();
    assert_eq!(t.status(&labels).state, StatusState::Pending);
    t.on_hit(Some(hit(Vec3::ZERO, Vec3::Z)));
    assert_eq!(t.status(&labels).state, StatusState::Neutral);
    t.confirm();
    let event = t.status(&labels);
    assert_eq!(event.id, Subsystem::Plane);
    assert_eq!(event.state, StatusState::Success);
    assert_eq!(event.label, "Wallpaper placed");
}
