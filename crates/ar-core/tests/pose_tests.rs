// Host-side tests for pose smoothing.

use ar_core::pose::{Pose, PoseSmoother};
use glam::{Mat4, Quat, Vec3};

/// Small deterministic generator so runs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 40) as f32) / (1u64 << 24) as f32
    }

    fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }

    fn vec3(&mut self, span: f32) -> Vec3 {
        Vec3::new(self.range(-span, span), self.range(-span, span), self.range(-span, span))
    }

    fn quat(&mut self) -> Quat {
        let axis = self.vec3(1.0).try_normalize().unwrap_or(Vec3::Y);
        Quat::from_axis_angle(axis, self.range(-3.0, 3.0))
    }
}

fn between(x: f32, a: f32, b: f32) -> bool {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    x >= lo - 1e-5 && x <= hi + 1e-5
}

#[test]
fn first_sample_seeds_the_filter() {
    let mut s = PoseSmoother::default();
    let p = Vec3::new(1.0, 2.0, -3.0);
    let q = Quat::from_rotation_y(0.7);
    let (sp, sq) = s.smooth(p, q);
    assert_eq!(sp, p);
    assert!(sq.dot(q).abs() > 0.9999);
    assert!(s.is_seeded());
}

#[test]
fn position_never_overshoots() {
    let mut rng = Lcg(7);
    let mut s = PoseSmoother::default();
    let mut prev = s.smooth(rng.vec3(5.0), rng.quat()).0;
    for _ in 0..500 {
        let target = rng.vec3(5.0);
        let (out, _) = s.smooth(target, rng.quat());
        assert!(between(out.x, prev.x, target.x), "x {} not in [{}, {}]", out.x, prev.x, target.x);
        assert!(between(out.y, prev.y, target.y));
        assert!(between(out.z, prev.z, target.z));
        prev = out;
    }
}

#[test]
fn orientation_stays_unit_length() {
    let mut rng = Lcg(99);
    let mut s = PoseSmoother::new(0.3);
    for _ in 0..200 {
        let (_, q) = s.smooth(rng.vec3(1.0), rng.quat());
        assert!((q.length() - 1.0).abs() < 1e-4);
    }
}

#[test]
fn converges_on_a_still_target() {
    let mut s = PoseSmoother::default();
    s.smooth(Vec3::ZERO, Quat::IDENTITY);
    let target = Vec3::new(1.0, 0.0, 0.0);
    let q = Quat::from_rotation_z(1.0);
    let mut out = (Vec3::ZERO, Quat::IDENTITY);
    for _ in 0..200 {
        out = s.smooth(target, q);
    }
    assert!(out.0.distance(target) < 1e-4);
    assert!(out.1.dot(q).abs() > 0.9999);
}

#[test]
fn reset_makes_next_sample_exact() {
    let mut rng = Lcg(3);
    let mut s = PoseSmoother::default();
    for _ in 0..10 {
        s.smooth(rng.vec3(2.0), rng.quat());
    }
    s.reset();
    assert!(!s.is_seeded());
    let p = Vec3::new(0.25, -1.5, 4.0);
    let q = Quat::from_rotation_x(0.4);
    let (sp, sq) = s.smooth(p, q);
    assert_eq!(sp, p);
    assert!(sq.dot(q).abs() > 0.9999);
}

#[test]
fn alpha_is_clamped() {
    assert_eq!(PoseSmoother::new(4.0).alpha(), 1.0);
    assert_eq!(PoseSmoother::new(-1.0).alpha(), 0.0);
    assert!((PoseSmoother::default().alpha() - 0.15).abs() < 1e-6);
}

#[test]
fn pose_reads_column_major_matrix() {
    let q = Quat::from_rotation_y(0.5);
    let t = Vec3::new(0.1, 1.2, -2.0);
    let m = Mat4::from_rotation_translation(q, t).to_cols_array();
    let pose = Pose::from_matrix(&m, 16.0).unwrap();
    assert!(pose.position.distance(t) < 1e-5);
    assert!(pose.orientation.dot(q).abs() > 0.9999);
    assert_eq!(pose.timestamp_ms, 16.0);

    let mut bad = m;
    bad[12] = f32::NAN;
    assert!(Pose::from_matrix(&bad, 0.0).is_none());
}
