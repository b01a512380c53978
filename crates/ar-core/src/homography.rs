//! Planar projective transforms between quadrilaterals.
//!
//! Points are `(x, y)` in pixel space, quads are ordered top-left,
//! top-right, bottom-right, bottom-left.

use crate::constants::{COLLINEAR_EPS, HOMOGRAPHY_EPS};
use crate::error::ArError;
use glam::{Affine2, Mat2, Mat3, Vec2, Vec3};
use smallvec::SmallVec;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    m: Mat3,
}

impl Homography {
    pub const IDENTITY: Homography = Homography { m: Mat3::IDENTITY };

    pub fn from_matrix(m: Mat3) -> Result<Self, ArError> {
        let det = m.determinant();
        if !m.is_finite() || !det.is_finite() || det == 0.0 {
            return Err(ArError::Degenerate("singular homography"));
        }
        Ok(Self { m })
    }

    /// Map the unit square onto `quad`.
    pub fn square_to_quad(quad: &[Vec2; 4]) -> Result<Self, ArError> {
        check_quad(quad)?;
        let [p0, p1, p2, p3] = *quad;
        let s = p0 - p1 + p2 - p3;

        let (g, h) = if s.x.abs() < HOMOGRAPHY_EPS && s.y.abs() < HOMOGRAPHY_EPS {
            // parallelogram: the projective row vanishes
            (0.0, 0.0)
        } else {
            let d1 = p1 - p2;
            let d2 = p3 - p2;
            let den = d1.perp_dot(d2);
            if den.abs() < HOMOGRAPHY_EPS {
                return Err(ArError::Degenerate("quad denominator is zero"));
            }
            (s.perp_dot(d2) / den, d1.perp_dot(s) / den)
        };

        let a = p1.x - p0.x + g * p1.x;
        let b = p3.x - p0.x + h * p3.x;
        let d = p1.y - p0.y + g * p1.y;
        let e = p3.y - p0.y + h * p3.y;
        Self::from_matrix(Mat3::from_cols(
            Vec3::new(a, d, g),
            Vec3::new(b, e, h),
            Vec3::new(p0.x, p0.y, 1.0),
        ))
    }

    /// Homography taking `src` corners onto `dst` corners.
    pub fn solve(src: &[Vec2; 4], dst: &[Vec2; 4]) -> Result<Self, ArError> {
        let to_src = Self::square_to_quad(src)?;
        let to_dst = Self::square_to_quad(dst)?;
        Self::from_matrix(to_dst.m * to_src.inverse()?.m).map(Self::normalized)
    }

    /// Homography taking the rectangle `0..width x 0..height` onto `dst`.
    pub fn from_rect(width: f32, height: f32, dst: &[Vec2; 4]) -> Result<Self, ArError> {
        let src = [
            Vec2::ZERO,
            Vec2::new(width, 0.0),
            Vec2::new(width, height),
            Vec2::new(0.0, height),
        ];
        Self::solve(&src, dst)
    }

    pub fn inverse(&self) -> Result<Self, ArError> {
        let inv = self.m.inverse();
        if !inv.is_finite() {
            return Err(ArError::Degenerate("homography is not invertible"));
        }
        Self::from_matrix(inv).map(Self::normalized)
    }

    pub fn matrix(&self) -> Mat3 {
        self.m
    }

    /// Project a point. `None` when it lands on the line at infinity.
    pub fn apply(&self, p: Vec2) -> Option<Vec2> {
        let v = self.m * p.extend(1.0);
        if v.z.abs() < HOMOGRAPHY_EPS {
            return None;
        }
        let out = v.truncate() / v.z;
        out.is_finite().then_some(out)
    }

    /// The 2x3 affine equivalent when the projective terms vanish.
    pub fn as_affine(&self) -> Option<Affine2> {
        let c = self.m.row(2);
        if c.x.abs() > HOMOGRAPHY_EPS || c.y.abs() > HOMOGRAPHY_EPS {
            return None;
        }
        let w = c.z;
        Some(Affine2::from_mat2_translation(
            Mat2::from_cols(self.m.x_axis.truncate() / w, self.m.y_axis.truncate() / w),
            self.m.z_axis.truncate() / w,
        ))
    }

    fn normalized(self) -> Self {
        let w = self.m.z_axis.z;
        if w.abs() > HOMOGRAPHY_EPS {
            Self { m: self.m * (1.0 / w) }
        } else {
            self
        }
    }
}

/// Rejects quads with non-finite corners or any three collinear corners.
pub fn check_quad(quad: &[Vec2; 4]) -> Result<(), ArError> {
    if quad.iter().any(|p| !p.is_finite()) {
        return Err(ArError::Degenerate("non-finite corner"));
    }
    let min = quad.iter().fold(Vec2::splat(f32::INFINITY), |a, p| a.min(*p));
    let max = quad.iter().fold(Vec2::splat(f32::NEG_INFINITY), |a, p| a.max(*p));
    let extent = (max - min).max_element();
    if extent < HOMOGRAPHY_EPS {
        return Err(ArError::Degenerate("quad has no extent"));
    }
    let tolerance = COLLINEAR_EPS * extent * extent;
    for skip in 0..4 {
        let tri: SmallVec<[Vec2; 3]> = (0..4).filter(|&i| i != skip).map(|i| quad[i]).collect();
        let area2 = (tri[1] - tri[0]).perp_dot(tri[2] - tri[0]);
        if area2.abs() <= tolerance {
            return Err(ArError::Degenerate("three collinear corners"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(k: f32) -> [Vec2; 4] {
        [
            Vec2::new(0.0, 0.0),
            Vec2::new(k, 0.0),
            Vec2::new(k, k),
            Vec2::new(0.0, k),
        ]
    }

    #[test]
    fn unit_square_maps_to_identity() {
        let h = Homography::square_to_quad(&square(1.0)).unwrap();
        assert!(h.matrix().abs_diff_eq(Mat3::IDENTITY, 1e-6));
    }

    #[test]
    fn affine_fast_path_matches_projection() {
        let dst = [
            Vec2::new(10.0, 5.0),
            Vec2::new(30.0, 5.0),
            Vec2::new(30.0, 25.0),
            Vec2::new(10.0, 25.0),
        ];
        let h = Homography::solve(&square(1.0), &dst).unwrap();
        let affine = h.as_affine().unwrap();
        let p = Vec2::new(0.25, 0.75);
        let a = affine.transform_point2(p);
        let b = h.apply(p).unwrap();
        assert!(a.abs_diff_eq(b, 1e-4));
    }
}
