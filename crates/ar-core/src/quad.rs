//! User-draggable quad for the planar fallback engine.

use crate::constants::{ANCHOR_HIT_RADIUS_PX, DEFAULT_QUAD_FILL, FIT_QUAD_FILL};
use glam::Vec2;

/// Four anchors in canvas pixels (y down), ordered top-left, top-right,
/// bottom-right, bottom-left. With y pointing down this order has a
/// positive signed area.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadAnchors {
    pub points: [Vec2; 4],
}

impl QuadAnchors {
    pub fn new(points: [Vec2; 4]) -> Self {
        Self { points }
    }

    fn rect(center: Vec2, size: Vec2) -> Self {
        let h = size * 0.5;
        Self::new([
            center + Vec2::new(-h.x, -h.y),
            center + Vec2::new(h.x, -h.y),
            center + Vec2::new(h.x, h.y),
            center + Vec2::new(-h.x, h.y),
        ])
    }

    /// Largest rectangle of the given `aspect` (width / height) that fits in
    /// `fill` of the canvas, centered.
    pub fn fit(aspect: f32, canvas: Vec2, fill: f32) -> Self {
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
        let room = canvas * fill;
        let size = if room.x / aspect <= room.y {
            Vec2::new(room.x, room.x / aspect)
        } else {
            Vec2::new(room.y * aspect, room.y)
        };
        Self::rect(canvas * 0.5, size)
    }

    pub fn default_for(aspect: f32, canvas: Vec2) -> Self {
        Self::fit(aspect, canvas, DEFAULT_QUAD_FILL)
    }

    /// Span the canvas width, keeping the current center.
    pub fn fit_width(&self, aspect: f32, canvas: Vec2) -> Self {
        let w = canvas.x * FIT_QUAD_FILL;
        Self::rect(self.centroid(), Vec2::new(w, w / aspect.max(f32::EPSILON)))
    }

    /// Span the canvas height, keeping the current center.
    pub fn fit_height(&self, aspect: f32, canvas: Vec2) -> Self {
        let h = canvas.y * FIT_QUAD_FILL;
        Self::rect(self.centroid(), Vec2::new(h * aspect, h))
    }

    pub fn centroid(&self) -> Vec2 {
        self.points.iter().copied().sum::<Vec2>() * 0.25
    }

    pub fn signed_area(&self) -> f32 {
        let mut sum = 0.0;
        for i in 0..4 {
            let a = self.points[i];
            let b = self.points[(i + 1) % 4];
            sum += a.perp_dot(b);
        }
        sum * 0.5
    }

    /// Convex with the fixed TL, TR, BR, BL winding.
    pub fn is_convex_clockwise(&self) -> bool {
        (0..4).all(|i| {
            let a = self.points[i];
            let b = self.points[(i + 1) % 4];
            let c = self.points[(i + 2) % 4];
            (b - a).perp_dot(c - b) > 0.0
        })
    }

    pub fn width_height(&self) -> Vec2 {
        let [tl, tr, br, bl] = self.points;
        Vec2::new(
            (tr.distance(tl) + br.distance(bl)) * 0.5,
            (bl.distance(tl) + br.distance(tr)) * 0.5,
        )
    }

    /// Index of the closest anchor whose box of half-size `radius` holds `p`.
    pub fn nearest_within(&self, p: Vec2, radius: f32) -> Option<usize> {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, a)| (p - **a).abs().max_element() < radius)
            .min_by(|(_, a), (_, b)| p.distance_squared(**a).total_cmp(&p.distance_squared(**b)))
            .map(|(i, _)| i)
    }

    /// Point-in-quad for a convex quad.
    pub fn contains(&self, p: Vec2) -> bool {
        (0..4).all(|i| {
            let a = self.points[i];
            let b = self.points[(i + 1) % 4];
            (b - a).perp_dot(p - a) >= 0.0
        })
    }

    pub fn scaled(&self, factor: Vec2) -> Self {
        Self::new(self.points.map(|p| p * factor))
    }
}

/// Corner-drag state machine: down near an anchor starts a drag, move updates
/// only that anchor, up/cancel/leave ends it.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnchorDrag {
    active: Option<usize>,
}

impl AnchorDrag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn pointer_down(&mut self, anchors: &QuadAnchors, p: Vec2) -> bool {
        self.active = anchors.nearest_within(p, ANCHOR_HIT_RADIUS_PX);
        self.active.is_some()
    }

    /// Move the dragged anchor. Moves that would fold the quad are dropped so
    /// the winding stays fixed.
    pub fn pointer_move(&mut self, anchors: &mut QuadAnchors, p: Vec2) -> bool {
        let Some(i) = self.active else {
            return false;
        };
        if !p.is_finite() {
            return false;
        }
        let mut next = *anchors;
        next.points[i] = p;
        if !next.is_convex_clockwise() {
            return false;
        }
        *anchors = next;
        true
    }

    pub fn pointer_up(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quad_is_wound_clockwise_on_screen() {
        let q = QuadAnchors::default_for(0.4, Vec2::new(800.0, 600.0));
        assert!(q.signed_area() > 0.0);
        assert!(q.is_convex_clockwise());
        assert!(q.contains(Vec2::new(400.0, 300.0)));
    }
}
