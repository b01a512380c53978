// Host-side tests for homographies, anchor quads and the CPU warp.

use ar_core::compositor::{compose_frame, composite_over, cut_out, render_wallpaper, WarpStyle};
use ar_core::constants::ANCHOR_HIT_RADIUS_PX;
use ar_core::homography::check_quad;
use ar_core::image::Rgba;
use ar_core::quad::AnchorDrag;
use ar_core::*;
use glam::Vec2;

fn unit_square() -> [Vec2; 4] {
    [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ]
}

fn close(a: Vec2, b: Vec2) -> bool {
    a.distance(b) < 1e-2
}

#[test]
fn scaled_square_gives_diagonal_matrix() {
    for k in [0.5_f32, 2.0, 37.5] {
        let dst = unit_square().map(|p| p * k);
        let h = Homography::solve(&unit_square(), &dst).unwrap();
        let m = h.matrix();
        assert!((m.x_axis.x - k).abs() < 1e-4, "k={k}: {m:?}");
        assert!((m.y_axis.y - k).abs() < 1e-4);
        assert!((m.z_axis.z - 1.0).abs() < 1e-6);
        for off in [m.x_axis.y, m.x_axis.z, m.y_axis.x, m.y_axis.z, m.z_axis.x, m.z_axis.y] {
            assert!(off.abs() < 1e-4);
        }
    }
}

#[test]
fn rect_corners_land_on_perspective_quad() {
    let dst = [
        Vec2::new(120.0, 80.0),
        Vec2::new(500.0, 110.0),
        Vec2::new(470.0, 420.0),
        Vec2::new(90.0, 380.0),
    ];
    let h = Homography::from_rect(300.0, 200.0, &dst).unwrap();
    assert!(h.as_affine().is_none());
    let src = [
        Vec2::new(0.0, 0.0),
        Vec2::new(300.0, 0.0),
        Vec2::new(300.0, 200.0),
        Vec2::new(0.0, 200.0),
    ];
    for (s, d) in src.iter().zip(dst.iter()) {
        assert!(close(h.apply(*s).unwrap(), *d), "{s} -> {d}");
    }
    let inv = h.inverse().unwrap();
    for (s, d) in src.iter().zip(dst.iter()) {
        assert!(close(inv.apply(*d).unwrap(), *s));
    }
}

#[test]
fn collinear_quads_are_rejected() {
    let line = [
        Vec2::new(0.0, 0.0),
        Vec2::new(10.0, 0.0),
        Vec2::new(20.0, 0.0),
        Vec2::new(0.0, 10.0),
    ];
    assert_eq!(
        check_quad(&line).unwrap_err().category(),
        ErrorCategory::NumericalDegeneracy
    );
    assert!(Homography::square_to_quad(&line).is_err());

    let point = [Vec2::splat(5.0); 4];
    assert!(check_quad(&point).is_err());

    let mut nan = unit_square();
    nan[2] = Vec2::new(f32::NAN, 1.0);
    assert!(Homography::solve(&unit_square(), &nan).is_err());
}

#[test]
fn default_quad_matches_wallpaper_aspect() {
    let canvas = Vec2::new(1280.0, 720.0);
    for aspect in [0.4_f32, 1.0, 2.5] {
        let q = QuadAnchors::default_for(aspect, canvas);
        let size = q.width_height();
        assert!((size.x / size.y - aspect).abs() < 1e-4);
        assert!(q.is_convex_clockwise());
        assert!(q.signed_area() > 0.0);
        assert!(close(q.centroid(), canvas * 0.5));
    }
}

#[test]
fn fit_width_keeps_center() {
    let canvas = Vec2::new(800.0, 600.0);
    let q = QuadAnchors::default_for(0.5, canvas);
    let moved = QuadAnchors::new(q.points.map(|p| p + Vec2::new(30.0, -20.0)));
    let fitted = moved.fit_width(0.5, canvas);
    assert!(close(fitted.centroid(), moved.centroid()));
    assert!((fitted.width_height().x - 720.0).abs() < 1e-3);
    let tall = moved.fit_height(0.5, canvas);
    assert!((tall.width_height().y - 540.0).abs() < 1e-3);
}

#[test]
fn drag_moves_only_the_grabbed_anchor() {
    let mut q = QuadAnchors::default_for(1.0, Vec2::new(400.0, 400.0));
    let before = q;
    let mut drag = AnchorDrag::new();
    assert!(!drag.pointer_down(&q, Vec2::new(200.0, 200.0)));
    assert!(drag.pointer_down(&q, before.points[1] + Vec2::new(5.0, 5.0)));
    assert_eq!(drag.active(), Some(1));
    assert!(drag.pointer_move(&mut q, before.points[1] + Vec2::new(15.0, -10.0)));
    assert_eq!(q.points[0], before.points[0]);
    assert_eq!(q.points[2], before.points[2]);
    assert_eq!(q.points[3], before.points[3]);
    drag.pointer_up();
    assert!(!drag.pointer_move(&mut q, Vec2::new(0.0, 0.0)));
}

#[test]
fn grab_reaches_only_the_hit_radius() {
    let q = QuadAnchors::default_for(1.0, Vec2::new(400.0, 400.0));
    let corner = q.points[1];
    let mut drag = AnchorDrag::new();
    assert!(!drag.pointer_down(&q, corner + Vec2::new(ANCHOR_HIT_RADIUS_PX + 1.0, 0.0)));
    assert_eq!(drag.active(), None);
    assert!(drag.pointer_down(&q, corner + Vec2::new(ANCHOR_HIT_RADIUS_PX - 1.0, 0.0)));
    assert_eq!(drag.active(), Some(1));
}

#[test]
fn drag_that_folds_the_quad_is_dropped() {
    let mut q = QuadAnchors::default_for(1.0, Vec2::new(400.0, 400.0));
    let before = q;
    let mut drag = AnchorDrag::new();
    assert!(drag.pointer_down(&q, before.points[0]));
    // top-left dragged past the bottom-right corner
    assert!(!drag.pointer_move(&mut q, before.points[2] + Vec2::splat(40.0)));
    assert_eq!(q, before);
    assert!(!drag.pointer_move(&mut q, Vec2::new(f32::INFINITY, 0.0)));
}

#[test]
fn warp_is_clipped_to_the_quad() {
    let paper = RgbaImage::filled(4, 4, Rgba::new(255, 0, 0, 255));
    let mut out = RgbaImage::new(40, 40);
    let quad = QuadAnchors::new([
        Vec2::new(10.0, 10.0),
        Vec2::new(30.0, 10.0),
        Vec2::new(30.0, 30.0),
        Vec2::new(10.0, 30.0),
    ]);
    render_wallpaper(&mut out, &paper, &quad, WarpStyle::default()).unwrap();
    assert_eq!(out.get(20, 20), Rgba::new(255, 0, 0, 255));
    assert_eq!(out.get(5, 5).a, 0);
    assert_eq!(out.get(35, 20).a, 0);
}

#[test]
fn warp_applies_brightness_and_opacity() {
    let paper = RgbaImage::filled(2, 2, Rgba::new(100, 100, 100, 255));
    let mut out = RgbaImage::new(20, 20);
    let quad = QuadAnchors::default_for(1.0, Vec2::new(20.0, 20.0));
    let style = WarpStyle {
        tiles: (2, 2),
        brightness: 1.5,
        opacity: 0.6,
    };
    render_wallpaper(&mut out, &paper, &quad, style).unwrap();
    let px = out.get(10, 10);
    assert_eq!(px.r, 150);
    assert_eq!(px.a, 153);
}

#[test]
fn degenerate_warp_leaves_layer_clear() {
    let paper = RgbaImage::filled(2, 2, Rgba::new(1, 2, 3, 255));
    let mut out = RgbaImage::filled(8, 8, Rgba::new(9, 9, 9, 255));
    let flat = QuadAnchors::new([
        Vec2::new(0.0, 4.0),
        Vec2::new(2.0, 4.0),
        Vec2::new(4.0, 4.0),
        Vec2::new(6.0, 4.0),
    ]);
    assert!(render_wallpaper(&mut out, &paper, &flat, WarpStyle::default()).is_err());
    assert!(out.pixels().iter().all(|p| p.a == 0));
}

#[test]
fn mask_cuts_wallpaper_out_of_the_composite() {
    let background = RgbaImage::filled(4, 1, Rgba::new(0, 0, 255, 255));
    let mut layer = RgbaImage::filled(4, 1, Rgba::new(255, 0, 0, 255));
    let mask = Mask::from_alpha(4, 1, vec![255, 255, 0, 0]).unwrap();
    let mut out = RgbaImage::new(0, 0);
    compose_frame(&mut out, &background, &mut layer, Some(&mask));
    assert_eq!(out.get(0, 0), Rgba::new(0, 0, 255, 255));
    assert_eq!(out.get(1, 0), Rgba::new(0, 0, 255, 255));
    assert_eq!(out.get(2, 0), Rgba::new(255, 0, 0, 255));
    assert_eq!(out.get(3, 0), Rgba::new(255, 0, 0, 255));
}

#[test]
fn half_alpha_blends_over_background() {
    let mut dst = RgbaImage::filled(1, 1, Rgba::new(0, 0, 0, 255));
    let mut src = RgbaImage::filled(1, 1, Rgba::new(200, 200, 200, 255));
    cut_out(&mut src, &Mask::from_alpha(1, 1, vec![128]).unwrap());
    composite_over(&mut dst, &src);
    let px = dst.get(0, 0);
    assert_eq!(px.a, 255);
    assert!((px.r as i32 - 100).abs() <= 1, "{px:?}");
}

#[test]
fn flip_vertical_reverses_rows() {
    let mut img = RgbaImage::new(2, 3);
    for y in 0..3 {
        img.put(0, y, Rgba::new(y as u8, 0, 0, 255));
        img.put(1, y, Rgba::new(0, y as u8, 0, 255));
    }
    img.flip_vertical();
    assert_eq!(img.get(0, 0), Rgba::new(2, 0, 0, 255));
    assert_eq!(img.get(1, 0), Rgba::new(0, 2, 0, 255));
    assert_eq!(img.get(0, 1), Rgba::new(1, 0, 0, 255));
    assert_eq!(img.get(0, 2), Rgba::new(0, 0, 0, 255));
}
