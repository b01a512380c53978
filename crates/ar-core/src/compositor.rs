//! CPU compositing for the planar engine: warp, cut out, blend.

use crate::error::ArError;
use crate::homography::{check_quad, Homography};
use crate::image::{Rgba, RgbaImage};
use crate::mask::Mask;
use crate::quad::QuadAnchors;
use glam::Vec2;

/// How the wallpaper is laid onto the quad.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WarpStyle {
    pub tiles: (u32, u32),
    pub brightness: f32,
    pub opacity: f32,
}

impl Default for WarpStyle {
    fn default() -> Self {
        Self {
            tiles: (1, 1),
            brightness: 1.0,
            opacity: 1.0,
        }
    }
}

fn scale_channel(c: u8, k: f32) -> u8 {
    (c as f32 * k).round().clamp(0.0, 255.0) as u8
}

/// Warp `wallpaper` into `out` through the quad. Pixels outside the quad are
/// left transparent, so the layer is clipped to the quad path.
pub fn render_wallpaper(
    out: &mut RgbaImage,
    wallpaper: &RgbaImage,
    quad: &QuadAnchors,
    style: WarpStyle,
) -> Result<(), ArError> {
    out.clear();
    check_quad(&quad.points)?;
    if wallpaper.is_empty() {
        return Ok(());
    }
    let to_canvas = Homography::from_rect(1.0, 1.0, &quad.points)?;
    let to_uv = to_canvas.inverse()?;
    let affine = to_uv.as_affine();

    let (min, max) = quad
        .points
        .iter()
        .fold((Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)), |(lo, hi), p| {
            (lo.min(*p), hi.max(*p))
        });
    let x0 = min.x.floor().max(0.0) as u32;
    let y0 = min.y.floor().max(0.0) as u32;
    let x1 = (max.x.ceil().max(0.0) as u32).min(out.width());
    let y1 = (max.y.ceil().max(0.0) as u32).min(out.height());

    let (tx, ty) = (style.tiles.0.max(1) as f32, style.tiles.1.max(1) as f32);
    let (ww, wh) = (wallpaper.width(), wallpaper.height());
    let alpha_scale = style.opacity.clamp(0.0, 1.0);

    for y in y0..y1 {
        for x in x0..x1 {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            if !quad.contains(p) {
                continue;
            }
            let uv = match affine {
                Some(a) => a.transform_point2(p),
                None => match to_uv.apply(p) {
                    Some(uv) => uv,
                    None => continue,
                },
            };
            if !(0.0..=1.0).contains(&uv.x) || !(0.0..=1.0).contains(&uv.y) {
                continue;
            }
            let tu = (uv.x * tx).fract();
            let tv = (uv.y * ty).fract();
            let sx = ((tu * ww as f32) as u32).min(ww - 1);
            let sy = ((tv * wh as f32) as u32).min(wh - 1);
            let src = wallpaper.get(sx, sy);
            out.put(
                x,
                y,
                Rgba::new(
                    scale_channel(src.r, style.brightness),
                    scale_channel(src.g, style.brightness),
                    scale_channel(src.b, style.brightness),
                    scale_channel(src.a, alpha_scale),
                ),
            );
        }
    }
    Ok(())
}

/// Destination-out: remove layer alpha wherever the mask marks real foreground.
pub fn cut_out(layer: &mut RgbaImage, mask: &Mask) {
    if mask.is_empty() || layer.is_empty() {
        return;
    }
    let (w, h) = (layer.width(), layer.height());
    let same_size = mask.width() == w && mask.height() == h;
    for y in 0..h {
        for x in 0..w {
            let m = if same_size {
                mask.get(x, y) as f32 / 255.0
            } else {
                mask.sample((x as f32 + 0.5) / w as f32, (y as f32 + 0.5) / h as f32)
            };
            if m <= 0.0 {
                continue;
            }
            let mut px = layer.get(x, y);
            px.a = scale_channel(px.a, 1.0 - m);
            layer.put(x, y, px);
        }
    }
}

/// Source-over of straight-alpha `src` onto opaque-or-not `dst`.
pub fn composite_over(dst: &mut RgbaImage, src: &RgbaImage) {
    if dst.width() != src.width() || dst.height() != src.height() {
        log::warn!(
            "[compositor] layer size {}x{} does not match {}x{}",
            src.width(),
            src.height(),
            dst.width(),
            dst.height()
        );
        return;
    }
    for (d, s) in dst.pixels_mut().iter_mut().zip(src.pixels()) {
        if s.a == 0 {
            continue;
        }
        if s.a == 255 {
            *d = *s;
            continue;
        }
        let sa = s.a as f32 / 255.0;
        let da = d.a as f32 / 255.0;
        let out_a = sa + da * (1.0 - sa);
        let blend = |sc: u8, dc: u8| -> u8 {
            if out_a <= 0.0 {
                return 0;
            }
            ((sc as f32 * sa + dc as f32 * da * (1.0 - sa)) / out_a)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        *d = Rgba::new(
            blend(s.r, d.r),
            blend(s.g, d.g),
            blend(s.b, d.b),
            (out_a * 255.0).round() as u8,
        );
    }
}

/// Background first, then the wallpaper layer with the mask cut out of it.
pub fn compose_frame(
    output: &mut RgbaImage,
    background: &RgbaImage,
    wallpaper_layer: &mut RgbaImage,
    mask: Option<&Mask>,
) {
    output.copy_from(background);
    if let Some(mask) = mask {
        cut_out(wallpaper_layer, mask);
    }
    composite_over(output, wallpaper_layer);
}
