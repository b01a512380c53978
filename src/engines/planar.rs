use crate::camera::WebCamera;
use crate::constants::{HANDLE_ACTIVE_FILL, HANDLE_FILL, HANDLE_RADIUS_PX, OUTLINE_COLOR, OUTLINE_WIDTH_PX};
use crate::vision::WebAssetLoader;
use ar_core::{PlanarEngine, PlanarSession, RgbaImage};
use glam::Vec2;
use wasm_bindgen::{Clamped, JsCast};
use web_sys as web;

pub type PlanarPreview = PlanarSession<WebCamera, WebAssetLoader>;

/// Puts the planar engine's composite on the page canvas and draws the
/// interaction overlay on top.
pub struct PlanarView {
    canvas: web::HtmlCanvasElement,
    ctx: web::CanvasRenderingContext2d,
}

impl PlanarView {
    pub fn new(canvas: &web::HtmlCanvasElement) -> anyhow::Result<Self> {
        let ctx = canvas
            .get_context("2d")
            .map_err(|e| anyhow::anyhow!("{:?}", e))?
            .ok_or_else(|| anyhow::anyhow!("no 2d context"))?
            .dyn_into::<web::CanvasRenderingContext2d>()
            .map_err(|e| anyhow::anyhow!("{:?}", e))?;
        Ok(Self {
            canvas: canvas.clone(),
            ctx,
        })
    }

    pub fn canvas(&self) -> &web::HtmlCanvasElement {
        &self.canvas
    }

    fn put(&self, image: &RgbaImage) -> bool {
        let (w, h) = (image.width(), image.height());
        if self.canvas.width() != w {
            self.canvas.set_width(w);
        }
        if self.canvas.height() != h {
            self.canvas.set_height(h);
        }
        match web::ImageData::new_with_u8_clamped_array_and_sh(Clamped(image.as_bytes()), w, h) {
            Ok(data) => self.ctx.put_image_data(&data, 0.0, 0.0).is_ok(),
            Err(e) => {
                log::warn!("[planar] ImageData failed: {:?}", e);
                false
            }
        }
    }

    /// Quad outline and corner handles, in output pixels.
    fn draw_handles(&self, engine: &PlanarEngine) {
        let canvas = engine.canvas();
        if canvas.x <= 0.0 || canvas.y <= 0.0 {
            return;
        }
        let to_out = Vec2::new(self.canvas.width() as f32, self.canvas.height() as f32) / canvas;
        let css_width = self.canvas.get_bounding_client_rect().width().max(1.0);
        let px = self.canvas.width() as f64 / css_width;
        let points = engine.anchors().scaled(to_out).points;

        let ctx = &self.ctx;
        ctx.begin_path();
        ctx.move_to(points[0].x as f64, points[0].y as f64);
        for p in &points[1..] {
            ctx.line_to(p.x as f64, p.y as f64);
        }
        ctx.close_path();
        ctx.set_line_width(OUTLINE_WIDTH_PX * px);
        ctx.set_stroke_style_str(OUTLINE_COLOR);
        ctx.stroke();

        let active = engine.active_anchor();
        for (i, p) in points.iter().enumerate() {
            ctx.begin_path();
            _ = ctx.arc(p.x as f64, p.y as f64, HANDLE_RADIUS_PX * px, 0.0, std::f64::consts::TAU);
            ctx.set_fill_style_str(if active == Some(i) { HANDLE_ACTIVE_FILL } else { HANDLE_FILL });
            ctx.fill();
            ctx.stroke();
        }
    }

    pub fn present(&self, engine: &PlanarEngine) {
        let output = engine.output();
        if output.is_empty() || !self.put(output) {
            return;
        }
        self.draw_handles(engine);
    }
}
