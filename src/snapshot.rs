use crate::constants::{SNAPSHOT_FILE_PREFIX, SNAPSHOT_MIME};
use crate::tray;
use ar_core::RgbaImage;
use wasm_bindgen::{Clamped, JsCast};
use web_sys as web;

/// Encode a composited frame as PNG and hand it to the browser as a download.
pub fn export(document: &web::Document, image: &RgbaImage) -> anyhow::Result<String> {
    let canvas: web::HtmlCanvasElement = document
        .create_element("canvas")
        .map_err(|e| anyhow::anyhow!("{:?}", e))?
        .dyn_into()
        .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    canvas.set_width(image.width());
    canvas.set_height(image.height());
    let ctx: web::CanvasRenderingContext2d = canvas
        .get_context("2d")
        .map_err(|e| anyhow::anyhow!("{:?}", e))?
        .ok_or_else(|| anyhow::anyhow!("no 2d context"))?
        .dyn_into()
        .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    let data = web::ImageData::new_with_u8_clamped_array_and_sh(Clamped(image.as_bytes()), image.width(), image.height())
        .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    ctx.put_image_data(&data, 0.0, 0.0)
        .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    let url = canvas
        .to_data_url_with_type(SNAPSHOT_MIME)
        .map_err(|e| anyhow::anyhow!("{:?}", e))?;

    let name = tray::snapshot_file_name(SNAPSHOT_FILE_PREFIX, js_sys::Date::now());
    let anchor: web::HtmlAnchorElement = document
        .create_element("a")
        .map_err(|e| anyhow::anyhow!("{:?}", e))?
        .dyn_into()
        .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    anchor.set_href(&url);
    anchor.set_download(&name);
    anchor.click();
    log::info!("[snapshot] exported {} ({}x{})", name, image.width(), image.height());
    Ok(name)
}
