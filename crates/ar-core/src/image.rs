//! Pixel buffers and the per-engine scratch arena.

use bytemuck::{Pod, Zeroable};

/// One RGBA8 pixel, straight (non-premultiplied) alpha.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Row-major RGBA8 image, the layout `ImageData` uses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RgbaImage {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
}

impl RgbaImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgba::TRANSPARENT; (width as usize) * (height as usize)],
        }
    }

    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        let mut img = Self::new(width, height);
        img.pixels.fill(color);
        img
    }

    /// Wrap raw RGBA bytes. `None` when the length does not match.
    pub fn from_bytes(width: u32, height: u32, bytes: &[u8]) -> Option<Self> {
        let expected = (width as usize) * (height as usize) * 4;
        if bytes.len() != expected {
            return None;
        }
        let pixels = bytes
            .chunks_exact(4)
            .map(|c| Rgba::new(c[0], c[1], c[2], c[3]))
            .collect();
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Rgba] {
        &mut self.pixels
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn get(&self, x: u32, y: u32) -> Rgba {
        if x >= self.width || y >= self.height {
            return Rgba::TRANSPARENT;
        }
        self.pixels[(y * self.width + x) as usize]
    }

    pub fn put(&mut self, x: u32, y: u32, px: Rgba) {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize] = px;
        }
    }

    /// Resize in place, discarding content when the size changes.
    pub fn ensure_size(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        *self = Self::new(width, height);
        true
    }

    pub fn clear(&mut self) {
        self.pixels.fill(Rgba::TRANSPARENT);
    }

    pub fn copy_from(&mut self, other: &RgbaImage) {
        self.ensure_size(other.width, other.height);
        self.pixels.copy_from_slice(&other.pixels);
    }

    /// Reverse the row order in place; GPU readbacks arrive bottom-up.
    pub fn flip_vertical(&mut self) {
        let w = self.width as usize;
        let h = self.height as usize;
        for y in 0..h / 2 {
            let (top, bottom) = self.pixels.split_at_mut((h - 1 - y) * w);
            top[y * w..(y + 1) * w].swap_with_slice(&mut bottom[..w]);
        }
    }

    /// Nearest-neighbour resample into a new image.
    pub fn resampled(&self, width: u32, height: u32) -> RgbaImage {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let mut out = RgbaImage::new(width, height);
        if self.is_empty() {
            return out;
        }
        for y in 0..height {
            let sy = ((y as u64 * self.height as u64) / height.max(1) as u64) as u32;
            for x in 0..width {
                let sx = ((x as u64 * self.width as u64) / width.max(1) as u64) as u32;
                out.put(x, y, self.get(sx, sy));
            }
        }
        out
    }
}

/// Fixed-role scratch buffers owned by one engine instance.
///
/// Each role is resized on demand and never shared between callers; the
/// render loop is the only writer.
#[derive(Default)]
pub struct BufferArena {
    pub video: RgbaImage,
    pub mask: crate::mask::Mask,
    pub wallpaper: RgbaImage,
    pub output: RgbaImage,
}

impl BufferArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the output-resolution roles; the mask follows the model size.
    pub fn ensure_size(&mut self, width: u32, height: u32) {
        if self.wallpaper.ensure_size(width, height) {
            log::debug!("[arena] resized to {}x{}", width, height);
        }
        self.output.ensure_size(width, height);
    }
}

/// Fit `(width, height)` so its longest side is at most `max_side`.
pub fn budget_size(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_side || longest == 0 {
        return (width.max(1), height.max(1));
    }
    let scale = max_side as f32 / longest as f32;
    (
        ((width as f32 * scale).round() as u32).max(1),
        ((height as f32 * scale).round() as u32).max(1),
    )
}
