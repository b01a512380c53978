//! Single-channel alpha masks and the segmentation post-processing passes.
//!
//! 255 means "real foreground, cut the wallpaper out here".

use crate::constants::MASK_TEMPORAL_ALPHA;
use crate::occlusion::DetectionBox;

/// Class names compare on letters and digits only, ignoring case, so
/// "dining table", "Dining_Table" and "diningtable" are one class.
pub fn same_label(a: &str, b: &str) -> bool {
    label_key(a).eq(label_key(b))
}

fn label_key(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            alpha: vec![0; (width as usize) * (height as usize)],
        }
    }

    pub fn from_alpha(width: u32, height: u32, alpha: Vec<u8>) -> Option<Self> {
        (alpha.len() == (width as usize) * (height as usize)).then_some(Self {
            width,
            height,
            alpha,
        })
    }

    /// Threshold a per-pixel foreground confidence map.
    pub fn from_confidence(width: u32, height: u32, confidence: &[f32], threshold: f32) -> Option<Self> {
        if confidence.len() != (width as usize) * (height as usize) {
            return None;
        }
        let alpha = confidence
            .iter()
            .map(|&c| if c >= threshold { 255 } else { 0 })
            .collect();
        Some(Self {
            width,
            height,
            alpha,
        })
    }

    /// Mark pixels whose category index names an allowed label.
    pub fn from_categories(
        width: u32,
        height: u32,
        categories: &[u8],
        labels: &[String],
        allow: &[String],
    ) -> Option<Self> {
        if categories.len() != (width as usize) * (height as usize) {
            return None;
        }
        let keep: Vec<bool> = labels
            .iter()
            .map(|l| allow.iter().any(|a| same_label(a, l)))
            .collect();
        let alpha = categories
            .iter()
            .map(|&c| {
                if keep.get(c as usize).copied().unwrap_or(false) {
                    255
                } else {
                    0
                }
            })
            .collect();
        Some(Self {
            width,
            height,
            alpha,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.alpha.is_empty()
    }

    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.alpha[(y * self.width + x) as usize]
    }

    /// Share of pixels that are fully set.
    pub fn coverage(&self) -> f32 {
        if self.alpha.is_empty() {
            return 0.0;
        }
        self.alpha.iter().filter(|&&a| a == 255).count() as f32 / self.alpha.len() as f32
    }

    /// Bilinear lookup at normalized coordinates, returned in `0.0..=1.0`.
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        if self.is_empty() || !u.is_finite() || !v.is_finite() {
            return 0.0;
        }
        let x = (u * self.width as f32 - 0.5).clamp(0.0, (self.width - 1) as f32);
        let y = (v * self.height as f32 - 0.5).clamp(0.0, (self.height - 1) as f32);
        let (x0, y0) = (x.floor() as u32, y.floor() as u32);
        let (x1, y1) = ((x0 + 1).min(self.width - 1), (y0 + 1).min(self.height - 1));
        let (fx, fy) = (x - x0 as f32, y - y0 as f32);
        let top = self.get(x0, y0) as f32 * (1.0 - fx) + self.get(x1, y0) as f32 * fx;
        let bottom = self.get(x0, y1) as f32 * (1.0 - fx) + self.get(x1, y1) as f32 * fx;
        (top * (1.0 - fy) + bottom * fy) / 255.0
    }

    /// OR detector boxes into the mask, each grown by `margin` (normalized) per side.
    pub fn merge_boxes(&mut self, boxes: &[DetectionBox], margin: f32) {
        let (w, h) = (self.width as f32, self.height as f32);
        for b in boxes {
            let r = b.expanded(margin);
            let x0 = ((r.x0 * w).floor().max(0.0) as u32).min(self.width);
            let y0 = ((r.y0 * h).floor().max(0.0) as u32).min(self.height);
            let x1 = ((r.x1 * w).ceil().max(0.0) as u32).min(self.width);
            let y1 = ((r.y1 * h).ceil().max(0.0) as u32).min(self.height);
            for y in y0..y1 {
                let row = (y * self.width) as usize;
                self.alpha[row + x0 as usize..row + x1.max(x0) as usize].fill(255);
            }
        }
    }

    /// Binary dilation with a square structuring element, done as two
    /// separable max passes.
    pub fn dilate(&mut self, radius: usize) {
        if radius == 0 || self.is_empty() {
            return;
        }
        let (w, h) = (self.width as usize, self.height as usize);
        let mut tmp = vec![0u8; self.alpha.len()];
        for y in 0..h {
            let row = &self.alpha[y * w..(y + 1) * w];
            for x in 0..w {
                let lo = x.saturating_sub(radius);
                let hi = (x + radius).min(w - 1);
                tmp[y * w + x] = row[lo..=hi].iter().copied().max().unwrap_or(0);
            }
        }
        for x in 0..w {
            for y in 0..h {
                let lo = y.saturating_sub(radius);
                let hi = (y + radius).min(h - 1);
                self.alpha[y * w + x] = (lo..=hi).map(|yy| tmp[yy * w + x]).max().unwrap_or(0);
            }
        }
    }

    /// Soft edges from a separable box blur of the given radius.
    pub fn feathered(&self, radius: usize) -> Mask {
        if radius == 0 || self.is_empty() {
            return self.clone();
        }
        let (w, h) = (self.width as usize, self.height as usize);
        let horizontal = box_blur(&self.alpha, w, h, radius, true);
        let both = box_blur(&horizontal, w, h, radius, false);
        Mask {
            width: self.width,
            height: self.height,
            alpha: both,
        }
    }

    pub fn resampled(&self, width: u32, height: u32) -> Mask {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let mut out = Mask::new(width, height);
        if self.is_empty() {
            return out;
        }
        for y in 0..height {
            let v = (y as f32 + 0.5) / height as f32;
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32;
                out.alpha[(y * width + x) as usize] = (self.sample(u, v) * 255.0).round() as u8;
            }
        }
        out
    }
}

/// One box blur pass along rows or columns.
fn box_blur(src: &[u8], w: usize, h: usize, radius: usize, horizontal: bool) -> Vec<u8> {
    let (len, lines, step, stride) = if horizontal { (w, h, 1, w) } else { (h, w, w, 1) };
    let mut out = vec![0u8; src.len()];
    for line in 0..lines {
        let base = line * stride;
        for i in 0..len {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(len - 1);
            let sum: u32 = (lo..=hi).map(|j| src[base + j * step] as u32).sum();
            out[base + i * step] = (sum as f32 / (hi - lo + 1) as f32).round() as u8;
        }
    }
    out
}

/// Exponential smoothing of a mask against its own previous blended value.
///
/// `blended = previous * alpha + current * (1 - alpha)`. State is dropped when
/// the input size changes.
#[derive(Clone, Debug)]
pub struct TemporalSmoother {
    alpha: f32,
    previous: Option<(u32, u32, Vec<f32>)>,
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new(MASK_TEMPORAL_ALPHA)
    }
}

impl TemporalSmoother {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            previous: None,
        }
    }

    pub fn apply(&mut self, current: &Mask) -> Mask {
        let seeded = matches!(
            &self.previous,
            Some((w, h, _)) if *w == current.width && *h == current.height
        );
        let blended: Vec<f32> = match (&self.previous, seeded) {
            (Some((_, _, prev)), true) => prev
                .iter()
                .zip(&current.alpha)
                .map(|(&p, &c)| p * self.alpha + c as f32 * (1.0 - self.alpha))
                .collect(),
            _ => current.alpha.iter().map(|&c| c as f32).collect(),
        };
        let alpha = blended.iter().map(|&v| v.round().clamp(0.0, 255.0) as u8).collect();
        self.previous = Some((current.width, current.height, blended));
        Mask {
            width: current.width,
            height: current.height,
            alpha,
        }
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}
