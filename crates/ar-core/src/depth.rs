//! Raw depth buffers and the per-fragment occlusion test.
//!
//! The platform negotiates the raw layout per session. The decode follows
//! whatever [`DepthEncoding`] it reported, so the same math runs on the host,
//! in tests, and (mirrored in GLSL) on the GPU.

use crate::constants::{DEPTH_BIAS_METERS, DEPTH_INTEGER_METERS_PER_UNIT, DEPTH_SOFT_BAND_METERS};
use crate::error::ArError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthEncoding {
    /// Two bytes per sample, `luminance + alpha * 256`.
    LuminanceAlpha,
    /// Little-endian `u16`.
    Uint16,
    /// Little-endian `f32`, already in platform units.
    Float32,
}

impl DepthEncoding {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            DepthEncoding::LuminanceAlpha | DepthEncoding::Uint16 => 2,
            DepthEncoding::Float32 => 4,
        }
    }

    /// Scale used when the platform does not report one.
    pub fn default_scale(self) -> f32 {
        match self {
            DepthEncoding::Float32 => 1.0,
            _ => DEPTH_INTEGER_METERS_PER_UNIT,
        }
    }

    /// Map a platform format name (`"luminance-alpha"`, `"float32"`, ...).
    pub fn from_format(name: &str) -> Option<Self> {
        match name {
            "luminance-alpha" => Some(DepthEncoding::LuminanceAlpha),
            "unsigned-short" | "uint16" => Some(DepthEncoding::Uint16),
            "float32" => Some(DepthEncoding::Float32),
            _ => None,
        }
    }

    /// Index used by the shader's decode switch.
    pub fn shader_index(self) -> i32 {
        match self {
            DepthEncoding::LuminanceAlpha => 0,
            DepthEncoding::Uint16 => 1,
            DepthEncoding::Float32 => 2,
        }
    }
}

/// One view's depth buffer, kept in its raw encoding.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthFrame {
    pub width: u32,
    pub height: u32,
    pub encoding: DepthEncoding,
    pub raw_to_meters: f32,
    data: Vec<u8>,
}

impl DepthFrame {
    pub fn new(
        width: u32,
        height: u32,
        encoding: DepthEncoding,
        raw_to_meters: Option<f32>,
        mut data: Vec<u8>,
    ) -> Result<Self, ArError> {
        let expected = (width as usize) * (height as usize) * encoding.bytes_per_sample();
        if data.len() < expected {
            return Err(ArError::TransientDevice(format!(
                "depth buffer holds {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        // platforms may hand over padded buffers; texture uploads need the exact size
        data.truncate(expected);
        let raw_to_meters = raw_to_meters
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or_else(|| encoding.default_scale());
        Ok(Self {
            width,
            height,
            encoding,
            raw_to_meters,
            data,
        })
    }

    /// Exactly `width * height` samples in the negotiated encoding.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    fn raw_at(&self, index: usize) -> f32 {
        let n = self.encoding.bytes_per_sample();
        let bytes = &self.data[index * n..(index + 1) * n];
        match self.encoding {
            DepthEncoding::LuminanceAlpha => bytes[0] as f32 + bytes[1] as f32 * 256.0,
            DepthEncoding::Uint16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            DepthEncoding::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Distance in meters at normalized view coordinates. `None` where the
    /// sensor has no reading.
    pub fn sample_meters(&self, u: f32, v: f32) -> Option<f32> {
        if self.width == 0 || self.height == 0 || !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
            return None;
        }
        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = ((v * self.height as f32) as u32).min(self.height - 1);
        let meters = self.raw_at((y * self.width + x) as usize) * self.raw_to_meters;
        (meters.is_finite() && meters > 0.0).then_some(meters)
    }

    /// Decode the whole buffer. Missing readings become `f32::INFINITY`.
    pub fn to_meters(&self) -> Vec<f32> {
        (0..(self.width as usize) * (self.height as usize))
            .map(|i| {
                let m = self.raw_at(i) * self.raw_to_meters;
                if m.is_finite() && m > 0.0 {
                    m
                } else {
                    f32::INFINITY
                }
            })
            .collect()
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Visibility of a wallpaper fragment at `fragment_m` given the real surface
/// at `real_m`: 1.0 drawn, 0.0 hidden behind the real world.
///
/// The real world occludes only when it is closer than the fragment by more
/// than `bias`; over the following `band` the fragment fades out.
pub fn occlusion_alpha(fragment_m: f32, real_m: Option<f32>, bias: f32, band: f32) -> f32 {
    let Some(real) = real_m else {
        return 1.0;
    };
    let closer_by = fragment_m - real;
    if band <= 0.0 {
        return if closer_by > bias { 0.0 } else { 1.0 };
    }
    1.0 - smoothstep(bias, bias + band, closer_by)
}

pub fn default_occlusion_alpha(fragment_m: f32, real_m: Option<f32>) -> f32 {
    occlusion_alpha(fragment_m, real_m, DEPTH_BIAS_METERS, DEPTH_SOFT_BAND_METERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luminance_alpha_decodes_high_byte() {
        let frame = DepthFrame::new(1, 1, DepthEncoding::LuminanceAlpha, None, vec![0xE8, 0x03]).unwrap();
        let m = frame.sample_meters(0.5, 0.5).unwrap();
        assert!((m - 1.0).abs() < 1e-6);
    }

    #[test]
    fn float_uses_unit_scale() {
        let frame =
            DepthFrame::new(1, 1, DepthEncoding::Float32, None, 2.5f32.to_le_bytes().to_vec()).unwrap();
        assert_eq!(frame.sample_meters(0.0, 0.0), Some(2.5));
    }

    #[test]
    fn padded_buffer_is_cut_to_the_samples() {
        let mut data: Vec<u8> = [1.0f32, 2.0, 3.0, 4.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        data.extend_from_slice(&[0xFF; 6]);
        let frame = DepthFrame::new(2, 2, DepthEncoding::Float32, None, data).unwrap();
        assert_eq!(frame.raw().len(), 16);
        assert_eq!(frame.sample_meters(0.99, 0.99), Some(4.0));

        let short = DepthFrame::new(2, 2, DepthEncoding::Uint16, None, vec![0; 7]);
        assert!(short.is_err());
    }
}
