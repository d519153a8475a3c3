//! CPU-side frame data: viewport sizes, working color formats and RGBA images.
//!
//! [`FrameImage`] is the exchange type between hosts and backends. Uploads,
//! readback, PNG export and the CPU backend's storage all go through it.

use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

/// Size of the render surface in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel storage format of a color buffer.
///
/// This is the pipeline's "frame buffer type": 8-bit targets clamp and quantize,
/// half-float targets round to f16, full-float targets store values as-is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorFormat {
    #[serde(rename = "rgba8")]
    Rgba8Unorm,
    #[default]
    #[serde(rename = "rgba16f")]
    Rgba16Float,
    #[serde(rename = "rgba32f")]
    Rgba32Float,
}

impl ColorFormat {
    /// Bytes per texel (four channels).
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            ColorFormat::Rgba8Unorm => 4,
            ColorFormat::Rgba16Float => 8,
            ColorFormat::Rgba32Float => 16,
        }
    }

    /// Apply the precision and range of this format to a color.
    pub fn quantize(self, color: Vec4) -> Vec4 {
        match self {
            ColorFormat::Rgba8Unorm => {
                (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round() / 255.0
            }
            ColorFormat::Rgba16Float => Vec4::from_array(
                color
                    .to_array()
                    .map(|c| half::f16::from_f32(c).to_f32()),
            ),
            ColorFormat::Rgba32Float => color,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColorFormat::Rgba8Unorm => "rgba8",
            ColorFormat::Rgba16Float => "rgba16f",
            ColorFormat::Rgba32Float => "rgba32f",
        }
    }
}

impl std::str::FromStr for ColorFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rgba8" | "rgba8unorm" | "unorm8" | "byte" => Ok(ColorFormat::Rgba8Unorm),
            "rgba16f" | "rgba16float" | "half" | "halffloat" => Ok(ColorFormat::Rgba16Float),
            "rgba32f" | "rgba32float" | "float" => Ok(ColorFormat::Rgba32Float),
            other => Err(format!("Unknown color format: {}", other)),
        }
    }
}

impl std::fmt::Display for ColorFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Linear RGBA image with one `Vec4` per pixel, rows top to bottom.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameImage {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

impl FrameImage {
    /// Transparent black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self::solid(width, height, Vec4::ZERO)
    }

    pub fn solid(width: u32, height: u32, color: Vec4) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    /// Build from raw pixels. Returns `None` if the pixel count does not match.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Vec4>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { width, height, pixels })
    }

    /// Decode tightly packed 8-bit RGBA.
    pub fn from_rgba8(width: u32, height: u32, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != width as usize * height as usize * 4 {
            return None;
        }
        let pixels = bytes
            .chunks_exact(4)
            .map(|p| Vec4::new(p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32) / 255.0)
            .collect();
        Some(Self { width, height, pixels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[self.index(x, y)]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Vec4) {
        let i = self.index(x, y);
        self.pixels[i] = color;
    }

    pub fn fill(&mut self, color: Vec4) {
        self.pixels.fill(color);
    }

    /// Nearest-texel lookup at normalized coordinates, clamped to the edges.
    pub fn sample_nearest(&self, uv: Vec2) -> Vec4 {
        if self.pixels.is_empty() {
            return Vec4::ZERO;
        }
        let x = ((uv.x * self.width as f32).floor().max(0.0) as u32).min(self.width - 1);
        let y = ((uv.y * self.height as f32).floor().max(0.0) as u32).min(self.height - 1);
        self.pixel(x, y)
    }

    /// Nearest-neighbour resample to `size`. Returns a copy when the size already matches.
    pub fn resampled(&self, size: Viewport) -> FrameImage {
        if size == self.viewport() {
            return self.clone();
        }
        let mut out = FrameImage::new(size.width, size.height);
        for y in 0..size.height {
            for x in 0..size.width {
                out.set_pixel(x, y, self.sample_nearest(texel_centre(x, y, size)));
            }
        }
        out
    }

    /// Store every pixel with the precision of `format`.
    pub fn quantized(mut self, format: ColorFormat) -> Self {
        for p in &mut self.pixels {
            *p = format.quantize(*p);
        }
        self
    }

    /// Encode as tightly packed 8-bit RGBA (clamped), e.g. for PNG output.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for p in &self.pixels {
            let c = (p.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
            out.extend_from_slice(&[c.x as u8, c.y as u8, c.z as u8, c.w as u8]);
        }
        out
    }

    /// Largest per-channel absolute difference to `other`, or `None` if sizes differ.
    pub fn max_abs_diff(&self, other: &FrameImage) -> Option<f32> {
        if self.viewport() != other.viewport() {
            return None;
        }
        Some(
            self.pixels
                .iter()
                .zip(&other.pixels)
                .map(|(a, b)| (*a - *b).abs().max_element())
                .fold(0.0, f32::max),
        )
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Normalized coordinates of the centre of texel `(x, y)` in a surface of `size`.
pub fn texel_centre(x: u32, y: u32, size: Viewport) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / size.width as f32,
        (y as f32 + 0.5) / size.height as f32,
    )
}
