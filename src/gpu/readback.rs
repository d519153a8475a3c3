//! Texel encoding for uploads and padded-row readback of color targets.

use crate::error::TrailsError;
use crate::frame::{ColorFormat, FrameImage, Viewport};

/// Align a row length to WebGPU's copy row alignment (256 bytes).
pub fn align_bytes_per_row(value: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    value.div_ceil(align) * align
}

/// Encode `image` as tightly packed texels of `format`.
pub fn encode_pixels(image: &FrameImage, format: ColorFormat) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.pixels().len() * format.bytes_per_pixel() as usize);
    for p in image.pixels() {
        let p = format.quantize(*p);
        match format {
            ColorFormat::Rgba8Unorm => {
                for c in p.to_array() {
                    out.push((c * 255.0).round() as u8);
                }
            }
            ColorFormat::Rgba16Float => {
                for c in p.to_array() {
                    out.extend_from_slice(&half::f16::from_f32(c).to_le_bytes());
                }
            }
            ColorFormat::Rgba32Float => {
                for c in p.to_array() {
                    out.extend_from_slice(&c.to_le_bytes());
                }
            }
        }
    }
    out
}

/// Decode rows of `format` texels, skipping row padding.
pub fn decode_rows(
    data: &[u8],
    padded_bytes_per_row: u32,
    size: Viewport,
    format: ColorFormat,
) -> Result<FrameImage, TrailsError> {
    let bpp = format.bytes_per_pixel() as usize;
    let tight = size.width as usize * bpp;
    let padded = padded_bytes_per_row as usize;
    if padded < tight || data.len() < padded * (size.height as usize).saturating_sub(1) + tight {
        return Err(TrailsError::Backend(format!(
            "readback buffer too small for {} {}",
            size, format
        )));
    }

    let mut pixels = Vec::with_capacity(size.pixel_count());
    for row in 0..size.height as usize {
        let start = row * padded;
        for texel in data[start..start + tight].chunks_exact(bpp) {
            let channels: [f32; 4] = match format {
                ColorFormat::Rgba8Unorm => std::array::from_fn(|i| texel[i] as f32 / 255.0),
                ColorFormat::Rgba16Float => std::array::from_fn(|i| {
                    half::f16::from_le_bytes([texel[i * 2], texel[i * 2 + 1]]).to_f32()
                }),
                ColorFormat::Rgba32Float => std::array::from_fn(|i| {
                    f32::from_le_bytes([
                        texel[i * 4],
                        texel[i * 4 + 1],
                        texel[i * 4 + 2],
                        texel[i * 4 + 3],
                    ])
                }),
            };
            pixels.push(glam::Vec4::from_array(channels));
        }
    }

    FrameImage::from_pixels(size.width, size.height, pixels)
        .ok_or_else(|| TrailsError::Backend("decoded pixel count mismatch".to_string()))
}

/// Copy a texture into a staging buffer and decode it.
pub fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    size: Viewport,
    format: ColorFormat,
) -> Result<FrameImage, TrailsError> {
    let padded_bytes_per_row = align_bytes_per_row(size.width * format.bytes_per_pixel());
    let buffer_size = (padded_bytes_per_row * size.height) as wgpu::BufferAddress;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Trails Readback Buffer"),
        size: buffer_size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Trails Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(size.height),
            },
        },
        wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |v| {
        let _ = tx.send(v);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|_| TrailsError::Backend("map_async callback dropped".to_string()))?
        .map_err(|e| TrailsError::Backend(format!("buffer map failed: {}", e)))?;

    let image = {
        let data = slice.get_mapped_range();
        decode_rows(&data, padded_bytes_per_row, size, format)
    };
    staging.unmap();
    staging.destroy();
    image
}
