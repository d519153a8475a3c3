//! Software reference backend.
//!
//! Targets are handles into images owned by the backend. Composites run the
//! same per-texel math as `shader_post_trails.wgsl`, sampling both inputs at
//! the destination's texel centres with nearest filtering, then store the
//! result with the destination format's precision.

use std::collections::HashMap;

use super::{Destination, RenderBackend, ResourceStats, TrailsUniforms};
use crate::error::TrailsError;
use crate::frame::{texel_centre, ColorFormat, FrameImage, Viewport};

/// Handle to an image owned by a [`CpuBackend`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CpuTarget {
    id: u64,
}

impl CpuTarget {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Composite program state: just the last uploaded uniforms.
#[derive(Debug)]
pub struct CpuProgram {
    uniforms: TrailsUniforms,
}

impl CpuProgram {
    pub fn uniforms(&self) -> &TrailsUniforms {
        &self.uniforms
    }
}

#[derive(Debug)]
struct Surface {
    label: String,
    format: ColorFormat,
    image: FrameImage,
}

impl Surface {
    fn new(label: &str, size: Viewport, format: ColorFormat) -> Self {
        Self {
            label: label.to_string(),
            format,
            image: FrameImage::new(size.width, size.height),
        }
    }
}

/// CPU implementation of [`RenderBackend`].
#[derive(Debug, Default)]
pub struct CpuBackend {
    next_id: u64,
    targets: HashMap<u64, Surface>,
    live_programs: usize,
    screen: Option<Surface>,
    draw_calls: u64,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend whose display surface is already configured.
    pub fn with_screen(size: Viewport, format: ColorFormat) -> Self {
        let mut backend = Self::new();
        backend.screen = Some(Surface::new("Screen", size, format));
        backend
    }

    /// Label a target was created with, if it is still alive.
    pub fn target_label(&self, target: &CpuTarget) -> Option<&str> {
        self.targets.get(&target.id).map(|s| s.label.as_str())
    }

    fn surface(&self, target: &CpuTarget) -> Result<&Surface, TrailsError> {
        self.targets
            .get(&target.id)
            .ok_or(TrailsError::UnknownTarget(target.id))
    }

    fn surface_mut(&mut self, target: &CpuTarget) -> Result<&mut Surface, TrailsError> {
        self.targets
            .get_mut(&target.id)
            .ok_or(TrailsError::UnknownTarget(target.id))
    }

    fn screen_mut(&mut self) -> Result<&mut Surface, TrailsError> {
        self.screen
            .as_mut()
            .ok_or_else(|| TrailsError::Backend("screen is not configured".to_string()))
    }
}

impl RenderBackend for CpuBackend {
    type Target = CpuTarget;
    type Program = CpuProgram;

    fn create_target(
        &mut self,
        label: &str,
        size: Viewport,
        format: ColorFormat,
    ) -> Result<CpuTarget, TrailsError> {
        if size.is_empty() {
            return Err(TrailsError::InvalidViewport {
                width: size.width,
                height: size.height,
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.targets.insert(id, Surface::new(label, size, format));
        log::trace!("cpu: created target #{} '{}' {} {}", id, label, size, format);
        Ok(CpuTarget { id })
    }

    fn release_target(&mut self, target: CpuTarget) {
        if self.targets.remove(&target.id).is_none() {
            log::warn!("cpu: release of unknown target #{}", target.id);
        }
    }

    fn clear_target(&mut self, target: &CpuTarget) -> Result<(), TrailsError> {
        self.surface_mut(target)?.image.fill(glam::Vec4::ZERO);
        Ok(())
    }

    fn target_size(&self, target: &CpuTarget) -> Viewport {
        self.targets
            .get(&target.id)
            .map(|s| s.image.viewport())
            .unwrap_or_default()
    }

    fn create_program(&mut self) -> Result<CpuProgram, TrailsError> {
        self.live_programs += 1;
        Ok(CpuProgram {
            uniforms: TrailsUniforms::default(),
        })
    }

    fn release_program(&mut self, _program: CpuProgram) {
        self.live_programs = self.live_programs.saturating_sub(1);
    }

    fn upload_uniforms(&mut self, program: &mut CpuProgram, uniforms: &TrailsUniforms) {
        program.uniforms = *uniforms;
    }

    fn draw_composite(
        &mut self,
        program: &mut CpuProgram,
        current: &CpuTarget,
        previous: &CpuTarget,
        destination: Destination<'_, CpuTarget>,
    ) -> Result<(), TrailsError> {
        let strength = program.uniforms.trail_strength;

        let (size, format) = match destination {
            Destination::Target(t) => {
                let s = self.surface(t)?;
                (s.image.viewport(), s.format)
            }
            Destination::Screen => {
                let s = self.screen_mut()?;
                (s.image.viewport(), s.format)
            }
        };

        let current = &self.surface(current)?.image;
        let previous = &self.surface(previous)?.image;

        let mut out = FrameImage::new(size.width, size.height);
        for y in 0..size.height {
            for x in 0..size.width {
                let uv = texel_centre(x, y, size);
                let c = current.sample_nearest(uv);
                let p = previous.sample_nearest(uv) * strength;
                out.set_pixel(x, y, format.quantize(c.max(p)));
            }
        }

        match destination {
            Destination::Target(t) => self.surface_mut(t)?.image = out,
            Destination::Screen => self.screen_mut()?.image = out,
        }
        self.draw_calls += 1;
        Ok(())
    }

    fn write_target(&mut self, target: &CpuTarget, image: &FrameImage) -> Result<(), TrailsError> {
        let surface = self.surface_mut(target)?;
        surface.image = image
            .resampled(surface.image.viewport())
            .quantized(surface.format);
        Ok(())
    }

    fn read_target(&mut self, target: &CpuTarget) -> Result<FrameImage, TrailsError> {
        Ok(self.surface(target)?.image.clone())
    }

    fn configure_screen(&mut self, size: Viewport, format: ColorFormat) -> Result<(), TrailsError> {
        if size.is_empty() {
            return Err(TrailsError::InvalidViewport {
                width: size.width,
                height: size.height,
            });
        }
        self.screen = Some(Surface::new("Screen", size, format));
        Ok(())
    }

    fn read_screen(&mut self) -> Result<FrameImage, TrailsError> {
        Ok(self.screen_mut()?.image.clone())
    }

    fn stats(&self) -> ResourceStats {
        ResourceStats {
            live_targets: self.targets.len(),
            live_programs: self.live_programs,
            draw_calls: self.draw_calls,
        }
    }

    fn describe(&self) -> String {
        "cpu (software reference)".to_string()
    }
}
