//! Rendering backend seam.
//!
//! The trails pass never talks to a graphics API directly. It allocates its
//! history targets, uploads its uniforms and issues full-screen composite draws
//! through [`RenderBackend`]. The wgpu backend is the production path; the CPU
//! backend is a deterministic reference used by tests and GPU-less hosts.

pub mod cpu;

use bytemuck::{Pod, Zeroable};

use crate::error::TrailsError;
use crate::frame::{ColorFormat, FrameImage, Viewport};

pub use cpu::CpuBackend;

/// Uniform block for the composite shader.
///
/// Layout matches `TrailsUniforms` in `shader_post_trails.wgsl` (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TrailsUniforms {
    pub trail_strength: f32,
    pub _padding: [f32; 3],
}

impl TrailsUniforms {
    pub fn new(trail_strength: f32) -> Self {
        Self {
            trail_strength,
            _padding: [0.0; 3],
        }
    }
}

/// Where a composite draw writes.
#[derive(Debug)]
pub enum Destination<'a, T> {
    /// An offscreen target (history buffer or the next stage's input).
    Target(&'a T),
    /// The display surface.
    Screen,
}

impl<T> Clone for Destination<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Destination<'_, T> {}

/// Live resource and draw counters, for leak checks and frame accounting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceStats {
    pub live_targets: usize,
    pub live_programs: usize,
    pub draw_calls: u64,
}

/// Graphics operations used by the trails pass and its host.
pub trait RenderBackend {
    /// Offscreen color buffer.
    type Target;
    /// Compiled composite program (pipeline + uniform storage).
    type Program;

    /// Allocate a target cleared to transparent black.
    fn create_target(
        &mut self,
        label: &str,
        size: Viewport,
        format: ColorFormat,
    ) -> Result<Self::Target, TrailsError>;

    /// Free a target. Releasing is infallible; unknown handles are ignored.
    fn release_target(&mut self, target: Self::Target);

    /// Reset a target's contents to transparent black.
    fn clear_target(&mut self, target: &Self::Target) -> Result<(), TrailsError>;

    fn target_size(&self, target: &Self::Target) -> Viewport;

    fn create_program(&mut self) -> Result<Self::Program, TrailsError>;

    fn release_program(&mut self, program: Self::Program);

    /// Push uniform values into the program. Takes effect for subsequent draws.
    fn upload_uniforms(&mut self, program: &mut Self::Program, uniforms: &TrailsUniforms);

    /// Draw `max(current, previous * trail_strength)` into `destination`.
    fn draw_composite(
        &mut self,
        program: &mut Self::Program,
        current: &Self::Target,
        previous: &Self::Target,
        destination: Destination<'_, Self::Target>,
    ) -> Result<(), TrailsError>;

    /// Replace a target's contents with `image` (converted to the target format).
    fn write_target(
        &mut self,
        target: &Self::Target,
        image: &FrameImage,
    ) -> Result<(), TrailsError>;

    /// Read a target back to the CPU.
    fn read_target(&mut self, target: &Self::Target) -> Result<FrameImage, TrailsError>;

    /// (Re)create the display surface at `size`.
    fn configure_screen(&mut self, size: Viewport, format: ColorFormat) -> Result<(), TrailsError>;

    /// Read the display surface back to the CPU.
    fn read_screen(&mut self) -> Result<FrameImage, TrailsError>;

    fn stats(&self) -> ResourceStats;

    /// Human-readable backend/adapter description.
    fn describe(&self) -> String;
}
