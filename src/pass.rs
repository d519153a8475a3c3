//! Host-pipeline lifecycle hooks for a post-processing pass.

use crate::backend::RenderBackend;
use crate::error::TrailsError;
use crate::frame::{ColorFormat, Viewport};

/// A single post-processing stage as seen by the host pipeline.
///
/// The host calls `initialize` on setup or context change, `set_size` on
/// viewport changes, `render` once per frame and `dispose` on teardown.
pub trait Pass<B: RenderBackend> {
    fn name(&self) -> &str;

    fn initialize(
        &mut self,
        backend: &mut B,
        viewport: Viewport,
        format: ColorFormat,
    ) -> Result<(), TrailsError>;

    fn set_size(&mut self, backend: &mut B, width: u32, height: u32) -> Result<(), TrailsError>;

    /// Process `input`, writing to `output` or to the screen when `output` is `None`.
    fn render(
        &mut self,
        backend: &mut B,
        input: Option<&B::Target>,
        output: Option<&B::Target>,
    ) -> Result<(), TrailsError>;

    fn dispose(&mut self, backend: &mut B);

    /// Whether the pass presents directly to the display.
    fn render_to_screen(&self) -> bool;
}
