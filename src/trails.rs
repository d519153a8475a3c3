//! Trails pass: frame persistence through ping-pong history targets.
//!
//! Each frame the pass composites the incoming image with the previous
//! composite, decayed by the trail strength:
//!
//! ```text
//! out = max(current, history * trail_strength)   (per channel, alpha included)
//! ```
//!
//! Two history targets alternate roles. The write target receives this
//! frame's composite and becomes next frame's history. The composite is then
//! re-drawn into the downstream target or the screen.

use serde::{Deserialize, Serialize};

use crate::backend::{Destination, RenderBackend, TrailsUniforms};
use crate::error::TrailsError;
use crate::frame::{ColorFormat, Viewport};
use crate::pass::Pass;

/// Default history decay per frame.
pub const DEFAULT_TRAIL_STRENGTH: f32 = 0.9;

/// User-facing pass settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrailsSettings {
    /// History decay factor. Nominally 0-1; values outside are not clamped
    /// (above 1 brightens, below 0 zeroes the history contribution).
    pub trail_strength: f32,
    /// Present directly to the display instead of the output target.
    pub render_to_screen: bool,
}

impl Default for TrailsSettings {
    fn default() -> Self {
        Self {
            trail_strength: DEFAULT_TRAIL_STRENGTH,
            render_to_screen: false,
        }
    }
}

impl TrailsSettings {
    pub fn with_trail_strength(mut self, value: f32) -> Self {
        self.trail_strength = value;
        self
    }

    pub fn with_render_to_screen(mut self, value: bool) -> Self {
        self.render_to_screen = value;
        self
    }

    /// Uniform block for the composite shader.
    pub fn to_uniforms(&self) -> TrailsUniforms {
        TrailsUniforms::new(self.trail_strength)
    }
}

/// Which history target receives the next composite.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActiveTarget {
    A,
    #[default]
    B,
}

impl ActiveTarget {
    fn index(self) -> usize {
        match self {
            ActiveTarget::A => 0,
            ActiveTarget::B => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            ActiveTarget::A => ActiveTarget::B,
            ActiveTarget::B => ActiveTarget::A,
        }
    }

    /// Boolean form of the flag: `true` when A is the write target.
    pub fn as_flag(self) -> bool {
        self == ActiveTarget::A
    }
}

/// Lifecycle of a pass. Transitions are linear; `Disposed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Disposed,
}

/// Ping-pong trails accumulator.
pub struct TrailsPass<B: RenderBackend> {
    settings: TrailsSettings,
    active: ActiveTarget,
    /// History targets A and B, present while initialized.
    targets: Option<[B::Target; 2]>,
    program: Option<B::Program>,
    viewport: Viewport,
    format: ColorFormat,
    disposed: bool,
    frames_rendered: u64,
}

impl<B: RenderBackend> TrailsPass<B> {
    pub const NAME: &'static str = "TrailsPass";

    /// Create the pass and its composite program. History targets are
    /// allocated later by [`initialize`](Self::initialize).
    pub fn new(backend: &mut B, settings: TrailsSettings) -> Result<Self, TrailsError> {
        let program = backend.create_program()?;
        Ok(Self {
            settings,
            active: ActiveTarget::default(),
            targets: None,
            program: Some(program),
            viewport: Viewport::default(),
            format: ColorFormat::default(),
            disposed: false,
            frames_rendered: 0,
        })
    }

    pub fn name(&self) -> &str {
        Self::NAME
    }

    /// Allocate both history targets, releasing any previous pair first.
    ///
    /// Safe to call repeatedly (e.g. after a context change). The active
    /// target is kept; the new targets start black.
    pub fn initialize(
        &mut self,
        backend: &mut B,
        viewport: Viewport,
        format: ColorFormat,
    ) -> Result<(), TrailsError> {
        if self.disposed {
            return Err(TrailsError::Disposed);
        }
        if viewport.is_empty() {
            return Err(TrailsError::InvalidViewport {
                width: viewport.width,
                height: viewport.height,
            });
        }

        self.release_targets(backend);
        self.targets = Some(Self::allocate_targets(backend, viewport, format)?);
        self.viewport = viewport;
        self.format = format;
        log::debug!("{}: initialized {} targets at {}", Self::NAME, format, viewport);
        Ok(())
    }

    /// Resize both history targets. Roles are preserved; contents restart black.
    ///
    /// Dimensions are clamped to at least 1. Without targets (never
    /// initialized, or disposed) this is a no-op.
    pub fn resize(&mut self, backend: &mut B, width: u32, height: u32) -> Result<(), TrailsError> {
        let size = Viewport::new(width.max(1), height.max(1));
        if self.targets.is_none() {
            log::debug!("{}: resize to {} ignored, no targets", Self::NAME, size);
            return Ok(());
        }
        if size == self.viewport {
            return Ok(());
        }

        self.release_targets(backend);
        self.targets = Some(Self::allocate_targets(backend, size, self.format)?);
        self.viewport = size;
        log::debug!("{}: resized to {}", Self::NAME, size);
        Ok(())
    }

    /// Composite `current` into the write target, swap roles, then draw the
    /// composite to `output` (or the screen when `output` is `None` or
    /// screen presentation is on).
    pub fn render(
        &mut self,
        backend: &mut B,
        current: Option<&B::Target>,
        output: Option<&B::Target>,
    ) -> Result<(), TrailsError> {
        let current = current.ok_or(TrailsError::InputMissing)?;
        let (Some(targets), Some(program)) = (self.targets.as_ref(), self.program.as_mut()) else {
            return Err(TrailsError::NotInitialized);
        };

        let write = &targets[self.active.index()];
        let history = &targets[self.active.other().index()];
        let uniforms = self.settings.to_uniforms();

        backend.upload_uniforms(program, &uniforms);
        backend.draw_composite(program, current, history, Destination::Target(write))?;

        self.active = self.active.other();

        if self.settings.render_to_screen {
            // Same draw as the history write, redirected to the display.
            backend.upload_uniforms(program, &uniforms);
            backend.draw_composite(program, current, history, Destination::Screen)?;
        } else {
            let destination = match output {
                Some(target) => Destination::Target(target),
                None => Destination::Screen,
            };
            backend.upload_uniforms(program, &uniforms);
            backend.draw_composite(program, write, history, destination)?;
        }

        self.frames_rendered += 1;
        log::trace!(
            "{}: frame {} (next write {:?})",
            Self::NAME,
            self.frames_rendered,
            self.active
        );
        Ok(())
    }

    /// Reset both history targets to black, e.g. after a seek.
    pub fn clear_history(&mut self, backend: &mut B) -> Result<(), TrailsError> {
        if let Some(targets) = &self.targets {
            for target in targets {
                backend.clear_target(target)?;
            }
        }
        Ok(())
    }

    /// Release both history targets and the program. Idempotent.
    pub fn dispose(&mut self, backend: &mut B) {
        self.release_targets(backend);
        if let Some(program) = self.program.take() {
            backend.release_program(program);
        }
        if !self.disposed {
            log::debug!("{}: disposed after {} frames", Self::NAME, self.frames_rendered);
        }
        self.disposed = true;
    }

    pub fn trail_strength(&self) -> f32 {
        self.settings.trail_strength
    }

    /// Takes effect from the next `render`.
    pub fn set_trail_strength(&mut self, value: f32) {
        self.settings.trail_strength = value;
    }

    pub fn render_to_screen(&self) -> bool {
        self.settings.render_to_screen
    }

    pub fn set_render_to_screen(&mut self, value: bool) {
        self.settings.render_to_screen = value;
    }

    pub fn settings(&self) -> &TrailsSettings {
        &self.settings
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.disposed {
            Lifecycle::Disposed
        } else if self.targets.is_some() {
            Lifecycle::Initialized
        } else {
            Lifecycle::Uninitialized
        }
    }

    pub fn active_target(&self) -> ActiveTarget {
        self.active
    }

    /// `true` when A is the next write target.
    pub fn active_flag(&self) -> bool {
        self.active.as_flag()
    }

    /// Target the next `render` writes into.
    pub fn write_target(&self) -> Option<&B::Target> {
        self.targets.as_ref().map(|t| &t[self.active.index()])
    }

    /// Target holding the last composite.
    pub fn history_target(&self) -> Option<&B::Target> {
        self.targets.as_ref().map(|t| &t[self.active.other().index()])
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn format(&self) -> ColorFormat {
        self.format
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    fn allocate_targets(
        backend: &mut B,
        size: Viewport,
        format: ColorFormat,
    ) -> Result<[B::Target; 2], TrailsError> {
        let a = backend.create_target("Trails Target A", size, format)?;
        let b = match backend.create_target("Trails Target B", size, format) {
            Ok(b) => b,
            Err(e) => {
                backend.release_target(a);
                return Err(e);
            }
        };
        Ok([a, b])
    }

    fn release_targets(&mut self, backend: &mut B) {
        if let Some([a, b]) = self.targets.take() {
            backend.release_target(a);
            backend.release_target(b);
        }
    }
}

impl<B: RenderBackend> Drop for TrailsPass<B> {
    fn drop(&mut self) {
        if self.targets.is_some() {
            log::warn!(
                "{} dropped without dispose(); history targets leak until the backend is dropped",
                Self::NAME
            );
        }
    }
}

impl<B: RenderBackend> Pass<B> for TrailsPass<B> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn initialize(
        &mut self,
        backend: &mut B,
        viewport: Viewport,
        format: ColorFormat,
    ) -> Result<(), TrailsError> {
        TrailsPass::initialize(self, backend, viewport, format)
    }

    fn set_size(&mut self, backend: &mut B, width: u32, height: u32) -> Result<(), TrailsError> {
        self.resize(backend, width, height)
    }

    fn render(
        &mut self,
        backend: &mut B,
        input: Option<&B::Target>,
        output: Option<&B::Target>,
    ) -> Result<(), TrailsError> {
        TrailsPass::render(self, backend, input, output)
    }

    fn dispose(&mut self, backend: &mut B) {
        TrailsPass::dispose(self, backend)
    }

    fn render_to_screen(&self) -> bool {
        self.settings.render_to_screen
    }
}
