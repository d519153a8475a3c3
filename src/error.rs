//! Error types for the trails pass and its rendering backends.

use thiserror::Error;

/// Errors raised by [`TrailsPass`](crate::trails::TrailsPass) and the backends it drives.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrailsError {
    /// `render` was called without a current frame.
    #[error("TrailsPass: input frame is required")]
    InputMissing,

    /// `render` was called before `initialize`, or after `dispose`.
    #[error("TrailsPass: history targets are not initialized")]
    NotInitialized,

    /// `initialize` was given a viewport with a zero dimension.
    #[error("Invalid viewport {width}x{height}: both dimensions must be positive")]
    InvalidViewport { width: u32, height: u32 },

    /// The pass was used after `dispose`.
    #[error("TrailsPass has been disposed")]
    Disposed,

    /// A target handle was not allocated by this backend (or was already released).
    #[error("Unknown render target #{0}")]
    UnknownTarget(u64),

    /// Adapter, device, readback, or surface failure in a backend.
    #[error("Backend error: {0}")]
    Backend(String),
}
