pub mod backend;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod offline;
pub mod pass;
pub mod pattern;
pub mod render_job;
pub mod trails;

pub mod cli;

pub use backend::{CpuBackend, Destination, RenderBackend, ResourceStats, TrailsUniforms};
pub use error::TrailsError;
pub use frame::{ColorFormat, FrameImage, Viewport};
pub use gpu::WgpuBackend;
pub use pass::Pass;
pub use trails::{ActiveTarget, Lifecycle, TrailsPass, TrailsSettings, DEFAULT_TRAIL_STRENGTH};
