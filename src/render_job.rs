//! Render job specification and metadata.
//!
//! This module defines the structures for offline trails renders: the job
//! spec (loaded from JSON and/or CLI flags), the metadata record written next
//! to the frames, and phased errors for reporting failures.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::frame::ColorFormat;
use crate::pattern::PatternConfig;
use crate::trails::TrailsSettings;

/// Default frame count.
fn default_frames() -> usize {
    120
}

/// Default FPS for rendering.
fn default_fps() -> f32 {
    60.0
}

/// Default output width.
fn default_width() -> u32 {
    800
}

/// Default output height.
fn default_height() -> u32 {
    600
}

/// Which rendering backend runs the pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Cpu,
    #[default]
    Gpu,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" | "software" => Ok(BackendKind::Cpu),
            "gpu" | "wgpu" => Ok(BackendKind::Gpu),
            other => Err(format!("Unknown backend: {}", other)),
        }
    }
}

/// Specification for a single offline render.
/// Contains everything needed to deterministically render a frame sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJobSpec {
    /// Output directory for frames and metadata.
    pub output_dir: PathBuf,

    /// Number of frames to render.
    #[serde(default = "default_frames")]
    pub frames: usize,

    /// Frames per second (drives pattern motion).
    #[serde(default = "default_fps")]
    pub fps: f32,

    /// Output width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Output height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,

    /// Working format of the history targets.
    #[serde(default)]
    pub format: ColorFormat,

    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub trails: TrailsSettings,

    #[serde(default)]
    pub pattern: PatternConfig,
}

impl RenderJobSpec {
    /// Create a new render job spec with required fields only.
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            frames: default_frames(),
            fps: default_fps(),
            width: default_width(),
            height: default_height(),
            format: ColorFormat::default(),
            backend: BackendKind::default(),
            trails: TrailsSettings::default(),
            pattern: PatternConfig::default(),
        }
    }

    /// Load a job spec from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read job file {:?}: {}", path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse job file {:?}: {}", path, e))
    }

    /// Validate the job specification.
    pub fn validate(&self) -> Result<(), String> {
        if self.frames == 0 {
            return Err("Frame count must be positive".to_string());
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err("FPS must be a positive number".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return Err("Width and height must be positive".to_string());
        }
        if !self.trails.trail_strength.is_finite() {
            return Err("Trail strength must be finite".to_string());
        }
        if !(0.0..=1.0).contains(&self.trails.trail_strength) {
            log::warn!(
                "Trail strength {} is outside [0, 1]; trails will {}",
                self.trails.trail_strength,
                if self.trails.trail_strength > 1.0 { "brighten" } else { "vanish" }
            );
        }
        Ok(())
    }

    /// SHA-256 of the canonical JSON form of this job.
    pub fn content_hash(&self) -> Result<String, String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| format!("Failed to serialize job: {}", e))?;
        Ok(format!("{:x}", Sha256::digest(&json)))
    }
}

/// Metadata for a completed render.
/// Written as metadata.json alongside rendered frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderMetadata {
    /// The job specification used.
    pub job: RenderJobSpec,

    /// Timestamp when render started (ISO 8601).
    pub started_at: DateTime<Utc>,

    /// Timestamp when render completed (ISO 8601).
    pub completed_at: DateTime<Utc>,

    /// Total render duration in seconds.
    pub render_duration_secs: f64,

    /// Total frames rendered.
    pub frame_count: usize,

    /// Average rendering FPS (frames / render_duration).
    pub average_render_fps: f64,

    /// SHA-256 hash of the job spec.
    pub job_hash: String,

    /// Crate version.
    pub trails_version: String,

    /// Backend / adapter description.
    pub backend: String,

    /// Any warnings or issues during render.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl RenderMetadata {
    /// Save metadata to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), RenderError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            RenderError::with_source(RenderPhase::MetadataSave, "Failed to serialize metadata", e)
        })?;
        std::fs::write(path, json).map_err(|e| {
            RenderError::with_source(
                RenderPhase::MetadataSave,
                format!("Failed to write metadata to {:?}", path),
                e,
            )
        })
    }
}

/// Render phase for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Initialization,
    GpuSetup,
    FrameRender,
    FrameSave,
    MetadataSave,
}

impl std::fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderPhase::Initialization => write!(f, "Initialization"),
            RenderPhase::GpuSetup => write!(f, "GPU Setup"),
            RenderPhase::FrameRender => write!(f, "Frame Render"),
            RenderPhase::FrameSave => write!(f, "Frame Save"),
            RenderPhase::MetadataSave => write!(f, "Metadata Save"),
        }
    }
}

/// Structured error for render failures.
#[derive(Debug, thiserror::Error)]
#[error("[{phase}] {message}")]
pub struct RenderError {
    pub phase: RenderPhase,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RenderError {
    /// Create a new render error.
    pub fn new(phase: RenderPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            source: None,
        }
    }

    /// Create a render error with a source error.
    pub fn with_source(
        phase: RenderPhase,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            phase,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Progress information for render callbacks.
#[derive(Debug, Clone)]
pub struct RenderProgress {
    /// Current frame number (1-indexed).
    pub current_frame: usize,
    /// Total frames to render.
    pub total_frames: usize,
    /// Elapsed time in seconds.
    pub elapsed_secs: f64,
    /// Estimated time remaining in seconds.
    pub eta_secs: Option<f64>,
}

impl RenderProgress {
    /// Get progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.total_frames == 0 {
            100.0
        } else {
            (self.current_frame as f64 / self.total_frames as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trails::DEFAULT_TRAIL_STRENGTH;

    #[test]
    fn test_render_job_spec_defaults() {
        let spec = RenderJobSpec::new(PathBuf::from("output"));

        assert_eq!(spec.frames, 120);
        assert_eq!(spec.fps, 60.0);
        assert_eq!(spec.width, 800);
        assert_eq!(spec.height, 600);
        assert_eq!(spec.format, ColorFormat::Rgba16Float);
        assert_eq!(spec.backend, BackendKind::Gpu);
        assert_eq!(spec.trails.trail_strength, DEFAULT_TRAIL_STRENGTH);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_render_job_spec_from_minimal_json() {
        let spec: RenderJobSpec = serde_json::from_str(
            r#"{
                "outputDir": "/tmp/trails",
                "width": 320,
                "format": "rgba8",
                "backend": "cpu",
                "trails": { "trailStrength": 0.75 }
            }"#,
        )
        .unwrap();

        assert_eq!(spec.output_dir, PathBuf::from("/tmp/trails"));
        assert_eq!(spec.width, 320);
        assert_eq!(spec.height, 600);
        assert_eq!(spec.format, ColorFormat::Rgba8Unorm);
        assert_eq!(spec.backend, BackendKind::Cpu);
        assert_eq!(spec.trails.trail_strength, 0.75);
        assert!(!spec.trails.render_to_screen);
        assert_eq!(spec.pattern, PatternConfig::default());
    }

    #[test]
    fn test_render_job_spec_validation() {
        let mut spec = RenderJobSpec::new(PathBuf::from("output"));
        spec.width = 0;
        assert!(spec.validate().is_err());

        let mut spec = RenderJobSpec::new(PathBuf::from("output"));
        spec.frames = 0;
        assert!(spec.validate().is_err());

        for fps in [0.0, -30.0, f32::NAN, f32::INFINITY] {
            let mut spec = RenderJobSpec::new(PathBuf::from("output"));
            spec.fps = fps;
            assert!(spec.validate().is_err(), "fps {} accepted", fps);
        }

        // Out-of-range strength is allowed, non-finite is not.
        let mut spec = RenderJobSpec::new(PathBuf::from("output"));
        spec.trails.trail_strength = 1.2;
        assert!(spec.validate().is_ok());
        spec.trails.trail_strength = f32::NAN;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_content_hash_tracks_changes() {
        let a = RenderJobSpec::new(PathBuf::from("output"));
        let mut b = a.clone();
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
        b.trails.trail_strength = 0.5;
        assert_ne!(a.content_hash().unwrap(), b.content_hash().unwrap());
        assert_eq!(a.content_hash().unwrap().len(), 64);
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("CPU".parse::<BackendKind>(), Ok(BackendKind::Cpu));
        assert_eq!("wgpu".parse::<BackendKind>(), Ok(BackendKind::Gpu));
        assert!("metal".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_metadata_save_reports_phase() {
        let job = RenderJobSpec::new(PathBuf::from("output"));
        let now = Utc::now();
        let metadata = RenderMetadata {
            job_hash: job.content_hash().unwrap(),
            job,
            started_at: now,
            completed_at: now,
            render_duration_secs: 0.0,
            frame_count: 0,
            average_render_fps: 0.0,
            trails_version: "0.0.0".to_string(),
            backend: "cpu".to_string(),
            warnings: Vec::new(),
        };

        let missing_dir = std::env::temp_dir()
            .join(format!("trails_missing_{}", std::process::id()))
            .join("metadata.json");
        let err = metadata.save(&missing_dir).unwrap_err();
        assert_eq!(err.phase, RenderPhase::MetadataSave);
        assert!(std::error::Error::source(&err).is_some());

        let path = std::env::temp_dir().join(format!("trails_meta_{}.json", std::process::id()));
        metadata.save(&path).unwrap();
        let loaded: RenderMetadata =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.job, metadata.job);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_render_error_display() {
        let err = RenderError::new(RenderPhase::FrameSave, "disk full");
        assert_eq!(err.to_string(), "[Frame Save] disk full");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_render_progress_percentage() {
        let progress = RenderProgress {
            current_frame: 50,
            total_frames: 100,
            elapsed_secs: 5.0,
            eta_secs: Some(5.0),
        };

        assert_eq!(progress.percentage(), 50.0);
    }
}
