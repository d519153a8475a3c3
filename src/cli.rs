use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

use crate::backend::{CpuBackend, RenderBackend};
use crate::frame::ColorFormat;
use crate::gpu::WgpuBackend;
use crate::offline::render_frames;
use crate::render_job::{BackendKind, RenderJobSpec, RenderMetadata};
use crate::trails::TrailsPass;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a trails sequence over a moving test pattern to PNG frames
    Render {
        /// JSON job file; flags below override its fields
        #[arg(long)]
        job: Option<PathBuf>,

        /// Output directory for frames
        #[arg(long)]
        out: Option<PathBuf>,

        /// Number of frames
        #[arg(long)]
        frames: Option<usize>,

        /// Frames per second
        #[arg(long)]
        fps: Option<f32>,

        /// Output width
        #[arg(long)]
        width: Option<u32>,

        /// Output height
        #[arg(long)]
        height: Option<u32>,

        /// History decay per frame
        #[arg(long)]
        strength: Option<f32>,

        /// Working format: rgba8, rgba16f or rgba32f
        #[arg(long)]
        format: Option<ColorFormat>,

        /// cpu or gpu
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Present to the screen surface instead of the output target
        #[arg(long)]
        to_screen: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            job,
            out,
            frames,
            fps,
            width,
            height,
            strength,
            format,
            backend,
            to_screen,
        } => {
            let mut spec = match job {
                Some(path) => RenderJobSpec::from_file(&path).map_err(anyhow::Error::msg)?,
                None => {
                    let output_dir = out.clone().unwrap_or_else(|| PathBuf::from("trails_out"));
                    RenderJobSpec::new(output_dir)
                }
            };
            if let Some(out) = out {
                spec.output_dir = out;
            }
            if let Some(frames) = frames {
                spec.frames = frames;
            }
            if let Some(fps) = fps {
                spec.fps = fps;
            }
            if let Some(width) = width {
                spec.width = width;
            }
            if let Some(height) = height {
                spec.height = height;
            }
            if let Some(strength) = strength {
                spec.trails.trail_strength = strength;
            }
            if let Some(format) = format {
                spec.format = format;
            }
            if let Some(backend) = backend {
                spec.backend = backend;
            }
            if to_screen {
                spec.trails.render_to_screen = true;
            }
            spec.validate().map_err(anyhow::Error::msg)?;

            match spec.backend {
                BackendKind::Cpu => render_offline(CpuBackend::new(), &spec)?,
                BackendKind::Gpu => {
                    let backend = pollster::block_on(WgpuBackend::headless())
                        .context("Failed to set up GPU backend")?;
                    render_offline(backend, &spec)?
                }
            }
        }
    }
    Ok(())
}

fn render_offline<B: RenderBackend>(mut backend: B, job: &RenderJobSpec) -> Result<()> {
    let started_at = Utc::now();
    let start = Instant::now();

    let mut pass = TrailsPass::new(&mut backend, job.trails.clone())
        .context("Failed to create trails pass")?;

    println!(
        "Rendering {} frames to {:?} on {}...",
        job.frames,
        job.output_dir,
        backend.describe()
    );

    let summary = render_frames(&mut backend, &mut pass, job, |progress| {
        if progress.current_frame % 10 == 0 || progress.current_frame == progress.total_frames {
            println!(
                "Rendered frame {}/{} ({:.0}%)",
                progress.current_frame,
                progress.total_frames,
                progress.percentage()
            );
        }
    })?;

    let stats = backend.stats();
    let mut warnings = Vec::new();
    if stats.live_targets != 0 || stats.live_programs != 0 {
        let msg = format!(
            "{} targets and {} programs still live after render",
            stats.live_targets, stats.live_programs
        );
        log::warn!("{}", msg);
        warnings.push(msg);
    }

    let duration = start.elapsed().as_secs_f64();
    let metadata = RenderMetadata {
        job: job.clone(),
        started_at,
        completed_at: Utc::now(),
        render_duration_secs: duration,
        frame_count: summary.frame_count,
        average_render_fps: if duration > 0.0 {
            summary.frame_count as f64 / duration
        } else {
            0.0
        },
        job_hash: job.content_hash().map_err(anyhow::Error::msg)?,
        trails_version: env!("CARGO_PKG_VERSION").to_string(),
        backend: backend.describe(),
        warnings,
    };
    metadata.save(&job.output_dir.join("metadata.json"))?;

    println!(
        "Done. {} frames in {:.2}s ({} draw calls)",
        summary.frame_count, summary.elapsed_secs, stats.draw_calls
    );
    Ok(())
}
