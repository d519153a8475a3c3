//! Offline render loop: drives one pass over the synthetic pattern and writes
//! each presented frame as a PNG.

use std::path::PathBuf;
use std::time::Instant;

use crate::backend::RenderBackend;
use crate::error::TrailsError;
use crate::frame::{FrameImage, Viewport};
use crate::pass::Pass;
use crate::pattern::OrbitPattern;
use crate::render_job::{RenderError, RenderJobSpec, RenderPhase, RenderProgress};

/// Result of a completed offline render.
#[derive(Debug, Clone)]
pub struct RenderSummary {
    pub frame_count: usize,
    pub elapsed_secs: f64,
    pub frame_paths: Vec<PathBuf>,
}

/// File name for frame `index` (0-based).
pub fn frame_file_name(index: usize) -> String {
    format!("frame_{:05}.png", index)
}

/// Render `job.frames` frames through `pass`.
///
/// The pass is initialized at the job's size and disposed before returning,
/// on success and on failure.
pub fn render_frames<B, P>(
    backend: &mut B,
    pass: &mut P,
    job: &RenderJobSpec,
    mut on_progress: impl FnMut(&RenderProgress),
) -> Result<RenderSummary, RenderError>
where
    B: RenderBackend,
    P: Pass<B>,
{
    let result = run_job(backend, pass, job, &mut on_progress);
    pass.dispose(backend);
    result
}

fn run_job<B, P>(
    backend: &mut B,
    pass: &mut P,
    job: &RenderJobSpec,
    on_progress: &mut impl FnMut(&RenderProgress),
) -> Result<RenderSummary, RenderError>
where
    B: RenderBackend,
    P: Pass<B>,
{
    job.validate()
        .map_err(|e| RenderError::new(RenderPhase::Initialization, e))?;
    std::fs::create_dir_all(&job.output_dir).map_err(|e| {
        RenderError::with_source(
            RenderPhase::Initialization,
            format!("Failed to create output directory {:?}", job.output_dir),
            e,
        )
    })?;

    let size = Viewport::new(job.width, job.height);
    let setup_err = |message: &'static str| {
        move |e: TrailsError| RenderError::with_source(RenderPhase::GpuSetup, message, e)
    };
    backend
        .configure_screen(size, job.format)
        .map_err(setup_err("Failed to configure screen"))?;
    pass.initialize(backend, size, job.format)
        .map_err(setup_err("Failed to initialize pass"))?;

    let input = backend
        .create_target("Pattern Input", size, job.format)
        .map_err(setup_err("Failed to allocate input target"))?;
    let output = match backend.create_target("Pass Output", size, job.format) {
        Ok(output) => output,
        Err(e) => {
            backend.release_target(input);
            return Err(setup_err("Failed to allocate output target")(e));
        }
    };

    let result = render_loop(backend, pass, job, &input, &output, on_progress);

    backend.release_target(input);
    backend.release_target(output);
    result
}

fn render_loop<B, P>(
    backend: &mut B,
    pass: &mut P,
    job: &RenderJobSpec,
    input: &B::Target,
    output: &B::Target,
    on_progress: &mut impl FnMut(&RenderProgress),
) -> Result<RenderSummary, RenderError>
where
    B: RenderBackend,
    P: Pass<B>,
{
    let size = Viewport::new(job.width, job.height);
    let dt = 1.0 / job.fps;
    let mut pattern = OrbitPattern::new(job.pattern.clone());
    let mut frame_paths = Vec::with_capacity(job.frames);
    let start = Instant::now();

    log::info!(
        "Rendering {} frames at {} through {} to {:?}",
        job.frames,
        size,
        pass.name(),
        job.output_dir
    );

    for i in 0..job.frames {
        pattern.update(dt);
        let render_err = |e: TrailsError| {
            RenderError::with_source(RenderPhase::FrameRender, format!("Frame {}", i), e)
        };

        backend.write_target(input, &pattern.draw(size)).map_err(render_err)?;
        pass.render(backend, Some(input), Some(output)).map_err(render_err)?;

        let frame = if pass.render_to_screen() {
            backend.read_screen()
        } else {
            backend.read_target(output)
        }
        .map_err(render_err)?;

        let frame_path = job.output_dir.join(frame_file_name(i));
        save_png(&frame, &frame_path)?;
        frame_paths.push(frame_path);

        let elapsed_secs = start.elapsed().as_secs_f64();
        let done = i + 1;
        on_progress(&RenderProgress {
            current_frame: done,
            total_frames: job.frames,
            elapsed_secs,
            eta_secs: Some(elapsed_secs / done as f64 * (job.frames - done) as f64),
        });
    }

    Ok(RenderSummary {
        frame_count: frame_paths.len(),
        elapsed_secs: start.elapsed().as_secs_f64(),
        frame_paths,
    })
}

fn save_png(frame: &FrameImage, path: &std::path::Path) -> Result<(), RenderError> {
    image::save_buffer(
        path,
        &frame.to_rgba8(),
        frame.width(),
        frame.height(),
        image::ColorType::Rgba8,
    )
    .map_err(|e| {
        RenderError::with_source(RenderPhase::FrameSave, format!("Failed to write {:?}", path), e)
    })
}
