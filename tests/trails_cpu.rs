//! Trails pass behaviour against the software backend.

use glam::Vec4;
use trails::backend::cpu::CpuTarget;
use trails::{
    ColorFormat, CpuBackend, FrameImage, Lifecycle, Pass, RenderBackend, TrailsError, TrailsPass,
    TrailsSettings, Viewport,
};

const SIZE: Viewport = Viewport { width: 16, height: 16 };

fn solid_target(
    backend: &mut CpuBackend,
    size: Viewport,
    format: ColorFormat,
    color: Vec4,
) -> CpuTarget {
    let target = backend.create_target("input", size, format).unwrap();
    backend
        .write_target(&target, &FrameImage::solid(size.width, size.height, color))
        .unwrap();
    target
}

fn init_pass(
    backend: &mut CpuBackend,
    settings: TrailsSettings,
    format: ColorFormat,
) -> TrailsPass<CpuBackend> {
    let mut pass = TrailsPass::new(backend, settings).unwrap();
    pass.initialize(backend, SIZE, format).unwrap();
    pass
}

fn assert_close(actual: Vec4, expected: Vec4, tolerance: f32) {
    assert!(
        (actual - expected).abs().max_element() <= tolerance,
        "expected {:?}, got {:?}",
        expected,
        actual
    );
}

#[test]
fn test_constant_input_is_fixed_point() {
    let color = Vec4::new(0.25, 0.5, 0.75, 1.0);
    for strength in [0.0, 0.5, 0.9, 1.0] {
        let mut backend = CpuBackend::new();
        let mut pass = init_pass(
            &mut backend,
            TrailsSettings::default().with_trail_strength(strength),
            ColorFormat::Rgba32Float,
        );
        let input = solid_target(&mut backend, SIZE, ColorFormat::Rgba32Float, color);
        let output = backend.create_target("out", SIZE, ColorFormat::Rgba32Float).unwrap();

        for _ in 0..5 {
            pass.render(&mut backend, Some(&input), Some(&output)).unwrap();
            let frame = backend.read_target(&output).unwrap();
            assert!(frame.pixels().iter().all(|p| *p == color), "strength {}", strength);
        }
        pass.dispose(&mut backend);
    }
}

#[test]
fn test_flag_parity_follows_frame_count() {
    let mut backend = CpuBackend::new();
    let mut pass = init_pass(&mut backend, TrailsSettings::default(), ColorFormat::Rgba8Unorm);
    let input = solid_target(&mut backend, SIZE, ColorFormat::Rgba8Unorm, Vec4::ONE);
    let output = backend.create_target("out", SIZE, ColorFormat::Rgba8Unorm).unwrap();

    let initial = pass.active_flag();
    assert!(!initial);
    for k in 1..=7 {
        pass.render(&mut backend, Some(&input), Some(&output)).unwrap();
        assert_eq!(pass.active_flag(), initial ^ (k % 2 == 1), "after {} frames", k);
    }
    assert_eq!(pass.frames_rendered(), 7);
    pass.dispose(&mut backend);
}

#[test]
fn test_reinitialize_does_not_leak_targets() {
    let mut backend = CpuBackend::new();
    let mut pass = init_pass(&mut backend, TrailsSettings::default(), ColorFormat::Rgba16Float);
    assert_eq!(backend.stats().live_targets, 2);

    pass.initialize(&mut backend, SIZE, ColorFormat::Rgba16Float).unwrap();
    pass.initialize(&mut backend, Viewport::new(32, 8), ColorFormat::Rgba8Unorm).unwrap();
    assert_eq!(backend.stats().live_targets, 2);
    assert_eq!(backend.stats().live_programs, 1);
    assert_eq!(pass.format(), ColorFormat::Rgba8Unorm);
    assert_eq!(backend.target_size(pass.write_target().unwrap()), Viewport::new(32, 8));

    pass.dispose(&mut backend);
    assert_eq!(backend.stats().live_targets, 0);
}

#[test]
fn test_render_requires_initialization() {
    let mut backend = CpuBackend::new();
    let input = solid_target(&mut backend, SIZE, ColorFormat::Rgba8Unorm, Vec4::ONE);
    let mut pass = TrailsPass::new(&mut backend, TrailsSettings::default()).unwrap();

    assert_eq!(
        pass.render(&mut backend, Some(&input), None),
        Err(TrailsError::NotInitialized)
    );
    assert_eq!(backend.stats().draw_calls, 0);

    pass.initialize(&mut backend, SIZE, ColorFormat::Rgba8Unorm).unwrap();
    pass.dispose(&mut backend);
    assert_eq!(
        pass.render(&mut backend, Some(&input), None),
        Err(TrailsError::NotInitialized)
    );
    assert_eq!(backend.stats().draw_calls, 0);
}

#[test]
fn test_missing_input_is_rejected_without_drawing() {
    let mut backend = CpuBackend::new();
    let mut pass = init_pass(&mut backend, TrailsSettings::default(), ColorFormat::Rgba8Unorm);
    let flag = pass.active_flag();

    assert_eq!(pass.render(&mut backend, None, None), Err(TrailsError::InputMissing));
    assert_eq!(pass.active_flag(), flag);
    assert_eq!(pass.frames_rendered(), 0);
    assert_eq!(backend.stats().draw_calls, 0);
    pass.dispose(&mut backend);
}

#[test]
fn test_initialize_rejects_empty_viewport() {
    let mut backend = CpuBackend::new();
    let mut pass = TrailsPass::new(&mut backend, TrailsSettings::default()).unwrap();
    assert_eq!(
        pass.initialize(&mut backend, Viewport::new(0, 10), ColorFormat::Rgba8Unorm),
        Err(TrailsError::InvalidViewport { width: 0, height: 10 })
    );
    assert_eq!(pass.lifecycle(), Lifecycle::Uninitialized);
    assert_eq!(backend.stats().live_targets, 0);
    pass.dispose(&mut backend);
}

#[test]
fn test_resize_then_render_matches_new_size() {
    let mut backend = CpuBackend::new();
    let mut pass = init_pass(&mut backend, TrailsSettings::default(), ColorFormat::Rgba32Float);
    let new_size = Viewport::new(24, 12);
    Pass::set_size(&mut pass, &mut backend, new_size.width, new_size.height).unwrap();
    assert_eq!(pass.viewport(), new_size);
    assert_eq!(backend.stats().live_targets, 2);

    let color = Vec4::new(0.0, 1.0, 0.0, 1.0);
    let input = solid_target(&mut backend, new_size, ColorFormat::Rgba32Float, color);
    let output = backend.create_target("out", new_size, ColorFormat::Rgba32Float).unwrap();
    pass.render(&mut backend, Some(&input), Some(&output)).unwrap();

    let frame = backend.read_target(&output).unwrap();
    assert_eq!(frame.viewport(), new_size);
    assert_eq!(frame.pixel(23, 11), color);
    assert_eq!(backend.read_target(pass.history_target().unwrap()).unwrap().viewport(), new_size);
    pass.dispose(&mut backend);
}

#[test]
fn test_red_frame_fades_after_black_frame() {
    let size = Viewport::new(256, 256);
    let format = ColorFormat::Rgba16Float;
    let mut backend = CpuBackend::new();
    let mut pass = TrailsPass::new(&mut backend, TrailsSettings::default()).unwrap();
    pass.initialize(&mut backend, size, format).unwrap();

    let red = solid_target(&mut backend, size, format, Vec4::new(1.0, 0.0, 0.0, 1.0));
    let black = solid_target(&mut backend, size, format, Vec4::ZERO);
    let output = backend.create_target("out", size, format).unwrap();

    pass.render(&mut backend, Some(&red), Some(&output)).unwrap();
    assert_close(
        backend.read_target(&output).unwrap().pixel(128, 128),
        Vec4::new(1.0, 0.0, 0.0, 1.0),
        0.0,
    );

    pass.render(&mut backend, Some(&black), Some(&output)).unwrap();
    let frame = backend.read_target(&output).unwrap();
    for (x, y) in [(0, 0), (128, 128), (255, 255)] {
        assert_close(frame.pixel(x, y), Vec4::new(0.9, 0.0, 0.0, 0.9), 1e-3);
    }

    pass.render(&mut backend, Some(&black), Some(&output)).unwrap();
    let frame = backend.read_target(&output).unwrap();
    assert_close(frame.pixel(10, 200), Vec4::new(0.81, 0.0, 0.0, 0.81), 2e-3);
    pass.dispose(&mut backend);
}

#[test]
fn test_strength_above_one_brightens() {
    let mut backend = CpuBackend::new();
    let mut pass = init_pass(
        &mut backend,
        TrailsSettings::default().with_trail_strength(1.5),
        ColorFormat::Rgba32Float,
    );
    let grey = solid_target(&mut backend, SIZE, ColorFormat::Rgba32Float, Vec4::splat(0.4));
    let output = backend.create_target("out", SIZE, ColorFormat::Rgba32Float).unwrap();

    pass.render(&mut backend, Some(&grey), Some(&output)).unwrap();
    pass.render(&mut backend, Some(&grey), Some(&output)).unwrap();
    assert_close(backend.read_target(&output).unwrap().pixel(1, 1), Vec4::splat(0.6), 1e-6);
    pass.dispose(&mut backend);
}

#[test]
fn test_negative_strength_drops_history() {
    let mut backend = CpuBackend::new();
    let mut pass = init_pass(
        &mut backend,
        TrailsSettings::default().with_trail_strength(-1.0),
        ColorFormat::Rgba32Float,
    );
    let white = solid_target(&mut backend, SIZE, ColorFormat::Rgba32Float, Vec4::ONE);
    let black = solid_target(&mut backend, SIZE, ColorFormat::Rgba32Float, Vec4::ZERO);
    let output = backend.create_target("out", SIZE, ColorFormat::Rgba32Float).unwrap();

    pass.render(&mut backend, Some(&white), Some(&output)).unwrap();
    pass.render(&mut backend, Some(&black), Some(&output)).unwrap();
    assert_eq!(backend.read_target(&output).unwrap().pixel(4, 4), Vec4::ZERO);
    pass.dispose(&mut backend);
}

#[test]
fn test_render_to_screen_presents_composite() {
    let mut backend = CpuBackend::with_screen(SIZE, ColorFormat::Rgba32Float);
    let mut pass = init_pass(
        &mut backend,
        TrailsSettings::default()
            .with_trail_strength(0.5)
            .with_render_to_screen(true),
        ColorFormat::Rgba32Float,
    );
    let white = solid_target(&mut backend, SIZE, ColorFormat::Rgba32Float, Vec4::ONE);
    let black = solid_target(&mut backend, SIZE, ColorFormat::Rgba32Float, Vec4::ZERO);
    let output = backend.create_target("out", SIZE, ColorFormat::Rgba32Float).unwrap();

    pass.render(&mut backend, Some(&white), Some(&output)).unwrap();
    pass.render(&mut backend, Some(&black), Some(&output)).unwrap();

    assert_eq!(backend.read_screen().unwrap().pixel(0, 0), Vec4::splat(0.5));
    // The output target is left untouched in screen mode.
    assert_eq!(backend.read_target(&output).unwrap().pixel(0, 0), Vec4::ZERO);
    pass.dispose(&mut backend);
}

#[test]
fn test_missing_output_falls_back_to_screen() {
    let mut backend = CpuBackend::with_screen(SIZE, ColorFormat::Rgba32Float);
    let mut pass = init_pass(&mut backend, TrailsSettings::default(), ColorFormat::Rgba32Float);
    let color = Vec4::new(0.1, 0.2, 0.3, 1.0);
    let input = solid_target(&mut backend, SIZE, ColorFormat::Rgba32Float, color);

    pass.render(&mut backend, Some(&input), None).unwrap();
    assert_eq!(backend.read_screen().unwrap().pixel(7, 7), color);
    pass.dispose(&mut backend);
}

#[test]
fn test_dispose_releases_everything_and_is_idempotent() {
    let mut backend = CpuBackend::new();
    let mut pass = init_pass(&mut backend, TrailsSettings::default(), ColorFormat::Rgba8Unorm);
    assert_eq!(backend.stats().live_programs, 1);

    pass.dispose(&mut backend);
    pass.dispose(&mut backend);
    let stats = backend.stats();
    assert_eq!(stats.live_targets, 0);
    assert_eq!(stats.live_programs, 0);
    assert_eq!(pass.lifecycle(), Lifecycle::Disposed);
    assert!(pass.write_target().is_none());

    // Resizing a disposed pass does nothing.
    pass.resize(&mut backend, 64, 64).unwrap();
    assert_eq!(backend.stats().live_targets, 0);
}

#[test]
fn test_trail_follows_moving_dot() {
    let mut backend = CpuBackend::new();
    let mut pass = init_pass(&mut backend, TrailsSettings::default(), ColorFormat::Rgba32Float);
    let output = backend.create_target("out", SIZE, ColorFormat::Rgba32Float).unwrap();
    let input = backend.create_target("input", SIZE, ColorFormat::Rgba32Float).unwrap();
    let white = Vec4::ONE;

    // Single lit texel walking along the top row.
    for x in 0..4 {
        let mut frame = FrameImage::new(SIZE.width, SIZE.height);
        frame.set_pixel(x, 0, white);
        backend.write_target(&input, &frame).unwrap();
        pass.render(&mut backend, Some(&input), Some(&output)).unwrap();
    }

    let frame = backend.read_target(&output).unwrap();
    assert_eq!(frame.pixel(3, 0), white);
    assert_close(frame.pixel(2, 0), white * 0.9, 1e-6);
    assert_close(frame.pixel(1, 0), white * 0.81, 1e-6);
    assert_close(frame.pixel(0, 0), white * 0.729, 1e-6);
    assert_eq!(frame.pixel(0, 1), Vec4::ZERO);
    pass.dispose(&mut backend);
}
