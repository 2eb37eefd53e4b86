//! Headless rendering tests: the render graph executed against offscreen targets
//! and stand-in eye images.
//!
//! Every test skips when the machine has no GPU adapter.

use volxr::*;

const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

fn headless_renderer() -> Option<Renderer> {
    match Renderer::new_headless(&RendererOptions::default()) {
        Ok(renderer) => Some(renderer),
        Err(e) => {
            eprintln!("Skipping test: no GPU available ({e})");
            None
        }
    }
}

fn eye_images(renderer: &Renderer, size: u32) -> [TextureEyeSource; 2] {
    [
        TextureEyeSource::new(renderer.device(), size, size).unwrap(),
        TextureEyeSource::new(renderer.device(), size, size).unwrap(),
    ]
}

fn render(renderer: &mut Renderer, images: &mut [TextureEyeSource; 2]) -> FrameStats {
    let [left, right] = images;
    renderer
        .render_frame(&[EyeView::default(); 2], [left, right])
        .unwrap()
}

fn pixel(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

fn unlit_material(renderer: &mut Renderer, color: [f32; 4]) -> MaterialHandle {
    let unlit = renderer.builtins().unlit;
    renderer
        .registry_mut()
        .create_material(unlit, MaterialDescriptor::color(color))
        .unwrap()
}

// ============================================================================
// Clearing and enabling draw calls
// ============================================================================

#[test]
fn test_disabled_draw_leaves_clear_color() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let mut images = eye_images(&renderer, 4);
    let target = renderer.create_target(4, 4).unwrap();
    let pass = renderer
        .add_pass(
            RenderTargetRef::Offscreen(target),
            ClearPolicy::color_and_depth(BLUE),
        )
        .unwrap();
    let red = unlit_material(&mut renderer, RED);
    let quad = renderer.builtins().quad;
    let draw = renderer
        .add_draw_call(
            pass,
            quad,
            red,
            Some(Transform::from_scale(Vec3::splat(0.5))),
            PipelineState::opaque(),
            false,
        )
        .unwrap();

    {
        let stats = render(&mut renderer, &mut images);
        assert_eq!(stats.draws, 0);
        assert_eq!(stats.skipped_draws, 2);
        assert_eq!(stats.passes, 2);

        let pixels = renderer.capture_target(target).unwrap();
        assert_eq!(pixels.len(), 4 * 4 * 4);
        for px in pixels.chunks_exact(4) {
            assert_eq!(px, [0, 0, 255, 255]);
        }
    }

    {
        renderer.set_enabled(pass, draw, true).unwrap();
        let stats = render(&mut renderer, &mut images);
        assert_eq!(stats.draws, 2);

        let pixels = renderer.capture_target(target).unwrap();
        // The half-size quad covers the centre 2x2 pixels only.
        assert_eq!(pixel(&pixels, 4, 1, 1), [255, 0, 0, 255]);
        assert_eq!(pixel(&pixels, 4, 2, 2), [255, 0, 0, 255]);
        assert_eq!(pixel(&pixels, 4, 0, 0), [0, 0, 255, 255]);
        assert_eq!(pixel(&pixels, 4, 3, 3), [0, 0, 255, 255]);
    }

    // Offscreen passes never touch the eye images.
    assert_eq!(images[0].acquisitions(), 0);
    assert_eq!(images[1].acquisitions(), 0);
}

#[test]
fn test_clearing_disabled_keeps_previous_frame() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let mut images = eye_images(&renderer, 4);
    let target = renderer.create_target(4, 4).unwrap();
    let pass = renderer
        .add_pass(
            RenderTargetRef::Offscreen(target),
            ClearPolicy::color_and_depth(BLUE),
        )
        .unwrap();
    render(&mut renderer, &mut images);

    renderer.set_clear(pass, ClearPolicy::color_and_depth(GREEN)).unwrap();
    renderer.set_clearing(false);
    render(&mut renderer, &mut images);

    let pixels = renderer.capture_target(target).unwrap();
    assert_eq!(pixel(&pixels, 4, 2, 2), [0, 0, 255, 255]);
}

// ============================================================================
// Draw order and depth comparison
// ============================================================================

#[test]
fn test_depth_compare_decides_equal_depth_winner() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let mut images = eye_images(&renderer, 4);
    let target = renderer.create_target(4, 4).unwrap();
    let pass = renderer
        .add_pass(
            RenderTargetRef::Offscreen(target),
            ClearPolicy::color_and_depth(BLUE),
        )
        .unwrap();
    let quad = renderer.builtins().quad;
    let red = unlit_material(&mut renderer, RED);
    let green = unlit_material(&mut renderer, GREEN);

    let less = PipelineState::opaque().with_depth_compare(DepthCompare::Less);
    let first = renderer
        .add_draw_call(pass, quad, red, None, less, true)
        .unwrap();
    let second = renderer
        .add_draw_call(pass, quad, green, None, less, true)
        .unwrap();

    {
        render(&mut renderer, &mut images);
        let pixels = renderer.capture_target(target).unwrap();
        assert_eq!(pixel(&pixels, 4, 2, 2), [255, 0, 0, 255], "Less keeps the first draw");
    }

    {
        let less_equal = PipelineState::opaque().with_depth_compare(DepthCompare::LessEqual);
        renderer.set_state(pass, first, less_equal).unwrap();
        renderer.set_state(pass, second, less_equal).unwrap();
        render(&mut renderer, &mut images);
        let pixels = renderer.capture_target(target).unwrap();
        assert_eq!(pixel(&pixels, 4, 2, 2), [0, 255, 0, 255], "LessEqual lets the second draw win");
    }
}

#[test]
fn test_state_cache_skips_repeated_state() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let mut images = eye_images(&renderer, 4);
    let target = renderer.create_target(4, 4).unwrap();
    let pass = renderer
        .add_pass(RenderTargetRef::Offscreen(target), ClearPolicy::default())
        .unwrap();
    let quad = renderer.builtins().quad;
    let red = unlit_material(&mut renderer, RED);
    for _ in 0..3 {
        renderer
            .add_draw_call(pass, quad, red, None, PipelineState::opaque(), true)
            .unwrap();
    }

    render(&mut renderer, &mut images);
    let stats = render(&mut renderer, &mut images);
    // Identical state on every draw: nothing left to change once applied.
    assert_eq!(stats.state_commands, 0);
    assert_eq!(stats.draws, 6);
    assert_eq!(renderer.pipeline_count(), 1);
}

// ============================================================================
// Target resize
// ============================================================================

#[test]
fn test_reinit_target_keeps_passes_working() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let mut images = eye_images(&renderer, 4);
    let target = renderer.create_target(4, 4).unwrap();
    let pass = renderer
        .add_pass(
            RenderTargetRef::Offscreen(target),
            ClearPolicy::color_and_depth(BLUE),
        )
        .unwrap();
    let red = unlit_material(&mut renderer, RED);
    let quad = renderer.builtins().quad;
    renderer
        .add_draw_call(
            pass,
            quad,
            red,
            Some(Transform::from_scale(Vec3::splat(0.5))),
            PipelineState::opaque(),
            true,
        )
        .unwrap();

    renderer.reinit_target(target, 8, 6).unwrap();
    let stats = render(&mut renderer, &mut images);
    assert_eq!(stats.draws, 2);

    let registered = renderer.registry().target(target).unwrap();
    assert_eq!((registered.width, registered.height), (8, 6));

    let pixels = renderer.capture_target(target).unwrap();
    assert_eq!(pixels.len(), 8 * 6 * 4);
    assert_eq!(pixel(&pixels, 8, 4, 3), [255, 0, 0, 255]);
    assert_eq!(pixel(&pixels, 8, 0, 0), [0, 0, 255, 255]);
}

// ============================================================================
// Chained passes
// ============================================================================

#[test]
fn test_fullscreen_pass_samples_earlier_target() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let mut images = eye_images(&renderer, 4);
    let scene = renderer.create_target(4, 4).unwrap();
    let output = renderer.create_target(4, 4).unwrap();
    renderer
        .add_pass(
            RenderTargetRef::Offscreen(scene),
            ClearPolicy::color_and_depth(GREEN),
        )
        .unwrap();

    let blit = renderer.builtins().blit;
    let material = renderer
        .registry_mut()
        .create_material(
            blit,
            MaterialDescriptor::textured(MaterialTexture::Target(scene)),
        )
        .unwrap();
    renderer
        .add_fullscreen_pass(
            RenderTargetRef::Offscreen(output),
            ClearPolicy::color_and_depth(BLUE),
            material,
        )
        .unwrap();

    render(&mut renderer, &mut images);
    let pixels = renderer.capture_target(output).unwrap();
    assert_eq!(pixel(&pixels, 4, 1, 2), [0, 255, 0, 255]);

    // Still sampled after a resize of the source.
    renderer.reinit_target(scene, 2, 2).unwrap();
    render(&mut renderer, &mut images);
    let pixels = renderer.capture_target(output).unwrap();
    assert_eq!(pixel(&pixels, 4, 3, 0), [0, 255, 0, 255]);
}

#[test]
fn test_pass_cannot_sample_its_own_target() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let mut images = eye_images(&renderer, 4);
    let target = renderer.create_target(4, 4).unwrap();
    let blit = renderer.builtins().blit;
    let material = renderer
        .registry_mut()
        .create_material(
            blit,
            MaterialDescriptor::textured(MaterialTexture::Target(target)),
        )
        .unwrap();
    renderer
        .add_fullscreen_pass(
            RenderTargetRef::Offscreen(target),
            ClearPolicy::default(),
            material,
        )
        .unwrap();

    let [left, right] = &mut images;
    let err = renderer
        .render_frame(&[EyeView::default(); 2], [left, right])
        .unwrap_err();
    assert!(err.is_precondition_violation());
}

// ============================================================================
// Display passes and eye images
// ============================================================================

#[test]
fn test_display_pass_acquires_each_eye_once() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let mut images = eye_images(&renderer, 8);
    renderer
        .add_pass(RenderTargetRef::Display, ClearPolicy::color_and_depth(GREEN))
        .unwrap();
    renderer
        .add_pass(RenderTargetRef::Display, ClearPolicy::preserve())
        .unwrap();

    render(&mut renderer, &mut images);
    for image in &images {
        assert_eq!(image.acquisitions(), 1);
        assert!(!image.is_acquired());
        let pixels = image
            .read_pixels(renderer.device(), renderer.queue(), renderer.sync_options())
            .unwrap();
        assert_eq!(pixel(&pixels, 8, 5, 5), [0, 255, 0, 255]);
    }
}

#[test]
fn test_clear_eyes() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let mut images = eye_images(&renderer, 4);
    {
        let [left, right] = &mut images;
        renderer.clear_eyes([left, right], RED).unwrap();
    }
    for image in &images {
        assert!(!image.is_acquired());
        let pixels = image
            .read_pixels(renderer.device(), renderer.queue(), renderer.sync_options())
            .unwrap();
        assert!(pixels.chunks_exact(4).all(|px| px == [255, 0, 0, 255]));
    }
}

#[test]
fn test_frame_driver_counts_frames() {
    let Some(renderer) = headless_renderer() else {
        return;
    };
    let mut images = eye_images(&renderer, 4);
    let mut driver = FrameDriver::new(renderer, FramePolicy::default());
    driver
        .renderer_mut()
        .add_pass(RenderTargetRef::Display, ClearPolicy::color_and_depth(BLUE))
        .unwrap();

    let frame = StereoFrame::mono(EyeView::default());
    for _ in 0..3 {
        let [left, right] = &mut images;
        let outcome = driver.drive_frame(&frame, [left, right]).unwrap();
        assert!(outcome.is_rendered());
        assert_eq!(outcome.stats().map(|s| s.passes), Some(2));
    }
    assert_eq!(driver.rendered_frames(), 3);
    assert_eq!(driver.skipped_frames(), 0);
    assert_eq!(driver.renderer().frame_count(), 3);
    assert_eq!(images[0].acquisitions(), 3);
}

#[test]
fn test_capture_encodes_png() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let mut images = eye_images(&renderer, 4);
    let target = renderer.create_target(4, 4).unwrap();
    renderer
        .add_pass(
            RenderTargetRef::Offscreen(target),
            ClearPolicy::color_and_depth(BLUE),
        )
        .unwrap();
    render(&mut renderer, &mut images);

    let pixels = renderer.capture_target(target).unwrap();
    let png = encode_png(&pixels, 4, 4).unwrap();
    assert_eq!(&png[..4], b"\x89PNG");
}
