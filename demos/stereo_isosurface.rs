//! Demo: extract the isosurface of a synthetic sphere on the GPU and render it
//! for both eyes into headless stand-in images, saved as PNG.
//!
//! Usage: `cargo run --example stereo_isosurface [config.json]`

use volxr::*;

const EYE_SIZE: u32 = 512;
const EYE_SEPARATION: f32 = 0.064;

fn eye_view(offset: f32) -> EyeView {
    let eye = Vec3::new(offset, 0.4, 1.6);
    let view = Mat4::look_at_rh(eye, Vec3::new(offset, 0.0, 0.0), Vec3::Y);
    let projection = Mat4::perspective_rh(45f32.to_radians(), 1.0, 0.05, 10.0);
    EyeView::new(view, projection)
}

fn main() -> volxr::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => VolxrConfig::load(path)?,
        None => VolxrConfig::default(),
    };
    let mut driver = headless_driver(&config)?;
    let extractor = IsosurfaceExtractor::new(driver.renderer().device(), config.extractor.clone())?;

    let renderer = driver.renderer_mut();
    let volume = DensityVolume::sphere(64, 0.35)?;
    let texture = renderer.registry_mut().create_volume_texture(&volume)?;
    let mesh = renderer.extract_isosurface(&extractor, texture, 48, 0.5)?;
    println!(
        "extracted {} triangles",
        renderer.registry().mesh(mesh)?.triangle_count()
    );

    let shader = renderer.builtins().isosurface;
    let material = renderer
        .registry_mut()
        .create_material(shader, MaterialDescriptor::color([0.9, 0.6, 0.3, 1.0]))?;
    let pass = renderer.add_pass(
        RenderTargetRef::Display,
        ClearPolicy::color_and_depth([0.0, 0.0, 1.0, 1.0]),
    )?;
    // Winding of extracted triangles is not consistent.
    renderer.add_draw_call(
        pass,
        mesh,
        material,
        Some(Transform::from_translation(Vec3::splat(-0.5))),
        PipelineState::opaque().with_culling(false),
        true,
    )?;

    let device = driver.renderer().device().clone();
    let mut left = TextureEyeSource::new(&device, EYE_SIZE, EYE_SIZE)?;
    let mut right = TextureEyeSource::new(&device, EYE_SIZE, EYE_SIZE)?;
    let frame = StereoFrame::new(
        eye_view(-EYE_SEPARATION / 2.0),
        eye_view(EYE_SEPARATION / 2.0),
    );

    match driver.drive_frame(&frame, [&mut left, &mut right])? {
        FrameOutcome::Rendered(stats) => println!("rendered: {stats:?}"),
        FrameOutcome::Skipped(reason) => {
            println!("frame skipped: {reason}");
            return Ok(());
        }
    }

    let renderer = driver.renderer();
    for (name, image) in [("left", &left), ("right", &right)] {
        let pixels = image.read_pixels(renderer.device(), renderer.queue(), renderer.sync_options())?;
        save_png(format!("stereo_isosurface_{name}.png"), &pixels, EYE_SIZE, EYE_SIZE)?;
    }
    Ok(())
}
