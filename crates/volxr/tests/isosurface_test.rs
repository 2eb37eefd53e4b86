//! GPU isosurface extraction checked against the CPU reference.
//!
//! Every test skips when the machine has no GPU adapter.

use volxr::*;
use volxr_core::surface_nets;
use volxr_render::buffer::create_readback_buffer;
use volxr_render::sync::{map_read_blocking, read_mapped};

fn headless_renderer() -> Option<Renderer> {
    match Renderer::new_headless(&RendererOptions::default()) {
        Ok(renderer) => Some(renderer),
        Err(e) => {
            eprintln!("Skipping test: no GPU available ({e})");
            None
        }
    }
}

fn extractor(renderer: &Renderer, config: ExtractorConfig) -> IsosurfaceExtractor {
    IsosurfaceExtractor::new(renderer.device(), config).unwrap()
}

/// 8^3 volume, 255 inside the voxel box [2, 6)^3. Sampled at n = 4 every corner
/// lands halfway between texels, so per-axis densities are 0, 0.5 or 1 and the
/// products stay clear of a 0.3 threshold.
fn box_volume() -> DensityVolume {
    DensityVolume::from_fn(UVec3::splat(8), |p| {
        if p.cmpge(UVec3::splat(2)).all() && p.cmplt(UVec3::splat(6)).all() {
            255
        } else {
            0
        }
    })
    .unwrap()
}

/// 8^3 volume whose corner samples at n = 4 alternate inside/outside along x, so
/// every one of the 64 cells carries surface.
fn layered_volume() -> DensityVolume {
    const COLUMNS: [u8; 8] = [255, 0, 0, 255, 255, 0, 0, 255];
    DensityVolume::from_fn(UVec3::splat(8), |p| COLUMNS[p.x as usize]).unwrap()
}

fn read_positions(renderer: &Renderer, mesh: MeshHandle) -> Vec<Vec3> {
    let mesh = renderer.registry().mesh(mesh).unwrap();
    let size = u64::from(mesh.vertex_count) * 12;
    if size == 0 {
        return Vec::new();
    }
    let staging = create_readback_buffer(renderer.device(), size, Some("test readback"));
    let mut encoder = renderer
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_buffer_to_buffer(&mesh.vertex_buffer, 0, &staging, 0, size);
    renderer.queue().submit(std::iter::once(encoder.finish()));
    map_read_blocking(renderer.device(), &staging, renderer.sync_options()).unwrap();
    let bytes = read_mapped(&staging, size as usize).unwrap();
    bytes
        .chunks_exact(12)
        .map(|v| {
            let f = |i: usize| f32::from_le_bytes([v[i], v[i + 1], v[i + 2], v[i + 3]]);
            Vec3::new(f(0), f(4), f(8))
        })
        .collect()
}

// ============================================================================
// Sphere
// ============================================================================

#[test]
fn test_sphere_extraction() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let extractor = extractor(&renderer, ExtractorConfig::default());
    let volume = renderer
        .registry_mut()
        .create_volume_texture(&DensityVolume::sphere(32, 0.35).unwrap())
        .unwrap();

    let first = renderer
        .extract_isosurface(&extractor, volume, 32, 0.5)
        .unwrap();
    let count = renderer.registry().mesh(first).unwrap().vertex_count;
    assert!(count > 0);
    assert_eq!(count % 3, 0);

    let positions = read_positions(&renderer, first);
    assert_eq!(positions.len(), count as usize);
    for p in &positions {
        assert!(
            p.cmpge(Vec3::ZERO).all() && p.cmple(Vec3::ONE).all(),
            "vertex {p} outside the unit cube"
        );
    }

    // Same inputs, same amount of geometry.
    let second = renderer
        .extract_isosurface(&extractor, volume, 32, 0.5)
        .unwrap();
    assert_eq!(renderer.registry().mesh(second).unwrap().vertex_count, count);
}

#[test]
fn test_reextract_keeps_handle() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let extractor = extractor(&renderer, ExtractorConfig::default());
    let volume = renderer
        .registry_mut()
        .create_volume_texture(&DensityVolume::sphere(16, 0.4).unwrap())
        .unwrap();
    let mesh = renderer
        .extract_isosurface(&extractor, volume, 8, 0.5)
        .unwrap();
    let meshes = renderer.registry().mesh_count();

    renderer
        .reextract_isosurface(&extractor, mesh, volume, 16, 0.5)
        .unwrap();
    assert_eq!(renderer.registry().mesh_count(), meshes);
    let count = renderer.registry().mesh(mesh).unwrap().vertex_count;
    assert!(count > 0);
    assert_eq!(count % 3, 0);
}

#[test]
fn test_uniform_volume_yields_no_triangles() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let extractor = extractor(&renderer, ExtractorConfig::default());
    for fill in [0u8, 255] {
        let volume = DensityVolume::from_fn(UVec3::splat(4), |_| fill).unwrap();
        let texture = renderer.registry_mut().create_volume_texture(&volume).unwrap();
        let mesh = renderer
            .extract_isosurface(&extractor, texture, 4, 0.5)
            .unwrap();
        assert_eq!(renderer.registry().mesh(mesh).unwrap().vertex_count, 0, "fill {fill}");
    }
}

// ============================================================================
// Agreement with the CPU reference
// ============================================================================

#[test]
fn test_gpu_matches_cpu_on_exact_fixtures() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let extractor = extractor(&renderer, ExtractorConfig::default());

    for (name, volume) in [("box", box_volume()), ("layered", layered_volume())] {
        let expected = surface_nets::extract(&volume, 4, 0.3).unwrap();
        assert!(!expected.is_empty(), "{name} fixture has no surface");

        let texture = renderer.registry_mut().create_volume_texture(&volume).unwrap();
        let mesh = renderer
            .extract_isosurface(&extractor, texture, 4, 0.3)
            .unwrap();
        let count = renderer.registry().mesh(mesh).unwrap().vertex_count;
        assert_eq!(count as usize, expected.len(), "{name} fixture");
    }
}

#[test]
fn test_layered_fixture_reference_count() {
    // Every cell is non-empty: each plane and sign emits for the 3x3x4 cells
    // whose two neighbours exist, 6 * 36 triangles in total.
    let vertices = surface_nets::extract(&layered_volume(), 4, 0.3).unwrap();
    assert_eq!(vertices.len(), 6 * 36 * 3);
}

// ============================================================================
// Overflow policies
// ============================================================================

#[test]
fn test_overflow_fail() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let config = ExtractorConfig {
        max_vertices_per_cell: 3,
        overflow_policy: OverflowPolicy::Fail,
        ..ExtractorConfig::default()
    };
    let extractor = extractor(&renderer, config);
    let texture = renderer
        .registry_mut()
        .create_volume_texture(&layered_volume())
        .unwrap();
    let meshes = renderer.registry().mesh_count();

    let err = renderer
        .extract_isosurface(&extractor, texture, 4, 0.3)
        .unwrap_err();
    assert!(err.is_capacity_exceeded());
    assert_eq!(renderer.registry().mesh_count(), meshes);
}

#[test]
fn test_overflow_truncate() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let config = ExtractorConfig {
        max_vertices_per_cell: 3,
        overflow_policy: OverflowPolicy::Truncate,
        ..ExtractorConfig::default()
    };
    let extractor = extractor(&renderer, config);
    let texture = renderer
        .registry_mut()
        .create_volume_texture(&layered_volume())
        .unwrap();

    let mesh = renderer
        .extract_isosurface(&extractor, texture, 4, 0.3)
        .unwrap();
    // 648 wanted, 4^3 * 3 reserved.
    assert_eq!(renderer.registry().mesh(mesh).unwrap().vertex_count, 192);
}

// ============================================================================
// Preconditions
// ============================================================================

#[test]
fn test_extraction_preconditions() {
    let Some(mut renderer) = headless_renderer() else {
        return;
    };
    let extractor = extractor(&renderer, ExtractorConfig::default());
    let volume = renderer
        .registry_mut()
        .create_volume_texture(&box_volume())
        .unwrap();

    {
        let err = renderer
            .extract_isosurface(&extractor, volume, 0, 0.5)
            .unwrap_err();
        assert!(err.is_precondition_violation());
    }

    {
        let image = renderer
            .registry_mut()
            .create_texture_2d(2, 2, &[255u8; 16])
            .unwrap();
        let err = renderer
            .extract_isosurface(&extractor, image, 4, 0.5)
            .unwrap_err();
        assert!(err.is_precondition_violation());
    }

    {
        renderer.registry_mut().free_texture(volume).unwrap();
        let err = renderer
            .extract_isosurface(&extractor, volume, 4, 0.5)
            .unwrap_err();
        assert!(err.is_precondition_violation());
    }
}

#[test]
fn test_invalid_extractor_config() {
    let Some(renderer) = headless_renderer() else {
        return;
    };
    let config = ExtractorConfig {
        max_vertices_per_cell: 2,
        ..ExtractorConfig::default()
    };
    assert!(IsosurfaceExtractor::new(renderer.device(), config).is_err());
}

#[test]
fn test_full_mesh_pool_fails_before_dispatch() {
    let options = RendererOptions {
        limits: RegistryLimits {
            meshes: 1,
            ..RegistryLimits::default()
        },
        ..RendererOptions::default()
    };
    let mut renderer = match Renderer::new_headless(&options) {
        Ok(renderer) => renderer,
        Err(e) => {
            eprintln!("Skipping test: no GPU available ({e})");
            return;
        }
    };
    let extractor = extractor(&renderer, ExtractorConfig::default());
    let volume = renderer
        .registry_mut()
        .create_volume_texture(&box_volume())
        .unwrap();

    // The built-in quad already fills the only slot.
    let err = renderer
        .extract_isosurface(&extractor, volume, 4, 0.3)
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::CapacityExceeded { ref resource, limit: 1 } if resource == "mesh"
    ));
    assert_eq!(renderer.registry().mesh_count(), 1);
}
