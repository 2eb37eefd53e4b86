//! GPU isosurface extraction.
//!
//! Two compute passes over an N^3 cell grid turn a density volume into a
//! non-indexed triangle list:
//!
//! 1. `surface_find` classifies each cell by its eight corner samples and places a
//!    surface point at the mean of the corners above the threshold.
//! 2. `surface_triangulate` connects each surface cell to pairs of neighbouring
//!    surface cells in the XY, XZ and YZ planes, reserving output slots with an
//!    atomic counter.
//!
//! The counter is then read back, and the vertex buffer the second pass wrote
//! becomes the mesh's vertex storage directly. `volxr_core::surface_nets` runs the
//! same algorithm on the CPU.

use bytemuck::{Pod, Zeroable};
use volxr_core::surface_nets::{vertex_capacity, CellRecord};
use volxr_core::{ExtractorConfig, OverflowPolicy};
use wgpu::util::DeviceExt;

use crate::buffer::{create_readback_buffer, try_create_buffer};
use crate::error::{RenderError, RenderResult};
use crate::mesh::GpuMesh;
use crate::registry::create_sampler;
use crate::sync::{map_read_blocking, read_mapped};
use crate::texture::{GpuTexture, TextureKind};

const SURFACE_FIND_SHADER: &str = include_str!("shaders/surface_find.wgsl");
const SURFACE_TRIANGULATE_SHADER: &str = include_str!("shaders/surface_triangulate.wgsl");

/// Bytes per emitted vertex: three `f32`.
const VERTEX_BYTES: u64 = 12;

/// Extraction parameters (must match `ExtractParams` in both shaders).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ExtractParams {
    sampling_rate: u32,
    threshold: f32,
    capacity: u32,
    _pad: u32,
}

/// Result of one extraction.
///
/// Owns the vertex buffer the GPU wrote. Either hand it to the registry with
/// [`into_mesh`](Self::into_mesh) or release it with [`destroy`](Self::destroy).
pub struct ExtractedMesh {
    pub buffer: wgpu::Buffer,
    /// Vertices written, always a multiple of 3.
    pub vertex_count: u32,
    /// Vertex slots the buffer holds.
    pub capacity: u32,
    /// True if triangles were dropped because the buffer was full.
    pub truncated: bool,
}

impl ExtractedMesh {
    pub fn triangle_count(&self) -> u32 {
        self.vertex_count / 3
    }

    /// Wraps the vertex buffer as a drawable position-only mesh. No copy is made.
    pub fn into_mesh(self) -> GpuMesh {
        GpuMesh::from_positions(self.buffer, self.vertex_count)
    }

    pub fn destroy(self) {
        self.buffer.destroy();
    }
}

/// Number of workgroups along one axis.
pub fn workgroup_count(sampling_rate: u32, workgroup_size: u32) -> u32 {
    sampling_rate.div_ceil(workgroup_size)
}

/// Decides how many vertices are usable once the counter is read back.
///
/// Returns the usable count and whether anything was dropped.
pub fn resolve_overflow(
    emitted: u32,
    capacity: u32,
    policy: OverflowPolicy,
) -> RenderResult<(u32, bool)> {
    if emitted <= capacity {
        return Ok((emitted, false));
    }
    match policy {
        OverflowPolicy::Fail => Err(RenderError::CapacityExceeded {
            resource: "isosurface vertex buffer".into(),
            limit: u64::from(capacity),
        }),
        OverflowPolicy::Truncate => {
            let kept = capacity - capacity % 3;
            log::warn!(
                "isosurface overflow: {emitted} vertices emitted, keeping {kept} of {capacity} slots"
            );
            Ok((kept, true))
        }
    }
}

/// Two-pass surface extraction on the GPU.
///
/// Pipelines and layouts are built once; buffers are allocated per call, sized by
/// the sampling rate.
pub struct IsosurfaceExtractor {
    config: ExtractorConfig,
    classify_layout: wgpu::BindGroupLayout,
    triangulate_layout: wgpu::BindGroupLayout,
    classify_pipeline: wgpu::ComputePipeline,
    triangulate_pipeline: wgpu::ComputePipeline,
    sampler: wgpu::Sampler,
}

impl IsosurfaceExtractor {
    pub fn new(device: &wgpu::Device, config: ExtractorConfig) -> RenderResult<Self> {
        let limits = device.limits();
        let ws = config.workgroup_size;
        if ws == 0
            || ws > limits.max_compute_workgroup_size_z
            || ws.saturating_pow(3) > limits.max_compute_invocations_per_workgroup
        {
            return Err(RenderError::precondition(format!(
                "unsupported workgroup size {ws}"
            )));
        }
        if config.max_vertices_per_cell < 3 {
            return Err(RenderError::precondition(format!(
                "max_vertices_per_cell must hold a triangle, got {}",
                config.max_vertices_per_cell
            )));
        }

        let classify_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("surface find layout"),
            entries: &[
                uniform_entry(0),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                storage_entry(3, false),
            ],
        });
        let triangulate_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("surface triangulate layout"),
                entries: &[
                    uniform_entry(0),
                    storage_entry(1, true),
                    storage_entry(2, false),
                    storage_entry(3, false),
                ],
            });

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let classify_pipeline = create_compute_pipeline(
            device,
            "surface find",
            SURFACE_FIND_SHADER,
            &classify_layout,
            ws,
        );
        let triangulate_pipeline = create_compute_pipeline(
            device,
            "surface triangulate",
            SURFACE_TRIANGULATE_SHADER,
            &triangulate_layout,
            ws,
        );
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::PipelineCreationFailed(format!(
                "isosurface extraction: {err}"
            )));
        }

        Ok(Self {
            config,
            classify_layout,
            triangulate_layout,
            classify_pipeline,
            triangulate_pipeline,
            sampler: create_sampler(
                device,
                wgpu::AddressMode::MirrorRepeat,
                wgpu::FilterMode::Linear,
            ),
        })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extracts the surface where `volume` crosses `threshold`, on a grid of
    /// `sampling_rate` cells per axis.
    ///
    /// Blocks until the GPU has finished both passes, within the configured wait
    /// budget.
    pub fn extract(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        volume: &GpuTexture,
        sampling_rate: u32,
        threshold: f32,
    ) -> RenderResult<ExtractedMesh> {
        if sampling_rate == 0 {
            return Err(RenderError::precondition("sampling rate must be positive"));
        }
        if volume.kind != TextureKind::D3 {
            return Err(RenderError::precondition(
                "isosurface extraction needs a 3-D volume texture",
            ));
        }

        let limits = device.limits();
        let groups = workgroup_count(sampling_rate, self.config.workgroup_size);
        if groups > limits.max_compute_workgroups_per_dimension {
            return Err(RenderError::CapacityExceeded {
                resource: "compute workgroups per dimension".into(),
                limit: u64::from(limits.max_compute_workgroups_per_dimension),
            });
        }

        let cells = u64::from(sampling_rate).pow(3);
        let record_bytes = cells * std::mem::size_of::<CellRecord>() as u64;
        let capacity_u64 = vertex_capacity(sampling_rate, self.config.max_vertices_per_cell);
        let vertex_bytes = capacity_u64 * VERTEX_BYTES;
        let max_binding = u64::from(limits.max_storage_buffer_binding_size);
        for (resource, bytes) in [
            ("isosurface cell records", record_bytes),
            ("isosurface vertex buffer", vertex_bytes),
        ] {
            let limit = max_binding.min(limits.max_buffer_size);
            if bytes > limit {
                return Err(RenderError::CapacityExceeded {
                    resource: resource.into(),
                    limit,
                });
            }
        }
        let capacity = u32::try_from(capacity_u64).map_err(|_| RenderError::CapacityExceeded {
            resource: "isosurface vertex buffer".into(),
            limit: u64::from(u32::MAX),
        })?;

        let params = ExtractParams {
            sampling_rate,
            threshold,
            capacity,
            _pad: 0,
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("isosurface params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let records = try_create_buffer(
            device,
            &wgpu::BufferDescriptor {
                label: Some("isosurface cell records"),
                size: record_bytes,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            },
        )?;
        let vertices = try_create_buffer(
            device,
            &wgpu::BufferDescriptor {
                label: Some("isosurface vertices"),
                size: vertex_bytes,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            },
        )?;
        let counter = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("isosurface vertex counter"),
            contents: bytemuck::bytes_of(&0u32),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        });
        let counter_staging = create_readback_buffer(device, 4, Some("isosurface counter readback"));

        let classify_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("surface find"),
            layout: &self.classify_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&volume.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: records.as_entire_binding(),
                },
            ],
        });
        let triangulate_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("surface triangulate"),
            layout: &self.triangulate_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: records.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: vertices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: counter.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("isosurface extraction"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("surface find"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.classify_pipeline);
            pass.set_bind_group(0, &classify_group, &[]);
            pass.dispatch_workgroups(groups, groups, groups);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("surface triangulate"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.triangulate_pipeline);
            pass.set_bind_group(0, &triangulate_group, &[]);
            pass.dispatch_workgroups(groups, groups, groups);
        }
        encoder.copy_buffer_to_buffer(&counter, 0, &counter_staging, 0, 4);
        queue.submit(std::iter::once(encoder.finish()));

        let waited = map_read_blocking(device, &counter_staging, &self.config.sync);
        records.destroy();
        counter.destroy();
        if let Err(e) = waited {
            vertices.destroy();
            return Err(e);
        }
        let bytes = read_mapped(&counter_staging, 4)?;
        let emitted: u32 = bytemuck::pod_read_unaligned(&bytes);

        let (vertex_count, truncated) =
            match resolve_overflow(emitted, capacity, self.config.overflow_policy) {
                Ok(resolved) => resolved,
                Err(e) => {
                    log::warn!(
                        "isosurface overflow: {emitted} vertices emitted for {capacity} slots"
                    );
                    vertices.destroy();
                    return Err(e);
                }
            };

        log::info!(
            "extracted isosurface: {} triangles from {sampling_rate}^3 cells (threshold {threshold})",
            vertex_count / 3
        );
        Ok(ExtractedMesh {
            buffer: vertices,
            vertex_count,
            capacity,
            truncated,
        })
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    layout: &wgpu::BindGroupLayout,
    workgroup_size: u32,
) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions {
            constants: &[("WORKGROUP_SIZE", f64::from(workgroup_size))],
            ..Default::default()
        },
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<ExtractParams>(), 16);
        assert_eq!(std::mem::size_of::<CellRecord>(), 16);
    }

    #[test]
    fn test_workgroup_count_rounds_up() {
        assert_eq!(workgroup_count(32, 4), 8);
        assert_eq!(workgroup_count(33, 4), 9);
        assert_eq!(workgroup_count(1, 4), 1);
    }

    #[test]
    fn test_no_overflow_keeps_count() {
        let (count, truncated) = resolve_overflow(90, 96, OverflowPolicy::Fail).unwrap();
        assert_eq!(count, 90);
        assert!(!truncated);
    }

    #[test]
    fn test_overflow_fail() {
        let err = resolve_overflow(120, 96, OverflowPolicy::Fail).unwrap_err();
        assert!(err.is_capacity_exceeded());
    }

    #[test]
    fn test_overflow_truncate_rounds_to_triangles() {
        let (count, truncated) = resolve_overflow(120, 100, OverflowPolicy::Truncate).unwrap();
        assert_eq!(count, 99);
        assert!(truncated);
    }

    proptest! {
        #[test]
        fn prop_truncate_keeps_whole_triangles(emitted in 0u32..100_000, capacity in 3u32..50_000) {
            let (count, truncated) =
                resolve_overflow(emitted, capacity, OverflowPolicy::Truncate).unwrap();
            prop_assert!(count <= capacity);
            prop_assert_eq!(truncated, emitted > capacity);
            if truncated {
                prop_assert_eq!(count % 3, 0);
            } else {
                prop_assert_eq!(count, emitted);
            }
        }
    }
}
