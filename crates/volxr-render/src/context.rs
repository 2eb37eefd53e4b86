//! Device and queue ownership.

use volxr_core::{PowerPreference, RendererOptions};

use crate::error::{RenderError, RenderResult};

/// The device the renderer records against.
///
/// Either created headless here, or wrapped around a device the windowing or XR
/// layer already owns.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// Name and backend of the adapter, when known.
    pub adapter_name: String,
}

impl GpuContext {
    /// Requests an adapter and device with no surface attached.
    pub async fn new_headless(options: &RendererOptions) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: match options.power_preference {
                    PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
                    PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
                },
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterCreationFailed)?;

        let info = adapter.get_info();
        let adapter_name = format!("{} ({:?})", info.name, info.backend);
        log::info!("using adapter {adapter_name}");

        // Timestamps are optional; only ask for them when wanted and offered.
        let required_features = if options.gpu_timing {
            adapter.features() & wgpu::Features::TIMESTAMP_QUERY
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("volxr device (headless)"),
                required_features,
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await?;

        Ok(Self {
            device,
            queue,
            adapter_name,
        })
    }

    /// Blocking variant of [`new_headless`](Self::new_headless).
    pub fn new_headless_blocking(options: &RendererOptions) -> RenderResult<Self> {
        pollster::block_on(Self::new_headless(options))
    }

    /// Wraps an existing device, for example the one an XR runtime rendered with.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            adapter_name: String::from("external"),
        }
    }

    /// Returns true if GPU timestamps can be recorded on this device.
    pub fn supports_timestamps(&self) -> bool {
        self.device
            .features()
            .contains(wgpu::Features::TIMESTAMP_QUERY)
    }
}
