//! GPU frame timing with timestamp queries.
//!
//! Four timestamps per frame: the start of each eye's first pass and the end of its
//! last pass. They are resolved after the second eye and read back with a bounded
//! wait, so timing a frame costs one extra host sync.

use volxr_core::SyncOptions;

use crate::error::RenderResult;
use crate::sync::{map_read_blocking, read_mapped};

const QUERY_COUNT: u32 = 4;
const RESOLVE_BYTES: u64 = QUERY_COUNT as u64 * 8;

/// Total GPU nanoseconds covered by `[begin0, end0, begin1, end1]`.
///
/// An eye whose end precedes its begin contributes nothing.
pub fn elapsed_ns(timestamps: [u64; 4], period_ns: f32) -> u64 {
    let [begin0, end0, begin1, end1] = timestamps;
    let ticks = end0.saturating_sub(begin0) + end1.saturating_sub(begin1);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let ns = (ticks as f64 * f64::from(period_ns)) as u64;
    ns
}

/// Timestamp query set plus the buffers to read it back through.
pub struct GpuFrameTimer {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    period_ns: f32,
}

impl GpuFrameTimer {
    /// Returns `None` if the device was created without timestamp queries.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Option<Self> {
        if !device.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            log::info!("timestamp queries unavailable; GPU frame timing disabled");
            return None;
        }
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("frame timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: QUERY_COUNT,
        });
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame timestamps resolve"),
            size: RESOLVE_BYTES,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame timestamps staging"),
            size: RESOLVE_BYTES,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let period_ns = queue.get_timestamp_period();
        log::debug!("GPU timestamp period {period_ns:.3} ns");
        Some(Self {
            query_set,
            resolve_buffer,
            staging_buffer,
            period_ns,
        })
    }

    /// Timestamp writes for one pass of `eye`. The first pass of an eye records its
    /// start and the last its end.
    pub fn pass_writes(
        &self,
        eye: usize,
        first: bool,
        last: bool,
    ) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        if !first && !last {
            return None;
        }
        let base = u32::try_from(eye * 2).ok()?;
        Some(wgpu::RenderPassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: first.then_some(base),
            end_of_pass_write_index: last.then_some(base + 1),
        })
    }

    /// Records the resolve and the copy into the staging buffer.
    pub fn resolve(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.resolve_query_set(&self.query_set, 0..QUERY_COUNT, &self.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(&self.resolve_buffer, 0, &self.staging_buffer, 0, RESOLVE_BYTES);
    }

    /// Waits for the resolved timestamps and returns the frame's GPU time.
    pub fn read_ns(&self, device: &wgpu::Device, sync: &SyncOptions) -> RenderResult<u64> {
        map_read_blocking(device, &self.staging_buffer, sync)?;
        #[allow(clippy::cast_possible_truncation)]
        let bytes = read_mapped(&self.staging_buffer, RESOLVE_BYTES as usize)?;
        let timestamps: [u64; 4] = bytemuck::pod_read_unaligned(&bytes);
        Ok(elapsed_ns(timestamps, self.period_ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_sums_both_eyes() {
        assert_eq!(elapsed_ns([100, 300, 400, 450], 1.0), 250);
    }

    #[test]
    fn test_elapsed_scales_by_period() {
        assert_eq!(elapsed_ns([0, 10, 0, 10], 2.5), 50);
    }

    #[test]
    fn test_elapsed_ignores_reversed_eye() {
        assert_eq!(elapsed_ns([500, 100, 0, 40], 1.0), 40);
    }
}
