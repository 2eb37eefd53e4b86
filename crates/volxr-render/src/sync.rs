//! Bounded host waits on GPU work.

use std::sync::mpsc;
use std::time::Duration;

use volxr_core::SyncOptions;

use crate::error::{RenderError, RenderResult};

/// Maps `buffer` for reading and blocks until the mapping completes, the retry budget
/// runs out, or mapping fails.
///
/// Each wait polls the device with a timeout; the timeout doubles after every miss.
pub fn map_read_blocking(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    sync: &SyncOptions,
) -> RenderResult<()> {
    let slice = buffer.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    let mut timeout = Duration::from_millis(sync.timeout_ms.max(1));
    let mut waited = Duration::ZERO;
    let attempts = sync.retries + 1;

    for attempt in 1..=attempts {
        let polled = device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: Some(timeout),
        });
        waited += timeout;

        match rx.try_recv() {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => return Err(RenderError::BufferMapFailed(e.to_string())),
            Err(mpsc::TryRecvError::Disconnected) => {
                return Err(RenderError::BufferMapFailed(
                    "map callback dropped without result".into(),
                ));
            }
            Err(mpsc::TryRecvError::Empty) => {}
        }

        match polled {
            Err(wgpu::PollError::Timeout) => {
                log::warn!(
                    "GPU wait attempt {attempt}/{attempts} timed out after {} ms",
                    timeout.as_millis()
                );
                timeout *= 2;
            }
            Err(e) => return Err(RenderError::BufferMapFailed(e.to_string())),
            Ok(_) => {
                // Queue drained but the callback has not run yet; give it another round.
                log::debug!("GPU idle but buffer not mapped yet (attempt {attempt})");
            }
        }
    }

    // Leave no pending map behind so the buffer can be reused or dropped.
    buffer.unmap();
    Err(RenderError::GpuSyncTimeout {
        attempts,
        waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
    })
}

/// Copies the first `len` bytes of a mapped buffer and unmaps it.
pub fn read_mapped(buffer: &wgpu::Buffer, len: usize) -> RenderResult<Vec<u8>> {
    let data = buffer.slice(..).get_mapped_range();
    if data.len() < len {
        let actual = data.len();
        drop(data);
        buffer.unmap();
        return Err(RenderError::SizeMismatch {
            expected: len,
            actual,
        });
    }
    let out = data[..len].to_vec();
    drop(data);
    buffer.unmap();
    Ok(out)
}
