// ============================================================================
// GPU CONTEXT — wgpu Device, Queue, and adapter initialization
// ============================================================================

use std::sync::Arc;

use crate::log_info;

/// Holds the core wgpu resources used by the GPU filter backend.
/// If creation fails the host falls back to the Canvas2d (CPU) path.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    /// Maximum texture dimension supported by this device.
    pub max_texture_dim: u32,
    /// Largest buffer the device accepts; bounds the readback staging buffer.
    pub max_buffer_size: u64,
}

impl GpuContext {
    /// Attempt to create a headless GPU context.  Tries hardware first, then
    /// a software rasterizer (`force_fallback_adapter`).
    pub fn new(preferred_gpu: &str) -> Option<Self> {
        if let Some(ctx) = pollster::block_on(Self::new_async(preferred_gpu, false)) {
            return Some(ctx);
        }
        log_info!("[GPU] Hardware adapter unavailable — trying software fallback");
        pollster::block_on(Self::new_async(preferred_gpu, true))
    }

    async fn new_async(preferred_gpu: &str, force_fallback: bool) -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: power_preference(preferred_gpu),
                compatible_surface: None,
                force_fallback_adapter: force_fallback,
            })
            .await?;

        let adapter_name = adapter.get_info().name.clone();
        let limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("ink-filter GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: limits.max_texture_dimension_2d,
                        max_buffer_size: limits.max_buffer_size,
                        max_compute_workgroup_size_x: limits.max_compute_workgroup_size_x,
                        max_compute_workgroup_size_y: limits.max_compute_workgroup_size_y,
                        max_compute_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                },
                None,
            )
            .await
            .ok()?;

        Some(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name,
            max_texture_dim: limits.max_texture_dimension_2d,
            max_buffer_size: limits.max_buffer_size,
        })
    }

    /// Check that a `width`×`height` image fits both the texture limit and,
    /// once row-padded, the staging buffer it is read back through.
    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        fits_device_limits(width, height, self.max_texture_dim, self.max_buffer_size)
    }

    /// Submit a single encoder's commands.
    pub fn submit_one(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// Bytes per row of a readback copy, padded to wgpu's copy pitch.
pub fn aligned_bytes_per_row(width: u32) -> u64 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64;
    (width as u64 * 4).div_ceil(align) * align
}

/// Size of the staging buffer needed to read back a `width`×`height` texture.
pub fn readback_buffer_size(width: u32, height: u32) -> u64 {
    aligned_bytes_per_row(width) * height as u64
}

fn fits_device_limits(width: u32, height: u32, max_texture_dim: u32, max_buffer_size: u64) -> bool {
    width <= max_texture_dim && height <= max_texture_dim && readback_buffer_size(width, height) <= max_buffer_size
}

/// Map the `preferred_gpu` setting onto a wgpu power preference.
pub fn power_preference(preferred_gpu: &str) -> wgpu::PowerPreference {
    match preferred_gpu.to_lowercase().as_str() {
        "low power" | "integrated" => wgpu::PowerPreference::LowPower,
        _ => wgpu::PowerPreference::HighPerformance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_strings() {
        assert_eq!(power_preference("Integrated"), wgpu::PowerPreference::LowPower);
        assert_eq!(power_preference("low power"), wgpu::PowerPreference::LowPower);
        assert_eq!(power_preference("discrete"), wgpu::PowerPreference::HighPerformance);
        assert_eq!(power_preference(""), wgpu::PowerPreference::HighPerformance);
    }

    #[test]
    fn rows_align_to_copy_pitch() {
        assert_eq!(aligned_bytes_per_row(1), 256);
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
    }

    #[test]
    fn readback_size_does_not_overflow_u32() {
        assert_eq!(readback_buffer_size(32768, 32768), 32768u64 * 4 * 32768);
    }

    #[test]
    fn size_check_covers_the_staging_buffer() {
        const DOWNLEVEL_MAX_BUFFER: u64 = 1 << 28;
        // Inside a 16384 texture limit, but 324_864_000 bytes once read back.
        assert!(!fits_device_limits(9000, 9000, 16384, DOWNLEVEL_MAX_BUFFER));
        assert!(fits_device_limits(8000, 8000, 16384, DOWNLEVEL_MAX_BUFFER));
        assert!(!fits_device_limits(16385, 1, 16384, u64::MAX));
        assert!(!fits_device_limits(1, 16385, 16384, u64::MAX));
    }
}
