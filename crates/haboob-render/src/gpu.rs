//! Headless GPU device initialization.
//!
//! Provides [`GpuContext`] which owns the wgpu instance, adapter, device and queue
//! without a presentation surface, and [`GpuContextError`] for clear diagnostics
//! when initialization fails. Presentation is the host application's concern.

/// Error type for GPU context initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum GpuContextError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// Owns all GPU state needed for offscreen rendering and compute.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Initialize the GPU asynchronously without a surface.
    pub async fn new_headless() -> Result<Self, GpuContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Ok(adapter) => adapter,
            Err(_) => return Err(GpuContextError::NoAdapter),
        };

        let info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        // Volume synthesis writes a 3-D storage texture and the raymarch reads it
        // filtered; both are covered by the default limits.
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("haboob-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Limits the device was created with.
    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }
}

/// Initialize a headless GPU context synchronously using `pollster`.
pub fn init_gpu_context_blocking() -> Result<GpuContext, GpuContextError> {
    pollster::block_on(GpuContext::new_headless())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_context_fields_exist() {
        #[allow(dead_code)]
        fn assert_fields(ctx: &GpuContext) {
            let _: &wgpu::Instance = &ctx.instance;
            let _: &wgpu::Adapter = &ctx.adapter;
            let _: &wgpu::Device = &ctx.device;
            let _: &wgpu::Queue = &ctx.queue;
        }
    }

    #[test]
    fn test_error_messages_are_descriptive() {
        let err = GpuContextError::NoAdapter;
        assert_eq!(err.to_string(), "no compatible GPU adapter found");
    }

    #[test]
    fn test_headless_context_supports_volume_textures() {
        let Ok(gpu) = init_gpu_context_blocking() else {
            return;
        };
        let limits = gpu.limits();
        assert!(limits.max_texture_dimension_3d >= 128);
        assert!(limits.max_compute_invocations_per_workgroup >= 64);
    }
}
