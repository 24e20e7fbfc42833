//! Error types for the volume subsystem.

use haboob_render::{ShaderError, TextureError};
use tracing::warn;

/// Failures surfaced to the frame driver. Nothing here is retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    /// The requested density grid is empty or exceeds the device's 3-D texture limit.
    #[error("density field size {size:?} is invalid (each axis must be in 1..={limit})")]
    InvalidVolumeSize { size: [u32; 3], limit: u32 },

    /// A 2-D target (interval, ray or shadow buffer) is empty or beyond the device limit.
    #[error("failed to allocate {what}: {source}")]
    TargetTooLarge {
        what: &'static str,
        #[source]
        source: TextureError,
    },

    /// A kernel was not registered with the shader library.
    #[error("kernel unavailable: {0}")]
    KernelMissing(#[from] ShaderError),

    /// The device refused an allocation that passed the size checks.
    #[error("GPU rejected the {what} allocation: {source}")]
    Allocation {
        what: &'static str,
        #[source]
        source: wgpu::Error,
    },
}

/// Run `allocate` inside out-of-memory and validation error scopes.
///
/// A captured device error becomes [`VolumeError::Allocation`] instead of
/// reaching the uncaptured-error handler.
pub(crate) fn capture_allocation<T>(
    device: &wgpu::Device,
    what: &'static str,
    allocate: impl FnOnce() -> Result<T, VolumeError>,
) -> Result<T, VolumeError> {
    let out_of_memory = device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let validation = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let result = allocate();
    // Scopes pop innermost first.
    let validation = pollster::block_on(validation.pop());
    let out_of_memory = pollster::block_on(out_of_memory.pop());
    if let Some(source) = out_of_memory.or(validation) {
        warn!(what, %source, "GPU allocation failed");
        return Err(VolumeError::Allocation { what, source });
    }
    result
}
