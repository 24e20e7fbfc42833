//! Render targets that carry their own resolution, plus sizing helpers.

/// Errors that can occur during texture creation.
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    /// Width or height is zero.
    #[error("texture dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },

    /// A dimension exceeds the device limit.
    #[error("texture '{label}' of {width}x{height} exceeds the device limit of {limit}")]
    TooLarge {
        label: &'static str,
        width: u32,
        height: u32,
        limit: u32,
    },
}

/// Calculates the number of mip levels for a 3-D texture.
pub fn mip_level_count_3d(width: u32, height: u32, depth: u32) -> u32 {
    let largest = width.max(height).max(depth).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Size of a buffer derived from `width`×`height` by `scale`, rounded up and at least 1×1.
pub fn scaled_extent(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let scale = if scale.is_finite() && scale > 0.0 {
        scale.min(1.0)
    } else {
        1.0
    };
    let w = ((width as f32) * scale).ceil() as u32;
    let h = ((height as f32) * scale).ceil() as u32;
    (w.max(1), h.max(1))
}

/// A 2-D colour target with its default view and stored resolution.
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// Create a target, validating its size against the device limits.
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Result<Self, TextureError> {
        if width == 0 || height == 0 {
            return Err(TextureError::ZeroDimensions { width, height });
        }
        let limit = device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(TextureError::TooLarge {
                label,
                width,
                height,
                limit,
            });
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            format,
            width,
            height,
        })
    }

    /// Current width in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Current height in texels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)` in texels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether this target was allocated at exactly `width`×`height`.
    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::init_gpu_context_blocking;

    #[test]
    fn test_mip_count_for_cube() {
        assert_eq!(mip_level_count_3d(128, 128, 128), 8);
        assert_eq!(mip_level_count_3d(1, 1, 1), 1);
    }

    #[test]
    fn test_mip_count_uses_largest_axis() {
        assert_eq!(mip_level_count_3d(64, 256, 32), 9);
        assert_eq!(mip_level_count_3d(100, 1, 1), 7);
    }

    #[test]
    fn test_scaled_extent_half_rounds_up() {
        assert_eq!(scaled_extent(1280, 720, 0.5), (640, 360));
        assert_eq!(scaled_extent(101, 33, 0.5), (51, 17));
    }

    #[test]
    fn test_scaled_extent_never_zero() {
        assert_eq!(scaled_extent(1, 1, 0.01), (1, 1));
    }

    #[test]
    fn test_scaled_extent_rejects_bad_scale() {
        assert_eq!(scaled_extent(64, 32, 0.0), (64, 32));
        assert_eq!(scaled_extent(64, 32, f32::NAN), (64, 32));
        assert_eq!(scaled_extent(64, 32, 4.0), (64, 32));
    }

    #[test]
    fn test_zero_dimension_target_is_rejected() {
        let Ok(gpu) = init_gpu_context_blocking() else {
            return;
        };
        let result = RenderTarget::new(
            &gpu.device,
            "zero",
            0,
            16,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        assert!(matches!(
            result,
            Err(TextureError::ZeroDimensions {
                width: 0,
                height: 16
            })
        ));
    }

    #[test]
    fn test_target_remembers_size() {
        let Ok(gpu) = init_gpu_context_blocking() else {
            return;
        };
        let target = RenderTarget::new(
            &gpu.device,
            "sized",
            320,
            200,
            wgpu::TextureFormat::Rgba16Float,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        )
        .unwrap();
        assert_eq!(target.size(), (320, 200));
        assert!(target.matches(320, 200));
        assert!(!target.matches(640, 400));
    }
}
