//! Minimal deferred G-buffer: a reverse-Z depth target and the lit colour target.
//!
//! Reverse-Z maps the near plane to 1.0 and the far plane to 0.0, so a cleared
//! depth buffer reads 0.0 everywhere and "nearer" means "greater".

use crate::texture::{RenderTarget, TextureError};

/// Depth buffer with reverse-Z configuration.
pub struct DepthBuffer {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl DepthBuffer {
    /// 32-bit float depth format for maximum precision with reverse-Z.
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Reverse-Z clear value: 0.0 represents the far plane.
    pub const CLEAR_VALUE: f32 = 0.0;

    /// Reverse-Z depth comparison: closer objects have higher depth values.
    pub const COMPARE_FUNCTION: wgpu::CompareFunction = wgpu::CompareFunction::GreaterEqual;

    /// Create a new depth buffer with the specified dimensions.
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gbuffer-depth"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
        }
    }

    /// Current `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Clear to the far plane.
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        self.clear_to(encoder, Self::CLEAR_VALUE);
    }

    /// Clear to an arbitrary reverse-Z depth, e.g. to stand in for an opaque wall.
    pub fn clear_to(&self, encoder: &mut wgpu::CommandEncoder, depth: f32) {
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("gbuffer-depth-clear"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
    }
}

/// Depth plus lit colour, both at the output resolution.
pub struct GBuffer {
    pub depth: DepthBuffer,
    pub lit: RenderTarget,
}

impl GBuffer {
    /// Usage flags of the lit target: written by lighting and the volume compositor,
    /// copied out for presentation or readback.
    pub const LIT_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
        .union(wgpu::TextureUsages::TEXTURE_BINDING)
        .union(wgpu::TextureUsages::COPY_SRC);

    /// Allocate a G-buffer of `width`×`height` with a lit target of `lit_format`.
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        lit_format: wgpu::TextureFormat,
    ) -> Result<Self, TextureError> {
        let lit = RenderTarget::new(device, "gbuffer-lit", width, height, lit_format, Self::LIT_USAGE)?;
        let depth = DepthBuffer::new(device, width, height);
        Ok(Self { depth, lit })
    }

    /// Reallocate both targets. No-op if dimensions are unchanged.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<(), TextureError> {
        if self.lit.matches(width, height) {
            return Ok(());
        }
        *self = Self::new(device, width, height, self.lit.format)?;
        Ok(())
    }

    /// Current `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        self.lit.size()
    }
}
