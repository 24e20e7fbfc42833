//! Composite the ray buffer over the lit target at full resolution.

use glam::{Vec2, Vec4};
use haboob_render::{RenderPassBuilder, ScopedRenderPass, ShaderLibrary};
use tracing::debug_span;
use wgpu::util::DeviceExt;

use crate::error::VolumeError;
use crate::integrator::RayBuffer;
use crate::kernels;
use crate::layout;
use crate::uniforms::UpscaleUniform;

/// How the ray buffer is filtered when stretched over the lit target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpscaleFilter {
    Nearest,
    Linear,
}

impl UpscaleFilter {
    /// Bilinear when the ray buffer is smaller than the target, exact texels otherwise.
    pub fn for_sizes(rays: (u32, u32), lit: (u32, u32)) -> Self {
        if rays == lit { Self::Nearest } else { Self::Linear }
    }
}

pub struct UpscaleCompositor {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    nearest: wgpu::Sampler,
    linear: wgpu::Sampler,
    lit_format: wgpu::TextureFormat,
}

impl UpscaleCompositor {
    /// Build the composite pipeline for lit targets of `lit_format`, which must be blendable.
    pub fn new(
        device: &wgpu::Device,
        library: &ShaderLibrary,
        lit_format: wgpu::TextureFormat,
    ) -> Result<Self, VolumeError> {
        let module = library.require(kernels::UPSCALE)?;
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("upscale-bgl"),
            entries: &[
                layout::filterable(0, fragment, wgpu::TextureViewDimension::D2),
                layout::sampler(1, fragment, wgpu::SamplerBindingType::Filtering),
                layout::uniform::<UpscaleUniform>(2, fragment),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("upscale-layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });
        let blend = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::SrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Zero,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        };
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("upscale-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_fullscreen"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_composite"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: lit_format,
                    blend: Some(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        });

        let sampler = |label: &'static str, filter: wgpu::FilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                ..Default::default()
            })
        };
        Ok(Self {
            layout,
            pipeline,
            nearest: sampler("upscale-nearest", wgpu::FilterMode::Nearest),
            linear: sampler("upscale-linear", wgpu::FilterMode::Linear),
            lit_format,
        })
    }

    pub fn lit_format(&self) -> wgpu::TextureFormat {
        self.lit_format
    }

    /// Blend `rays` over the lit target `lit_view` of `lit_size`.
    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        rays: &RayBuffer,
        lit_view: &wgpu::TextureView,
        lit_size: (u32, u32),
    ) {
        let ray_size = rays.size();
        debug_assert!(
            ray_size.0 <= lit_size.0 && ray_size.1 <= lit_size.1,
            "ray buffer {ray_size:?} larger than lit target {lit_size:?}"
        );
        let filter = UpscaleFilter::for_sizes(ray_size, lit_size);
        let _span = debug_span!("upscale", ?ray_size, ?lit_size, ?filter).entered();

        let uniform = UpscaleUniform {
            inv_target: [
                1.0 / lit_size.0.max(1) as f32,
                1.0 / lit_size.1.max(1) as f32,
                0.0,
                0.0,
            ],
        };
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("upscale-uniform"),
            contents: bytemuck::bytes_of(&uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let sampler = match filter {
            UpscaleFilter::Nearest => &self.nearest,
            UpscaleFilter::Linear => &self.linear,
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("upscale-bg"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&rays.target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffer.as_entire_binding(),
                },
            ],
        });

        let builder = RenderPassBuilder::new().label(kernels::UPSCALE);
        let mut pass = ScopedRenderPass::bind(encoder, &builder, lit_view, &self.pipeline, &[&bind_group]);
        pass.draw(0..3);
        pass.finish();
    }
}

/// Clamp-to-edge fetch of `rays` (`ray_size`) at texture coordinates `uv`.
fn sample_rays(rays: &[[f32; 4]], ray_size: (u32, u32), uv: Vec2, filter: UpscaleFilter) -> Vec4 {
    let size = Vec2::new(ray_size.0 as f32, ray_size.1 as f32);
    let fetch = |x: i32, y: i32| {
        let x = x.clamp(0, ray_size.0 as i32 - 1) as u32;
        let y = y.clamp(0, ray_size.1 as i32 - 1) as u32;
        Vec4::from_array(rays[(y * ray_size.0 + x) as usize])
    };
    match filter {
        UpscaleFilter::Nearest => {
            let p = (uv * size).floor();
            fetch(p.x as i32, p.y as i32)
        }
        UpscaleFilter::Linear => {
            let p = uv * size - Vec2::splat(0.5);
            let base = p.floor();
            let f = p - base;
            let (x, y) = (base.x as i32, base.y as i32);
            let top = fetch(x, y).lerp(fetch(x + 1, y), f.x);
            let bottom = fetch(x, y + 1).lerp(fetch(x + 1, y + 1), f.x);
            top.lerp(bottom, f.y)
        }
    }
}

/// CPU composite: `lit * ray.a + ray.rgb` at every lit pixel, alpha untouched.
pub fn composite_reference(
    lit: &[[f32; 4]],
    lit_size: (u32, u32),
    rays: &[[f32; 4]],
    ray_size: (u32, u32),
) -> Vec<[f32; 4]> {
    let filter = UpscaleFilter::for_sizes(ray_size, lit_size);
    let inv = Vec2::new(1.0 / lit_size.0 as f32, 1.0 / lit_size.1 as f32);
    lit.iter()
        .enumerate()
        .map(|(i, &dst)| {
            let x = i as u32 % lit_size.0;
            let y = i as u32 / lit_size.0;
            let uv = (Vec2::new(x as f32, y as f32) + 0.5) * inv;
            let ray = sample_rays(rays, ray_size, uv, filter);
            [
                dst[0] * ray.w + ray.x,
                dst[1] * ray.w + ray.y,
                dst[2] * ray.w + ray.z,
                dst[3],
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::RAY_CLEAR;
    use crate::kernels::register_builtin_kernels;
    use haboob_render::{RenderTarget, decode_texels, init_gpu_context_blocking, read_texture};

    #[test]
    fn test_filter_choice() {
        assert_eq!(UpscaleFilter::for_sizes((64, 32), (64, 32)), UpscaleFilter::Nearest);
        assert_eq!(UpscaleFilter::for_sizes((32, 16), (64, 32)), UpscaleFilter::Linear);
    }

    #[test]
    fn test_cleared_rays_leave_lit_unchanged() {
        let lit = vec![[0.2, 0.4, 0.6, 1.0]; 8 * 4];
        let rays = vec![RAY_CLEAR; 4 * 2];
        assert_eq!(composite_reference(&lit, (8, 4), &rays, (4, 2)), lit);
    }

    #[test]
    fn test_equal_sizes_use_exact_texels() {
        let lit = vec![[1.0; 4]; 4];
        let rays = vec![
            [0.5, 0.0, 0.0, 0.5],
            [0.0, 0.5, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
            [0.1, 0.2, 0.3, 0.25],
        ];
        let out = composite_reference(&lit, (2, 2), &rays, (2, 2));
        assert_eq!(out[0], [1.0, 0.5, 0.5, 1.0]);
        assert_eq!(out[1], [0.0, 0.5, 0.0, 1.0]);
        assert_eq!(out[2], [1.0, 1.0, 1.0, 1.0]);
        for (got, want) in out[3].iter().zip([0.35, 0.45, 0.55, 1.0]) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_half_resolution_is_interpolated() {
        let lit = vec![[0.0, 0.0, 0.0, 1.0]; 4];
        let rays = vec![[0.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0, 1.0]];
        let out = composite_reference(&lit, (4, 1), &rays, (2, 1));
        assert!(out[0][0] < out[1][0] && out[1][0] < out[2][0] && out[2][0] < out[3][0]);
        assert_eq!(out[0][0], 0.0);
        assert_eq!(out[3][0], 1.0);
    }

    #[test]
    fn test_gpu_composite_matches_reference() {
        let Ok(gpu) = init_gpu_context_blocking() else {
            return;
        };
        let format = wgpu::TextureFormat::Rgba16Float;
        let mut library = ShaderLibrary::new();
        register_builtin_kernels(&mut library, &gpu.device).unwrap();
        let compositor = UpscaleCompositor::new(&gpu.device, &library, format).unwrap();
        let rays = RayBuffer::new(&gpu.device, 16, 8).unwrap();
        let lit = RenderTarget::new(
            &gpu.device,
            "upscale-test-lit",
            32,
            16,
            format,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        )
        .unwrap();

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        RenderPassBuilder::new()
            .clear_color(wgpu::Color {
                r: 0.25,
                g: 0.5,
                b: 0.75,
                a: 0.5,
            })
            .clear(&mut encoder, &rays.target.view);
        RenderPassBuilder::new()
            .clear_color(wgpu::Color {
                r: 1.0,
                g: 1.0,
                b: 1.0,
                a: 1.0,
            })
            .clear(&mut encoder, &lit.view);
        compositor.record(&gpu.device, &mut encoder, &rays, &lit.view, lit.size());
        gpu.queue.submit([encoder.finish()]);

        let bytes = read_texture(&gpu.device, &gpu.queue, &lit.texture).unwrap();
        let texels = decode_texels(format, &bytes).unwrap();
        let expected = composite_reference(
            &vec![[1.0; 4]; 32 * 16],
            (32, 16),
            &vec![[0.25, 0.5, 0.75, 0.5]; 16 * 8],
            (16, 8),
        );
        for (got, want) in texels.iter().zip(&expected) {
            for c in 0..4 {
                assert!((got[c] - want[c]).abs() < 2e-3, "{got:?} vs {want:?}");
            }
        }
    }
}
