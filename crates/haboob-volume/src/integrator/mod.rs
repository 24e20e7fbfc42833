//! The raymarch integrator: spectral single scattering through the density field,
//! written into a reduced-resolution ray buffer.
//!
//! Each covered pixel ends up holding in-scattered radiance in rgb and view
//! transmittance in alpha, so compositing is `lit * a + rgb`.

mod march;

pub use march::{MarchInputs, march_image, march_ray};

use haboob_lighting::LightUniform;
use haboob_render::{CameraUniform, RenderPassBuilder, RenderTarget, ScopedRenderPass, ShaderLibrary};
use tracing::debug_span;

use crate::density::DensityField;
use crate::error::{VolumeError, capture_allocation};
use crate::interval::IntervalBuffer;
use crate::kernels;
use crate::layout;
use crate::shadow::BeerShadowMap;
use crate::uniforms::{OpticsUniform, VolumeUniform};

/// Ray-buffer texel where nothing was marched: no radiance, full transmittance.
pub const RAY_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Mip levels above the sampling level at which the max-density channel is
/// tested for empty space. Matches `raymarch.wgsl`.
pub const EMPTY_SPACE_LOD_BIAS: f32 = 2.0;

/// The reduced-resolution radiance/transmittance target.
pub struct RayBuffer {
    pub target: RenderTarget,
}

impl RayBuffer {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self, VolumeError> {
        let target = capture_allocation(device, "ray buffer", || {
            RenderTarget::new(
                device,
                "volume-ray-buffer",
                width,
                height,
                Self::FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
            )
            .map_err(|source| VolumeError::TargetTooLarge {
                what: "ray buffer",
                source,
            })
        })?;
        Ok(Self { target })
    }

    pub fn size(&self) -> (u32, u32) {
        self.target.size()
    }

    pub fn clear_color() -> wgpu::Color {
        let [r, g, b, a] = RAY_CLEAR;
        wgpu::Color {
            r: f64::from(r),
            g: f64::from(g),
            b: f64::from(b),
            a: f64::from(a),
        }
    }
}

/// Per-frame inputs of [`RaymarchIntegrator::record`].
pub struct MarchResources<'a> {
    pub camera: &'a wgpu::Buffer,
    pub volume: &'a wgpu::Buffer,
    pub optics: &'a wgpu::Buffer,
    pub light: &'a wgpu::Buffer,
    pub density: &'a DensityField,
    pub intervals: &'a IntervalBuffer,
    pub shadow: &'a BeerShadowMap,
}

pub struct RaymarchIntegrator {
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    density_sampler: wgpu::Sampler,
    shadow_sampler: wgpu::Sampler,
}

impl RaymarchIntegrator {
    pub fn new(device: &wgpu::Device, library: &ShaderLibrary) -> Result<Self, VolumeError> {
        let module = library.require(kernels::RAYMARCH)?;
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("raymarch-uniform-bgl"),
            entries: &[
                layout::uniform::<CameraUniform>(0, fragment),
                layout::uniform::<VolumeUniform>(1, fragment),
                layout::uniform::<OpticsUniform>(2, fragment),
                layout::uniform::<LightUniform>(3, fragment),
            ],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("raymarch-texture-bgl"),
            entries: &[
                layout::filterable(0, fragment, wgpu::TextureViewDimension::D3),
                layout::sampler(1, fragment, wgpu::SamplerBindingType::Filtering),
                layout::unfilterable_2d(2, fragment),
                layout::filterable(3, fragment, wgpu::TextureViewDimension::D2),
                layout::sampler(4, fragment, wgpu::SamplerBindingType::Filtering),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("raymarch-layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            immediate_size: 0,
        });

        // Radiance adds up; transmittance multiplies into the cleared 1.
        let blend = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Zero,
                dst_factor: wgpu::BlendFactor::SrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
        };
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("raymarch-pipeline"),
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
                entry_point: Some("fs_march"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: RayBuffer::FORMAT,
                    blend: Some(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        });

        let density_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("raymarch-density-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("raymarch-shadow-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Ok(Self {
            uniform_layout,
            texture_layout,
            pipeline,
            density_sampler,
            shadow_sampler,
        })
    }

    /// Clear `rays` and march every covered pixel into it.
    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        rays: &RayBuffer,
        resources: &MarchResources<'_>,
    ) {
        let (width, height) = rays.size();
        let _span = debug_span!("raymarch", width, height).entered();
        let uniforms = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("raymarch-uniform-bg"),
            layout: &self.uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: resources.camera.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: resources.volume.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resources.optics.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: resources.light.as_entire_binding(),
                },
            ],
        });
        let textures = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("raymarch-texture-bg"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&resources.density.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.density_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&resources.intervals.target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&resources.shadow.target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.shadow_sampler),
                },
            ],
        });

        let builder = RenderPassBuilder::new()
            .label(kernels::RAYMARCH)
            .clear_color(RayBuffer::clear_color());
        let mut pass = ScopedRenderPass::bind(
            encoder,
            &builder,
            &rays.target.view,
            &self.pipeline,
            &[&uniforms, &textures],
        );
        pass.draw(0..3);
        pass.finish();
    }
}
