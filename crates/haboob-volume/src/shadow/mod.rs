//! Beer shadow map: optical depth from the light into the volume, stored in an
//! orthographic light-space texture so the integrator can look up how much dust
//! sits between any sample and the sun.

mod reference;

pub use reference::{BeerShadowReference, MISS_TEXEL, beer_lookup, optical_depth_reference};

use glam::Vec3;
use haboob_lighting::{LightSpace, LightUniform, fit_light_space, sanitize_direction};
use haboob_render::{RenderTarget, ScopedComputePass, ShaderLibrary, workgroup_count};
use tracing::{debug_span, warn};

use crate::density::DensityField;
use crate::density::field::compute_pipeline;
use crate::error::{VolumeError, capture_allocation};
use crate::kernels;
use crate::layout;
use crate::proxy::VolumeProxy;
use crate::uniforms::{OpticsUniform, ShadowUniform, VolumeUniform};

const SHADOW_WORKGROUP: [u32; 3] = [8, 8, 1];

/// Direction change below which the shadow map is kept.
pub const DIRECTION_EPSILON: f32 = 1e-5;

/// Light-space projection for `direction` fitted around `proxy`.
///
/// A zero or non-finite direction is replaced by straight down, with a warning.
pub fn shadow_light_space(direction: Vec3, proxy: &VolumeProxy, resolution: u32) -> LightSpace {
    let (_, substituted) = sanitize_direction(direction);
    if substituted {
        warn!(?direction, "degenerate light direction, shadowing from straight above");
    }
    let (center, radius) = proxy.bounding_sphere();
    fit_light_space(direction, center, radius, resolution)
}

/// Whether a light moving from `previous` to `next` invalidates the shadow map.
pub fn direction_changed(previous: Vec3, next: Vec3) -> bool {
    let (a, _) = sanitize_direction(previous);
    let (b, _) = sanitize_direction(next);
    (a - b).abs().max_element() > DIRECTION_EPSILON
}

/// The shadow texture and the light space it was rendered in.
pub struct BeerShadowMap {
    pub target: RenderTarget,
    light_space: LightSpace,
}

impl BeerShadowMap {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

    pub fn new(device: &wgpu::Device, resolution: u32, light_space: LightSpace) -> Result<Self, VolumeError> {
        let target = capture_allocation(device, "beer shadow map", || {
            RenderTarget::new(
                device,
                "volume-beer-shadow",
                resolution,
                resolution,
                Self::FORMAT,
                wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
            )
            .map_err(|source| VolumeError::TargetTooLarge {
                what: "beer shadow map",
                source,
            })
        })?;
        Ok(Self { target, light_space })
    }

    pub fn resolution(&self) -> u32 {
        self.target.width()
    }

    pub fn light_space(&self) -> &LightSpace {
        &self.light_space
    }

    pub fn set_light_space(&mut self, light_space: LightSpace) {
        self.light_space = light_space;
    }
}

/// Compute pipeline that fills a [`BeerShadowMap`].
pub struct BeerShadowBuilder {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    sampler: wgpu::Sampler,
}

/// Per-rebuild inputs of [`BeerShadowBuilder::record`].
pub struct ShadowInputs<'a> {
    pub volume: &'a wgpu::Buffer,
    pub optics: &'a wgpu::Buffer,
    pub light: &'a wgpu::Buffer,
    pub density: &'a DensityField,
    pub iterations: u32,
}

impl BeerShadowBuilder {
    pub fn new(device: &wgpu::Device, library: &ShaderLibrary) -> Result<Self, VolumeError> {
        let module = library.require(kernels::BEER_SHADOW)?;
        let compute = wgpu::ShaderStages::COMPUTE;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("beer-shadow-bgl"),
            entries: &[
                layout::uniform::<VolumeUniform>(0, compute),
                layout::uniform::<OpticsUniform>(1, compute),
                layout::uniform::<LightUniform>(2, compute),
                layout::uniform::<ShadowUniform>(3, compute),
                layout::filterable(4, compute, wgpu::TextureViewDimension::D3),
                layout::sampler(5, compute, wgpu::SamplerBindingType::Filtering),
                layout::storage(6, BeerShadowMap::FORMAT, wgpu::TextureViewDimension::D2),
            ],
        });
        let pipeline = compute_pipeline(device, "beer-shadow-pipeline", &layout, &module, "build");
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("beer-shadow-density-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });
        Ok(Self {
            layout,
            pipeline,
            sampler,
        })
    }

    /// Record the shadow pass into `encoder`.
    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        map: &BeerShadowMap,
        inputs: &ShadowInputs<'_>,
    ) {
        use wgpu::util::DeviceExt;

        let resolution = map.resolution();
        let _span = debug_span!("beer-shadow", resolution, iterations = inputs.iterations).entered();
        let uniform = ShadowUniform {
            params: [resolution, inputs.iterations.max(1), 0, 0],
        };
        let shadow_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("beer-shadow-uniform"),
            contents: bytemuck::bytes_of(&uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("beer-shadow-bg"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: inputs.volume.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: inputs.optics.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: inputs.light.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: shadow_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&inputs.density.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(&map.target.view),
                },
            ],
        });
        let mut pass = ScopedComputePass::bind(encoder, kernels::BEER_SHADOW, &self.pipeline, &[&bind_group]);
        pass.dispatch(workgroup_count([resolution, resolution, 1], SHADOW_WORKGROUP));
        pass.finish();
    }
}
