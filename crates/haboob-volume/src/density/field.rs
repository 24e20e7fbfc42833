//! GPU density field: a mip-chained 3-D texture written by compute kernels.

use haboob_render::{ScopedComputePass, ShaderLibrary, mip_level_count_3d, workgroup_count};
use tracing::{debug, debug_span};
use wgpu::util::DeviceExt;

use super::DensityParams;
use super::grid::validate_size;
use crate::error::{VolumeError, capture_allocation};
use crate::kernels;
use crate::layout;
use crate::uniforms::SynthesisUniform;

/// Texel format of the density texture.
pub const DENSITY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Workgroup size of the synthesis and mip kernels.
pub const SYNTHESIS_WORKGROUP: [u32; 3] = [4, 4, 4];

/// The density texture and the parameters it was built from.
pub struct DensityField {
    pub texture: wgpu::Texture,
    /// All mip levels, for sampling.
    pub view: wgpu::TextureView,
    params: DensityParams,
    mip_level_count: u32,
}

impl DensityField {
    pub fn params(&self) -> &DensityParams {
        &self.params
    }

    pub fn size(&self) -> [u32; 3] {
        self.params.size
    }

    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }
}

/// Compute pipelines that fill a [`DensityField`].
pub struct DensitySynthesizer {
    synthesis_pipeline: wgpu::ComputePipeline,
    synthesis_layout: wgpu::BindGroupLayout,
    mip_pipeline: wgpu::ComputePipeline,
    mip_layout: wgpu::BindGroupLayout,
}

impl DensitySynthesizer {
    pub fn new(device: &wgpu::Device, library: &ShaderLibrary) -> Result<Self, VolumeError> {
        let synthesis_module = library.require(kernels::VOLUME_SYNTHESIS)?;
        let mip_module = library.require(kernels::VOLUME_MIPS)?;

        let synthesis_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("volume-synthesis-bgl"),
            entries: &[
                layout::uniform::<SynthesisUniform>(0, wgpu::ShaderStages::COMPUTE),
                layout::storage(1, DENSITY_FORMAT, wgpu::TextureViewDimension::D3),
            ],
        });
        let mip_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("volume-mips-bgl"),
            entries: &[
                layout::texture(
                    0,
                    wgpu::ShaderStages::COMPUTE,
                    wgpu::TextureViewDimension::D3,
                    wgpu::TextureSampleType::Float { filterable: false },
                ),
                layout::storage(1, DENSITY_FORMAT, wgpu::TextureViewDimension::D3),
            ],
        });

        let synthesis_pipeline = compute_pipeline(
            device,
            "volume-synthesis-pipeline",
            &synthesis_layout,
            &synthesis_module,
            "synthesize",
        );
        let mip_pipeline = compute_pipeline(
            device,
            "volume-mips-pipeline",
            &mip_layout,
            &mip_module,
            "downsample",
        );

        Ok(Self {
            synthesis_pipeline,
            synthesis_layout,
            mip_pipeline,
            mip_layout,
        })
    }

    /// Allocate a new field for `params` and record its synthesis and mip passes.
    ///
    /// Nothing is recorded when the size is rejected or the device cannot
    /// allocate the texture.
    pub fn synthesize(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        params: &DensityParams,
    ) -> Result<DensityField, VolumeError> {
        let limit = device.limits().max_texture_dimension_3d;
        validate_size(params.size, limit)?;
        let [w, h, d] = params.size;
        let mip_level_count = mip_level_count_3d(w, h, d);
        let _span = debug_span!("volume-synthesis", size = ?params.size, mips = mip_level_count).entered();

        let texture = capture_allocation(device, "density field", || {
            Ok(device.create_texture(&wgpu::TextureDescriptor {
                label: Some("volume-density"),
                size: wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: d,
                },
                mip_level_count,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D3,
                format: DENSITY_FORMAT,
                usage: wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            }))
        })?;
        let level_view = |level: u32| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("volume-density-level"),
                base_mip_level: level,
                mip_level_count: Some(1),
                ..Default::default()
            })
        };

        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("volume-synthesis-uniform"),
            contents: bytemuck::bytes_of(&params.to_uniform()),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let base_view = level_view(0);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("volume-synthesis-bg"),
            layout: &self.synthesis_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&base_view),
                },
            ],
        });
        let mut pass = ScopedComputePass::bind(
            encoder,
            kernels::VOLUME_SYNTHESIS,
            &self.synthesis_pipeline,
            &[&bind_group],
        );
        pass.dispatch(workgroup_count(params.size, SYNTHESIS_WORKGROUP));
        pass.finish();

        for level in 1..mip_level_count {
            let source = level_view(level - 1);
            let destination = level_view(level);
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("volume-mips-bg"),
                layout: &self.mip_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&source),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&destination),
                    },
                ],
            });
            let extent = [
                (w >> level).max(1),
                (h >> level).max(1),
                (d >> level).max(1),
            ];
            let mut pass =
                ScopedComputePass::bind(encoder, kernels::VOLUME_MIPS, &self.mip_pipeline, &[&bind_group]);
            pass.dispatch(workgroup_count(extent, SYNTHESIS_WORKGROUP));
            pass.finish();
        }
        debug!("density passes recorded");

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("volume-density-view"),
            ..Default::default()
        });
        Ok(DensityField {
            texture,
            view,
            params: *params,
            mip_level_count,
        })
    }
}

pub(crate) fn compute_pipeline(
    device: &wgpu::Device,
    label: &'static str,
    bind_group_layout: &wgpu::BindGroupLayout,
    module: &wgpu::ShaderModule,
    entry_point: &'static str,
) -> wgpu::ComputePipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bind_group_layout],
        immediate_size: 0,
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}
