//! Frame orchestration: owns the volume's GPU resources and records its passes.
//!
//! One [`VolumeRenderer::render`] call records, into the caller's encoder and in
//! this order: density rebuild (when parameters changed), Beer shadow rebuild
//! (when the light, optics or density changed), interval culling, the raymarch
//! and the composite into the lit target.

use glam::Vec3;
use haboob_lighting::{DirectionalLight, LightUniform};
use haboob_render::{Camera, CameraUniform, ShaderLibrary, scaled_extent};
use tracing::{debug, info, warn};

use crate::density::{DensityField, DensityParams, DensitySynthesizer};
use crate::error::VolumeError;
use crate::integrator::{MarchResources, RayBuffer, RaymarchIntegrator};
use crate::interval::{IntervalBuffer, IntervalCuller, IntervalInputs};
use crate::params::{MarchParams, VolumeParams};
use crate::proxy::{ProxyParams, VolumeProxy};
use crate::shadow::{
    BeerShadowBuilder, BeerShadowMap, ShadowInputs, direction_changed, shadow_light_space,
};
use crate::spectral::{OpticsParams, SpectralOpticalModel};
use crate::uniforms::{OpticsUniform, VolumeUniform};
use crate::upscale::UpscaleCompositor;

/// Fixed per-renderer settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RendererSettings {
    /// Ray buffer size relative to the lit target, in `(0, 1]`.
    pub ray_scale: f32,
    pub shadow_resolution: u32,
    /// Format of the lit targets passed to [`VolumeRenderer::render`].
    pub lit_format: wgpu::TextureFormat,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            ray_scale: 0.5,
            shadow_resolution: 256,
            lit_format: wgpu::TextureFormat::Rgba16Float,
        }
    }
}

/// Everything a frame borrows from the host renderer.
pub struct FrameContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// Reverse-Z scene depth (`Depth32Float`).
    pub scene_depth: &'a wgpu::TextureView,
    pub lit_view: &'a wgpu::TextureView,
    pub lit_size: (u32, u32),
    pub camera: &'a Camera,
    pub light: &'a DirectionalLight,
}

/// What a frame did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    pub camera_inside: bool,
    pub density_rebuilt: bool,
    pub shadow_rebuilt: bool,
    pub ray_size: (u32, u32),
}

struct FrameTargets {
    lit_size: (u32, u32),
    intervals: IntervalBuffer,
    rays: RayBuffer,
}

impl FrameTargets {
    fn new(device: &wgpu::Device, lit_size: (u32, u32), ray_scale: f32) -> Result<Self, VolumeError> {
        let ray_size = scaled_extent(lit_size.0, lit_size.1, ray_scale);
        let intervals = IntervalBuffer::new(device, ray_size.0, ray_size.1)?;
        let rays = RayBuffer::new(device, ray_size.0, ray_size.1)?;
        debug!(?ray_size, ?lit_size, "volume targets allocated");
        Ok(Self {
            lit_size,
            intervals,
            rays,
        })
    }
}

struct UniformBuffers {
    camera: wgpu::Buffer,
    volume: wgpu::Buffer,
    optics: wgpu::Buffer,
    light: wgpu::Buffer,
}

impl UniformBuffers {
    fn new(device: &wgpu::Device) -> Self {
        let buffer = |label: &'static str, size: usize| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        Self {
            camera: buffer("volume-camera-uniform", std::mem::size_of::<CameraUniform>()),
            volume: buffer("volume-uniform", std::mem::size_of::<VolumeUniform>()),
            optics: buffer("volume-optics-uniform", std::mem::size_of::<OpticsUniform>()),
            light: buffer("volume-light-uniform", std::mem::size_of::<LightUniform>()),
        }
    }
}

/// The haboob volume: density, optics, proxy and the passes that draw them.
pub struct VolumeRenderer {
    settings: RendererSettings,
    synthesizer: DensitySynthesizer,
    culler: IntervalCuller,
    shadow_builder: BeerShadowBuilder,
    integrator: RaymarchIntegrator,
    compositor: UpscaleCompositor,

    density: DensityField,
    density_params: DensityParams,
    density_dirty: bool,
    march: MarchParams,
    optics: SpectralOpticalModel,
    proxy_params: ProxyParams,
    proxy: VolumeProxy,

    shadow: BeerShadowMap,
    shadow_dirty: bool,
    shadow_direction: Vec3,
    targets: Option<FrameTargets>,
    uniforms: UniformBuffers,
}

impl VolumeRenderer {
    /// Build the pipelines and synthesize the initial density field.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        library: &ShaderLibrary,
        settings: RendererSettings,
        params: &VolumeParams,
    ) -> Result<Self, VolumeError> {
        let synthesizer = DensitySynthesizer::new(device, library)?;
        let culler = IntervalCuller::new(device, library)?;
        let shadow_builder = BeerShadowBuilder::new(device, library)?;
        let integrator = RaymarchIntegrator::new(device, library)?;
        let compositor = UpscaleCompositor::new(device, library, settings.lit_format)?;

        let density = synthesize_now(device, queue, &synthesizer, &params.density)?;
        let proxy = VolumeProxy::new(&params.proxy);
        let shadow_direction = haboob_lighting::DEFAULT_LIGHT_DIRECTION;
        let light_space = shadow_light_space(shadow_direction, &proxy, settings.shadow_resolution);
        let shadow = BeerShadowMap::new(device, settings.shadow_resolution, light_space)?;
        info!(
            size = ?params.density.size,
            ray_scale = settings.ray_scale,
            shadow_resolution = settings.shadow_resolution,
            "volume renderer ready"
        );

        Ok(Self {
            settings,
            synthesizer,
            culler,
            shadow_builder,
            integrator,
            compositor,
            density,
            density_params: params.density,
            density_dirty: false,
            march: params.march,
            optics: SpectralOpticalModel::new(params.optics),
            proxy_params: params.proxy,
            proxy,
            shadow,
            shadow_dirty: true,
            shadow_direction,
            targets: None,
            uniforms: UniformBuffers::new(device),
        })
    }

    /// Resynthesize the density field on a private encoder and submit it.
    ///
    /// On failure the previous field stays bound.
    pub fn rebuild_density(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        params: &DensityParams,
    ) -> Result<(), VolumeError> {
        let field = synthesize_now(device, queue, &self.synthesizer, params)?;
        self.density = field;
        self.density_params = *params;
        self.density_dirty = false;
        self.shadow_dirty = true;
        Ok(())
    }

    /// Reallocate the interval and ray buffers for a lit target of `width`×`height`.
    ///
    /// On failure the previous buffers stay bound.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<(), VolumeError> {
        self.targets = Some(FrameTargets::new(device, (width, height), self.settings.ray_scale)?);
        Ok(())
    }

    /// Record the volume's passes for one frame into `frame.encoder`.
    pub fn render(&mut self, frame: &mut FrameContext<'_>) -> Result<FrameReport, VolumeError> {
        let density_rebuilt = self.refresh_density(frame)?;

        let lit_size = frame.lit_size;
        let targets = match self.targets.take() {
            Some(targets) if targets.lit_size == lit_size => targets,
            previous => match FrameTargets::new(frame.device, lit_size, self.settings.ray_scale) {
                Ok(targets) => targets,
                Err(err) => {
                    self.targets = previous;
                    return Err(err);
                }
            },
        };
        let ray_size = targets.rays.size();

        let direction = frame.light.effective_direction();
        if direction_changed(self.shadow_direction, direction) {
            self.shadow_dirty = true;
        }
        let shadow_rebuilt = self.shadow_dirty;
        if shadow_rebuilt {
            let space = shadow_light_space(frame.light.direction, &self.proxy, self.shadow.resolution());
            self.shadow.set_light_space(space);
            self.shadow_direction = direction;
        }

        let camera_inside = self.proxy.camera_inside(frame.camera.position, frame.camera.near);
        let volume_uniform = VolumeUniform::new(
            &self.proxy,
            self.density.size(),
            self.density.mip_level_count(),
            &self.march,
            camera_inside,
        );
        let queue = frame.queue;
        queue.write_buffer(
            &self.uniforms.camera,
            0,
            bytemuck::bytes_of(&frame.camera.to_uniform(ray_size.0, ray_size.1)),
        );
        queue.write_buffer(&self.uniforms.volume, 0, bytemuck::bytes_of(&volume_uniform));
        queue.write_buffer(&self.uniforms.optics, 0, bytemuck::bytes_of(&self.optics.to_uniform()));
        queue.write_buffer(
            &self.uniforms.light,
            0,
            bytemuck::bytes_of(&frame.light.to_uniform(self.shadow.light_space())),
        );

        if shadow_rebuilt {
            self.shadow_builder.record(
                frame.device,
                frame.encoder,
                &self.shadow,
                &ShadowInputs {
                    volume: &self.uniforms.volume,
                    optics: &self.uniforms.optics,
                    light: &self.uniforms.light,
                    density: &self.density,
                    iterations: self.march.effective_shadow_iterations(),
                },
            );
            self.shadow_dirty = false;
        }

        self.culler.record(
            frame.device,
            frame.encoder,
            &targets.intervals,
            &IntervalInputs {
                camera: &self.uniforms.camera,
                volume: &self.uniforms.volume,
                scene_depth: frame.scene_depth,
                camera_inside,
            },
        );
        self.integrator.record(
            frame.device,
            frame.encoder,
            &targets.rays,
            &MarchResources {
                camera: &self.uniforms.camera,
                volume: &self.uniforms.volume,
                optics: &self.uniforms.optics,
                light: &self.uniforms.light,
                density: &self.density,
                intervals: &targets.intervals,
                shadow: &self.shadow,
            },
        );
        self.compositor
            .record(frame.device, frame.encoder, &targets.rays, frame.lit_view, lit_size);
        self.targets = Some(targets);

        Ok(FrameReport {
            camera_inside,
            density_rebuilt,
            shadow_rebuilt,
            ray_size,
        })
    }

    /// Record a pending density rebuild into the frame encoder.
    fn refresh_density(&mut self, frame: &mut FrameContext<'_>) -> Result<bool, VolumeError> {
        if !self.density_dirty {
            return Ok(false);
        }
        self.density_dirty = false;
        match self
            .synthesizer
            .synthesize(frame.device, frame.encoder, &self.density_params)
        {
            Ok(field) => {
                self.density = field;
                self.shadow_dirty = true;
                Ok(true)
            }
            Err(err) => {
                warn!(%err, "density rebuild failed, keeping the previous field");
                self.density_params = *self.density.params();
                Err(err)
            }
        }
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn march_params(&self) -> &MarchParams {
        &self.march
    }

    pub fn set_march_params(&mut self, params: MarchParams) {
        if params.effective_shadow_iterations() != self.march.effective_shadow_iterations() {
            self.shadow_dirty = true;
        }
        self.march = params;
    }

    pub fn optics_params(&self) -> &OpticsParams {
        self.optics.params()
    }

    /// Replace the optics and rebuild the quadrature tables.
    pub fn set_optics_params(&mut self, params: OpticsParams) {
        if params.attenuation != self.optics.params().attenuation {
            self.shadow_dirty = true;
        }
        self.optics = SpectralOpticalModel::new(params);
    }

    pub fn spectral_model(&self) -> &SpectralOpticalModel {
        &self.optics
    }

    pub fn density_params(&self) -> &DensityParams {
        &self.density_params
    }

    /// Queue a density rebuild for the next [`render`](Self::render).
    pub fn set_density_params(&mut self, params: DensityParams) {
        if params != self.density_params {
            self.density_params = params;
            self.density_dirty = true;
        }
    }

    pub fn density(&self) -> &DensityField {
        &self.density
    }

    pub fn proxy_params(&self) -> &ProxyParams {
        &self.proxy_params
    }

    pub fn set_proxy_params(&mut self, params: ProxyParams) {
        self.proxy_params = params;
        self.proxy = VolumeProxy::new(&params);
        self.shadow_dirty = true;
    }

    pub fn proxy(&self) -> &VolumeProxy {
        &self.proxy
    }

    pub fn shadow_map(&self) -> &BeerShadowMap {
        &self.shadow
    }

    /// The interval buffer of the last frame, once targets exist.
    pub fn interval_buffer(&self) -> Option<&IntervalBuffer> {
        self.targets.as_ref().map(|t| &t.intervals)
    }

    /// The ray buffer of the last frame, once targets exist.
    pub fn ray_buffer(&self) -> Option<&RayBuffer> {
        self.targets.as_ref().map(|t| &t.rays)
    }
}

/// Synthesize `params` on a private encoder and submit it.
fn synthesize_now(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    synthesizer: &DensitySynthesizer,
    params: &DensityParams,
) -> Result<DensityField, VolumeError> {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("volume-density-rebuild"),
    });
    let field = synthesizer.synthesize(device, &mut encoder, params)?;
    queue.submit([encoder.finish()]);
    info!(size = ?params.size, mips = field.mip_level_count(), "density field rebuilt");
    Ok(field)
}
