//! Screen-space ray intervals: where each ray-buffer pixel enters and leaves the proxy.
//!
//! The interval buffer holds, per pixel, the reverse-Z depth of the entry point
//! (red), the exit point clipped against the scene (green) and the pixel's NDC
//! (blue, alpha). Negative depth means "no entry" or "no exit".

mod reference;

pub use reference::{IntervalImage, SceneDepth, cull_reference, pixel_ndc};

use haboob_render::{
    CameraUniform, RenderPassBuilder, RenderTarget, ScopedRenderPass, ShaderLibrary,
};
use tracing::debug_span;

use crate::error::{VolumeError, capture_allocation};
use crate::kernels;
use crate::layout;
use crate::uniforms::VolumeUniform;

/// Clear value when the camera is outside the proxy: no entry, no exit.
pub const OUTSIDE_CLEAR: [f32; 4] = [-1.0, -1.0, 0.0, 0.0];
/// Clear value when the camera may be inside: rays start at the near plane.
pub const INSIDE_CLEAR: [f32; 4] = [1.0, -1.0, 0.0, 0.0];

/// Vertices of the 12 proxy triangles.
const CUBE_VERTEX_COUNT: u32 = 36;

/// The interval render target.
pub struct IntervalBuffer {
    pub target: RenderTarget,
}

impl IntervalBuffer {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self, VolumeError> {
        let target = capture_allocation(device, "interval buffer", || {
            RenderTarget::new(
                device,
                "volume-interval",
                width,
                height,
                Self::FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
            )
            .map_err(|source| VolumeError::TargetTooLarge {
                what: "interval buffer",
                source,
            })
        })?;
        Ok(Self { target })
    }

    pub fn clear_color(camera_inside: bool) -> wgpu::Color {
        let [r, g, b, a] = if camera_inside { INSIDE_CLEAR } else { OUTSIDE_CLEAR };
        wgpu::Color {
            r: f64::from(r),
            g: f64::from(g),
            b: f64::from(b),
            a: f64::from(a),
        }
    }
}

/// Front- and back-face pipelines of the cull pass.
pub struct IntervalCuller {
    layout: wgpu::BindGroupLayout,
    front_pipeline: wgpu::RenderPipeline,
    back_pipeline: wgpu::RenderPipeline,
}

/// Per-frame inputs of [`IntervalCuller::record`].
pub struct IntervalInputs<'a> {
    pub camera: &'a wgpu::Buffer,
    pub volume: &'a wgpu::Buffer,
    pub scene_depth: &'a wgpu::TextureView,
    pub camera_inside: bool,
}

impl IntervalCuller {
    pub fn new(device: &wgpu::Device, library: &ShaderLibrary) -> Result<Self, VolumeError> {
        let module = library.require(kernels::INTERVAL_CULL)?;
        let stages = wgpu::ShaderStages::VERTEX_FRAGMENT;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("interval-cull-bgl"),
            entries: &[
                layout::uniform::<CameraUniform>(0, stages),
                layout::uniform::<VolumeUniform>(1, stages),
                layout::depth_2d(2, wgpu::ShaderStages::FRAGMENT),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("interval-cull-layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });

        let pipeline = |label: &'static str, cull: wgpu::Face, entry: &'static str, mask: wgpu::ColorWrites| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_cube"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(cull),
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: IntervalBuffer::FORMAT,
                        blend: None,
                        write_mask: mask,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview_mask: None,
                cache: None,
            })
        };

        // Front faces write the entry depth only; back faces the exit and the NDC.
        let front_pipeline = pipeline(
            "interval-front-pipeline",
            wgpu::Face::Back,
            "fs_front",
            wgpu::ColorWrites::RED,
        );
        let back_pipeline = pipeline(
            "interval-back-pipeline",
            wgpu::Face::Front,
            "fs_back",
            wgpu::ColorWrites::GREEN | wgpu::ColorWrites::BLUE | wgpu::ColorWrites::ALPHA,
        );

        Ok(Self {
            layout,
            front_pipeline,
            back_pipeline,
        })
    }

    /// Clear `buffer` and rasterize the proxy into it.
    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        buffer: &IntervalBuffer,
        inputs: &IntervalInputs<'_>,
    ) {
        let _span = debug_span!("interval-cull", inside = inputs.camera_inside).entered();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("interval-cull-bg"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: inputs.camera.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: inputs.volume.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(inputs.scene_depth),
                },
            ],
        });

        let builder = RenderPassBuilder::new()
            .label(kernels::INTERVAL_CULL)
            .clear_color(IntervalBuffer::clear_color(inputs.camera_inside));
        let mut pass = ScopedRenderPass::bind(
            encoder,
            &builder,
            &buffer.target.view,
            &self.front_pipeline,
            &[&bind_group],
        );
        // From inside, the front faces are behind the near plane or missing.
        if !inputs.camera_inside {
            pass.draw(0..CUBE_VERTEX_COUNT);
        }
        pass.set_pipeline(&self.back_pipeline);
        pass.draw(0..CUBE_VERTEX_COUNT);
        pass.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::register_builtin_kernels;
    use crate::proxy::{ProxyParams, VolumeProxy};
    use glam::Vec3;
    use haboob_render::{Camera, DepthBuffer, Projection, decode_texels, init_gpu_context_blocking, read_texture};
    use wgpu::util::DeviceExt;

    #[test]
    fn test_clear_colors() {
        assert_eq!(IntervalBuffer::clear_color(false).r, -1.0);
        assert_eq!(IntervalBuffer::clear_color(true).r, 1.0);
        assert_eq!(IntervalBuffer::clear_color(true).g, -1.0);
    }

    const SIZE: (u32, u32) = (64, 48);

    fn test_camera() -> Camera {
        Camera::look_at(
            Vec3::new(2.5, 1.5, 6.0),
            Vec3::ZERO,
            Projection::Perspective {
                fov_y: 45f32.to_radians(),
                aspect_ratio: SIZE.0 as f32 / SIZE.1 as f32,
            },
        )
    }

    fn test_proxy() -> VolumeProxy {
        VolumeProxy::new(&ProxyParams {
            scale: [2.0, 1.0, 2.0],
            ..ProxyParams::default()
        })
    }

    /// Run the cull passes against a scene depth cleared to `scene_depth`.
    fn cull_on_gpu(scene_depth: f32) -> Option<Vec<[f32; 4]>> {
        let gpu = init_gpu_context_blocking().ok()?;
        let mut library = ShaderLibrary::new();
        register_builtin_kernels(&mut library, &gpu.device).unwrap();
        let culler = IntervalCuller::new(&gpu.device, &library).unwrap();

        let (camera, proxy) = (test_camera(), test_proxy());
        let camera_uniform = camera.to_uniform(SIZE.0, SIZE.1);
        let volume_uniform = VolumeUniform {
            world_from_local: proxy.world_from_local().to_cols_array_2d(),
            local_from_world: proxy.local_from_world().to_cols_array_2d(),
            ..bytemuck::Zeroable::zeroed()
        };
        let camera_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: None,
            contents: bytemuck::bytes_of(&camera_uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let volume_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: None,
            contents: bytemuck::bytes_of(&volume_uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let depth = DepthBuffer::new(&gpu.device, SIZE.0, SIZE.1);
        let buffer = IntervalBuffer::new(&gpu.device, SIZE.0, SIZE.1).unwrap();

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        depth.clear_to(&mut encoder, scene_depth);
        culler.record(
            &gpu.device,
            &mut encoder,
            &buffer,
            &IntervalInputs {
                camera: &camera_buffer,
                volume: &volume_buffer,
                scene_depth: &depth.view,
                camera_inside: false,
            },
        );
        gpu.queue.submit([encoder.finish()]);
        let bytes = read_texture(&gpu.device, &gpu.queue, &buffer.target.texture).unwrap();
        Some(decode_texels(IntervalBuffer::FORMAT, &bytes).unwrap())
    }

    fn reference(scene_depth: f32) -> IntervalImage {
        cull_reference(
            test_camera().view_projection_matrix(),
            &test_proxy(),
            SIZE,
            &SceneDepth::uniform(SIZE.0, SIZE.1, scene_depth),
            false,
        )
    }

    /// Compare every pixel away from the silhouette and from depths too close
    /// to `scene_depth` for the depth test to be decided reliably.
    fn assert_matches_reference(got: &[[f32; 4]], scene_depth: f32) -> usize {
        let unoccluded = reference(0.0);
        let expected = reference(scene_depth);
        let mut compared = 0;
        for y in 1..SIZE.1 - 1 {
            for x in 1..SIZE.0 - 1 {
                // Rasterization rules decide coverage on the silhouette.
                let neighbours_agree = [(0i32, 0i32), (1, 0), (-1, 0), (0, 1), (0, -1)]
                    .iter()
                    .all(|&(dx, dy)| {
                        unoccluded.covered((x as i32 + dx) as u32, (y as i32 + dy) as u32)
                            == unoccluded.covered(x, y)
                    });
                let [entry, exit, ..] = unoccluded.texel(x, y);
                let ambiguous = (entry - scene_depth).abs() < 1e-4 || (exit - scene_depth).abs() < 1e-4;
                if !neighbours_agree || ambiguous {
                    continue;
                }
                let have = got[(y * SIZE.0 + x) as usize];
                let want = expected.texel(x, y);
                for c in 0..4 {
                    assert!(
                        (have[c] - want[c]).abs() < 1e-3,
                        "depth {scene_depth} pixel ({x}, {y}) channel {c}: {} vs {}",
                        have[c],
                        want[c]
                    );
                }
                compared += 1;
            }
        }
        compared
    }

    /// Entry and exit depth of the ray through the centre pixel.
    fn centre_span() -> (f32, f32) {
        let [entry, exit, ..] = reference(0.0).texel(SIZE.0 / 2, SIZE.1 / 2);
        (entry, exit)
    }

    #[test]
    fn test_gpu_intervals_match_reference() {
        let Some(texels) = cull_on_gpu(DepthBuffer::CLEAR_VALUE) else {
            return;
        };
        assert!(assert_matches_reference(&texels, DepthBuffer::CLEAR_VALUE) > 1000);
    }

    #[test]
    fn test_gpu_wall_in_front_of_volume_hides_entry() {
        let unoccluded = reference(0.0);
        let nearest_entry = unoccluded
            .texels
            .iter()
            .map(|t| t[0])
            .fold(f32::MIN, f32::max);
        assert!(nearest_entry > 0.0 && nearest_entry < 1.0);
        let wall = 0.5 * (nearest_entry + 1.0);

        let Some(texels) = cull_on_gpu(wall) else {
            return;
        };
        assert!(assert_matches_reference(&texels, wall) > 1000);
        // Every ray is blocked before it reaches the proxy.
        assert!(texels.iter().all(|t| t[0] < 0.0));
        let (x, y) = (SIZE.0 / 2, SIZE.1 / 2);
        assert!((texels[(y * SIZE.0 + x) as usize][1] - wall).abs() < 1e-3);
    }

    #[test]
    fn test_gpu_wall_inside_volume_clips_exit() {
        let (entry, exit) = centre_span();
        assert!(entry > exit && exit > 0.0);
        let wall = 0.5 * (entry + exit);

        let Some(texels) = cull_on_gpu(wall) else {
            return;
        };
        assert!(assert_matches_reference(&texels, wall) > 1000);
        let centre = texels[(SIZE.1 / 2 * SIZE.0 + SIZE.0 / 2) as usize];
        assert!((centre[0] - entry).abs() < 1e-3);
        assert!((centre[1] - wall).abs() < 1e-3, "exit {} should stop at the wall", centre[1]);
        let expected = reference(wall);
        // Rays that reach the proxy only behind the wall lose their entry.
        assert!(expected.texels.iter().any(|t| t[0] < 0.0 && t[1] >= 0.0));
    }
}
