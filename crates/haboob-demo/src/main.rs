//! Headless haboob renderer.
//!
//! Loads `config.ron` (created with defaults on first run), applies CLI overrides,
//! renders one frame of the dust plume over a sky-cleared background and writes
//! it as a PNG.
//!
//! `cargo run -p haboob-demo -- --width 1920 --height 1080 -o storm.png`

mod image;
mod scene;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use haboob_config::{CliArgs, Config, default_config_dir};
use haboob_render::{
    GBuffer, GpuContextError, ReadbackError, RenderPassBuilder, SKY_BLUE, ShaderError,
    TextureError, decode_texels, init_gpu_context_blocking, read_texture,
};
use haboob_volume::{
    FrameContext, RendererSettings, VolumeError, VolumeRenderer, register_builtin_kernels,
};
use tracing::{error, info};

use crate::image::PngWriteError;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Gpu(#[from] GpuContextError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error("failed to allocate output target: {0}")]
    Target(#[from] TextureError),

    #[error(transparent)]
    Readback(#[from] ReadbackError),

    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: PngWriteError,
    },
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    haboob_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<(), DemoError> {
    let width = config.output.width.max(1);
    let height = config.output.height.max(1);

    let gpu = init_gpu_context_blocking()?;
    let mut library = haboob_render::ShaderLibrary::new();
    register_builtin_kernels(&mut library, &gpu.device)?;

    let settings = RendererSettings {
        ray_scale: config.output.ray_scale,
        shadow_resolution: config.output.shadow_resolution,
        ..RendererSettings::default()
    };
    let mut renderer =
        VolumeRenderer::new(&gpu.device, &gpu.queue, &library, settings, &config.volume)?;
    let gbuffer = GBuffer::new(&gpu.device, width, height, settings.lit_format)?;
    let camera = scene::camera(&config.scene, width, height);
    let light = scene::light(&config.scene);

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("haboob-frame"),
        });
    gbuffer.depth.clear(&mut encoder);
    RenderPassBuilder::new()
        .label("sky-clear")
        .clear_color(SKY_BLUE)
        .clear(&mut encoder, &gbuffer.lit.view);
    let report = renderer.render(&mut FrameContext {
        device: &gpu.device,
        queue: &gpu.queue,
        encoder: &mut encoder,
        scene_depth: &gbuffer.depth.view,
        lit_view: &gbuffer.lit.view,
        lit_size: gbuffer.size(),
        camera: &camera,
        light: &light,
    })?;
    gpu.queue.submit([encoder.finish()]);
    info!(
        camera_inside = report.camera_inside,
        ray_size = ?report.ray_size,
        "frame recorded"
    );

    let bytes = read_texture(&gpu.device, &gpu.queue, &gbuffer.lit.texture)?;
    let texels = decode_texels(gbuffer.lit.format, &bytes)?;
    let rgba = image::to_rgba8(&texels);
    let path = &config.output.path;
    image::write_png(path, width, height, &rgba).map_err(|source| DemoError::Output {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), width, height, "wrote image");
    Ok(())
}
