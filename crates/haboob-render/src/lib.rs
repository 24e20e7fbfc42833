//! wgpu plumbing for the haboob volume renderer: headless device setup, scoped passes,
//! shader loading by kernel name, render targets, the reverse-Z camera and G-buffer.

pub mod camera;
pub mod gbuffer;
pub mod gpu;
pub mod pass;
pub mod readback;
pub mod shader;
pub mod texture;

pub use camera::{Camera, CameraUniform, Projection};
pub use gbuffer::{DepthBuffer, GBuffer};
pub use gpu::{GpuContext, GpuContextError, init_gpu_context_blocking};
pub use pass::{
    PassState, RenderPassBuilder, SKY_BLUE, ScopedComputePass, ScopedRenderPass, workgroup_count,
};
pub use readback::{ReadbackError, decode_texels, f16_to_f32, read_texture};
pub use shader::{ShaderError, ShaderLibrary};
pub use texture::{RenderTarget, TextureError, mip_level_count_3d, scaled_extent};
