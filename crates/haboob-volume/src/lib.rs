//! Volumetric haboob rendering: a procedurally synthesized dust plume raymarched
//! through a bounding proxy with four-sample spectral single scattering, Beer
//! shadowing from the sun and a reduced-resolution ray buffer composited over
//! the lit scene.
//!
//! Every GPU pass has a CPU counterpart that evaluates the same formulas; the
//! GPU tests compare against them.

mod error;
pub mod kernels;
mod layout;
mod noise;
mod uniforms;

pub mod density;
pub mod integrator;
pub mod interval;
pub mod optics;
pub mod params;
pub mod proxy;
pub mod renderer;
pub mod shadow;
pub mod spectral;
pub mod upscale;

pub use density::{DensityField, DensityGrid, DensityMips, DensityParams, DensitySynthesizer};
pub use error::VolumeError;
pub use integrator::{MarchInputs, RayBuffer, RaymarchIntegrator, march_image, march_ray};
pub use interval::{IntervalBuffer, IntervalCuller, cull_reference};
pub use kernels::{BUILTIN_KERNELS, COMMON_SOURCE, register_builtin_kernels};
pub use noise::fbm;
pub use params::{DebugView, MarchParams, VolumeParams};
pub use proxy::{ProxyParams, VolumeProxy};
pub use renderer::{FrameContext, FrameReport, RendererSettings, VolumeRenderer};
pub use shadow::{BeerShadowBuilder, BeerShadowMap, BeerShadowReference, optical_depth_reference};
pub use spectral::{OpticsParams, SpectralOpticalModel};
pub use uniforms::{OpticsUniform, SynthesisUniform, VolumeUniform};
pub use upscale::{UpscaleCompositor, composite_reference};
