//! Logical kernel names and the built-in WGSL sources behind them.

use haboob_render::{ShaderError, ShaderLibrary};
use tracing::info;

pub const VOLUME_SYNTHESIS: &str = "volume-synthesis";
pub const VOLUME_MIPS: &str = "volume-mips";
pub const INTERVAL_CULL: &str = "interval-cull";
pub const RAYMARCH: &str = "raymarch";
pub const BEER_SHADOW: &str = "beer-shadow";
pub const UPSCALE: &str = "upscale";

/// Shared structs and helpers, prepended to every kernel.
pub const COMMON_SOURCE: &str = include_str!("common.wgsl");

/// Kernel name and body for every pass of the subsystem.
pub const BUILTIN_KERNELS: [(&str, &str); 6] = [
    (VOLUME_SYNTHESIS, include_str!("density/synthesis.wgsl")),
    (VOLUME_MIPS, include_str!("density/mips.wgsl")),
    (INTERVAL_CULL, include_str!("interval/interval.wgsl")),
    (RAYMARCH, include_str!("integrator/raymarch.wgsl")),
    (BEER_SHADOW, include_str!("shadow/beer_shadow.wgsl")),
    (UPSCALE, include_str!("upscale/upscale.wgsl")),
];

/// Compile the built-in kernels into `library` under their logical names.
///
/// A host that ships its own sources can load them under the same names instead.
pub fn register_builtin_kernels(
    library: &mut ShaderLibrary,
    device: &wgpu::Device,
) -> Result<(), ShaderError> {
    for (name, body) in BUILTIN_KERNELS {
        library.load_composed(device, name, &[COMMON_SOURCE, body])?;
    }
    info!(count = BUILTIN_KERNELS.len(), "registered volume kernels");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use haboob_render::init_gpu_context_blocking;

    #[test]
    fn test_kernel_names_are_unique() {
        let mut names: Vec<_> = BUILTIN_KERNELS.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BUILTIN_KERNELS.len());
    }

    #[test]
    fn test_sources_are_not_empty() {
        assert!(!COMMON_SOURCE.trim().is_empty());
        for (name, body) in BUILTIN_KERNELS {
            assert!(!body.trim().is_empty(), "{name} has no source");
        }
    }

    #[test]
    fn test_builtin_kernels_compile() {
        let Ok(gpu) = init_gpu_context_blocking() else {
            return;
        };
        let mut library = ShaderLibrary::new();
        register_builtin_kernels(&mut library, &gpu.device).unwrap();
        for (name, _) in BUILTIN_KERNELS {
            assert!(library.get(name).is_some(), "{name} missing");
        }
    }
}
