//! GPU-side uniform blocks shared by the volume kernels.
//!
//! Layouts match the structs declared in `common.wgsl` and `density/synthesis.wgsl`.
//! Every block is a whole number of 16-byte rows.

use bytemuck::{Pod, Zeroable};

use crate::params::MarchParams;
use crate::proxy::VolumeProxy;

/// Proxy transforms plus per-frame march settings, 192 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct VolumeUniform {
    pub world_from_local: [[f32; 4]; 4],
    pub local_from_world: [[f32; 4]; 4],
    /// xyz = voxel counts, w = mip level count.
    pub size: [f32; 4],
    /// initial_z_step, march_z_step, world size of one voxel, transmittance cutoff.
    pub march: [f32; 4],
    /// iterations, manual march, cone filter, debug view.
    pub flags: [u32; 4],
    /// shadow iterations, camera inside, skip empty space, unused.
    pub shadow: [u32; 4],
}

impl VolumeUniform {
    pub fn new(
        proxy: &VolumeProxy,
        size: [u32; 3],
        mip_level_count: u32,
        march: &MarchParams,
        camera_inside: bool,
    ) -> Self {
        Self {
            world_from_local: proxy.world_from_local().to_cols_array_2d(),
            local_from_world: proxy.local_from_world().to_cols_array_2d(),
            size: [size[0] as f32, size[1] as f32, size[2] as f32, mip_level_count as f32],
            march: [
                march.initial_z_step.max(0.0),
                march.manual_step(),
                proxy.voxel_world_size(size),
                march.transmittance_cutoff.max(0.0),
            ],
            flags: [
                march.effective_iterations(),
                u32::from(march.manual_march),
                u32::from(march.cone_filter),
                march.debug_view.index(),
            ],
            shadow: [
                march.effective_shadow_iterations(),
                u32::from(camera_inside),
                u32::from(march.skip_empty_space),
                0,
            ],
        }
    }
}

/// Spectral optics, 304 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct OpticsUniform {
    /// Forward HG asymmetry per quadrature sample.
    pub forward: [f32; 4],
    /// Backward HG asymmetry per quadrature sample.
    pub backward: [f32; 4],
    /// Weight of the backward lobe per quadrature sample.
    pub blend: [f32; 4],
    /// scatter Ångström exponent, absorption Ångström exponent, attenuation, powder.
    pub coefficients: [f32; 4],
    /// ambient fraction, reference wavelength, unused, unused.
    pub lighting: [f32; 4],
    /// apply Beer, apply HG, apply spectral, unused.
    pub flags: [u32; 4],
    /// Effective wavelengths in µm, row = sample, column = channel.
    pub abscissas: [[f32; 4]; 4],
    /// Quadrature weights, same layout as `abscissas`.
    pub weights: [[f32; 4]; 4],
    /// Per-channel quadrature totals.
    pub totals: [f32; 4],
    /// Channel space to RGB.
    pub channel_to_rgb: [[f32; 4]; 4],
}

/// Density synthesis parameters, 128 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SynthesisUniform {
    pub size: [u32; 4],
    pub seed: [u32; 4],
    /// world size, octaves, gap, increment.
    pub fbm: [f32; 4],
    /// fbm offset, fbm scale, shape power, shape scale.
    pub shaping: [f32; 4],
    /// roof gradient, exp rate, exp scale, radial offset.
    pub roof: [f32; 4],
    /// nose height, blend height, blend rate, unused.
    pub nose: [f32; 4],
    /// falloff scale, height scale, height exponent, angle range.
    pub distribution: [f32; 4],
    /// angle power, unused, unused, unused.
    pub angular: [f32; 4],
}

/// Beer shadow map parameters, 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadowUniform {
    /// resolution, iterations, unused, unused.
    pub params: [u32; 4],
}

/// Composite parameters, 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct UpscaleUniform {
    /// 1/lit width, 1/lit height, unused, unused.
    pub inv_target: [f32; 4],
}

static_assertions::assert_eq_size!(VolumeUniform, [u8; 192]);
static_assertions::assert_eq_size!(OpticsUniform, [u8; 304]);
static_assertions::assert_eq_size!(SynthesisUniform, [u8; 128]);
static_assertions::assert_eq_size!(ShadowUniform, [u8; 16]);
static_assertions::assert_eq_size!(UpscaleUniform, [u8; 16]);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DebugView;

    #[test]
    fn test_volume_uniform_size() {
        assert_eq!(std::mem::size_of::<VolumeUniform>(), 192);
        assert_eq!(std::mem::offset_of!(VolumeUniform, size), 128);
        assert_eq!(std::mem::offset_of!(VolumeUniform, flags), 160);
    }

    #[test]
    fn test_optics_uniform_size() {
        assert_eq!(std::mem::size_of::<OpticsUniform>(), 304);
        assert_eq!(std::mem::offset_of!(OpticsUniform, abscissas), 96);
        assert_eq!(std::mem::offset_of!(OpticsUniform, weights), 160);
        assert_eq!(std::mem::offset_of!(OpticsUniform, totals), 224);
        assert_eq!(std::mem::offset_of!(OpticsUniform, channel_to_rgb), 240);
    }

    #[test]
    fn test_volume_uniform_lifts_degenerate_march() {
        let march = MarchParams {
            iterations: 0,
            march_z_step: 0.0,
            manual_march: true,
            ..MarchParams::default()
        };
        let uniform = VolumeUniform::new(&VolumeProxy::default(), [32, 32, 32], 6, &march, true);
        assert_eq!(uniform.flags[0], 1);
        assert_eq!(uniform.flags[1], 1);
        assert!(uniform.march[1] > 0.0);
        assert_eq!(uniform.shadow[1], 1);
        assert_eq!(uniform.shadow[2], 1);
        assert_eq!(uniform.size, [32.0, 32.0, 32.0, 6.0]);

        let full = MarchParams {
            skip_empty_space: false,
            debug_view: DebugView::RayTravel,
            ..march
        };
        let uniform = VolumeUniform::new(&VolumeProxy::default(), [32, 32, 32], 6, &full, false);
        assert_eq!(uniform.shadow[2], 0);
        assert_eq!(uniform.flags[3], 5);
    }

    #[test]
    fn test_synthesis_and_shadow_sizes() {
        assert_eq!(std::mem::size_of::<SynthesisUniform>(), 128);
        assert_eq!(std::mem::size_of::<ShadowUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<UpscaleUniform>(), 16);
    }
}
