//! CPU evaluation of the raymarch integrator, one ray at a time.

use glam::{Mat4, Vec3, Vec4};
use haboob_lighting::DirectionalLight;

use super::{EMPTY_SPACE_LOD_BIAS, RAY_CLEAR};
use crate::density::DensityMips;
use crate::interval::IntervalImage;
use crate::optics::{ISOTROPIC_PHASE, angstrom_scale, blended_phase, powder};
use crate::params::{DebugView, MarchParams};
use crate::proxy::VolumeProxy;
use crate::shadow::BeerShadowReference;
use crate::spectral::{SpectralOpticalModel, rgb_to_channels};

/// Everything a ray needs besides its interval texel.
pub struct MarchInputs<'a> {
    pub density: &'a DensityMips,
    pub proxy: &'a VolumeProxy,
    pub optics: &'a SpectralOpticalModel,
    pub march: &'a MarchParams,
    pub light: &'a DirectionalLight,
    pub shadow: &'a BeerShadowReference,
    pub inv_view_proj: Mat4,
    pub camera_position: Vec3,
    /// Angle subtended by one ray-buffer pixel.
    pub pixel_cone: f32,
}

/// March one ray described by interval texel `interval`.
///
/// Returns the ray-buffer texel, or `None` when the pixel is masked and the
/// cleared value `(0, 0, 0, 1)` stays in place.
pub fn march_ray(inputs: &MarchInputs<'_>, interval: [f32; 4]) -> Option<[f32; 4]> {
    let [entry_depth, exit_depth, ndc_x, ndc_y] = interval;
    if entry_depth < 0.0 || exit_depth < 0.0 {
        return None;
    }
    let entry = inputs.inv_view_proj.project_point3(Vec3::new(ndc_x, ndc_y, entry_depth));
    let exit = inputs.inv_view_proj.project_point3(Vec3::new(ndc_x, ndc_y, exit_depth));
    let segment = exit - entry;
    let seg_len = segment.length();
    if seg_len <= 1e-6 {
        return None;
    }
    let ray_dir = segment / seg_len;

    let march = inputs.march;
    if march.debug_view == DebugView::Interval {
        return Some([entry_depth, exit_depth, 0.0, 0.0]);
    }

    let params = inputs.optics.params();
    let matrices = inputs.optics.matrices();
    let abscissas = inputs.optics.effective_abscissas();
    let iterations = march.effective_iterations();
    let (dt, mut t) = if march.manual_march {
        let dt = march.manual_step();
        (dt, march.initial_z_step.max(0.0) + 0.5 * dt)
    } else {
        let dt = seg_len / iterations as f32;
        (dt, 0.5 * dt)
    };

    let local_from_world = inputs.proxy.local_from_world();
    let voxel_world = inputs.proxy.voxel_world_size(inputs.density.size().to_array());
    let ambient = rgb_to_channels(inputs.light.ambient) * params.ambient_fraction;
    let sun = rgb_to_channels(inputs.light.radiance());
    let cos_theta = inputs.light.effective_direction().dot(-ray_dir);
    let phase = Vec4::from_array(std::array::from_fn(|s| {
        if params.apply_hg {
            blended_phase(cos_theta, params.forward[s], params.backward[s], params.blend[s])
        } else {
            ISOTROPIC_PHASE
        }
    }));
    let attenuation = params.attenuation.max(0.0);

    let skip_empty = march.skip_empty_space && params.apply_beer;

    let mut channels = Vec4::ZERO;
    let mut od = 0.0f32;
    let mut density_integral = 0.0f32;
    let mut entered = false;
    let mut lod_range: Option<(f32, f32)> = None;
    for _ in 0..iterations {
        if t > seg_len {
            break;
        }
        let world = entry + ray_dir * t;
        let local = local_from_world.transform_point3(world);
        if local.abs().max_element() > 0.5 {
            if entered {
                break;
            }
            t += dt;
            continue;
        }
        entered = true;

        let lod = if march.cone_filter {
            let footprint = (world - inputs.camera_position).length() * inputs.pixel_cone;
            (footprint / voxel_world).max(1e-6).log2().max(0.0)
        } else {
            0.0
        };
        lod_range = Some(lod_range.map_or((lod, lod), |(first, _)| (first, lod)));
        if skip_empty && inputs.density.peak_lod(local, lod + EMPTY_SPACE_LOD_BIAS) <= 0.0 {
            t += dt;
            continue;
        }
        let rho = inputs.density.sample_lod(local, lod);
        let tau = attenuation * rho * dt;
        density_integral += rho * dt;

        let light_tau = if params.apply_beer {
            inputs.shadow.optical_depth(world)
        } else {
            0.0
        };
        let powder_factor = powder(light_tau, params.powder);

        for c in 0..4 {
            let total = matrices.totals[c];
            if total <= 0.0 {
                continue;
            }
            let mut sum = 0.0;
            for s in 0..4 {
                let lambda = abscissas.col(c)[s];
                let view_scale = angstrom_scale(lambda, params.reference_wavelength, params.absorption_angstrom);
                let light_scale = angstrom_scale(lambda, params.reference_wavelength, params.scatter_angstrom);
                let (t_view, absorbed, t_light) = if params.apply_beer {
                    (
                        (-od * view_scale).exp(),
                        1.0 - (-tau * view_scale).exp(),
                        (-light_tau * light_scale).exp(),
                    )
                } else {
                    (1.0, dt / seg_len, 1.0)
                };
                let in_light = ambient[c] + sun[c] * phase[s] * t_light * powder_factor;
                sum += matrices.weights.col(c)[s] / total * t_view * absorbed * in_light;
            }
            channels[c] += sum;
        }

        od += tau;
        if params.apply_beer && (-od).exp() < march.transmittance_cutoff {
            break;
        }
        t += dt;
    }

    let transmittance = (-od).exp();
    match march.debug_view {
        DebugView::Density => return Some([density_integral, density_integral, density_integral, 0.0]),
        DebugView::Transmittance => return Some([transmittance, transmittance, transmittance, 0.0]),
        DebugView::SampleLevel => {
            let (first, last) = lod_range.unwrap_or((0.0, 0.0));
            return Some([first, last, 0.0, 0.0]);
        }
        DebugView::RayTravel => {
            let travel = t.min(seg_len);
            return Some([travel, travel / seg_len, 0.0, 0.0]);
        }
        DebugView::Lit | DebugView::Interval => {}
    }
    let rgb = matrices.channel_to_rgb * channels;
    let alpha = if params.apply_beer { transmittance } else { 1.0 };
    Some([rgb.x, rgb.y, rgb.z, alpha])
}

/// March every pixel of `intervals`; masked pixels keep the cleared value.
pub fn march_image(inputs: &MarchInputs<'_>, intervals: &IntervalImage) -> Vec<[f32; 4]> {
    intervals
        .texels
        .iter()
        .map(|&texel| march_ray(inputs, texel).unwrap_or(RAY_CLEAR))
        .collect()
}
