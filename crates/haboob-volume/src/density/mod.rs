//! Procedural haboob density: parameters, the per-voxel shaping formula, a
//! CPU-built reference grid and the GPU field with its mip chain.
//!
//! The plume lives in the unit cube `[-0.5, 0.5]³` of volume-local space. Height
//! runs along +y; the radial profile gives the wall of dust its rolled-over
//! "nose" and the angular term concentrates it around the horizon.

pub(crate) mod field;
mod grid;

pub use field::{DENSITY_FORMAT, DensityField, DensitySynthesizer, SYNTHESIS_WORKGROUP};
pub use grid::{DensityGrid, DensityMips};

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::noise::fbm;
use crate::uniforms::SynthesisUniform;

const MIN_SHAPE_PARAM: f32 = 1e-4;
/// Largest noise frequency across the cube.
pub const MAX_WORLD_SIZE: f32 = 1024.0;
/// Largest per-octave frequency multiplier; keeps the last octave's frequency finite.
pub const MAX_FRACTIONAL_GAP: f32 = 8.0;

/// Shape of the dust wall as a function of horizontal distance from the axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadialProfile {
    /// Height of the leading nose at the axis, in local units.
    pub nose_height: f32,
    pub exp_scale: f32,
    pub exp_rate: f32,
    /// Radius (0..1 of the half-extent) before the roof starts to fall.
    pub radial_offset: f32,
    pub roof_gradient: f32,
    /// Height where the profile hands over from the roof to the nose.
    pub blend_height: f32,
    pub blend_rate: f32,
}

impl Default for RadialProfile {
    fn default() -> Self {
        Self {
            nose_height: 0.8,
            exp_scale: 1.0,
            exp_rate: 2.0,
            radial_offset: 0.3,
            roof_gradient: 4.0,
            blend_height: 0.5,
            blend_rate: 8.0,
        }
    }
}

/// Angular, height and spherical falloff of the plume.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionProfile {
    /// Half-width in radians of the band around the horizon that carries dust.
    pub angle_range: f32,
    pub angle_power: f32,
    pub height_scale: f32,
    pub height_exponent: f32,
    pub falloff_scale: f32,
}

impl Default for DistributionProfile {
    fn default() -> Self {
        Self {
            angle_range: PI,
            angle_power: 1.0,
            height_scale: 1.0,
            height_exponent: 2.0,
            falloff_scale: 1.0,
        }
    }
}

/// Everything that determines the synthesized density field.
///
/// Two fields built from equal parameters are identical texel for texel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityParams {
    /// Voxel resolution along x, y and z.
    pub size: [u32; 3],
    /// Noise hash key.
    pub seed: [u32; 4],
    /// Noise frequency across the cube.
    pub world_size: f32,
    /// FBM layer count; the fractional part weights the last layer.
    pub octaves: f32,
    /// Frequency multiplier between layers.
    pub fractional_gap: f32,
    /// Amplitude divisor between layers.
    pub fractional_increment: f32,
    pub fbm_offset: f32,
    pub fbm_scale: f32,
    pub shape_power: f32,
    pub shape_scale: f32,
    pub radial: RadialProfile,
    pub distribution: DistributionProfile,
}

impl Default for DensityParams {
    fn default() -> Self {
        Self {
            size: [128; 3],
            seed: [0x12345, 0xCAFE_BABE, 0xDEAD_BEEF, 0],
            world_size: 5.0,
            octaves: 3.1,
            fractional_gap: 2.4,
            fractional_increment: 1.01,
            fbm_offset: 0.1,
            fbm_scale: 0.4,
            shape_power: 0.8,
            shape_scale: 0.0,
            radial: RadialProfile::default(),
            distribution: DistributionProfile::default(),
        }
    }
}

/// One synthesized voxel and the intermediate terms that shaped it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelSample {
    pub density: f32,
    /// The shaped noise value `n`.
    pub noise: f32,
    /// The spherical envelope.
    pub shape: f32,
}

impl VoxelSample {
    /// Base-level density texel: R is density, G the max density under the
    /// texel (the density itself at full resolution). B and A stay zero; the
    /// format is four-channel only because storage writes need it.
    pub fn to_texel(self) -> [f32; 4] {
        [self.density, self.density, 0.0, 0.0]
    }
}

/// `x^e` that is zero rather than NaN for non-positive `x`.
pub(crate) fn safe_pow(x: f32, e: f32) -> f32 {
    if x <= 0.0 { 0.0 } else { x.powf(e) }
}

fn saturate(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

fn finite_or(x: &mut f32, fallback: f32) {
    if !x.is_finite() {
        *x = fallback;
    }
}

impl DensityParams {
    /// Copy with non-finite values, runaway frequencies and divide-by-zero
    /// hazards replaced by usable values.
    pub fn sanitized(&self) -> Self {
        let mut p = *self;
        let d = Self::default();
        for (x, fallback) in [
            (&mut p.world_size, d.world_size),
            (&mut p.octaves, d.octaves),
            (&mut p.fractional_gap, d.fractional_gap),
            (&mut p.fractional_increment, d.fractional_increment),
            (&mut p.fbm_offset, d.fbm_offset),
            (&mut p.fbm_scale, d.fbm_scale),
            (&mut p.shape_power, d.shape_power),
            (&mut p.shape_scale, d.shape_scale),
            (&mut p.radial.nose_height, d.radial.nose_height),
            (&mut p.radial.exp_scale, d.radial.exp_scale),
            (&mut p.radial.exp_rate, d.radial.exp_rate),
            (&mut p.radial.radial_offset, d.radial.radial_offset),
            (&mut p.radial.roof_gradient, d.radial.roof_gradient),
            (&mut p.radial.blend_height, d.radial.blend_height),
            (&mut p.radial.blend_rate, d.radial.blend_rate),
            (&mut p.distribution.angle_range, d.distribution.angle_range),
            (&mut p.distribution.angle_power, d.distribution.angle_power),
            (&mut p.distribution.height_scale, d.distribution.height_scale),
            (&mut p.distribution.height_exponent, d.distribution.height_exponent),
            (&mut p.distribution.falloff_scale, d.distribution.falloff_scale),
        ] {
            finite_or(x, fallback);
        }

        p.world_size = p.world_size.clamp(-MAX_WORLD_SIZE, MAX_WORLD_SIZE);
        p.fractional_gap = p.fractional_gap.clamp(-MAX_FRACTIONAL_GAP, MAX_FRACTIONAL_GAP);
        if !(p.fractional_increment > 0.0) {
            p.fractional_increment = 1.0;
        }
        p.radial.nose_height = p.radial.nose_height.max(MIN_SHAPE_PARAM);
        p.distribution.angle_range = p.distribution.angle_range.max(MIN_SHAPE_PARAM);
        p
    }

    /// Voxel count.
    pub fn voxel_count(&self) -> usize {
        self.size.iter().map(|&s| s as usize).product()
    }

    /// The density texel for voxel `id`, with `self` already sanitized.
    pub fn evaluate_voxel(&self, id: UVec3) -> VoxelSample {
        let size = UVec3::from_array(self.size).max(UVec3::ONE).as_vec3();
        let p = (id.as_vec3() + Vec3::splat(0.5)) / size - Vec3::splat(0.5);
        self.evaluate(p)
    }

    /// Density at local position `p` in `[-0.5, 0.5]³`.
    pub fn evaluate(&self, p: Vec3) -> VoxelSample {
        let r_mod = &self.radial;
        let d_mod = &self.distribution;

        let h = p.y + 0.5;
        let horizontal = Vec3::new(p.x, 0.0, p.z).length();
        let r = horizontal / 0.5;

        let raw = fbm(
            (p + Vec3::splat(0.5)) * self.world_size,
            self.seed,
            self.octaves,
            self.fractional_gap,
            self.fractional_increment,
        );
        let n = (self.fbm_offset + self.fbm_scale * (2.0 * raw - 1.0)).abs();

        let roof_height = r_mod.nose_height
            * (r_mod.exp_scale * (-r_mod.exp_rate * (r - r_mod.radial_offset).max(0.0)).exp())
                .min(1.0);
        let roof = saturate((roof_height - h) * r_mod.roof_gradient);
        let blend = 1.0 / (1.0 + (r_mod.blend_rate * (h - r_mod.blend_height)).exp());
        let nose_h = h / r_mod.nose_height;
        let nose = saturate(1.0 - nose_h * nose_h);
        let radial = roof * (blend + (1.0 - blend) * nose);

        let theta = if p.length() < 1e-6 {
            FRAC_PI_2
        } else {
            horizontal.atan2(p.y)
        };
        let angular = safe_pow(
            saturate(1.0 - (theta - FRAC_PI_2).abs() / d_mod.angle_range),
            d_mod.angle_power,
        );
        let height = (-d_mod.height_scale * safe_pow(h, d_mod.height_exponent)).exp();
        let r2 = p.length_squared();
        let falloff = (-d_mod.falloff_scale * r2).exp();

        let shape = saturate((0.25 - r2 - self.shape_scale * safe_pow(n, self.shape_power)) / 0.25);
        let density = shape * radial * angular * height * falloff * n;

        VoxelSample {
            density,
            noise: n,
            shape,
        }
    }

    pub(crate) fn to_uniform(&self) -> SynthesisUniform {
        let p = self.sanitized();
        SynthesisUniform {
            size: [p.size[0], p.size[1], p.size[2], 0],
            seed: p.seed,
            fbm: [p.world_size, p.octaves, p.fractional_gap, p.fractional_increment],
            shaping: [p.fbm_offset, p.fbm_scale, p.shape_power, p.shape_scale],
            roof: [
                p.radial.roof_gradient,
                p.radial.exp_rate,
                p.radial.exp_scale,
                p.radial.radial_offset,
            ],
            nose: [
                p.radial.nose_height,
                p.radial.blend_height,
                p.radial.blend_rate,
                0.0,
            ],
            distribution: [
                p.distribution.falloff_scale,
                p.distribution.height_scale,
                p.distribution.height_exponent,
                p.distribution.angle_range,
            ],
            angular: [p.distribution.angle_power, 0.0, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_density_is_zero_outside_envelope() {
        let params = DensityParams::default().sanitized();
        for p in [
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::new(0.4, 0.3, 0.2),
            Vec3::new(-0.45, -0.45, -0.45),
        ] {
            let s = params.evaluate(p);
            assert_eq!(s.shape, 0.0, "envelope should vanish at {p}");
            assert_eq!(s.density, 0.0);
        }
    }

    #[test]
    fn test_density_is_non_negative_and_finite() {
        let params = DensityParams {
            size: [16; 3],
            ..DensityParams::default()
        }
        .sanitized();
        for z in 0..16 {
            for y in 0..16 {
                for x in 0..16 {
                    let s = params.evaluate_voxel(UVec3::new(x, y, z));
                    assert!(s.density.is_finite() && s.density >= 0.0);
                    assert!(s.noise >= 0.0);
                    assert!((0.0..=1.0).contains(&s.shape));
                }
            }
        }
    }

    #[test]
    fn test_plume_is_denser_low_than_high() {
        let params = DensityParams::default().sanitized();
        let low: f32 = (0..32)
            .map(|i| params.evaluate(Vec3::new(0.01 * i as f32 - 0.16, -0.3, 0.05)).density)
            .sum();
        let high: f32 = (0..32)
            .map(|i| params.evaluate(Vec3::new(0.01 * i as f32 - 0.16, 0.4, 0.05)).density)
            .sum();
        assert!(low > high, "low {low} high {high}");
    }

    #[test]
    fn test_sanitize_guards_divisors() {
        let mut params = DensityParams::default();
        params.fractional_increment = 0.0;
        params.radial.nose_height = 0.0;
        params.distribution.angle_range = -1.0;
        let clean = params.sanitized();
        assert_eq!(clean.fractional_increment, 1.0);
        assert!(clean.radial.nose_height > 0.0);
        assert!(clean.distribution.angle_range > 0.0);
        let s = clean.evaluate(Vec3::new(0.1, -0.2, 0.1));
        assert!(s.density.is_finite());
    }

    #[test]
    fn test_sanitize_bounds_frequencies() {
        let params = DensityParams {
            size: [8; 3],
            octaves: 16.0,
            fractional_gap: 1e30,
            world_size: f32::INFINITY,
            fbm_scale: f32::NAN,
            ..DensityParams::default()
        };
        let clean = params.sanitized();
        assert_eq!(clean.fractional_gap, MAX_FRACTIONAL_GAP);
        assert_eq!(clean.world_size, DensityParams::default().world_size);
        assert_eq!(clean.fbm_scale, DensityParams::default().fbm_scale);
        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    let s = clean.evaluate_voxel(UVec3::new(x, y, z));
                    assert!(s.density.is_finite() && s.density >= 0.0, "{s:?}");
                }
            }
        }
    }

    #[test]
    fn test_center_voxel_uses_horizon_angle() {
        let params = DensityParams {
            fbm_offset: 0.5,
            fbm_scale: 0.0,
            ..DensityParams::default()
        }
        .sanitized();
        let s = params.evaluate(Vec3::ZERO);
        assert!(s.density > 0.0);
        assert!((s.noise - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_voxel_centers() {
        let params = DensityParams {
            size: [2, 2, 2],
            ..DensityParams::default()
        }
        .sanitized();
        let a = params.evaluate_voxel(UVec3::ZERO);
        let b = params.evaluate(Vec3::splat(-0.25));
        assert_eq!(a, b);
    }

    #[test]
    fn test_params_deserialize_with_defaults() {
        let params: DensityParams = ron::from_str("(size: (32, 32, 32), octaves: 2.0)").unwrap();
        assert_eq!(params.size, [32, 32, 32]);
        assert_eq!(params.octaves, 2.0);
        assert_eq!(params.fractional_gap, DensityParams::default().fractional_gap);
        assert_eq!(params.radial, RadialProfile::default());
    }

    #[test]
    fn test_uniform_packs_sanitized_values() {
        let mut params = DensityParams::default();
        params.fractional_increment = -2.0;
        let u = params.to_uniform();
        assert_eq!(u.size, [128, 128, 128, 0]);
        assert_eq!(u.fbm[3], 1.0);
        assert_eq!(u.seed, params.seed);
    }
}
