//! Scattering and attenuation helpers shared by the CPU marcher and mirrored in
//! `common.wgsl`.

use std::f32::consts::PI;

/// Phase function value for isotropic scattering.
pub const ISOTROPIC_PHASE: f32 = 1.0 / (4.0 * PI);

/// Henyey–Greenstein phase for scattering angle cosine `cos_theta` and asymmetry `g`.
///
/// `g` is clamped to ±0.999 so the forward peak stays finite.
pub fn hg_phase(cos_theta: f32, g: f32) -> f32 {
    let g = g.clamp(-0.999, 0.999);
    let denom = (1.0 + g * g - 2.0 * g * cos_theta).max(1e-6);
    (1.0 - g * g) / (4.0 * PI * denom * denom.sqrt())
}

/// Two-lobe HG: `forward` and `backward` lobes mixed by `blend` (weight of backward).
pub fn blended_phase(cos_theta: f32, forward: f32, backward: f32, blend: f32) -> f32 {
    let blend = blend.clamp(0.0, 1.0);
    let f = hg_phase(cos_theta, forward);
    let b = hg_phase(cos_theta, backward);
    f + (b - f) * blend
}

/// Beer–Lambert transmittance of optical depth `od`.
pub fn beer_transmittance(od: f32) -> f32 {
    (-od.max(0.0)).exp()
}

/// Ångström power law `(λ / λ_ref)^-exponent`.
pub fn angstrom_scale(lambda: f32, reference: f32, exponent: f32) -> f32 {
    if lambda <= 0.0 || reference <= 0.0 {
        return 1.0;
    }
    (lambda / reference).powf(-exponent)
}

/// Powder darkening: thin dust at the lit edge scatters less towards the viewer.
pub fn powder(light_tau: f32, strength: f32) -> f32 {
    1.0 - strength.clamp(0.0, 1.0) * (-2.0 * light_tau.max(0.0)).exp()
}
