//! Four-sample spectral model of the dust's colour response.
//!
//! Each colour channel is the integral of a Gaussian-shaped response over
//! wavelength, approximated with 4-point Gauss–Hermite quadrature after
//! substituting wavelength for the Hermite variable. Channels are described by a
//! uniform table so linear and logarithmic responses share one code path.

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::uniforms::OpticsUniform;

/// Gauss–Hermite nodes for n = 4.
pub const GAUSS_HERMITE_NODES: [f64; 4] = [
    -1.650_680_123_885_784_5,
    -0.524_647_623_275_290_3,
    0.524_647_623_275_290_3,
    1.650_680_123_885_784_5,
];

/// Gauss–Hermite weights for n = 4.
pub const GAUSS_HERMITE_WEIGHTS: [f64; 4] = [
    0.081_312_835_447_245_18,
    0.804_914_090_005_512_8,
    0.804_914_090_005_512_8,
    0.081_312_835_447_245_18,
];

const SQRT_PI: f64 = 1.772_453_850_905_516;

/// How the Hermite variable maps onto wavelength.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelDomain {
    /// `x = rate · (scale · λ + offset)`
    Linear,
    /// `x = rate · ln(scale · λ + offset)`
    Logarithmic,
}

/// One row of the channel table: a Gaussian response `peak · exp(-x²)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub domain: ChannelDomain,
    pub peak: f32,
    pub rate: f32,
    pub scale: f32,
    pub offset: f32,
}

impl ChannelResponse {
    pub const fn linear(peak: f32, rate: f32, scale: f32, offset: f32) -> Self {
        Self {
            domain: ChannelDomain::Linear,
            peak,
            rate,
            scale,
            offset,
        }
    }

    pub const fn logarithmic(peak: f32, rate: f32, scale: f32, offset: f32) -> Self {
        Self {
            domain: ChannelDomain::Logarithmic,
            peak,
            rate,
            scale,
            offset,
        }
    }

    fn is_finite(&self) -> bool {
        [self.peak, self.rate, self.scale, self.offset]
            .iter()
            .all(|v| v.is_finite())
    }

    fn jacobian_scale(&self) -> Option<f64> {
        if !self.is_finite() {
            return None;
        }
        let rs = f64::from(self.rate) * f64::from(self.scale);
        (rs.is_finite() && rs != 0.0).then(|| rs.abs())
    }

    /// Response at wavelength `lambda` (µm). Zero outside a log channel's domain.
    pub fn response(&self, lambda: f64) -> f64 {
        let (rate, scale, offset) = (
            f64::from(self.rate),
            f64::from(self.scale),
            f64::from(self.offset),
        );
        let arg = scale * lambda + offset;
        let x = match self.domain {
            ChannelDomain::Linear => rate * arg,
            ChannelDomain::Logarithmic => {
                if arg <= 0.0 {
                    return 0.0;
                }
                rate * arg.ln()
            }
        };
        f64::from(self.peak) * (-x * x).exp()
    }

    /// Exact integral of [`Self::response`] over all wavelengths.
    pub fn closed_form_total(&self) -> f64 {
        let Some(rs) = self.jacobian_scale() else {
            return 0.0;
        };
        let base = f64::from(self.peak) * SQRT_PI / rs;
        match self.domain {
            ChannelDomain::Linear => base,
            ChannelDomain::Logarithmic => {
                let rate = f64::from(self.rate);
                base * (1.0 / (4.0 * rate * rate)).exp()
            }
        }
    }

    /// Quadrature abscissas (µm) and weights, or `None` for a degenerate channel.
    fn quadrature(&self) -> Option<([f64; 4], [f64; 4])> {
        let rs = self.jacobian_scale()?;
        let (rate, scale, offset) = (
            f64::from(self.rate),
            f64::from(self.scale),
            f64::from(self.offset),
        );
        let peak = f64::from(self.peak);
        let mut abscissas = [0.0; 4];
        let mut weights = [0.0; 4];
        for s in 0..4 {
            let x = GAUSS_HERMITE_NODES[s];
            let w = GAUSS_HERMITE_WEIGHTS[s];
            match self.domain {
                ChannelDomain::Linear => {
                    abscissas[s] = (x / rate - offset) / scale;
                    weights[s] = peak * w / rs;
                }
                ChannelDomain::Logarithmic => {
                    let e = (x / rate).exp();
                    abscissas[s] = (e - offset) / scale;
                    weights[s] = peak * w * e / rs;
                }
            }
        }
        // Evaluated in f32 on the GPU.
        let usable = |v: &f64| (*v as f32).is_finite();
        (abscissas.iter().all(usable) && weights.iter().all(usable)).then_some((abscissas, weights))
    }
}

/// Calibrated channel table: red-major, green, blue, red-minor.
///
/// The fourth channel is the short-wavelength lobe of the red matching curve, so
/// it is lit from the red component of any RGB input (see [`rgb_to_channels`])
/// and folds back into red through `channel_to_rgb`.
pub const CIE_CHANNELS: [ChannelResponse; 4] = [
    ChannelResponse::logarithmic(1.132, 15.297_06, -1.075_99, 1.7996),
    ChannelResponse::linear(1.011, 1.0, 12.2602, -8.522_37),
    ChannelResponse::logarithmic(2.06, 5.656_85, 4.434_59, -1.473_39),
    ChannelResponse::logarithmic(0.398, 35.355_34, 0.788_95, 0.562_23),
];

/// Quadrature tables: column = channel, row = sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpectralMatrices {
    /// Wavelengths in µm.
    pub abscissas: Mat4,
    pub weights: Mat4,
    /// Sum of each channel's weights.
    pub totals: Vec4,
    /// Maps the four channels to linear RGB.
    pub channel_to_rgb: Mat4,
}

/// Build the quadrature tables for `channels`.
///
/// A channel with a non-finite coefficient, a zero or non-finite `rate · scale`,
/// or a quadrature sample that overflows f32 contributes nothing: its weights are
/// zero and its abscissas sit at `reference_wavelength`.
pub fn build_spectral_matrices(
    channels: &[ChannelResponse; 4],
    reference_wavelength: f32,
) -> SpectralMatrices {
    let mut abscissas = [Vec4::splat(reference_wavelength); 4];
    let mut weights = [Vec4::ZERO; 4];
    let mut totals = [0.0f32; 4];

    for (c, channel) in channels.iter().enumerate() {
        match channel.quadrature() {
            Some((a, w)) => {
                abscissas[c] = Vec4::new(a[0] as f32, a[1] as f32, a[2] as f32, a[3] as f32);
                weights[c] = Vec4::new(w[0] as f32, w[1] as f32, w[2] as f32, w[3] as f32);
                totals[c] = w.iter().sum::<f64>() as f32;
            }
            None => {
                warn!(channel = c, ?channel, "degenerate spectral channel, weights zeroed");
            }
        }
    }

    let red_sum = totals[0] + totals[3];
    let major = if red_sum > 0.0 { totals[0] / red_sum } else { 1.0 };
    let channel_to_rgb = Mat4::from_cols(
        Vec4::new(major, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 1.0, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(1.0 - major, 0.0, 0.0, 0.0),
    );

    SpectralMatrices {
        abscissas: Mat4::from_cols(abscissas[0], abscissas[1], abscissas[2], abscissas[3]),
        weights: Mat4::from_cols(weights[0], weights[1], weights[2], weights[3]),
        totals: Vec4::from_array(totals),
        channel_to_rgb,
    }
}

/// Expand linear RGB into the four channels (both red channels take red).
pub fn rgb_to_channels(rgb: Vec3) -> Vec4 {
    Vec4::new(rgb.x, rgb.y, rgb.z, rgb.x)
}

/// User-editable optics.
///
/// `forward`, `backward` and `blend` hold one lane per quadrature sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpticsParams {
    pub forward: [f32; 4],
    pub backward: [f32; 4],
    pub blend: [f32; 4],
    pub scatter_angstrom: f32,
    pub absorption_angstrom: f32,
    pub powder: f32,
    /// Extinction per unit density per unit world length.
    pub attenuation: f32,
    pub ambient_fraction: f32,
    /// Wavelength (µm) at which the Ångström laws are unity.
    pub reference_wavelength: f32,
    pub apply_beer: bool,
    pub apply_hg: bool,
    pub apply_spectral: bool,
    pub channels: [ChannelResponse; 4],
}

impl Default for OpticsParams {
    fn default() -> Self {
        Self {
            forward: [0.55, 0.6, 0.65, 0.7],
            backward: [-0.3; 4],
            blend: [0.3; 4],
            scatter_angstrom: 1.3,
            absorption_angstrom: 1.0,
            powder: 0.5,
            attenuation: 2.0,
            ambient_fraction: 0.4,
            reference_wavelength: 0.55,
            apply_beer: true,
            apply_hg: true,
            apply_spectral: true,
            channels: CIE_CHANNELS,
        }
    }
}

/// Optics parameters together with the quadrature tables derived from them.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralOpticalModel {
    params: OpticsParams,
    matrices: SpectralMatrices,
}

impl SpectralOpticalModel {
    pub fn new(params: OpticsParams) -> Self {
        let matrices = build_spectral_matrices(&params.channels, params.reference_wavelength);
        Self { params, matrices }
    }

    pub fn params(&self) -> &OpticsParams {
        &self.params
    }

    pub fn matrices(&self) -> &SpectralMatrices {
        &self.matrices
    }

    /// Abscissas the integrator uses: the reference wavelength everywhere when
    /// spectral sampling is off.
    pub fn effective_abscissas(&self) -> Mat4 {
        if self.params.apply_spectral {
            self.matrices.abscissas
        } else {
            Mat4::from_cols(
                Vec4::splat(self.params.reference_wavelength),
                Vec4::splat(self.params.reference_wavelength),
                Vec4::splat(self.params.reference_wavelength),
                Vec4::splat(self.params.reference_wavelength),
            )
        }
    }

    pub fn to_uniform(&self) -> OpticsUniform {
        let p = &self.params;
        let m = &self.matrices;
        OpticsUniform {
            forward: p.forward,
            backward: p.backward,
            blend: p.blend,
            coefficients: [
                p.scatter_angstrom,
                p.absorption_angstrom,
                p.attenuation.max(0.0),
                p.powder,
            ],
            lighting: [p.ambient_fraction, p.reference_wavelength, 0.0, 0.0],
            flags: [
                u32::from(p.apply_beer),
                u32::from(p.apply_hg),
                u32::from(p.apply_spectral),
                0,
            ],
            abscissas: self.effective_abscissas().to_cols_array_2d(),
            weights: m.weights.to_cols_array_2d(),
            totals: m.totals.to_array(),
            channel_to_rgb: m.channel_to_rgb.to_cols_array_2d(),
        }
    }
}

impl Default for SpectralOpticalModel {
    fn default() -> Self {
        Self::new(OpticsParams::default())
    }
}
