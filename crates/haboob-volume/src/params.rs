//! Per-frame march settings.

use serde::{Deserialize, Serialize};

use crate::density::DensityParams;
use crate::proxy::ProxyParams;
use crate::spectral::OpticsParams;

/// What the integrator writes into the ray buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebugView {
    /// Lit in-scattered radiance (the normal output).
    #[default]
    Lit,
    /// Integrated density along the view ray.
    Density,
    /// View transmittance at the reference wavelength.
    Transmittance,
    /// Entry and exit depth from the interval buffer.
    Interval,
    /// Density mip level chosen at the first and last in-volume step.
    SampleLevel,
    /// World distance the ray advanced before stopping, and that distance as a
    /// fraction of the culled segment.
    RayTravel,
}

impl DebugView {
    pub fn index(self) -> u32 {
        match self {
            Self::Lit => 0,
            Self::Density => 1,
            Self::Transmittance => 2,
            Self::Interval => 3,
            Self::SampleLevel => 4,
            Self::RayTravel => 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarchParams {
    /// Step count, and the cap on steps in manual mode.
    pub iterations: u32,
    /// Use a fixed world step instead of dividing the segment evenly.
    pub manual_march: bool,
    /// Manual mode: distance skipped before the first step.
    pub initial_z_step: f32,
    /// Manual mode: world length of each step.
    pub march_z_step: f32,
    /// Pick the density mip from the pixel footprint.
    pub cone_filter: bool,
    pub shadow_iterations: u32,
    pub transmittance_cutoff: f32,
    /// Skip steps whose coarse max-density mip is zero. Only taken with Beer
    /// attenuation on, where such steps contribute nothing.
    pub skip_empty_space: bool,
    pub debug_view: DebugView,
}

impl Default for MarchParams {
    fn default() -> Self {
        Self {
            iterations: 10,
            manual_march: false,
            initial_z_step: 0.0,
            march_z_step: 0.1,
            cone_filter: true,
            shadow_iterations: 32,
            transmittance_cutoff: 1e-3,
            skip_empty_space: true,
            debug_view: DebugView::Lit,
        }
    }
}

impl MarchParams {
    /// Iteration count with the zero case lifted to one step.
    pub fn effective_iterations(&self) -> u32 {
        self.iterations.max(1)
    }

    pub fn effective_shadow_iterations(&self) -> u32 {
        self.shadow_iterations.max(1)
    }

    /// Manual step length, kept away from zero.
    pub fn manual_step(&self) -> f32 {
        self.march_z_step.max(1e-4)
    }
}

/// Every user-editable volume parameter, as persisted by the configuration layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeParams {
    pub density: DensityParams,
    pub march: MarchParams,
    pub optics: OpticsParams,
    pub proxy: ProxyParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = MarchParams::default();
        assert_eq!(p.iterations, 10);
        assert!(!p.manual_march);
        assert_eq!(p.march_z_step, 0.1);
        assert_eq!(p.debug_view, DebugView::Lit);
    }

    #[test]
    fn test_degenerate_counts_are_lifted() {
        let p = MarchParams {
            iterations: 0,
            shadow_iterations: 0,
            march_z_step: 0.0,
            ..MarchParams::default()
        };
        assert_eq!(p.effective_iterations(), 1);
        assert_eq!(p.effective_shadow_iterations(), 1);
        assert!(p.manual_step() > 0.0);
    }

    #[test]
    fn test_volume_params_fill_missing_sections() {
        let p: VolumeParams = ron::from_str("(march: (iterations: 64), proxy: (rotation_y_degrees: 30.0))").unwrap();
        assert_eq!(p.march.iterations, 64);
        assert_eq!(p.proxy.rotation_y_degrees, 30.0);
        assert_eq!(p.density, DensityParams::default());
        assert_eq!(p.optics, OpticsParams::default());
    }

    #[test]
    fn test_debug_view_parses_from_ron() {
        let p: MarchParams = ron::from_str("(debug_view: Transmittance, iterations: 64)").unwrap();
        assert_eq!(p.debug_view, DebugView::Transmittance);
        assert_eq!(p.debug_view.index(), 2);
        assert_eq!(p.iterations, 64);
    }

    #[test]
    fn test_debug_view_indices_are_distinct() {
        let views = [
            DebugView::Lit,
            DebugView::Density,
            DebugView::Transmittance,
            DebugView::Interval,
            DebugView::SampleLevel,
            DebugView::RayTravel,
        ];
        for (i, view) in views.iter().enumerate() {
            assert_eq!(view.index(), i as u32);
        }
        let p: MarchParams = ron::from_str("(debug_view: RayTravel)").unwrap();
        assert_eq!(p.debug_view, DebugView::RayTravel);
        assert!(p.skip_empty_space);
    }
}
