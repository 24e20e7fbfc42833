//! Directional light: the single sun-like light source lighting the plume.
//!
//! The [`DirectionalLight`] struct describes the CPU-side light properties,
//! while [`LightUniform`] is the GPU-side representation written to a uniform
//! buffer together with the light-space projection.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::light_space::LightSpace;

/// Direction used when a zero or non-finite direction is supplied: straight down.
pub const DEFAULT_LIGHT_DIRECTION: Vec3 = Vec3::NEG_Y;

/// CPU-side directional light description.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Normalized direction vector pointing FROM the light (toward the scene).
    pub direction: Vec3,
    /// Linear RGB color of the light (not premultiplied by intensity).
    pub color: Vec3,
    /// Scalar intensity multiplier.
    pub intensity: f32,
    /// Linear RGB sky/ambient radiance.
    pub ambient: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, -1.0, -1.0).normalize(),
            // Warm white, approximating D65 daylight.
            color: Vec3::new(1.0, 0.96, 0.90),
            intensity: 1.0,
            ambient: Vec3::new(0.35, 0.42, 0.55),
        }
    }
}

/// Normalize `dir`, substituting [`DEFAULT_LIGHT_DIRECTION`] for zero or non-finite input.
///
/// Returns the direction and whether the substitution happened.
pub fn sanitize_direction(dir: Vec3) -> (Vec3, bool) {
    let len = dir.length();
    if len.is_finite() && len > 1e-6 {
        (dir / len, false)
    } else {
        (DEFAULT_LIGHT_DIRECTION, true)
    }
}

impl DirectionalLight {
    /// Set the light direction, normalizing the input.
    ///
    /// A zero-length or non-finite vector is replaced by [`DEFAULT_LIGHT_DIRECTION`].
    pub fn set_direction(&mut self, dir: Vec3) {
        let (direction, substituted) = sanitize_direction(dir);
        if substituted {
            log::warn!("light direction {dir} is degenerate, using {direction}");
        }
        self.direction = direction;
    }

    /// The direction that rendering will actually use.
    pub fn effective_direction(&self) -> Vec3 {
        sanitize_direction(self.direction).0
    }

    /// Direct radiance: colour times intensity.
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity.max(0.0)
    }

    /// Build the GPU-side uniform for a given light-space projection.
    pub fn to_uniform(&self, light_space: &LightSpace) -> LightUniform {
        let dir = self.effective_direction();
        LightUniform {
            direction_intensity: [dir.x, dir.y, dir.z, self.intensity.max(0.0)],
            color: [self.color.x, self.color.y, self.color.z, 0.0],
            ambient: [self.ambient.x, self.ambient.y, self.ambient.z, 0.0],
            light_view_proj: light_space.view_proj.to_cols_array_2d(),
            inv_light_view_proj: light_space.view_proj.inverse().to_cols_array_2d(),
        }
    }
}

/// GPU-side representation, 176 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightUniform {
    /// xyz = direction (normalized), w = intensity.
    pub direction_intensity: [f32; 4],
    /// xyz = color (linear RGB), w = padding.
    pub color: [f32; 4],
    /// xyz = ambient radiance, w = padding.
    pub ambient: [f32; 4],
    pub light_view_proj: [[f32; 4]; 4],
    pub inv_light_view_proj: [[f32; 4]; 4],
}

impl LightUniform {
    /// Light-space view-projection as a matrix.
    pub fn light_view_proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.light_view_proj)
    }
}
