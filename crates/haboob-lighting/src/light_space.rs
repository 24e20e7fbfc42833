//! Orthographic light-space projection fitted around a bounding sphere.
//!
//! Light-space depth is NOT reversed here: 0.0 is the side facing the light and
//! 1.0 the far side, so depth grows along the light's travel direction.

use glam::{Mat4, Vec3, Vec4};

use crate::directional::sanitize_direction;

/// Light-space projection covering a sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightSpace {
    /// World to light clip space.
    pub view_proj: Mat4,
    /// The direction actually used (after degenerate-input substitution).
    pub direction: Vec3,
    /// World-space length of the light-depth range [0, 1].
    pub depth_extent: f32,
}

impl LightSpace {
    /// Project a world point to `(u, v, depth)` with u, v in [0, 1] (v down).
    pub fn world_to_texel(&self, world: Vec3) -> Vec3 {
        let clip = self.view_proj * world.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        Vec3::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5, ndc.z)
    }

    /// World-space point for texel coordinates `(u, v)` at light depth `depth`.
    pub fn texel_to_world(&self, u: f32, v: f32, depth: f32) -> Vec3 {
        let ndc = Vec4::new(u * 2.0 - 1.0, 1.0 - v * 2.0, depth, 1.0);
        let world = self.view_proj.inverse() * ndc;
        world.truncate() / world.w
    }
}

/// Fit an orthographic light camera looking along `light_dir` around the sphere
/// (`center`, `radius`), snapped to the texel grid of a `resolution`² map.
pub fn fit_light_space(light_dir: Vec3, center: Vec3, radius: f32, resolution: u32) -> LightSpace {
    let (direction, _) = sanitize_direction(light_dir);
    let radius = if radius.is_finite() && radius > 1e-6 {
        radius
    } else {
        1.0
    };

    let light_up = if direction.y.abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    // Anchored at the world origin so texel snapping is stable as the volume moves.
    let light_view = Mat4::look_to_rh(Vec3::ZERO, direction, light_up);
    let center_ls = (light_view * center.extend(1.0)).truncate();

    // Texel snapping: move the window in whole texels, keep its size fixed.
    let units_per_texel = (2.0 * radius) / resolution.max(1) as f32;
    let snapped = (center_ls.truncate() / units_per_texel).round() * units_per_texel;
    let half = radius + units_per_texel;
    let min = Vec3::new(snapped.x - half, snapped.y - half, center_ls.z - radius);
    let max = Vec3::new(snapped.x + half, snapped.y + half, center_ls.z + radius);

    // View space looks down -Z: the light-facing side has the largest z.
    let ortho = Mat4::orthographic_rh(min.x, max.x, min.y, max.y, -max.z, -min.z);

    LightSpace {
        view_proj: ortho * light_view,
        direction,
        depth_extent: max.z - min.z,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_fits_inside_unit_square() {
        let center = Vec3::new(2.0, 1.0, -3.0);
        let space = fit_light_space(Vec3::new(0.3, -1.0, 0.2), center, 1.5, 512);
        for offset in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
            let t = space.world_to_texel(center + offset * 1.5);
            assert!((0.0..=1.0).contains(&t.x), "u out of range: {t}");
            assert!((0.0..=1.0).contains(&t.y), "v out of range: {t}");
            assert!((-1e-4..=1.0001).contains(&t.z), "depth out of range: {t}");
        }
    }

    #[test]
    fn test_depth_increases_along_light() {
        let dir = Vec3::new(0.0, -1.0, -1.0).normalize();
        let space = fit_light_space(dir, Vec3::ZERO, 1.0, 256);
        let near = space.world_to_texel(-dir * 0.9);
        let far = space.world_to_texel(dir * 0.9);
        assert!(near.z < far.z);
        assert!((space.depth_extent - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_vertical_light_does_not_degenerate() {
        let space = fit_light_space(Vec3::NEG_Y, Vec3::ZERO, 1.0, 256);
        assert!(space.view_proj.is_finite());
        let t = space.world_to_texel(Vec3::ZERO);
        assert!((t.x - 0.5).abs() < 0.01 && (t.y - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_zero_direction_substitutes_default() {
        let space = fit_light_space(Vec3::ZERO, Vec3::ZERO, 1.0, 256);
        assert_eq!(space.direction, crate::DEFAULT_LIGHT_DIRECTION);
        assert!(space.view_proj.is_finite());
    }

    #[test]
    fn test_texel_roundtrip() {
        let space = fit_light_space(Vec3::new(1.0, -2.0, 0.5), Vec3::new(0.5, 0.0, 0.0), 2.0, 128);
        let p = Vec3::new(0.7, 0.3, -0.4);
        let t = space.world_to_texel(p);
        let back = space.texel_to_world(t.x, t.y, t.z);
        assert!((back - p).length() < 1e-3);
    }

    #[test]
    fn test_snapping_keeps_texel_size_constant() {
        let a = fit_light_space(Vec3::NEG_Y, Vec3::new(0.01, 0.0, 0.0), 1.0, 64);
        let b = fit_light_space(Vec3::NEG_Y, Vec3::new(0.37, 0.0, 0.0), 1.0, 64);
        let width = |s: &LightSpace| {
            (s.texel_to_world(1.0, 0.5, 0.5) - s.texel_to_world(0.0, 0.5, 0.5)).length()
        };
        assert!((width(&a) - width(&b)).abs() < 1e-3);
    }
}
