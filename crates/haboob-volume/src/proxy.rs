//! The bounding proxy: a unit cube `[-0.5, 0.5]³` placed in the world.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Radius of the sphere circumscribing the unit cube.
pub const BOUNDING_RADIUS: f32 = 0.866_025_4;

const MIN_SCALE: f32 = 1e-4;

/// Placement of the volume in the world.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyParams {
    pub center: [f32; 3],
    /// Edge lengths of the box along x, y and z.
    pub scale: [f32; 3],
    /// Rotation about the world y axis.
    pub rotation_y_degrees: f32,
}

impl Default for ProxyParams {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0, 0.0],
            scale: [4.0, 2.0, 4.0],
            rotation_y_degrees: 0.0,
        }
    }
}

/// Ray parameters where a segment crosses the cube.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlabHit {
    pub t_enter: f32,
    pub t_exit: f32,
}

impl SlabHit {
    pub fn hits(&self) -> bool {
        self.t_enter <= self.t_exit
    }
}

/// Intersect `origin + t·dir` with the unit cube. Near-zero direction components
/// are replaced by a tiny positive value so the slab test stays finite.
pub fn cube_slab(origin: Vec3, dir: Vec3) -> SlabHit {
    let safe = Vec3::select(dir.abs().cmplt(Vec3::splat(1e-8)), Vec3::splat(1e-8), dir);
    let inv = safe.recip();
    let ta = (Vec3::splat(-0.5) - origin) * inv;
    let tb = (Vec3::splat(0.5) - origin) * inv;
    let t_min = ta.min(tb);
    let t_max = ta.max(tb);
    SlabHit {
        t_enter: t_min.max_element(),
        t_exit: t_max.min_element(),
    }
}

/// World placement of the cube.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeProxy {
    world_from_local: Mat4,
    scale: Vec3,
}

impl VolumeProxy {
    pub fn new(params: &ProxyParams) -> Self {
        let scale = Vec3::from_array(params.scale).abs().max(Vec3::splat(MIN_SCALE));
        let rotation = Quat::from_rotation_y(params.rotation_y_degrees.to_radians());
        Self {
            world_from_local: Mat4::from_scale_rotation_translation(
                scale,
                rotation,
                Vec3::from_array(params.center),
            ),
            scale,
        }
    }

    pub fn world_from_local(&self) -> Mat4 {
        self.world_from_local
    }

    pub fn local_from_world(&self) -> Mat4 {
        self.world_from_local.inverse()
    }

    pub fn to_local(&self, world: Vec3) -> Vec3 {
        self.local_from_world().transform_point3(world)
    }

    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.world_from_local.transform_point3(local)
    }

    pub fn center(&self) -> Vec3 {
        self.world_from_local.w_axis.truncate()
    }

    /// Centre and radius of a world-space sphere enclosing the cube.
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        (self.center(), BOUNDING_RADIUS * self.scale.max_element())
    }

    pub fn min_axis_scale(&self) -> f32 {
        self.scale.min_element()
    }

    /// World length of one voxel edge along the finest axis of a `size` grid.
    pub fn voxel_world_size(&self, size: [u32; 3]) -> f32 {
        let per_axis = self.scale / glam::UVec3::from_array(size).max(glam::UVec3::ONE).as_vec3();
        per_axis.min_element()
    }

    /// Whether a camera at `position` with near plane `near` may clip the cube.
    ///
    /// Conservative: the local-space bounding sphere grown by the near distance.
    pub fn camera_inside(&self, position: Vec3, near: f32) -> bool {
        let local = self.to_local(position);
        local.length() <= BOUNDING_RADIUS + near.max(0.0) / self.min_axis_scale()
    }
}

impl Default for VolumeProxy {
    fn default() -> Self {
        Self::new(&ProxyParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slab_through_center() {
        let hit = cube_slab(Vec3::new(0.0, 0.0, -2.0), Vec3::Z);
        assert!(hit.hits());
        assert!((hit.t_enter - 1.5).abs() < 1e-6);
        assert!((hit.t_exit - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_slab_miss() {
        let hit = cube_slab(Vec3::new(2.0, 0.0, -2.0), Vec3::Z);
        assert!(!hit.hits());
    }

    #[test]
    fn test_axis_aligned_ray_with_zero_components_is_finite() {
        let hit = cube_slab(Vec3::new(0.1, 0.2, -1.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(hit.t_enter.is_finite() && hit.t_exit.is_finite());
        assert!(hit.hits());
    }

    #[test]
    fn test_transform_roundtrip() {
        let proxy = VolumeProxy::new(&ProxyParams {
            center: [1.0, 2.0, 3.0],
            scale: [2.0, 1.0, 4.0],
            rotation_y_degrees: 30.0,
        });
        let p = Vec3::new(0.2, -0.4, 0.1);
        let back = proxy.to_local(proxy.to_world(p));
        assert!((back - p).length() < 1e-5);
        assert!((proxy.center() - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn test_bounding_sphere_contains_corners() {
        let proxy = VolumeProxy::default();
        let (center, radius) = proxy.bounding_sphere();
        for corner in 0..8u32 {
            let local = Vec3::new(
                (corner & 1) as f32 - 0.5,
                ((corner >> 1) & 1) as f32 - 0.5,
                ((corner >> 2) & 1) as f32 - 0.5,
            );
            assert!(proxy.to_world(local).distance(center) <= radius + 1e-4);
        }
    }

    #[test]
    fn test_camera_inside_radius() {
        let proxy = VolumeProxy::default();
        assert!(proxy.camera_inside(Vec3::ZERO, 0.1));
        assert!(proxy.camera_inside(Vec3::new(1.9, 0.0, 0.0), 0.1));
        assert!(!proxy.camera_inside(Vec3::new(0.0, 0.0, 10.0), 0.1));
    }

    #[test]
    fn test_degenerate_scale_is_clamped() {
        let proxy = VolumeProxy::new(&ProxyParams {
            scale: [0.0, -2.0, 1.0],
            ..ProxyParams::default()
        });
        assert!(proxy.local_from_world().is_finite());
        assert!(proxy.min_axis_scale() > 0.0);
    }

    #[test]
    fn test_voxel_world_size() {
        let proxy = VolumeProxy::default();
        assert!((proxy.voxel_world_size([128, 128, 128]) - 2.0 / 128.0).abs() < 1e-7);
    }
}
