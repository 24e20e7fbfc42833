//! Camera system for view and projection matrix generation.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3, Vec4};

/// A camera that generates reverse-Z view and projection matrices.
#[derive(Debug, Clone)]
pub struct Camera {
    /// World-space position.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Projection parameters.
    pub projection: Projection,
    /// Near clip plane distance (always positive).
    pub near: f32,
    /// Far clip plane distance (always positive, > near).
    pub far: f32,
}

/// Projection type for the camera.
#[derive(Debug, Clone)]
pub enum Projection {
    /// Perspective projection for 3D scenes.
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        /// Width / height.
        aspect_ratio: f32,
    },
    /// Orthographic projection.
    Orthographic {
        /// Half-width of the view volume in world units.
        half_width: f32,
        /// Half-height of the view volume in world units.
        half_height: f32,
    },
}

/// GPU-side camera data shared by the interval, raymarch and upscale kernels.
///
/// Total size: 2×64 + 16 + 16 = 160 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    /// xyz = world position, w = cone angle of one target pixel in radians.
    pub position: [f32; 4],
    /// Target width, height, 1/width, 1/height.
    pub viewport: [f32; 4],
}

impl Camera {
    /// Camera at `eye` looking at `target` with +Y as the up hint.
    pub fn look_at(eye: Vec3, target: Vec3, projection: Projection) -> Self {
        let forward = (target - eye).normalize_or(Vec3::NEG_Z);
        let up = if forward.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_to_rh(eye, forward, up);
        let (_, rotation, _) = view.inverse().to_scale_rotation_translation();
        Self {
            position: eye,
            rotation,
            projection,
            ..Self::default()
        }
    }

    /// Compute the view matrix (inverse of camera transform).
    pub fn view_matrix(&self) -> Mat4 {
        let rotation_matrix = Mat4::from_quat(self.rotation);
        let translation_matrix = Mat4::from_translation(self.position);
        (translation_matrix * rotation_matrix).inverse()
    }

    /// Compute the projection matrix with reverse-Z.
    pub fn projection_matrix(&self) -> Mat4 {
        match &self.projection {
            Projection::Perspective {
                fov_y,
                aspect_ratio,
            } => {
                // Reverse-Z: near plane maps to z=1, far plane maps to z=0.
                Mat4::perspective_rh(*fov_y, *aspect_ratio, self.far, self.near)
            }
            Projection::Orthographic {
                half_width,
                half_height,
            } => Mat4::orthographic_rh(
                -*half_width,
                *half_width,
                -*half_height,
                *half_height,
                self.far,
                self.near,
            ),
        }
    }

    /// Compute the combined view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Update the aspect ratio for perspective projection.
    pub fn set_aspect_ratio(&mut self, width: f32, height: f32) {
        if let Projection::Perspective { aspect_ratio, .. } = &mut self.projection {
            *aspect_ratio = width / height.max(1.0);
        }
    }

    /// Angle subtended by one pixel row of a target `height` pixels tall.
    ///
    /// Zero for orthographic cameras, whose footprint does not grow with distance.
    pub fn pixel_cone_angle(&self, height: u32) -> f32 {
        match &self.projection {
            Projection::Perspective { fov_y, .. } => {
                2.0 * (fov_y * 0.5).tan() / height.max(1) as f32
            }
            Projection::Orthographic { .. } => 0.0,
        }
    }

    /// Unproject an NDC position (reverse-Z depth) to world space.
    pub fn ndc_to_world(&self, ndc: Vec3) -> Vec3 {
        let world = self.view_projection_matrix().inverse() * ndc.extend(1.0);
        world.truncate() / world.w
    }

    /// Project a world-space point to NDC, `None` when it is behind the camera.
    pub fn world_to_ndc(&self, world: Vec3) -> Option<Vec3> {
        let clip: Vec4 = self.view_projection_matrix() * world.extend(1.0);
        (clip.w > 1e-6).then(|| clip.truncate() / clip.w)
    }

    /// Convert the camera to a uniform for a target of `width`×`height` pixels.
    pub fn to_uniform(&self, width: u32, height: u32) -> CameraUniform {
        let view_proj = self.view_projection_matrix();
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        CameraUniform {
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            position: [
                self.position.x,
                self.position.y,
                self.position.z,
                self.pixel_cone_angle(height),
            ],
            viewport: [w, h, 1.0 / w, 1.0 / h],
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            projection: Projection::Perspective {
                fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
                aspect_ratio: 16.0 / 9.0,
            },
            near: 0.1,
            far: 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_identity_camera_looks_down_neg_z() {
        let camera = Camera::default();
        let forward = camera.forward();
        assert!((forward - Vec3::NEG_Z).length() < 1e-6);
    }

    #[test]
    fn test_uniform_is_160_bytes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 160);
        assert_eq!(std::mem::size_of::<CameraUniform>() % 16, 0);
    }

    #[test]
    fn test_reverse_z_near_maps_to_one() {
        let camera = Camera::default();
        let near_point = Vec3::new(0.0, 0.0, -camera.near);
        let far_point = Vec3::new(0.0, 0.0, -camera.far);
        let near_ndc = camera.world_to_ndc(near_point).unwrap();
        let far_ndc = camera.world_to_ndc(far_point).unwrap();
        assert!((near_ndc.z - 1.0).abs() < 1e-4);
        assert!(far_ndc.z.abs() < 1e-4);
    }

    #[test]
    fn test_look_at_faces_target() {
        let eye = Vec3::new(3.0, 1.0, 4.0);
        let camera = Camera::look_at(eye, Vec3::ZERO, Camera::default().projection);
        let expected = (-eye).normalize();
        assert!((camera.forward() - expected).length() < 1e-4);
        let ndc = camera.world_to_ndc(Vec3::ZERO).unwrap();
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
    }

    #[test]
    fn test_look_at_straight_down_is_finite() {
        let camera = Camera::look_at(
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::ZERO,
            Camera::default().projection,
        );
        assert!(camera.rotation.is_finite());
        assert!((camera.forward() - Vec3::NEG_Y).length() < 1e-4);
    }

    #[test]
    fn test_ndc_roundtrip_recovers_world_point() {
        let camera = Camera::look_at(
            Vec3::new(0.0, 2.0, 6.0),
            Vec3::ZERO,
            Camera::default().projection,
        );
        let point = Vec3::new(0.3, -0.2, 0.5);
        let ndc = camera.world_to_ndc(point).unwrap();
        let back = camera.ndc_to_world(ndc);
        assert!((back - point).length() < 1e-3);
    }

    #[test]
    fn test_point_behind_camera_has_no_ndc() {
        let camera = Camera::default();
        assert!(camera.world_to_ndc(Vec3::new(0.0, 0.0, 5.0)).is_none());
    }

    #[test]
    fn test_pixel_cone_angle_matches_fov() {
        let camera = Camera {
            projection: Projection::Perspective {
                fov_y: FRAC_PI_2,
                aspect_ratio: 1.0,
            },
            ..Camera::default()
        };
        // tan(45°) = 1, so the full height spans 2 units at distance 1.
        assert!((camera.pixel_cone_angle(100) - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_ortho_projection_produces_correct_bounds() {
        let camera = Camera {
            projection: Projection::Orthographic {
                half_width: 10.0,
                half_height: 5.0,
            },
            near: 0.1,
            far: 100.0,
            ..Camera::default()
        };
        let proj = camera.projection_matrix();
        let right_edge = proj * Vec4::new(10.0, 0.0, -50.0, 1.0);
        assert!((right_edge.x / right_edge.w - 1.0).abs() < 1e-4);
        assert_eq!(camera.pixel_cone_angle(100), 0.0);
    }
}
