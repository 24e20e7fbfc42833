//! Camera and sun built from the `scene` config section.

use glam::Vec3;
use haboob_config::SceneConfig;
use haboob_lighting::DirectionalLight;
use haboob_render::{Camera, Projection};

/// Perspective camera for a `width`×`height` output.
pub fn camera(scene: &SceneConfig, width: u32, height: u32) -> Camera {
    let mut camera = Camera::look_at(
        Vec3::from_array(scene.camera_position),
        Vec3::from_array(scene.camera_target),
        Projection::Perspective {
            fov_y: scene.fov_y_degrees.clamp(1.0, 179.0).to_radians(),
            aspect_ratio: 1.0,
        },
    );
    camera.set_aspect_ratio(width.max(1) as f32, height.max(1) as f32);
    camera.near = scene.near.max(1e-4);
    camera.far = scene.far.max(camera.near * 2.0);
    camera
}

pub fn light(scene: &SceneConfig) -> DirectionalLight {
    let mut light = DirectionalLight {
        color: Vec3::from_array(scene.light_color),
        intensity: scene.light_intensity,
        ambient: Vec3::from_array(scene.ambient),
        ..DirectionalLight::default()
    };
    light.set_direction(Vec3::from_array(scene.light_direction));
    light
}
