//! CPU evaluation of the interval buffer with an exact ray/box test per pixel.

use glam::{Mat4, Vec2, Vec3, Vec4};

use super::{INSIDE_CLEAR, OUTSIDE_CLEAR};
use crate::proxy::{VolumeProxy, cube_slab};

/// A reverse-Z depth image standing in for the G-buffer depth.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneDepth {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl SceneDepth {
    /// Depth cleared to the far plane.
    pub fn far(width: u32, height: u32) -> Self {
        Self::uniform(width, height, 0.0)
    }

    /// Every pixel at reverse-Z depth `depth`.
    pub fn uniform(width: u32, height: u32, depth: f32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            values: vec![depth; (width * height) as usize],
        }
    }

    pub fn set(&mut self, x: u32, y: u32, depth: f32) {
        let index = (y * self.width + x) as usize;
        self.values[index] = depth;
    }

    /// Depth under fragment `frag` of a `target`-sized buffer, scaled like the kernel.
    pub fn at_fragment(&self, frag: Vec2, target: (u32, u32)) -> f32 {
        let size = Vec2::new(self.width as f32, self.height as f32);
        let inv = Vec2::new(1.0 / target.0.max(1) as f32, 1.0 / target.1.max(1) as f32);
        let scaled = (frag * inv * size).floor().min(size - Vec2::ONE);
        self.values[(scaled.y as u32 * self.width + scaled.x as u32) as usize]
    }
}

/// CPU-side interval buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct IntervalImage {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl IntervalImage {
    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[(y * self.width + x) as usize]
    }

    /// Whether pixel `(x, y)` has both an entry and an exit.
    pub fn covered(&self, x: u32, y: u32) -> bool {
        let [entry, exit, ..] = self.texel(x, y);
        entry >= 0.0 && exit >= 0.0
    }
}

/// NDC of the centre of pixel `(x, y)` in a `size` target (y up).
pub fn pixel_ndc(x: u32, y: u32, size: (u32, u32)) -> Vec2 {
    let frag = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
    Vec2::new(
        frag.x / size.0 as f32 * 2.0 - 1.0,
        1.0 - frag.y / size.1 as f32 * 2.0,
    )
}

fn project_depth(view_proj: Mat4, world: Vec3) -> f32 {
    let clip: Vec4 = view_proj * world.extend(1.0);
    clip.z / clip.w
}

/// Fill an interval buffer of `size` the way the two cull passes do.
pub fn cull_reference(
    view_proj: Mat4,
    proxy: &VolumeProxy,
    size: (u32, u32),
    scene: &SceneDepth,
    camera_inside: bool,
) -> IntervalImage {
    let inv_view_proj = view_proj.inverse();
    let local_from_world = proxy.local_from_world();
    let clear = if camera_inside { INSIDE_CLEAR } else { OUTSIDE_CLEAR };
    let mut texels = Vec::with_capacity((size.0 * size.1) as usize);

    for y in 0..size.1 {
        for x in 0..size.0 {
            let mut texel = clear;
            let ndc = pixel_ndc(x, y, size);
            let frag = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let scene_depth = scene.at_fragment(frag, size);

            let near = inv_view_proj.project_point3(ndc.extend(1.0));
            let far = inv_view_proj.project_point3(ndc.extend(0.0));
            let origin = local_from_world.transform_point3(near);
            let dir = local_from_world.transform_point3(far) - origin;
            let hit = cube_slab(origin, dir);

            if hit.hits() {
                let at = |t: f32| proxy.to_world(origin + dir * t);
                if !camera_inside && hit.t_enter > 0.0 && hit.t_enter <= 1.0 {
                    let entry = project_depth(view_proj, at(hit.t_enter));
                    if entry >= scene_depth {
                        texel[0] = entry;
                    }
                }
                if hit.t_exit > 0.0 && hit.t_exit <= 1.0 {
                    let exit = project_depth(view_proj, at(hit.t_exit));
                    texel[1] = exit.max(scene_depth);
                    texel[2] = ndc.x;
                    texel[3] = ndc.y;
                }
            }
            texels.push(texel);
        }
    }

    IntervalImage {
        width: size.0,
        height: size.1,
        texels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyParams;
    use haboob_render::{Camera, Projection};

    const SIZE: (u32, u32) = (96, 64);

    fn camera() -> Camera {
        Camera::look_at(
            Vec3::new(3.0, 2.0, 7.0),
            Vec3::ZERO,
            Projection::Perspective {
                fov_y: 50f32.to_radians(),
                aspect_ratio: SIZE.0 as f32 / SIZE.1 as f32,
            },
        )
    }

    fn proxy() -> VolumeProxy {
        VolumeProxy::new(&ProxyParams {
            center: [0.0, 0.0, 0.0],
            scale: [2.0, 1.5, 2.5],
            rotation_y_degrees: 20.0,
        })
    }

    /// Pixel-space convex hull of the projected cube corners (monotone chain).
    fn projected_hull(camera: &Camera, proxy: &VolumeProxy) -> Vec<Vec2> {
        let mut points: Vec<Vec2> = (0..8u32)
            .map(|corner| {
                let local = Vec3::new(
                    (corner & 1) as f32 - 0.5,
                    ((corner >> 1) & 1) as f32 - 0.5,
                    ((corner >> 2) & 1) as f32 - 0.5,
                );
                let ndc = camera.world_to_ndc(proxy.to_world(local)).unwrap();
                Vec2::new(
                    (ndc.x * 0.5 + 0.5) * SIZE.0 as f32,
                    (0.5 - ndc.y * 0.5) * SIZE.1 as f32,
                )
            })
            .collect();
        points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        let cross = |o: Vec2, a: Vec2, b: Vec2| (a - o).perp_dot(b - o);
        let mut hull: Vec<Vec2> = Vec::new();
        for pass in [points.clone(), points.iter().rev().copied().collect()] {
            let start = hull.len();
            for p in pass {
                while hull.len() >= start + 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
                    hull.pop();
                }
                hull.push(p);
            }
            hull.pop();
        }
        hull
    }

    /// Signed distance of `p` to the hull boundary, positive inside.
    fn hull_distance(hull: &[Vec2], p: Vec2) -> f32 {
        let mut inside = f32::MAX;
        for i in 0..hull.len() {
            let a = hull[i];
            let b = hull[(i + 1) % hull.len()];
            let edge = b - a;
            inside = inside.min(edge.perp_dot(p - a) / edge.length());
        }
        inside
    }

    #[test]
    fn test_coverage_matches_projected_hull() {
        let camera = camera();
        let proxy = proxy();
        let view_proj = camera.view_projection_matrix();
        let image = cull_reference(view_proj, &proxy, SIZE, &SceneDepth::far(SIZE.0, SIZE.1), false);
        let hull = projected_hull(&camera, &proxy);
        assert!(hull.len() >= 4);

        let mut covered = 0;
        for y in 0..SIZE.1 {
            for x in 0..SIZE.0 {
                let centre = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let d = hull_distance(&hull, centre);
                if d > 0.5 {
                    assert!(image.covered(x, y), "pixel ({x}, {y}) inside hull is not covered");
                    let [entry, exit, ..] = image.texel(x, y);
                    assert!(entry > exit, "entry must be nearer than exit in reverse-Z");
                    covered += 1;
                } else if d < -0.5 {
                    assert_eq!(image.texel(x, y), OUTSIDE_CLEAR, "pixel ({x}, {y}) outside hull");
                }
            }
        }
        assert!(covered > 100);
    }

    #[test]
    fn test_wall_in_front_occludes_entry() {
        let camera = camera();
        let proxy = proxy();
        let view_proj = camera.view_projection_matrix();
        // Reverse-Z 0.999 is just beyond the near plane, in front of the whole cube.
        let wall = SceneDepth::uniform(SIZE.0, SIZE.1, 0.999);
        let image = cull_reference(view_proj, &proxy, SIZE, &wall, false);
        for texel in &image.texels {
            assert!(texel[0] < 0.0, "entry behind the wall must be discarded");
            if texel[1] >= 0.0 {
                assert_eq!(texel[1], 0.999);
            }
        }
    }

    #[test]
    fn test_wall_inside_volume_clips_exit() {
        let camera = camera();
        let proxy = proxy();
        let view_proj = camera.view_projection_matrix();
        let centre_depth = camera.world_to_ndc(Vec3::ZERO).unwrap().z;
        let wall = SceneDepth::uniform(SIZE.0, SIZE.1, centre_depth);
        let open = cull_reference(view_proj, &proxy, SIZE, &SceneDepth::far(SIZE.0, SIZE.1), false);
        let clipped = cull_reference(view_proj, &proxy, SIZE, &wall, false);
        let (x, y) = (SIZE.0 / 2, SIZE.1 / 2);
        assert!(open.covered(x, y) && clipped.covered(x, y));
        assert!(clipped.texel(x, y)[1] > open.texel(x, y)[1]);
        assert_eq!(clipped.texel(x, y)[1], centre_depth);
    }

    #[test]
    fn test_inside_camera_starts_at_near_plane() {
        let camera = Camera::look_at(
            Vec3::new(0.1, 0.0, 0.2),
            Vec3::new(0.0, 0.0, -5.0),
            Projection::Perspective {
                fov_y: 60f32.to_radians(),
                aspect_ratio: 1.5,
            },
        );
        let proxy = proxy();
        assert!(proxy.camera_inside(camera.position, camera.near));
        let image = cull_reference(
            camera.view_projection_matrix(),
            &proxy,
            SIZE,
            &SceneDepth::far(SIZE.0, SIZE.1),
            true,
        );
        for y in 0..SIZE.1 {
            for x in 0..SIZE.0 {
                let [entry, exit, ..] = image.texel(x, y);
                assert_eq!(entry, 1.0);
                assert!(exit >= 0.0, "every ray leaves the box from the inside");
            }
        }
    }

    #[test]
    fn test_scene_depth_is_sampled_at_scaled_coordinates() {
        let mut depth = SceneDepth::far(4, 4);
        depth.set(3, 3, 0.5);
        assert_eq!(depth.at_fragment(Vec2::new(1.5, 1.5), (2, 2)), 0.5);
        assert_eq!(depth.at_fragment(Vec2::new(0.5, 0.5), (2, 2)), 0.0);
    }

    #[test]
    fn test_pixel_ndc_is_y_up() {
        let ndc = pixel_ndc(0, 0, (2, 2));
        assert_eq!(ndc, Vec2::new(-0.5, 0.5));
    }
}
