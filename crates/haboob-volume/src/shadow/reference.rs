//! CPU evaluation of the Beer shadow map.

use glam::{Vec2, Vec3, Vec4};
use haboob_lighting::LightSpace;

use crate::density::DensityMips;
use crate::proxy::{VolumeProxy, cube_slab};

/// Texel of a light ray that misses the volume.
pub const MISS_TEXEL: [f32; 4] = [0.0, 1.0, 1.0, 1.0];

/// Optical depth along a shadow texel up to light depth `depth`.
pub fn beer_lookup(texel: [f32; 4], depth: f32) -> f32 {
    let span = (texel[2] - texel[1]).max(1e-6);
    texel[0] * ((depth - texel[1]) / span).clamp(0.0, 1.0)
}

/// CPU shadow map: `(optical depth, entry depth, exit depth, 1)` per texel.
#[derive(Clone, Debug, PartialEq)]
pub struct BeerShadowReference {
    resolution: u32,
    light_space: LightSpace,
    texels: Vec<[f32; 4]>,
}

/// March every texel's light ray through the volume, as the shadow kernel does.
pub fn optical_depth_reference(
    density: &DensityMips,
    proxy: &VolumeProxy,
    light_space: &LightSpace,
    resolution: u32,
    iterations: u32,
    attenuation: f32,
) -> BeerShadowReference {
    let resolution = resolution.max(1);
    let steps = iterations.max(1);
    let inv_light = light_space.view_proj.inverse();
    let local_from_world = proxy.local_from_world();
    let mut texels = Vec::with_capacity((resolution * resolution) as usize);

    for y in 0..resolution {
        for x in 0..resolution {
            let uv = (Vec2::new(x as f32, y as f32) + 0.5) / resolution as f32;
            let ndc = Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
            let near_world = inv_light.project_point3(ndc.extend(0.0));
            let far_world = inv_light.project_point3(ndc.extend(1.0));
            let origin = local_from_world.transform_point3(near_world);
            let dir = local_from_world.transform_point3(far_world) - origin;

            let hit = cube_slab(origin, dir);
            let t0 = hit.t_enter.clamp(0.0, 1.0);
            let t1 = hit.t_exit.clamp(0.0, 1.0);
            if !hit.hits() || t1 <= t0 {
                texels.push(MISS_TEXEL);
                continue;
            }

            let dt = (far_world - near_world).length() * (t1 - t0) / steps as f32;
            let mut sum = 0.0;
            for i in 0..steps {
                let t = t0 + (t1 - t0) * (i as f32 + 0.5) / steps as f32;
                sum += density.sample_lod(origin + dir * t, 0.0);
            }
            texels.push([attenuation.max(0.0) * sum * dt, t0, t1, 1.0]);
        }
    }

    BeerShadowReference {
        resolution,
        light_space: *light_space,
        texels,
    }
}

impl BeerShadowReference {
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn light_space(&self) -> &LightSpace {
        &self.light_space
    }

    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        let x = x.min(self.resolution - 1);
        let y = y.min(self.resolution - 1);
        self.texels[(y * self.resolution + x) as usize]
    }

    /// Bilinear, clamp-to-edge fetch at texture coordinates `uv`.
    pub fn sample(&self, uv: Vec2) -> [f32; 4] {
        let pos = uv * self.resolution as f32 - Vec2::splat(0.5);
        let base = pos.floor();
        let f = pos - base;
        let max = self.resolution as i32 - 1;
        let fetch = |dx: i32, dy: i32| {
            let x = (base.x as i32 + dx).clamp(0, max) as u32;
            let y = (base.y as i32 + dy).clamp(0, max) as u32;
            Vec4::from_array(self.texel(x, y))
        };
        let top = fetch(0, 0).lerp(fetch(1, 0), f.x);
        let bottom = fetch(0, 1).lerp(fetch(1, 1), f.x);
        top.lerp(bottom, f.y).to_array()
    }

    /// Optical depth between the light and world point `world`.
    pub fn optical_depth(&self, world: Vec3) -> f32 {
        let t = self.light_space.world_to_texel(world);
        beer_lookup(self.sample(Vec2::new(t.x, t.y)), t.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::{DensityGrid, DensityParams};
    use crate::optics::beer_transmittance;
    use crate::proxy::ProxyParams;
    use haboob_lighting::fit_light_space;

    fn setup(direction: Vec3) -> (DensityMips, VolumeProxy, LightSpace) {
        let grid = DensityGrid::synthesize(&DensityParams {
            size: [24, 24, 24],
            ..DensityParams::default()
        })
        .unwrap();
        let proxy = VolumeProxy::new(&ProxyParams::default());
        let (center, radius) = proxy.bounding_sphere();
        let space = fit_light_space(direction, center, radius, 32);
        (DensityMips::build(&grid), proxy, space)
    }

    #[test]
    fn test_lookup_fraction() {
        let texel = [2.0, 0.2, 0.6, 1.0];
        assert_eq!(beer_lookup(texel, 0.1), 0.0);
        assert!((beer_lookup(texel, 0.4) - 1.0).abs() < 1e-6);
        assert_eq!(beer_lookup(texel, 0.9), 2.0);
        assert_eq!(beer_lookup(MISS_TEXEL, 0.5), 0.0);
    }

    #[test]
    fn test_optical_depth_grows_along_the_light() {
        let direction = Vec3::new(0.3, -1.0, 0.2).normalize();
        let (mips, proxy, space) = setup(direction);
        let shadow = optical_depth_reference(&mips, &proxy, &space, 32, 32, 2.0);
        let mut last = -1.0;
        for i in 0..20 {
            let p = -direction * 1.8 + direction * (i as f32 * 0.18) + Vec3::new(0.0, -0.4, 0.0);
            let tau = shadow.optical_depth(p);
            assert!(tau >= last - 1e-6, "optical depth decreased at step {i}");
            last = tau;
        }
        assert!(last > 0.0);
    }

    #[test]
    fn test_texels_outside_the_volume_miss() {
        let (mips, proxy, space) = setup(Vec3::NEG_Y);
        let shadow = optical_depth_reference(&mips, &proxy, &space, 32, 16, 2.0);
        // The fitted square spans the bounding sphere, so its corners see no cube.
        assert_eq!(shadow.texel(0, 0), MISS_TEXEL);
        assert_eq!(shadow.texel(31, 31), MISS_TEXEL);
        let centre = shadow.texel(16, 16);
        assert!(centre[1] < centre[2]);
    }

    #[test]
    fn test_zero_light_direction_gives_finite_transmittance() {
        let (mips, proxy, space) = setup(Vec3::ZERO);
        let shadow = optical_depth_reference(&mips, &proxy, &space, 16, 16, 2.0);
        for y in 0..16 {
            for x in 0..16 {
                let tau = shadow.texel(x, y)[0];
                assert!(tau.is_finite() && tau >= 0.0);
                let t = beer_transmittance(tau);
                assert!(t.is_finite() && (0.0..=1.0).contains(&t));
            }
        }
    }
}
