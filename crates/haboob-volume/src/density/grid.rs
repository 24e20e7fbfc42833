//! CPU-side density grid and its box-filtered mip chain.
//!
//! Produces the same texels as the synthesis kernel and is used as the reference
//! the GPU field is checked against, and by the CPU ray marcher.

use std::thread;

use glam::{UVec3, Vec3};
use haboob_render::mip_level_count_3d;
use tracing::debug;

use super::DensityParams;
use crate::error::VolumeError;

/// Largest axis the CPU synthesizer accepts.
pub const MAX_CPU_GRID_DIM: u32 = 1024;

/// Density texels laid out x-fastest, then y, then z.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityGrid {
    size: UVec3,
    texels: Vec<[f32; 4]>,
}

/// Reject empty grids and axes longer than `limit`.
pub fn validate_size(size: [u32; 3], limit: u32) -> Result<(), VolumeError> {
    if size.iter().any(|&s| s == 0 || s > limit) {
        return Err(VolumeError::InvalidVolumeSize { size, limit });
    }
    Ok(())
}

impl DensityGrid {
    /// Synthesize the grid for `params`, splitting z-slices across worker threads.
    pub fn synthesize(params: &DensityParams) -> Result<Self, VolumeError> {
        validate_size(params.size, MAX_CPU_GRID_DIM)?;
        let params = params.sanitized();
        let size = UVec3::from_array(params.size);
        let slice_len = (size.x * size.y) as usize;
        let mut texels = vec![[0.0f32; 4]; params.voxel_count()];

        let threads = num_cpus::get().max(1);
        let slices_per_thread = (size.z as usize).div_ceil(threads).max(1);
        debug!(?size, threads, "synthesizing density grid on the CPU");

        thread::scope(|scope| {
            for (chunk_index, chunk) in texels
                .chunks_mut(slice_len * slices_per_thread)
                .enumerate()
            {
                let params = &params;
                scope.spawn(move || {
                    let z0 = chunk_index * slices_per_thread;
                    for (offset, texel) in chunk.iter_mut().enumerate() {
                        let z = z0 + offset / slice_len;
                        let in_slice = offset % slice_len;
                        let id = UVec3::new(
                            (in_slice % size.x as usize) as u32,
                            (in_slice / size.x as usize) as u32,
                            z as u32,
                        );
                        *texel = params.evaluate_voxel(id).to_texel();
                    }
                });
            }
        });

        Ok(Self { size, texels })
    }

    pub fn size(&self) -> UVec3 {
        self.size
    }

    fn index(&self, id: UVec3) -> usize {
        (id.x + self.size.x * (id.y + self.size.y * id.z)) as usize
    }

    /// All four channels of voxel `id`.
    pub fn texel(&self, id: UVec3) -> [f32; 4] {
        self.texels[self.index(id)]
    }

    /// Density channel of voxel `id`.
    pub fn density(&self, id: UVec3) -> f32 {
        self.texel(id)[0]
    }

    /// Raw texels in upload order.
    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    /// The densest voxel and its density.
    pub fn max_voxel(&self) -> (UVec3, f32) {
        let mut best = (UVec3::ZERO, f32::MIN);
        for z in 0..self.size.z {
            for y in 0..self.size.y {
                for x in 0..self.size.x {
                    let id = UVec3::new(x, y, z);
                    let d = self.density(id);
                    if d > best.1 {
                        best = (id, d);
                    }
                }
            }
        }
        best
    }

    /// Volume-local position of the centre of voxel `id`.
    pub fn voxel_center(&self, id: UVec3) -> Vec3 {
        (id.as_vec3() + Vec3::splat(0.5)) / self.size.as_vec3() - Vec3::splat(0.5)
    }
}

/// One level of the density mip chain: box-filtered density and max density.
#[derive(Clone, Debug, PartialEq)]
struct MipLevel {
    size: UVec3,
    texels: Vec<[f32; 2]>,
}

impl MipLevel {
    fn at(&self, id: UVec3) -> [f32; 2] {
        let id = id.min(self.size - UVec3::ONE);
        self.texels[(id.x + self.size.x * (id.y + self.size.y * id.z)) as usize]
    }

    /// Trilinear sample of `channel` with clamp-to-edge at normalized coordinates `uvw`.
    fn sample(&self, uvw: Vec3, channel: usize) -> f32 {
        let pos = uvw * self.size.as_vec3() - Vec3::splat(0.5);
        let base = pos.floor();
        let f = pos - base;
        let max = (self.size - UVec3::ONE).as_ivec3();
        let b = base.as_ivec3();
        let fetch = |dx: i32, dy: i32, dz: i32| {
            let id = (b + glam::IVec3::new(dx, dy, dz)).clamp(glam::IVec3::ZERO, max);
            self.at(id.as_uvec3())[channel]
        };
        let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
        let x00 = lerp(fetch(0, 0, 0), fetch(1, 0, 0), f.x);
        let x10 = lerp(fetch(0, 1, 0), fetch(1, 1, 0), f.x);
        let x01 = lerp(fetch(0, 0, 1), fetch(1, 0, 1), f.x);
        let x11 = lerp(fetch(0, 1, 1), fetch(1, 1, 1), f.x);
        lerp(lerp(x00, x10, f.y), lerp(x01, x11, f.y), f.z)
    }

    /// Max density over source texels `src - 1 ..= src + 2` on each axis.
    ///
    /// The one-texel apron covers the fine texels a coarse texel overlaps when
    /// odd sizes stop the levels from nesting, and the fine filter's reach.
    fn window_peak(&self, src: UVec3) -> f32 {
        let lo = src.saturating_sub(UVec3::ONE);
        let hi = (src + UVec3::splat(2)).min(self.size - UVec3::ONE);
        let mut peak = 0.0f32;
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    peak = peak.max(self.at(UVec3::new(x, y, z))[PEAK]);
                }
            }
        }
        peak
    }

    fn downsample(&self) -> Self {
        let size = (self.size / 2).max(UVec3::ONE);
        let mut texels = Vec::with_capacity((size.x * size.y * size.z) as usize);
        for z in 0..size.z {
            for y in 0..size.y {
                for x in 0..size.x {
                    let src = UVec3::new(x, y, z) * 2;
                    let mut sum = 0.0;
                    for corner in 0..8u32 {
                        let offset = UVec3::new(corner & 1, (corner >> 1) & 1, (corner >> 2) & 1);
                        sum += self.at(src + offset)[DENSITY];
                    }
                    texels.push([sum * 0.125, self.window_peak(src)]);
                }
            }
        }
        Self { size, texels }
    }
}

/// The density grid with its full mip chain, sampled like the GPU texture with a
/// linear-mip-linear clamp-to-edge sampler.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityMips {
    levels: Vec<MipLevel>,
}

const DENSITY: usize = 0;
const PEAK: usize = 1;

impl DensityMips {
    pub fn build(grid: &DensityGrid) -> Self {
        let size = grid.size();
        let base = MipLevel {
            size,
            texels: grid.texels().iter().map(|t| [t[0], t[1]]).collect(),
        };
        let count = mip_level_count_3d(size.x, size.y, size.z);
        let mut levels = Vec::with_capacity(count as usize);
        levels.push(base);
        for _ in 1..count {
            let next = levels[levels.len() - 1].downsample();
            levels.push(next);
        }
        Self { levels }
    }

    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn size(&self) -> UVec3 {
        self.levels[0].size
    }

    fn sample_channel(&self, p: Vec3, lod: f32, channel: usize) -> f32 {
        let uvw = p + Vec3::splat(0.5);
        if uvw.cmplt(Vec3::ZERO).any() || uvw.cmpgt(Vec3::ONE).any() {
            return 0.0;
        }
        let max_lod = (self.levels.len() - 1) as f32;
        let lod = lod.clamp(0.0, max_lod);
        let lo = lod.floor() as usize;
        let hi = (lo + 1).min(self.levels.len() - 1);
        let t = lod - lo as f32;
        let a = self.levels[lo].sample(uvw, channel);
        if t == 0.0 || hi == lo {
            return a;
        }
        a + (self.levels[hi].sample(uvw, channel) - a) * t
    }

    /// Density at volume-local `p` (cube `[-0.5, 0.5]³`) and mip `lod`.
    ///
    /// Zero outside the cube.
    pub fn sample_lod(&self, p: Vec3, lod: f32) -> f32 {
        self.sample_channel(p, lod, DENSITY)
    }

    /// Filtered max density at `p` and mip `lod`. Zero only where every texel
    /// the filter touches, and so every finer texel beneath them, is empty.
    pub fn peak_lod(&self, p: Vec3, lod: f32) -> f32 {
        self.sample_channel(p, lod, PEAK)
    }

    /// Density at volume-local `p`, full resolution.
    pub fn sample(&self, p: Vec3) -> f32 {
        self.sample_lod(p, 0.0)
    }

    /// Average density of mip `level` (the coarsest level is the whole-grid mean).
    pub fn level_mean(&self, level: u32) -> f32 {
        let l = &self.levels[level as usize];
        l.texels.iter().map(|t| t[DENSITY]).sum::<f32>() / l.texels.len() as f32
    }

    /// Largest max-density texel of mip `level`.
    pub fn level_peak(&self, level: u32) -> f32 {
        self.levels[level as usize]
            .texels
            .iter()
            .map(|t| t[PEAK])
            .fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> DensityParams {
        DensityParams {
            size: [24, 20, 16],
            ..DensityParams::default()
        }
    }

    #[test]
    fn test_synthesis_is_bit_identical_across_runs() {
        let a = DensityGrid::synthesize(&small_params()).unwrap();
        let b = DensityGrid::synthesize(&small_params()).unwrap();
        assert!(a == b);
        let bits = |g: &DensityGrid| {
            g.texels()
                .iter()
                .flat_map(|t| t.iter().map(|v| v.to_bits()))
                .collect::<Vec<_>>()
        };
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn test_layout_matches_evaluate() {
        let params = small_params();
        let grid = DensityGrid::synthesize(&params).unwrap();
        let clean = params.sanitized();
        for id in [UVec3::new(3, 7, 11), UVec3::new(23, 19, 15), UVec3::ZERO] {
            assert_eq!(grid.texel(id), clean.evaluate_voxel(id).to_texel());
        }
    }

    #[test]
    fn test_default_field_peaks_strictly_inside() {
        let grid = DensityGrid::synthesize(&DensityParams::default()).unwrap();
        assert_eq!(grid.size(), UVec3::splat(128));
        let (id, density) = grid.max_voxel();
        assert!(density > 0.0);
        assert!(
            id.cmpgt(UVec3::ZERO).all() && id.cmplt(UVec3::splat(127)).all(),
            "densest voxel {id} touches the boundary"
        );
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let params = DensityParams {
            size: [0, 16, 16],
            ..DensityParams::default()
        };
        assert!(matches!(
            DensityGrid::synthesize(&params),
            Err(VolumeError::InvalidVolumeSize { size: [0, 16, 16], .. })
        ));
    }

    #[test]
    fn test_oversize_is_rejected() {
        assert!(validate_size([16, MAX_CPU_GRID_DIM + 1, 16], MAX_CPU_GRID_DIM).is_err());
        assert!(validate_size([1, 1, 1], MAX_CPU_GRID_DIM).is_ok());
    }

    #[test]
    fn test_seed_changes_grid() {
        let a = DensityGrid::synthesize(&small_params()).unwrap();
        let b = DensityGrid::synthesize(&DensityParams {
            seed: [7, 8, 9, 10],
            ..small_params()
        })
        .unwrap();
        assert!(a != b);
    }

    #[test]
    fn test_mip_chain_reaches_single_texel() {
        let grid = DensityGrid::synthesize(&small_params()).unwrap();
        let mips = DensityMips::build(&grid);
        assert_eq!(mips.level_count(), 5);
        assert_eq!(mips.levels.last().map(|l| l.size), Some(UVec3::ONE));
    }

    #[test]
    fn test_mip_average_of_constant_is_constant() {
        let grid = DensityGrid {
            size: UVec3::splat(8),
            texels: vec![[0.25, 0.25, 0.0, 0.0]; 512],
        };
        let mips = DensityMips::build(&grid);
        for level in 0..mips.level_count() {
            assert!((mips.level_mean(level) - 0.25).abs() < 1e-6);
        }
        assert!((mips.sample_lod(Vec3::new(0.1, -0.2, 0.3), 1.7) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_peak_channel_matches_densest_voxel() {
        let grid = DensityGrid::synthesize(&small_params()).unwrap();
        let mips = DensityMips::build(&grid);
        let (_, densest) = grid.max_voxel();
        for level in 0..mips.level_count() {
            assert_eq!(mips.level_peak(level), densest);
        }
    }

    #[test]
    fn test_empty_peak_implies_empty_density() {
        // A small puff near one corner of an otherwise empty 32³ grid.
        let size = UVec3::splat(32);
        let mut texels = Vec::with_capacity(32 * 32 * 32);
        for z in 0..32 {
            for y in 0..32 {
                for x in 0..32 {
                    let d = UVec3::new(x, y, z).as_vec3().distance(Vec3::splat(6.0));
                    let density = if d <= 2.0 { 1.0 } else { 0.0 };
                    texels.push([density, density, 0.0, 0.0]);
                }
            }
        }
        let mips = DensityMips::build(&DensityGrid { size, texels });

        let mut empty_hits = 0;
        for i in 0..4000 {
            let f = i as f32;
            let p = Vec3::new(
                (f * 0.618_034).fract() - 0.5,
                (f * 0.414_214).fract() - 0.5,
                (f * 0.732_051).fract() - 0.5,
            );
            let lod = (f * 0.1).fract() * 2.0;
            let peak = mips.peak_lod(p, lod + 2.0);
            assert!(peak >= 0.0);
            if peak == 0.0 {
                empty_hits += 1;
                assert_eq!(mips.sample_lod(p, lod), 0.0, "empty peak over dust at {p}");
            }
        }
        assert!(empty_hits > 100, "only {empty_hits} empty samples");
    }

    #[test]
    fn test_sample_hits_voxel_centres_and_vanishes_outside() {
        let grid = DensityGrid::synthesize(&small_params()).unwrap();
        let mips = DensityMips::build(&grid);
        let id = UVec3::new(12, 8, 8);
        let centre = grid.voxel_center(id);
        assert!((mips.sample(centre) - grid.density(id)).abs() < 1e-5);
        assert_eq!(mips.sample(Vec3::new(0.6, 0.0, 0.0)), 0.0);
    }
}
