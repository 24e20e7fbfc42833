//! Seeded lattice value noise and fractional-octave FBM.
//!
//! Mirrors the hash and interpolation in `density/synthesis.wgsl` operation for
//! operation, so the CPU grid and the GPU texture agree to within float rounding.

use glam::{UVec3, Vec3};

/// TEA key schedule constant.
pub const TEA_DELTA: u32 = 0x9e37_79b9;
const TEA_ROUNDS: u32 = 4;

/// Upper bound on the octave count; more layers are below f16 precision anyway.
pub const MAX_OCTAVES: f32 = 16.0;
/// Per-octave domain shift that decorrelates layers sampled at related frequencies.
pub const OCTAVE_SHIFT: f32 = 17.13;

/// Tiny Encryption Algorithm, reduced to four rounds, used as a 64-bit hash.
pub fn tea(v: [u32; 2], key: [u32; 4]) -> [u32; 2] {
    let [mut v0, mut v1] = v;
    let mut sum = 0u32;
    for _ in 0..TEA_ROUNDS {
        sum = sum.wrapping_add(TEA_DELTA);
        v0 = v0.wrapping_add(
            (v1 << 4).wrapping_add(key[0]) ^ v1.wrapping_add(sum) ^ (v1 >> 5).wrapping_add(key[1]),
        );
        v1 = v1.wrapping_add(
            (v0 << 4).wrapping_add(key[2]) ^ v0.wrapping_add(sum) ^ (v0 >> 5).wrapping_add(key[3]),
        );
    }
    [v0, v1]
}

/// Hash a lattice cell to a value in [0, 1).
///
/// Cells are two's-complement coordinates, so neighbours of the last
/// representable cell wrap instead of overflowing.
pub fn lattice_hash(cell: UVec3, key: [u32; 4]) -> f32 {
    let (x, y, z) = (cell.x, cell.y, cell.z);
    let v = [
        x.wrapping_mul(0x8da6_b343) ^ y.wrapping_mul(0xd816_3841),
        z.wrapping_mul(0xcb1a_b31f),
    ];
    let [h, _] = tea(v, key);
    (h >> 8) as f32 * (1.0 / 16_777_216.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Trilinearly interpolated lattice noise with smoothstep weights, in [0, 1).
pub fn value_noise(p: Vec3, key: [u32; 4]) -> f32 {
    let cell = p.floor();
    let f = p - cell;
    let u = f * f * (Vec3::splat(3.0) - 2.0 * f);
    // f32 -> i32 saturates, matching WGSL.
    let c = cell.as_ivec3().as_uvec3();
    let h = |dx: u32, dy: u32, dz: u32| lattice_hash(c.wrapping_add(UVec3::new(dx, dy, dz)), key);

    let x00 = lerp(h(0, 0, 0), h(1, 0, 0), u.x);
    let x10 = lerp(h(0, 1, 0), h(1, 1, 0), u.x);
    let x01 = lerp(h(0, 0, 1), h(1, 0, 1), u.x);
    let x11 = lerp(h(0, 1, 1), h(1, 1, 1), u.x);
    lerp(lerp(x00, x10, u.y), lerp(x01, x11, u.y), u.z)
}

/// Fractal Brownian motion normalized to [0, 1).
///
/// `octaves` may be fractional: its fractional part weights the last layer.
/// Each layer multiplies frequency by `gap` and divides amplitude by `increment`.
pub fn fbm(p: Vec3, key: [u32; 4], octaves: f32, gap: f32, increment: f32) -> f32 {
    let octaves = octaves.clamp(0.0, MAX_OCTAVES);
    let full = octaves.floor() as u32;
    let partial = octaves - full as f32;

    let mut frequency = 1.0f32;
    let mut amplitude = 1.0f32;
    let mut total = 0.0f32;
    let mut norm = 0.0f32;
    for o in 0..=full {
        let weight = if o == full { partial } else { 1.0 };
        if weight <= 0.0 {
            break;
        }
        let shifted = p * frequency + Vec3::splat(o as f32 * OCTAVE_SHIFT);
        total += weight * amplitude * value_noise(shifted, key);
        norm += weight * amplitude;
        frequency *= gap;
        amplitude /= increment;
    }

    if norm > 0.0 { total / norm } else { 0.5 }
}
