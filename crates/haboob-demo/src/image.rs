//! Linear HDR texels to an 8-bit sRGB PNG.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Linear-to-sRGB transfer for one channel in `[0, 1]`.
pub fn encode_srgb(linear: f32) -> f32 {
    let c = linear.clamp(0.0, 1.0);
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Quantize linear texels to opaque RGBA8, clamping out-of-range values.
///
/// NaN maps to black.
pub fn to_rgba8(texels: &[[f32; 4]]) -> Vec<u8> {
    let quantize = |v: f32| {
        let v = if v.is_nan() { 0.0 } else { v };
        (encode_srgb(v) * 255.0 + 0.5) as u8
    };
    texels
        .iter()
        .flat_map(|t| [quantize(t[0]), quantize(t[1]), quantize(t[2]), u8::MAX])
        .collect()
}

/// Write tightly packed RGBA8 rows to `path`, creating parent directories.
pub fn write_png(path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<(), PngWriteError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_srgb(png::SrgbRenderingIntent::Perceptual);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(rgba)?;
    writer.finish()?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PngWriteError {
    #[error("failed to create output: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode png: {0}")]
    Encoding(#[from] png::EncodingError),
}
