//! Texture readback for offscreen output and GPU tests.

/// Errors that can occur while copying a texture back to the host.
#[derive(Debug, thiserror::Error)]
pub enum ReadbackError {
    /// The buffer could not be mapped for reading.
    #[error("failed to map readback buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    /// Waiting for the device failed.
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    /// The map callback never ran.
    #[error("readback callback was dropped before completion")]
    CallbackDropped,

    /// The texture format has no fixed texel size.
    #[error("format {0:?} cannot be read back")]
    UnsupportedFormat(wgpu::TextureFormat),
}

/// Copy mip 0 of `texture` to the host, every slice of a 3-D texture included.
///
/// Returns tightly packed rows (row padding removed) in the texture's own format,
/// slice after slice.
pub fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<Vec<u8>, ReadbackError> {
    let format = texture.format();
    let bytes_per_pixel = format
        .block_copy_size(None)
        .ok_or(ReadbackError::UnsupportedFormat(format))?;
    let width = texture.width();
    let height = texture.height();
    let layers = texture.depth_or_array_layers();
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("texture-readback"),
        size: u64::from(padded) * u64::from(height) * u64::from(layers),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback-encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: layers,
        },
    );
    queue.submit([encoder.finish()]);

    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    })?;
    rx.recv().map_err(|_| ReadbackError::CallbackDropped)??;

    let mapped = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((unpadded * height * layers) as usize);
    for row in 0..height * layers {
        let start = (row * padded) as usize;
        pixels.extend_from_slice(&mapped[start..start + unpadded as usize]);
    }
    drop(mapped);
    buffer.unmap();

    Ok(pixels)
}

/// Decode an IEEE half-precision float.
pub fn f16_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = i32::from((bits >> 10) & 0x1f);
    let mantissa = f32::from(bits & 0x3ff);
    match exponent {
        0 => sign * mantissa * 2f32.powi(-24),
        31 if mantissa == 0.0 => sign * f32::INFINITY,
        31 => f32::NAN,
        e => sign * (1.0 + mantissa / 1024.0) * 2f32.powi(e - 15),
    }
}

/// Convert bytes returned by [`read_texture`] into RGBA floats.
pub fn decode_texels(format: wgpu::TextureFormat, bytes: &[u8]) -> Result<Vec<[f32; 4]>, ReadbackError> {
    let texels = match format {
        wgpu::TextureFormat::Rgba32Float => bytes
            .chunks_exact(16)
            .map(|t| std::array::from_fn(|c| f32::from_le_bytes([t[4 * c], t[4 * c + 1], t[4 * c + 2], t[4 * c + 3]])))
            .collect(),
        wgpu::TextureFormat::Rgba16Float => bytes
            .chunks_exact(8)
            .map(|t| std::array::from_fn(|c| f16_to_f32(u16::from_le_bytes([t[2 * c], t[2 * c + 1]]))))
            .collect(),
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => bytes
            .chunks_exact(4)
            .map(|t| std::array::from_fn(|c| f32::from(t[c]) / 255.0))
            .collect(),
        other => return Err(ReadbackError::UnsupportedFormat(other)),
    };
    Ok(texels)
}
