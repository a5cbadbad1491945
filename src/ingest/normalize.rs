//! Raw device buffers to packed RGB24.

use anyhow::{anyhow, ensure, Result};

/// Pixel layouts a capture device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    /// Packed 4:2:2 as `Y0 U Y1 V`. Most USB webcams default to this.
    Yuyv,
    /// Full-resolution Y plane followed by interleaved half-resolution UV.
    Nv12,
}

impl PixelFormat {
    fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Nv12 => "NV12",
        }
    }

    /// Bytes one `width`×`height` frame occupies in this layout.
    pub(crate) fn frame_len(self, width: u32, height: u32) -> Result<usize> {
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("{}x{} frame is too large", width, height))?;
        let len = match self {
            PixelFormat::Rgb24 => pixels.checked_mul(3),
            PixelFormat::Yuyv => pixels.checked_mul(2),
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
        };
        len.ok_or_else(|| anyhow!("{}x{} frame is too large", width, height))
    }
}

/// Convert one device buffer to packed RGB24. Trailing driver padding is ignored.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = format.frame_len(width, height)?;
    ensure!(
        pixels.len() >= expected,
        "{} buffer too short for {}x{}: expected {} bytes, got {}",
        format.name(),
        width,
        height,
        expected,
        pixels.len()
    );
    let pixels = &pixels[..expected];
    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Yuyv => {
            ensure!(width % 2 == 0, "YUYV frame width must be even, got {}", width);
            Ok(pixels
                .chunks_exact(4)
                .flat_map(|quad| {
                    let (u, v) = (quad[1], quad[3]);
                    [yuv_to_rgb(quad[0], u, v), yuv_to_rgb(quad[2], u, v)]
                })
                .flatten()
                .collect())
        }
        PixelFormat::Nv12 => {
            let width = width as usize;
            let (luma, chroma) = pixels.split_at(width * height as usize);
            let mut rgb = Vec::with_capacity(luma.len() * 3);
            for (row, luma_row) in luma.chunks_exact(width).enumerate() {
                let chroma_row = &chroma[(row / 2) * width..];
                for (col, &y) in luma_row.iter().enumerate() {
                    let pair = (col / 2) * 2;
                    rgb.extend_from_slice(&yuv_to_rgb(y, chroma_row[pair], chroma_row[pair + 1]));
                }
            }
            Ok(rgb)
        }
    }
}

/// BT.601 full-range conversion.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        to_u8(y + 1.402 * v),
        to_u8(y - 0.344_136 * u - 0.714_136 * v),
        to_u8(y + 1.772 * u),
    ]
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
