#![cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]

use anyhow::{anyhow, Result};

/// Pixel layouts a capture device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Nv12,
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"NV12" => Some(Self::Nv12),
            b"YUYV" => Some(Self::Yuyv),
            _ => None,
        }
    }
}

pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    match format {
        PixelFormat::Rgb24 => {
            let expected = plane_len(width, height, 3)?;
            if pixels.len() < expected {
                return Err(anyhow!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            // Drivers may pad the mapped buffer; keep exactly one image.
            Ok(pixels[..expected].to_vec())
        }
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width, height),
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, width, height),
    }
}

fn plane_len(width: u32, height: u32, bytes_per_pixel: usize) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(bytes_per_pixel))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = plane_len(width, height, 1)?;
    let expected = y_plane
        .checked_add(y_plane / 2)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    if pixels.len() < expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i];
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let offset = (j * w + i) * 3;
            write_yuv(&mut rgb[offset..offset + 3], y, pixels[uv_index], pixels[uv_index + 1]);
        }
    }

    Ok(rgb)
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = plane_len(width, height, 2)?;
    if pixels.len() < expected || width % 2 != 0 {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {} bytes for even width, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; plane_len(width, height, 3)?];
    for (pair, out) in pixels[..expected]
        .chunks_exact(4)
        .zip(rgb.chunks_exact_mut(6))
    {
        let (y0, u, y1, v) = (pair[0], pair[1], pair[2], pair[3]);
        write_yuv(&mut out[..3], y0, u, v);
        write_yuv(&mut out[3..], y1, u, v);
    }
    Ok(rgb)
}

fn write_yuv(out: &mut [u8], y: u8, u: u8, v: u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    out[0] = clamp_to_u8(y + 1.402_f32 * v);
    out[1] = clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v);
    out[2] = clamp_to_u8(y + 1.772_f32 * u);
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let rgb = normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn yuyv_conversion_produces_gray() -> Result<()> {
        let yuyv = vec![200u8, 128, 200, 128];
        let rgb = normalize_to_rgb(&yuyv, 2, 1, PixelFormat::Yuyv)?;
        assert_eq!(rgb, vec![200u8; 6]);
        Ok(())
    }

    #[test]
    fn rgb_pass_through_trims_padding() -> Result<()> {
        let mut pixels = vec![1u8; 9];
        pixels.extend_from_slice(&[0, 0, 0]);
        let rgb = normalize_to_rgb(&pixels, 1, 3, PixelFormat::Rgb24)?;
        assert_eq!(rgb, vec![1u8; 9]);
        Ok(())
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(normalize_to_rgb(&[0u8; 5], 2, 1, PixelFormat::Rgb24).is_err());
        assert!(normalize_to_rgb(&[0u8; 3], 2, 1, PixelFormat::Yuyv).is_err());
    }

    #[test]
    fn fourcc_lookup() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
