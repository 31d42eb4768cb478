//! JPEG decode → resample → encode.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use super::ResizeError;

const JPEG_QUALITY: u8 = 75;

/// Computes output dimensions for a `width` × `height` request against a
/// `src_w` × `src_h` source.
///
/// A zero side is derived from the other one so the aspect ratio is kept;
/// when both are zero the source size is returned unchanged. Derived sides
/// are rounded and never fall below one pixel.
pub fn target_dimensions(src_w: u32, src_h: u32, width: u32, height: u32) -> (u32, u32) {
    let scale = |side: u32, num: u32, den: u32| -> u32 {
        if den == 0 {
            return 1;
        }
        let scaled = (u64::from(side) * u64::from(num) + u64::from(den) / 2) / u64::from(den);
        u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
    };

    match (width, height) {
        (0, 0) => (src_w, src_h),
        (w, 0) => (w, scale(src_h, w, src_w)),
        (0, h) => (scale(src_w, h, src_h), h),
        (w, h) => (w, h),
    }
}

/// Decodes `data` as JPEG, resizes it to `width` × `height` (see
/// [`target_dimensions`]) with a Lanczos3 filter, and re-encodes it as JPEG.
///
/// The output may hold at most `max_pixels` pixels; larger targets are
/// refused before any buffer is allocated. CPU-bound; run it on the blocking
/// pool.
///
/// # Errors
///
/// [`ResizeError::Decode`] if `data` is not a JPEG,
/// [`ResizeError::OutputTooLarge`] if the target exceeds `max_pixels`, and
/// [`ResizeError::Encode`] if the resized image cannot be written.
pub fn resize_jpeg(data: &[u8], width: u32, height: u32, max_pixels: u64) -> Result<Bytes, ResizeError> {
    let source = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map_err(ResizeError::Decode)?;

    let (w, h) = target_dimensions(source.width(), source.height(), width, height);
    if u64::from(w) * u64::from(h) > max_pixels {
        return Err(ResizeError::OutputTooLarge {
            width: w,
            height: h,
            max_pixels,
        });
    }
    let resized = if (w, h) == (source.width(), source.height()) {
        source
    } else {
        source.resize_exact(w, h, FilterType::Lanczos3)
    };

    encode_jpeg(&resized)
}

fn encode_jpeg(image: &DynamicImage) -> Result<Bytes, ResizeError> {
    // JPEG has no alpha channel.
    let rgb = image.to_rgb8();
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(ResizeError::Encode)?;
    Ok(Bytes::from(buf.into_inner()))
}
