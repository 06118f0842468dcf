// Image optimization - size-reducing re-encode ahead of storage
//
// Re-encodes a decoded image as JPEG and keeps the result only when the
// projected savings clear the configured minimum percentage. Anything
// else (including a larger re-encode) keeps the original bytes.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::constants::OPTIMIZE_JPEG_QUALITY;
use crate::error::{Result, VaultError};

/// Re-encode `img` and return the smaller JPEG if it saves at least
/// `min_savings_percent` against `original_len`. `None` means "store the
/// original bytes".
pub fn reencode_smaller(
    img: &DynamicImage,
    original_len: usize,
    min_savings_percent: f64,
) -> Result<Option<Vec<u8>>> {
    let rgb = img.to_rgb8();
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, OPTIMIZE_JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|e| VaultError::Decode(format!("Optimize encode failed: {}", e)))?;

    if original_len == 0 || jpeg.len() >= original_len {
        return Ok(None);
    }

    let savings_percent = (original_len - jpeg.len()) as f64 / original_len as f64 * 100.0;
    if savings_percent >= min_savings_percent {
        Ok(Some(jpeg))
    } else {
        Ok(None)
    }
}
