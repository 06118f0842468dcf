// Thumbnail generation
//
// Creates JPG previews capped at THUMB_MAX_WIDTH for grid display.
// Images are resized in-process; videos get their first frame extracted
// through ffmpeg.

use std::path::Path;
use std::process::Command;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::constants::{THUMB_MAX_WIDTH, THUMB_QUALITY};
use crate::error::{Result, VaultError};

/// An encoded thumbnail plus its derived dimensions.
#[derive(Debug, Clone)]
pub struct ThumbRender {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Render a JPEG thumbnail from a decoded image, capping width at
/// `max_width` while preserving aspect ratio. Narrower images are
/// re-encoded at their own size.
pub fn render_thumbnail(img: &DynamicImage, max_width: u32) -> Result<ThumbRender> {
    let scaled;
    let source = if img.width() > max_width {
        scaled = img.thumbnail(max_width, u32::MAX);
        &scaled
    } else {
        img
    };

    let rgb = source.to_rgb8();
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, THUMB_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|e| VaultError::Decode(format!("Thumbnail encode failed: {}", e)))?;

    Ok(ThumbRender {
        jpeg,
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// Extract the first frame of a video as a thumbnail, scaled down to
/// `max_width`. Writes through a temp file for atomicity.
pub fn video_thumbnail(source_path: &Path, output_path: &Path, max_width: u32) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = output_path.with_extension("tmp.jpg");

    let scale_filter = format!("scale='min({},iw)':-1", max_width);

    // FFmpeg quality scale is 1-31 where 1 is best
    let q_value = ((100 - THUMB_QUALITY as u32) as f32 / 100.0 * 30.0 + 1.0) as u32;

    let output = Command::new(crate::tools::ffmpeg_path())
        .args([
            "-y",
            "-i", &source_path.to_string_lossy(),
            "-vframes", "1",
            "-vf", &scale_filter,
            "-q:v", &q_value.to_string(),
            &tmp_path.to_string_lossy(),
        ])
        .output()
        .map_err(|e| VaultError::FFmpeg(format!("Failed to run ffmpeg: {}", e)))?;

    if !output.status.success() {
        let _ = std::fs::remove_file(&tmp_path);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VaultError::FFmpeg(format!(
            "Frame extraction failed: {}",
            stderr
        )));
    }

    std::fs::rename(&tmp_path, output_path)?;

    if !output_path.exists() || std::fs::metadata(output_path)?.len() == 0 {
        let _ = std::fs::remove_file(output_path);
        return Err(VaultError::FFmpeg(
            "Video thumbnail is empty or missing".to_string(),
        ));
    }

    Ok(())
}

/// Default-width convenience used by the ingest pipeline.
pub fn render_default_thumbnail(img: &DynamicImage) -> Result<ThumbRender> {
    render_thumbnail(img, THUMB_MAX_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_wide_image_capped_at_max_width() {
        let img = gradient(1200, 800);
        let thumb = render_thumbnail(&img, THUMB_MAX_WIDTH).unwrap();
        assert_eq!(thumb.width, THUMB_MAX_WIDTH);
        // Aspect ratio preserved: 1200x800 -> 400x266
        assert!((thumb.height as i64 - 266).abs() <= 1);

        let decoded = image::load_from_memory(&thumb.jpeg).unwrap();
        assert_eq!(decoded.width(), THUMB_MAX_WIDTH);
    }

    #[test]
    fn test_narrow_image_keeps_its_size() {
        let img = gradient(200, 100);
        let thumb = render_thumbnail(&img, THUMB_MAX_WIDTH).unwrap();
        assert_eq!((thumb.width, thumb.height), (200, 100));
    }
}
