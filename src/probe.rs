// Media probing: image decode and ffprobe wrapper for video metadata

use std::path::Path;
use std::process::Command;

use image::DynamicImage;
use serde::Deserialize;

use crate::error::{Result, VaultError};
use crate::model::VideoMeta;

/// Decode an in-memory image. Corrupt or unsupported input fails before
/// any storage mutation happens.
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(data).map_err(|e| VaultError::Decode(e.to_string()))
}

/// Dimensions plus stream details for a video file.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: i32,
    pub height: i32,
    pub meta: VideoMeta,
}

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<i32>,
    height: Option<i32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

/// Run ffprobe on a video file and extract dimensions and stream details.
pub fn probe_video(path: &Path) -> Result<VideoInfo> {
    let output = Command::new(crate::tools::ffprobe_path())
        .args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| VaultError::FFprobe(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VaultError::Decode(format!(
            "ffprobe rejected {}: {}",
            path.display(),
            stderr
        )));
    }

    let probe_output: FFprobeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| VaultError::FFprobe(format!("Failed to parse ffprobe output: {}", e)))?;

    let mut info = VideoInfo {
        width: 0,
        height: 0,
        meta: VideoMeta::default(),
    };
    let mut saw_video_stream = false;

    if let Some(ref streams) = probe_output.streams {
        for stream in streams {
            match stream.codec_type.as_deref() {
                Some("video") if !saw_video_stream => {
                    saw_video_stream = true;
                    info.width = stream.width.unwrap_or(0);
                    info.height = stream.height.unwrap_or(0);
                    info.meta.video_codec = stream.codec_name.clone();
                    info.meta.fps = parse_frame_rate(stream.r_frame_rate.as_deref());
                    if let Some(ms) = parse_duration_ms(stream.duration.as_deref()) {
                        info.meta.duration_ms = ms;
                    }
                }
                Some("audio") => {
                    info.meta.has_audio = true;
                    if info.meta.audio_codec.is_none() {
                        info.meta.audio_codec = stream.codec_name.clone();
                    }
                }
                _ => {}
            }
        }
    }

    if !saw_video_stream {
        return Err(VaultError::Decode(format!(
            "No video stream in {}",
            path.display()
        )));
    }

    if let Some(ref format) = probe_output.format {
        if info.meta.duration_ms == 0 {
            if let Some(ms) = parse_duration_ms(format.duration.as_deref()) {
                info.meta.duration_ms = ms;
            }
        }
        info.meta.bitrate = format.bit_rate.as_ref().and_then(|s| s.parse().ok());
    }

    Ok(info)
}

/// Parse frame rate string like "30000/1001" to f64
fn parse_frame_rate(rate_str: Option<&str>) -> Option<f64> {
    let rate_str = rate_str?;
    if let Some((num, den)) = rate_str.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
    }
    rate_str.parse().ok()
}

/// Parse duration string (seconds) to milliseconds
fn parse_duration_ms(duration_str: Option<&str>) -> Option<i64> {
    let duration_str = duration_str?;
    let seconds: f64 = duration_str.parse().ok()?;
    Some((seconds * 1000.0) as i64)
}
