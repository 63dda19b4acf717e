use super::types::{FFProbeOutput, VideoInfo};
use anyhow::{Context, Result};
use fl_core::{FrameGeometry, PipelineError};
use log::debug;
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm", "m4v", "ts"];

pub fn check_dependencies() -> Result<()> {
    for dep in ["ffmpeg", "ffprobe"] {
        which::which(dep).map_err(|_| {
            PipelineError::SourceUnavailable(format!("'{}' not found in PATH", dep))
        })?;
    }
    Ok(())
}

/// Width, height, frame rate and frame count of the first video stream.
pub fn probe_video(path: &Path) -> Result<VideoInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-select_streams",
            "v:0",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| PipelineError::SourceUnavailable(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(PipelineError::SourceUnavailable(format!(
            "ffprobe could not read {}",
            path.display()
        ))
        .into());
    }

    let (geometry, fps, nb_frames) = parse_probe(&output.stdout)?;
    let total_frames = match nb_frames {
        Some(n) => n,
        None => count_frames(path)?,
    };

    debug!(
        "Probed {}: {} @ {:.3} fps, {} frames",
        path.display(),
        geometry,
        fps,
        total_frames
    );
    Ok(VideoInfo {
        geometry,
        fps,
        total_frames,
    })
}

pub fn parse_probe(json: &[u8]) -> Result<(FrameGeometry, f64, Option<u64>)> {
    let parsed: FFProbeOutput = serde_json::from_slice(json)
        .map_err(|e| PipelineError::SourceUnavailable(format!("bad ffprobe output: {}", e)))?;

    let stream = parsed
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref().map_or(true, |t| t == "video"))
        .ok_or_else(|| PipelineError::SourceUnavailable("no video stream found".into()))?;

    let geometry = match (stream.width, stream.height) {
        (Some(w), Some(h)) => FrameGeometry::new(w, h)
            .map_err(|e| PipelineError::SourceUnavailable(e.to_string()))?,
        _ => {
            return Err(
                PipelineError::SourceUnavailable("video stream has no dimensions".into()).into(),
            )
        }
    };

    let fps = parse_frame_rate(&stream.r_frame_rate)
        .filter(|f| *f > 0.0)
        .ok_or_else(|| {
            PipelineError::SourceUnavailable(format!(
                "unusable frame rate '{}'",
                stream.r_frame_rate
            ))
        })?;

    let nb_frames = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .filter(|n| *n > 0);

    Ok((geometry, fps, nb_frames))
}

/// Accepts `num/den` (as ffprobe reports it) or a plain number.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => rate.trim().parse().ok(),
    }
}

/// Counts frames by remuxing the video stream to the null muxer. Slow, but
/// works for containers that do not store a frame count.
pub fn count_frames(path: &Path) -> Result<u64> {
    let output = Command::new("ffmpeg")
        .arg("-i")
        .arg(path)
        .args(["-map", "0:v:0", "-c", "copy", "-f", "null", "-"])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| PipelineError::SourceUnavailable(format!("failed to run ffmpeg: {}", e)))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    parse_frame_counter(&stderr).ok_or_else(|| {
        PipelineError::SourceUnavailable(format!("could not count frames of {}", path.display()))
            .into()
    })
}

/// Last `frame=` counter printed by ffmpeg.
pub fn parse_frame_counter(stderr: &str) -> Option<u64> {
    let idx = stderr.rfind("frame=")?;
    stderr[idx + "frame=".len()..]
        .trim_start()
        .split(|c: char| !c.is_ascii_digit())
        .next()?
        .parse()
        .ok()
}

/// Frames the encoder receives: every source frame plus `multiplier - 1`
/// inserts per consecutive pair.
pub fn total_output_frames(total_input: u64, multiplier: u32) -> u64 {
    if total_input == 0 {
        return 0;
    }
    let m = multiplier as u64;
    total_input * m - (m - 1)
}

/// `clip.mp4` at 2x of 30 fps becomes `clip_2X_60fps.mp4` next to the input.
pub fn default_output_path(input: &Path, multiplier: u32, fps_target: f64) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".into());
    input.with_file_name(format!(
        "{}_{}X_{}fps.{}",
        stem,
        multiplier,
        fps_target.round() as u64,
        ext
    ))
}

/// Video files in `dir`, sorted by name.
pub fn find_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(false, |ext| {
                        VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext))
                    })
        })
        .collect();
    files.sort();
    Ok(files)
}
