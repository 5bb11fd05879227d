// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Video inputs: the middle frame stands in for the clip

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use super::{fit_within, write_jpeg, NormalizedImage, Normalizer, Scratch};
use crate::{Result, StocktagError};

/// Extracts the middle frame of a clip with FFmpeg
pub struct VideoNormalizer {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl VideoNormalizer {
    pub fn new(ffmpeg: &str, ffprobe: &str) -> Self {
        Self {
            ffmpeg: PathBuf::from(ffmpeg),
            ffprobe: PathBuf::from(ffprobe),
        }
    }

    /// Probe the first video stream with FFprobe
    fn probe(&self, path: &Path) -> Result<serde_json::Value> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-select_streams", "v:0",
                "-show_streams",
                "-show_format",
            ])
            .arg(path)
            .output()
            .map_err(|e| StocktagError::Normalization(format!("Cannot run {:?}: {}", self.ffprobe, e)))?;

        if !output.status.success() {
            return Err(StocktagError::Normalization(format!(
                "ffprobe could not read {:?}",
                path
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| StocktagError::Normalization(format!("Unreadable ffprobe output: {}", e)))
    }

    /// Decode frame `index` into `target` as PNG
    fn extract_frame(&self, path: &Path, index: u64, target: &Path) -> Result<()> {
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(path)
            .args([
                "-vf", &format!("select=eq(n\\,{})", index),
                "-frames:v", "1",
                "-y",
            ])
            .arg(target)
            .output()
            .map_err(|e| StocktagError::Normalization(format!("Cannot run {:?}: {}", self.ffmpeg, e)))?;

        if !output.status.success() || !target.exists() {
            return Err(StocktagError::Normalization(format!(
                "Could not read frame {} from {:?}: {}",
                index,
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Frame count of the probed stream: `nb_frames` when the container records
/// it, otherwise duration times frame rate.
pub fn frame_count(probe: &serde_json::Value) -> Option<u64> {
    let stream = probe.get("streams")?.as_array()?.first()?;

    let recorded = stream
        .get("nb_frames")
        .and_then(|n| n.as_str())
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0);
    if recorded.is_some() {
        return recorded;
    }

    let duration = stream
        .get("duration")
        .or_else(|| probe.get("format").and_then(|f| f.get("duration")))
        .and_then(|d| d.as_str())
        .and_then(|d| d.parse::<f64>().ok())?;
    let fps = stream
        .get("avg_frame_rate")
        .and_then(|f| f.as_str())
        .and_then(parse_rate)
        .or_else(|| stream.get("r_frame_rate").and_then(|f| f.as_str()).and_then(parse_rate))?;

    Some((duration * fps).floor() as u64)
}

/// Parse an FFmpeg rational such as `30000/1001`
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (value > 0.0).then_some(value)
}

impl Normalizer for VideoNormalizer {
    fn name(&self) -> &'static str {
        "video"
    }

    fn supported_extensions(&self) -> &[&str] {
        &["mp4", "mov"]
    }

    fn normalize(&self, source: &Path, scratch: &mut Scratch) -> Result<NormalizedImage> {
        let probe = self.probe(source)?;
        let middle = frame_count(&probe).unwrap_or(0) / 2;
        info!("Extracting frame {} of {:?}", middle, source);

        let frame = scratch.file("frame", "png");
        self.extract_frame(source, middle, &frame)?;

        let img = image::open(&frame)
            .map_err(|e| StocktagError::Normalization(format!("Unreadable frame: {}", e)))?;
        let img = fit_within(img);

        let thumb = scratch.file("thumb", "jpg");
        write_jpeg(&img, &thumb)?;
        debug!("Thumbnail for {:?} written to {:?}", source, thumb);

        Ok(NormalizedImage::jpeg(thumb))
    }
}
