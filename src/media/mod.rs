// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Media normalization: any supported input becomes one still image that
//! fits within 1024x1024 and can be sent to the vision model.

pub mod raster;
pub mod vector;
pub mod video;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::ToolsConfig;
use crate::{Result, StocktagError};

/// Longest edge of a normalized image
pub const MAX_EDGE: u32 = 1024;

/// JPEG quality used for re-encoded stills
pub const JPEG_QUALITY: u8 = 85;

/// A still image ready for submission
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pub path: PathBuf,
    pub mime_type: &'static str,
}

impl NormalizedImage {
    pub fn jpeg(path: PathBuf) -> Self {
        Self { path, mime_type: "image/jpeg" }
    }

    pub fn png(path: PathBuf) -> Self {
        Self { path, mime_type: "image/png" }
    }
}

/// Scratch files of one task.
///
/// Names are namespaced by the task index so concurrent tasks never share a
/// path. Every file handed out is removed when the scratch is dropped.
#[derive(Debug)]
pub struct Scratch {
    dir: PathBuf,
    index: usize,
    files: Vec<PathBuf>,
}

impl Scratch {
    pub fn new(dir: PathBuf, index: usize) -> Self {
        Self { dir, index, files: Vec::new() }
    }

    /// Reserve `<dir>/<prefix>_<index>.<extension>`
    pub fn file(&mut self, prefix: &str, extension: &str) -> PathBuf {
        let path = self.dir.join(format!("{}_{}.{}", prefix, self.index, extension));
        self.files.push(path.clone());
        path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        for file in &self.files {
            if file.exists() {
                if let Err(e) = std::fs::remove_file(file) {
                    tracing::warn!("Failed to remove scratch file {:?}: {}", file, e);
                }
            }
        }
    }
}

/// Converts one kind of media into a still image
pub trait Normalizer: Send + Sync {
    /// Name of this normalizer
    fn name(&self) -> &'static str;

    /// File extensions this normalizer handles
    fn supported_extensions(&self) -> &[&str];

    /// Check if this normalizer can handle a file
    fn can_handle(&self, path: &Path) -> bool {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            self.supported_extensions().iter().any(|e| e.eq_ignore_ascii_case(ext))
        } else {
            false
        }
    }

    /// Produce the still image, writing intermediates into `scratch`
    fn normalize(&self, source: &Path, scratch: &mut Scratch) -> Result<NormalizedImage>;
}

/// Registry of all normalizers
pub struct NormalizerRegistry {
    normalizers: Vec<Box<dyn Normalizer>>,
}

impl NormalizerRegistry {
    /// Create a registry with the raster, video and vector normalizers
    pub fn new(tools: &ToolsConfig) -> Self {
        let mut registry = Self { normalizers: Vec::new() };
        registry.register(Box::new(raster::RasterNormalizer::new()));
        registry.register(Box::new(video::VideoNormalizer::new(&tools.ffmpeg, &tools.ffprobe)));
        registry.register(Box::new(vector::VectorNormalizer::new(&tools.ghostscript)));
        registry
    }

    pub fn register(&mut self, normalizer: Box<dyn Normalizer>) {
        self.normalizers.push(normalizer);
    }

    /// Find the normalizer for a file
    pub fn find(&self, path: &Path) -> Option<&dyn Normalizer> {
        self.normalizers
            .iter()
            .find(|n| n.can_handle(path))
            .map(|n| n.as_ref())
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.find(path).is_some()
    }

    /// Normalize `source` with whichever normalizer handles it
    pub fn normalize(&self, source: &Path, scratch: &mut Scratch) -> Result<NormalizedImage> {
        let normalizer = self.find(source).ok_or_else(|| {
            StocktagError::UnsupportedFileType(source.display().to_string())
        })?;
        debug!("Normalizing {:?} with {}", source, normalizer.name());
        normalizer.normalize(source, scratch)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.normalizers.iter().map(|n| n.name()).collect()
    }
}

/// Downscale so neither edge exceeds [`MAX_EDGE`], keeping the aspect ratio.
/// Smaller images are returned untouched.
pub fn fit_within(img: DynamicImage) -> DynamicImage {
    if img.width() > MAX_EDGE || img.height() > MAX_EDGE {
        img.resize(MAX_EDGE, MAX_EDGE, image::imageops::FilterType::Triangle)
    } else {
        img
    }
}

/// Write `img` as an RGB JPEG at [`JPEG_QUALITY`]
pub fn write_jpeg(img: &DynamicImage, path: &Path) -> Result<()> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let writer = BufWriter::new(File::create(path)?);
    let encoder = JpegEncoder::new_with_quality(writer, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, RgbImage};

    #[test]
    fn test_fit_within_downscales_longest_edge() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(2048, 1024));
        let fitted = fit_within(img);
        assert_eq!(fitted.dimensions(), (1024, 512));
    }

    #[test]
    fn test_fit_within_never_upscales() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(300, 200));
        assert_eq!(fit_within(img).dimensions(), (300, 200));
    }

    #[test]
    fn test_scratch_files_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut scratch = Scratch::new(dir.path().to_path_buf(), 7);
            let path = scratch.file("resize", "jpg");
            assert_eq!(path, dir.path().join("resize_7.jpg"));
            std::fs::write(&path, b"tmp").unwrap();
            path
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_registry_routes_by_extension() {
        let registry = NormalizerRegistry::new(&ToolsConfig::default());
        assert_eq!(registry.find(Path::new("a.JPG")).map(|n| n.name()), Some("raster"));
        assert_eq!(registry.find(Path::new("a.png")).map(|n| n.name()), Some("raster"));
        assert_eq!(registry.find(Path::new("a.MoV")).map(|n| n.name()), Some("video"));
        assert_eq!(registry.find(Path::new("a.mp4")).map(|n| n.name()), Some("video"));
        assert_eq!(registry.find(Path::new("a.eps")).map(|n| n.name()), Some("vector"));
        assert!(!registry.is_supported(Path::new("a.gif")));
        assert!(!registry.is_supported(Path::new("noext")));
    }

    #[test]
    fn test_unsupported_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = NormalizerRegistry::new(&ToolsConfig::default());
        let mut scratch = Scratch::new(dir.path().to_path_buf(), 1);
        let result = registry.normalize(Path::new("doc.pdf"), &mut scratch);
        assert!(matches!(result, Err(StocktagError::UnsupportedFileType(_))));
    }
}
