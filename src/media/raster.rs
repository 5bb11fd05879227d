// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! JPEG and PNG inputs

use std::path::Path;
use tracing::debug;

use super::{fit_within, write_jpeg, NormalizedImage, Normalizer, Scratch};
use crate::Result;

/// Re-encodes photos as bounded RGB JPEGs
pub struct RasterNormalizer;

impl RasterNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RasterNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer for RasterNormalizer {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn supported_extensions(&self) -> &[&str] {
        &["jpg", "jpeg", "png"]
    }

    fn normalize(&self, source: &Path, scratch: &mut Scratch) -> Result<NormalizedImage> {
        let img = fit_within(image::open(source)?);
        let target = scratch.file("resize", "jpg");
        write_jpeg(&img, &target)?;
        debug!("Resized {:?} to {}x{}", source, img.width(), img.height());
        Ok(NormalizedImage::jpeg(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, RgbaImage};

    #[test]
    fn test_png_becomes_bounded_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wide.png");
        DynamicImage::ImageRgba8(RgbaImage::new(1600, 400)).save(&source).unwrap();

        let mut scratch = Scratch::new(dir.path().to_path_buf(), 3);
        let normalized = RasterNormalizer::new().normalize(&source, &mut scratch).unwrap();

        assert_eq!(normalized.mime_type, "image/jpeg");
        assert_eq!(normalized.path, dir.path().join("resize_3.jpg"));
        let out = image::open(&normalized.path).unwrap();
        assert_eq!(out.dimensions(), (1024, 256));
        assert_eq!(
            image::ImageFormat::from_path(&normalized.path).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_corrupt_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.jpg");
        std::fs::write(&source, b"definitely not a jpeg").unwrap();

        let mut scratch = Scratch::new(dir.path().to_path_buf(), 1);
        assert!(RasterNormalizer::new().normalize(&source, &mut scratch).is_err());
    }
}
