// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! EPS inputs, rasterized with Ghostscript

use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::{fit_within, NormalizedImage, Normalizer, Scratch, MAX_EDGE};
use crate::{Result, StocktagError};

/// Render resolution handed to Ghostscript
const RENDER_DPI: u32 = 150;

/// Rasterizes vector art to PNG
pub struct VectorNormalizer {
    ghostscript: PathBuf,
}

impl VectorNormalizer {
    pub fn new(ghostscript: &str) -> Self {
        Self {
            ghostscript: PathBuf::from(ghostscript),
        }
    }

    fn rasterize(&self, source: &Path, target: &Path) -> Result<()> {
        let output = Command::new(&self.ghostscript)
            .args([
                "-q",
                "-dSAFER",
                "-dBATCH",
                "-dNOPAUSE",
                "-dEPSCrop",
                "-sDEVICE=png16m",
                &format!("-r{}", RENDER_DPI),
            ])
            .arg(output_file_arg(target))
            .arg(source)
            .output()
            .map_err(|e| {
                StocktagError::Normalization(format!("Cannot run {:?}: {}", self.ghostscript, e))
            })?;

        if !output.status.success() || !target.exists() {
            return Err(StocktagError::Normalization(format!(
                "Ghostscript could not rasterize {:?}: {}",
                source,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// `-sOutputFile=` argument for `target`. Ghostscript reads `%` as a page
/// number format, so literal percent signs are doubled.
fn output_file_arg(target: &Path) -> String {
    format!("-sOutputFile={}", target.display().to_string().replace('%', "%%"))
}

impl Normalizer for VectorNormalizer {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn supported_extensions(&self) -> &[&str] {
        &["eps"]
    }

    fn normalize(&self, source: &Path, scratch: &mut Scratch) -> Result<NormalizedImage> {
        let target = scratch.file("eps", "png");
        self.rasterize(source, &target)?;

        let img = image::open(&target)
            .map_err(|e| StocktagError::Normalization(format!("Unreadable raster: {}", e)))?;
        if img.width() > MAX_EDGE || img.height() > MAX_EDGE {
            fit_within(img).save_with_format(&target, ImageFormat::Png)?;
        }
        debug!("Rasterized {:?} to {:?}", source, target);

        Ok(NormalizedImage::png(target))
    }
}
