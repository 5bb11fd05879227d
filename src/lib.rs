// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! stocktag: stock media metadata generator
//!
//! Scans a folder of images, videos and vector files, asks a Gemini vision
//! model for a title, keywords and category, renames each file into the
//! output folder and records the metadata in a CSV ledger ready for upload.

pub mod config;
pub mod describe;
pub mod dispatcher;
pub mod error;
pub mod gemini;
pub mod ledger;
pub mod media;
pub mod metadata;
pub mod pipeline;

pub use config::AppConfig;
pub use error::{Result, StocktagError};
