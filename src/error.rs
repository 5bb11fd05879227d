// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for stocktag

use thiserror::Error;

/// Result type alias for stocktag operations
pub type Result<T> = std::result::Result<T, StocktagError>;

/// stocktag error types
#[derive(Error, Debug)]
pub enum StocktagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Gemini not available: {0}")]
    GeminiUnavailable(String),

    #[error("Normalization failed: {0}")]
    Normalization(String),

    #[error("Description failed: {0}")]
    Description(String),

    #[error("Ledger write failed: {0}")]
    Persistence(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Task aborted: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for StocktagError {
    fn from(e: tokio::task::JoinError) -> Self {
        StocktagError::Task(e.to_string())
    }
}
