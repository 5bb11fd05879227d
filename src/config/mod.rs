// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for stocktag
//!
//! The on-disk format is a flat JSON object. Every key is optional so that
//! partially written or older config files still load.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Result, StocktagError};

/// Known Gemini model identifiers, default first.
pub const GEMINI_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-2.5-pro-exp-03-25",
    "gemini-2.0-pro",
    "gemini-2.0-flash-lite",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
    "gemini-1.5-flash-8b",
];

/// Upper bound on the worker pool size
pub const MAX_WORKERS: usize = 10;

/// Upper bound on the inter-task delay, in seconds
pub const MAX_DELAY_SECS: u64 = 60;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Gemini API key
    #[serde(default)]
    pub api_key: String,

    /// Gemini model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Directory scanned (recursively) for media
    #[serde(default)]
    pub input_path: String,

    /// Directory receiving renamed files, the Error folder and the ledger
    #[serde(default)]
    pub output_path: String,

    /// Maximum title length in characters
    #[serde(default = "default_max_title_length")]
    pub max_title_length: usize,

    /// Maximum number of keywords kept per file
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Number of files processed in parallel
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pause after each processed file, in seconds
    #[serde(default = "default_delay")]
    pub delay: u64,

    /// Keywords that must appear in every file's keyword list
    #[serde(default)]
    pub custom_keywords: String,

    /// Base URL of the Gemini REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout for the description call
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retries after a failed description call
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// External tool locations
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
    #[serde(default = "default_ghostscript")]
    pub ghostscript: String,
}

// Default value functions
fn default_model() -> String { GEMINI_MODELS[0].to_string() }
fn default_max_title_length() -> usize { 120 }
fn default_max_keywords() -> usize { 49 }
fn default_workers() -> usize { 1 }
fn default_delay() -> u64 { 6 }
fn default_api_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_timeout() -> u64 { 120 }
fn default_retries() -> u32 { 1 }
fn default_ffmpeg() -> String { "ffmpeg".to_string() }
fn default_ffprobe() -> String { "ffprobe".to_string() }

fn default_ghostscript() -> String {
    if cfg!(windows) { "gswin64c".to_string() } else { "gs".to_string() }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            input_path: String::new(),
            output_path: String::new(),
            max_title_length: default_max_title_length(),
            max_keywords: default_max_keywords(),
            workers: default_workers(),
            delay: default_delay(),
            custom_keywords: String::new(),
            api_base_url: default_api_base_url(),
            timeout_secs: default_timeout(),
            retries: default_retries(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            ghostscript: default_ghostscript(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| StocktagError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges. Paths and the API key are checked at run time.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(StocktagError::Config("model must not be empty".to_string()));
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(StocktagError::Config(format!(
                "workers must be between 1 and {}, got {}",
                MAX_WORKERS, self.workers
            )));
        }
        if self.delay > MAX_DELAY_SECS {
            return Err(StocktagError::Config(format!(
                "delay must be at most {} seconds, got {}",
                MAX_DELAY_SECS, self.delay
            )));
        }
        if !(1..=999).contains(&self.max_title_length) {
            return Err(StocktagError::Config(format!(
                "max_title_length must be between 1 and 999, got {}",
                self.max_title_length
            )));
        }
        if !(1..=999).contains(&self.max_keywords) {
            return Err(StocktagError::Config(format!(
                "max_keywords must be between 1 and 999, got {}",
                self.max_keywords
            )));
        }
        if self.timeout_secs == 0 {
            return Err(StocktagError::Config("timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn input_dir(&self) -> PathBuf {
        PathBuf::from(&self.input_path)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_path)
    }

    /// Custom keywords, or `None` when blank
    pub fn custom_keywords(&self) -> Option<&str> {
        let trimmed = self.custom_keywords.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}
