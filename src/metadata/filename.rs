// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Output filename derivation

use chrono::NaiveDate;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::strip_punctuation;

/// Turn a title into a filename stem: punctuation removed, whitespace runs
/// collapsed to `_`, cut to `max_length` characters, `untitled` if nothing
/// is left.
pub fn safe_title(title: &str, max_length: usize) -> String {
    let stripped = strip_punctuation(title);
    let joined = stripped.split_whitespace().collect::<Vec<_>>().join("_");
    let truncated: String = joined.chars().take(max_length).collect();

    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated
    }
}

/// First free path in `dir` named `stem` + `extension`, or `stem_1`,
/// `stem_2`, … when taken. `extension` includes its leading dot (or is
/// empty). The name is claimed by creating an empty placeholder, so two
/// tasks can never settle on the same file.
pub fn claim_unique_path(dir: &Path, stem: &str, extension: &str) -> std::io::Result<PathBuf> {
    let mut counter = 0;
    loop {
        let candidate = if counter == 0 {
            dir.join(format!("{}{}", stem, extension))
        } else {
            dir.join(format!("{}_{}{}", stem, counter, extension))
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e),
        }
    }
}

/// `YYYYMMDD_<safe title>`
pub fn output_stem(title: &str, max_title_length: usize, date: NaiveDate) -> String {
    format!("{}_{}", date.format("%Y%m%d"), safe_title(title, max_title_length))
}

/// Extension of `name` with its leading dot, or "" when there is none
pub fn dotted_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}
