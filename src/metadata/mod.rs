// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Turning a model description into submission metadata

pub mod category;
pub mod filename;
pub mod keywords;

use regex::Regex;
use std::sync::OnceLock;

pub use category::{category_code, CATEGORY_MAP};
pub use filename::{claim_unique_path, dotted_extension, output_stem, safe_title};
pub use keywords::{resolve_keywords, split_keywords};

/// Drop every character that is neither a word character nor whitespace.
pub fn strip_punctuation(text: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let re = NON_WORD.get_or_init(|| Regex::new(r"[^\w\s]").expect("valid regex"));
    re.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_punctuation() {
        assert_eq!(strip_punctuation("A Red Car!"), "A Red Car");
        assert_eq!(strip_punctuation("Rock 'n' roll, baby?"), "Rock n roll baby");
        assert_eq!(strip_punctuation("snake_case stays"), "snake_case stays");
        assert_eq!(strip_punctuation("Café au lait"), "Café au lait");
    }
}
