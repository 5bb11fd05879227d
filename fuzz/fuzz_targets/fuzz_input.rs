// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use stocktag::describe::parse_reply;
use stocktag::metadata::{category_code, resolve_keywords, safe_title};

#[derive(Arbitrary, Debug)]
struct Input {
    reply: String,
    custom_keywords: Option<String>,
    max_keywords: u8,
    max_title_length: u8,
}

fuzz_target!(|input: Input| {
    let parsed = parse_reply(&input.reply);

    let max_keywords = usize::from(input.max_keywords);
    let keywords = resolve_keywords(&parsed.keywords, input.custom_keywords.as_deref(), max_keywords);
    assert!(keywords.len() <= max_keywords);

    let mut seen = std::collections::HashSet::new();
    for keyword in &keywords {
        assert!(!keyword.is_empty());
        assert!(seen.insert(keyword.to_lowercase()));
    }

    let max_title_length = usize::from(input.max_title_length).max(1);
    let stem = safe_title(&parsed.title, max_title_length);
    assert!(!stem.is_empty());
    assert!(stem.chars().count() <= max_title_length.max("untitled".len()));
    assert!(!stem.contains(char::is_whitespace));

    let _ = category_code(&parsed.category);
});
