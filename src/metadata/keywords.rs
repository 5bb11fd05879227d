// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Keyword merging and ordering

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn separators() -> &'static Regex {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    SEPARATORS.get_or_init(|| Regex::new(r"[\s,;]+").expect("valid regex"))
}

/// Split a keyword string on runs of whitespace, commas and semicolons.
pub fn split_keywords(text: &str) -> Vec<String> {
    separators()
        .split(text)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

/// Build the final keyword list for one file.
///
/// Custom keywords come first, in the order given. Model keywords follow,
/// ordered by where they first occur (case-insensitively) in `model_text`;
/// a keyword that cannot be located keeps its relative order after the ones
/// that can. Duplicates are dropped case-insensitively, first occurrence
/// wins, and the list is cut to `max_keywords`.
pub fn resolve_keywords(model_text: &str, custom: Option<&str>, max_keywords: usize) -> Vec<String> {
    let mut seen = HashSet::new();

    let pinned: Vec<String> = custom
        .map(split_keywords)
        .unwrap_or_default()
        .into_iter()
        .filter(|kw| seen.insert(kw.to_lowercase()))
        .collect();

    let source = model_text.to_lowercase();
    let mut ranked: Vec<(usize, String)> = split_keywords(model_text)
        .into_iter()
        .filter(|kw| seen.insert(kw.to_lowercase()))
        .map(|kw| {
            let position = source.find(&kw.to_lowercase()).unwrap_or(usize::MAX);
            (position, kw)
        })
        .collect();
    ranked.sort_by_key(|(position, _)| *position);

    pinned
        .into_iter()
        .chain(ranked.into_iter().map(|(_, kw)| kw))
        .take(max_keywords)
        .collect()
}
