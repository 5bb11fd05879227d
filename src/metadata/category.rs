// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Adobe Stock category taxonomy

/// Category names and their numeric codes, in match order.
pub const CATEGORY_MAP: [(&str, &str); 24] = [
    ("Animals", "1"),
    ("Architecture", "2"),
    ("Backgrounds/Textures", "3"),
    ("Beauty/Fashion", "4"),
    ("Business", "5"),
    ("Food & Drink", "6"),
    ("Healthcare/Medical", "7"),
    ("Holidays", "8"),
    ("Industrial", "9"),
    ("Interiors", "10"),
    ("Miscellaneous", "11"),
    ("Nature", "12"),
    ("Objects", "13"),
    ("Parks/Outdoor", "14"),
    ("People", "15"),
    ("Religion", "16"),
    ("Science", "17"),
    ("Signs/Symbols", "18"),
    ("Sports/Recreation", "19"),
    ("Technology", "20"),
    ("The Arts", "21"),
    ("Transportation", "22"),
    ("Travel", "23"),
    ("Vectors", "24"),
];

/// Category names joined for the prompt.
pub fn category_names() -> String {
    CATEGORY_MAP
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Map the model's free-text category to a code.
///
/// The first category whose name occurs (case-insensitively) anywhere in the
/// text wins. No match is not an error: it yields an empty code.
pub fn category_code(category_text: &str) -> &'static str {
    let haystack = category_text.to_lowercase();
    CATEGORY_MAP
        .iter()
        .find(|(name, _)| haystack.contains(&name.to_lowercase()))
        .map(|(_, code)| *code)
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_sequential() {
        for (i, (_, code)) in CATEGORY_MAP.iter().enumerate() {
            assert_eq!(*code, (i + 1).to_string());
        }
    }

    #[test]
    fn test_substring_match() {
        assert_eq!(category_code("This looks like Nature photography"), "12");
        assert_eq!(category_code("nature"), "12");
        assert_eq!(category_code("Food & Drink"), "6");
        assert_eq!(category_code("the arts"), "21");
    }

    #[test]
    fn test_first_declared_match_wins() {
        // Both "Animals" and "Nature" occur; Animals is declared first.
        assert_eq!(category_code("Nature, Animals"), "1");
    }

    #[test]
    fn test_no_match_is_empty() {
        assert_eq!(category_code("Abstract"), "");
        assert_eq!(category_code(""), "");
    }

    #[test]
    fn test_prompt_list_contains_every_name() {
        let names = category_names();
        assert!(names.starts_with("Animals, Architecture"));
        assert!(names.ends_with("Travel, Vectors"));
    }
}
