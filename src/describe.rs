// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Asking a vision model for a title, keywords and a category

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::metadata::category::category_names;
use crate::Result;

/// Reply labels, in the order the model is asked to emit them
pub const TITLE_LABEL: &str = "Title:";
pub const KEYWORDS_LABEL: &str = "Keywords:";
pub const CATEGORY_LABEL: &str = "Category:";

/// Something that can describe an image given a prompt
#[async_trait]
pub trait Describer: Send + Sync {
    /// Send one image with one prompt and return the raw reply text
    async fn describe(&self, image: &[u8], mime_type: &str, prompt: &str) -> Result<String>;
}

/// Parsed model reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionResult {
    pub title: String,
    pub keywords: String,
    pub category: String,
}

impl DescriptionResult {
    /// All three fields present
    pub fn is_complete(&self) -> bool {
        !self.title.is_empty() && !self.keywords.is_empty() && !self.category.is_empty()
    }

    /// Names of the fields the reply left empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.is_empty() {
            missing.push("title");
        }
        if self.keywords.is_empty() {
            missing.push("keywords");
        }
        if self.category.is_empty() {
            missing.push("category");
        }
        missing
    }
}

/// Per-file limits that shape the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionRequest {
    pub max_title_length: usize,
    pub max_keywords: usize,
    pub custom_keywords: Option<String>,
}

impl DescriptionRequest {
    /// Build the structured prompt
    pub fn prompt(&self) -> String {
        let mut lines = vec![
            "Describe this image using exactly the following format, one field per line:".to_string(),
            format!(
                "{} Describe the image in clear, detailed terms, focusing on the main subject, \
                 setting and defining features. Describe only visible, tangible elements; avoid \
                 general themes, vague labels and inferred meanings. Do not start with \
                 'This image contains...'. Stay under {} characters.",
                TITLE_LABEL, self.max_title_length
            ),
            format!(
                "{} A comma-separated list of exactly {} relevant single-word keywords. \
                 Avoid copyrighted or trademarked words.",
                KEYWORDS_LABEL, self.max_keywords
            ),
        ];

        if let Some(custom) = self.custom_keywords.as_deref().filter(|c| !c.trim().is_empty()) {
            lines.push(format!("Ensure these keywords are included in the list: {}.", custom.trim()));
        }

        lines.push(format!(
            "{} The most relevant category from the following list: {}.",
            CATEGORY_LABEL,
            category_names()
        ));
        lines.push(
            "Do not include anything except the exact formatted result. No preamble, no closing remarks."
                .to_string(),
        );

        lines.join("\n")
    }
}

/// Value following `label` on the first line that starts with it, or "".
pub fn extract_field(reply: &str, label: &str) -> String {
    let pattern = format!(r"(?m)^[ \t]*{}[ \t]*(.*)$", regex::escape(label));
    match Regex::new(&pattern) {
        Ok(re) => re
            .captures(reply)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        Err(e) => {
            warn!("Bad label pattern {:?}: {}", label, e);
            String::new()
        }
    }
}

/// Split a reply into its three labeled fields
pub fn parse_reply(reply: &str) -> DescriptionResult {
    DescriptionResult {
        title: extract_field(reply, TITLE_LABEL),
        keywords: extract_field(reply, KEYWORDS_LABEL),
        category: extract_field(reply, CATEGORY_LABEL),
    }
}

/// Describe one image. Any failure is logged and reported as an empty
/// result, which callers must treat as a failed description.
pub async fn request_description(
    describer: &dyn Describer,
    image: &[u8],
    mime_type: &str,
    request: &DescriptionRequest,
) -> DescriptionResult {
    let prompt = request.prompt();
    match describer.describe(image, mime_type, &prompt).await {
        Ok(reply) => {
            debug!("Model reply: {:?}", reply);
            parse_reply(reply.trim())
        }
        Err(e) => {
            warn!("Description request failed: {}", e);
            DescriptionResult::default()
        }
    }
}
