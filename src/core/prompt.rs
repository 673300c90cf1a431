//! Extraction prompt construction.
//!
//! The dispatcher itself is prompt-agnostic; callers build the prompt here
//! and hand it over as an opaque string.

use std::fmt::Write as _;

use crate::core::record::ExtractField;

/// System message sent with every extraction request.
pub const SYSTEM_PROMPT: &str = "You are a precise research-literature \
    extraction assistant. You respond with a single JSON object and nothing \
    else: no prose, no markdown fences, no commentary.";

/// Build the user prompt for extracting structured data from an abstract.
///
/// Lists every expected JSON key except `original_title`, which is pinned
/// from caller input and never requested from the model.
#[must_use]
pub fn build_extraction_prompt(abstract_text: &str, title: Option<&str>) -> String {
    let mut prompt = String::with_capacity(abstract_text.len() + 512);
    prompt.push_str(
        "Extract the following fields from the research abstract below and \
         return them as a JSON object. Use exactly these keys:\n",
    );
    for field in ExtractField::ALL {
        if field == ExtractField::OriginalTitle {
            continue;
        }
        let _ = writeln!(prompt, "- \"{}\"", field.canonical_key());
    }
    prompt.push_str(
        "\nIf a field is not mentioned in the abstract, use the string \
         \"not explicitly stated\". For \"translated_title\", translate the \
         title into English.\n",
    );
    if let Some(title) = title {
        if !title.trim().is_empty() {
            let _ = writeln!(prompt, "\nTitle: {}", title.trim());
        }
    }
    let _ = write!(prompt, "\nAbstract:\n{}", abstract_text.trim());
    prompt
}
