//! Candidate extraction from raw recognizer text

use super::code::{has_code_shape, CODE_LEN};

/// Strip all whitespace and uppercase the rest
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Find every code-shaped substring of `raw`, left to right.
///
/// Matches never overlap: once a window matches, scanning resumes right
/// after it. Vocabulary membership is not checked here.
pub fn extract_candidates(raw: &str) -> Vec<String> {
    let cleaned = normalize(raw);
    let bytes = cleaned.as_bytes();
    let mut candidates = Vec::new();

    let mut i = 0;
    while i + CODE_LEN <= bytes.len() {
        let window = &bytes[i..i + CODE_LEN];
        if has_code_shape(window) {
            // The window is all ASCII, so both ends sit on char boundaries.
            candidates.push(cleaned[i..i + CODE_LEN].to_string());
            i += CODE_LEN;
        } else {
            i += 1;
        }
    }

    candidates
}
