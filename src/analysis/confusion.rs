//! Glyph confusion correction
//!
//! The recognizer routinely swaps visually similar glyphs. Correction rewrites
//! every mapped character independently and leaves the rest alone.
//!
//! Most pairs are involutions (`0`/`O`), so correcting an already-correct
//! string can break it. Only apply this to candidates that failed validation.

/// Fixed substitution table: (seen, replacement)
pub const CONFUSION_MAP: [(char, char); 13] = [
    ('0', 'O'),
    ('O', '0'),
    ('1', 'I'),
    ('I', '1'),
    ('5', 'S'),
    ('S', '5'),
    ('8', 'B'),
    ('B', '8'),
    ('2', 'Z'),
    ('Z', '2'),
    ('6', 'G'),
    ('G', '6'),
    ('D', '0'),
];

/// Replacement for a single glyph, if it is a known confusion
pub fn confused_with(c: char) -> Option<char> {
    CONFUSION_MAP
        .iter()
        .find(|(seen, _)| *seen == c)
        .map(|(_, replacement)| *replacement)
}

/// Apply the confusion map to every character of `candidate`.
///
/// Total and deterministic; output has the same number of characters as input.
/// Not idempotent: `correct(correct(s))` generally differs from `correct(s)`.
pub fn correct(candidate: &str) -> String {
    candidate
        .chars()
        .map(|c| confused_with(c).unwrap_or(c))
        .collect()
}
