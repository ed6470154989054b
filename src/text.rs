//! Post-processing of recognized text.

/// Apply punctuation and capitalization cleanup to recognized text.
///
/// Trims surrounding whitespace, collapses internal whitespace runs to a
/// single space, appends a period unless the text already ends in `.`, `!`
/// or `?`, and upper-cases the first character. Idempotent:
/// `punctuate(punctuate(x)) == punctuate(x)`.
#[must_use]
pub fn punctuate(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut result = String::with_capacity(trimmed.len() + 1);
    let mut last_was_space = false;
    for ch in trimmed.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                result.push(' ');
            }
            last_was_space = true;
        } else {
            result.push(ch);
            last_was_space = false;
        }
    }

    if !result.ends_with(['.', '!', '?']) {
        result.push('.');
    }

    // Capitalize the first character (may expand to multiple chars, e.g. ß).
    let mut chars = result.chars();
    match chars.next() {
        Some(first) if !first.is_uppercase() => {
            let mut capitalized: String = first.to_uppercase().collect();
            capitalized.push_str(chars.as_str());
            capitalized
        }
        _ => result,
    }
}
