// src/utils/html.rs

/// Sanitizes authored quiz text with ammonia's whitelist (keeps <b>, <p>,
/// drops <script> and event attributes) and trims the result.
///
/// Returns `None` when nothing printable is left, so callers can drop the
/// prompt or option instead of rendering an empty control.
pub fn clean_authored_text(input: &str) -> Option<String> {
    let cleaned = ammonia::clean(input.trim());
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
