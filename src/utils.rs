/// Average glyph advance as a fraction of the font size, used to size pills
/// and badges without a font database.
const GLYPH_ADVANCE_RATIO: f32 = 0.56;

pub fn escape_xml(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub fn estimate_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * GLYPH_ADVANCE_RATIO
}

/// Shortens `text` to at most `max_chars` characters, ending in an ellipsis.
pub fn truncate_label(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut shortened: String = trimmed.chars().take(keep).collect();
    shortened.push('\u{2026}');
    shortened
}

/// Uppercased first character, used for avatars.
pub fn initial(text: &str) -> String {
    text.trim()
        .chars()
        .next()
        .map(|ch| ch.to_uppercase().collect())
        .unwrap_or_else(|| "?".to_string())
}
