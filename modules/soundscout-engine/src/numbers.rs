//! Parsing helpers for audience counts as rendered on profile pages.

/// Parse a count with optional `K`/`M`/`B` suffix and thousands separators.
/// `"1.2K"` → 1200, `"3.4M"` → 3_400_000, `"12,345"` → 12345.
///
/// Returns None for empty or non-numeric input, or anything at or above 1B
/// followers-equivalent times 1000 (garbage guard).
pub fn parse_count(text: &str) -> Option<u64> {
    let cleaned = text.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }

    let (digits, multiplier) = match cleaned.chars().last()? {
        'k' | 'K' => (&cleaned[..cleaned.len() - 1], 1_000f64),
        'm' | 'M' => (&cleaned[..cleaned.len() - 1], 1_000_000f64),
        'b' | 'B' => (&cleaned[..cleaned.len() - 1], 1_000_000_000f64),
        _ => (cleaned.as_str(), 1f64),
    };

    let value: f64 = digits.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let scaled = value * multiplier;
    if scaled >= 1e12 {
        return None;
    }
    Some(scaled.round() as u64)
}

/// Like [`parse_count`] but treats values at or above one billion as parse
/// garbage. Used for follower counts where >1B means a bad selector match.
pub fn parse_follower_count(text: &str) -> Option<u64> {
    parse_count(text).filter(|&n| n < 1_000_000_000)
}
