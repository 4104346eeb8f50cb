//! Title filtering and artist-name extraction.
//!
//! Deterministic, no LLM in this path. A title is accepted only when an
//! artist name can actually be extracted from it, so downstream stages never
//! see an accepted candidate without a canonical artist.

use std::sync::OnceLock;

use regex::Regex;

/// Title substrings that qualify a video on their own.
const PRIMARY_MARKER: &str = "official music video";

/// Secondary markers that qualify only together with artist-song structure.
const SECONDARY_MARKERS: &[&str] = &[
    "official video",
    "music video",
    "official mv",
    "official audio",
];

/// Standalone names that are never artists. The marker phrases themselves are
/// listed so a bare-marker title ("Official Music Video" with nothing else)
/// cannot leak through the no-separator extraction path as an artist.
const NAME_BLOCKLIST: &[&str] = &[
    "various artists",
    "vevo",
    "topic",
    "official",
    "music",
    "video",
    "audio",
    "lyrics",
    "live",
    "official music video",
    "official video",
    "music video",
    "official mv",
    "official audio",
];

/// Title/description keywords that disqualify a candidate outright.
const EXCLUDED_CONTENT: &[&str] = &[
    "ai cover",
    "karaoke",
    "instrumental",
    "reaction",
    "tutorial",
    "how to",
    "mashup",
    "remix by",
];

fn featured_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Token family that introduces a featured artist or collaborator.
        // Word-bounded so "Banda" or "Xavier" are untouched.
        Regex::new(
            r"(?i)\s*\b(?:feat\.?|featuring|ft\.?)\s+|\s+(?:&|\+|and|x|vs\.?|with)\s+|\s+w/\s*|\s*,\s+",
        )
        .expect("featured-artist regex compiles")
    })
}

/// Outcome of the title gate for a single candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleVerdict {
    /// Accepted, with the canonical artist name.
    Accepted { artist: String },
    Rejected { reason: &'static str },
}

/// Run the full title gate: marker check, excluded-content check, and artist
/// extraction. Accepting implies a non-empty canonical artist name.
pub fn evaluate_title(title: &str, description: Option<&str>) -> TitleVerdict {
    if !has_music_video_marker(title) {
        return TitleVerdict::Rejected {
            reason: "no music-video marker in title",
        };
    }
    if has_excluded_keyword(title, description) {
        return TitleVerdict::Rejected {
            reason: "excluded content keyword",
        };
    }
    match extract_artist(title) {
        Some(artist) => TitleVerdict::Accepted { artist },
        None => TitleVerdict::Rejected {
            reason: "no extractable artist name",
        },
    }
}

/// The marker gate: "official music video" anywhere, or a secondary marker
/// plus artist-song structure (`A - B`, `A | B`, `A : B`, `A (Official …)`,
/// `A [Official …]`).
pub fn has_music_video_marker(title: &str) -> bool {
    let folded = title.to_lowercase();
    if folded.contains(PRIMARY_MARKER) {
        return true;
    }
    if !SECONDARY_MARKERS.iter().any(|m| folded.contains(m)) {
        return false;
    }
    has_artist_song_structure(title)
}

fn has_artist_song_structure(title: &str) -> bool {
    if let Some((left, right)) = split_at_separator(title) {
        return !left.trim().is_empty() && !right.trim().is_empty();
    }
    // `A (Official …)` / `A [Official …]`
    for (open, _) in [('(', ')'), ('[', ']')] {
        if let Some(pos) = title.find(open) {
            let head = title[..pos].trim();
            let tail = title[pos..].to_lowercase();
            if !head.is_empty() && tail.contains("official") {
                return true;
            }
        }
    }
    false
}

fn has_excluded_keyword(title: &str, description: Option<&str>) -> bool {
    let mut haystack = title.to_lowercase();
    if let Some(d) = description {
        haystack.push(' ');
        haystack.push_str(&d.to_lowercase());
    }
    EXCLUDED_CONTENT.iter().any(|k| haystack.contains(k))
}

/// Split at the first `-`, `|`, or `:` at bracket depth zero. Separators must
/// be whitespace-delimited (colon may sit flush against the left side), so
/// hyphenated names like "Jay-Z" survive.
fn split_at_separator(title: &str) -> Option<(&str, &str)> {
    let bytes = title.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            b'-' | b'|' | b':' if depth == 0 => {
                let prev_ws = i > 0 && bytes[i - 1].is_ascii_whitespace();
                let next_ws = i + 1 < bytes.len() && bytes[i + 1].is_ascii_whitespace();
                let qualifies = (prev_ws && next_ws) || (b == b':' && next_ws);
                if qualifies {
                    return Some((&title[..i], &title[i + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the canonical artist name from an accepted title.
///
/// 1. Left side of the first top-level separator (or the text before the
///    first bracket group when there is no separator).
/// 2. Strip quotes and whitespace.
/// 3. Drop featured-artist suffixes, keeping the leftmost token group.
/// 4. Reject blocklisted, empty, over-long, or all-punctuation names.
pub fn extract_artist(title: &str) -> Option<String> {
    let raw = match split_at_separator(title) {
        Some((left, _)) => left,
        None => {
            let cut = title
                .find(['(', '['])
                .unwrap_or(title.len());
            &title[..cut]
        }
    };

    let trimmed = raw.trim().trim_matches(['"', '\'', '\u{201c}', '\u{201d}']);
    let main = strip_featured(trimmed);
    let candidate = main.trim().trim_end_matches([',', '.', ';']).trim();

    if !is_valid_artist_name(candidate) {
        return None;
    }
    Some(candidate.to_string())
}

/// Keep the leftmost token group before any featured-artist introducer.
pub fn strip_featured(name: &str) -> &str {
    match featured_split_re().find(name) {
        Some(m) if m.start() > 0 => &name[..m.start()],
        _ => name,
    }
}

fn is_valid_artist_name(name: &str) -> bool {
    if name.len() < 2 || name.len() > 50 {
        return false;
    }
    // all punctuation / no alphanumeric content
    if !name.chars().any(|c| c.is_alphanumeric()) {
        return false;
    }
    // bare year
    if name.len() == 4 && name.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let folded = name.to_lowercase();
    !NAME_BLOCKLIST.contains(&folded.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artist_of(title: &str) -> Option<String> {
        match evaluate_title(title, None) {
            TitleVerdict::Accepted { artist } => Some(artist),
            TitleVerdict::Rejected { .. } => None,
        }
    }

    #[test]
    fn accepts_primary_marker() {
        assert_eq!(
            artist_of("Alice - Song (Official Music Video)").as_deref(),
            Some("Alice")
        );
    }

    #[test]
    fn accepts_secondary_marker_with_structure() {
        assert_eq!(
            artist_of("Dave | Track Official Video").as_deref(),
            Some("Dave")
        );
        assert_eq!(
            artist_of("Mina: Nightfall (Official Audio)").as_deref(),
            Some("Mina")
        );
    }

    #[test]
    fn rejects_secondary_marker_without_structure() {
        assert_eq!(artist_of("great music video compilation"), None);
    }

    #[test]
    fn rejects_plain_titles() {
        assert_eq!(artist_of("Tutorial"), None);
        assert_eq!(artist_of("Alice - Song"), None);
    }

    #[test]
    fn rejects_excluded_content() {
        assert_eq!(artist_of("Alice - Song (Official Music Video) [AI Cover]"), None);
        assert_eq!(artist_of("Bob - Hit (Official Video) KARAOKE"), None);
    }

    #[test]
    fn strips_featured_artists() {
        assert_eq!(
            artist_of("Drake ft. Future - Life Is Good (Official Music Video)").as_deref(),
            Some("Drake")
        );
        assert_eq!(
            artist_of("Bob feat. Carol - Hit (Official Music Video)").as_deref(),
            Some("Bob")
        );
        assert_eq!(
            artist_of("Ana & Luis - Juntos (Official Video)").as_deref(),
            Some("Ana")
        );
        assert_eq!(
            artist_of("KQ x Moss - Collab (Official Music Video)").as_deref(),
            Some("KQ")
        );
    }

    #[test]
    fn featured_tokens_do_not_split_inside_words() {
        assert_eq!(
            artist_of("Banda Sonora - Tema (Official Music Video)").as_deref(),
            Some("Banda Sonora")
        );
        assert_eq!(
            artist_of("Xavier - Dawn (Official Music Video)").as_deref(),
            Some("Xavier")
        );
    }

    #[test]
    fn hyphenated_names_survive() {
        assert_eq!(
            artist_of("Jay-Z - Song (Official Music Video)").as_deref(),
            Some("Jay-Z")
        );
    }

    #[test]
    fn strips_quotes() {
        assert_eq!(
            artist_of("\"Alice\" - Song (Official Music Video)").as_deref(),
            Some("Alice")
        );
    }

    #[test]
    fn no_separator_falls_back_to_bracket_cut() {
        assert_eq!(
            artist_of("Alice (Official Music Video)").as_deref(),
            Some("Alice")
        );
    }

    #[test]
    fn rejects_blocklisted_names() {
        assert_eq!(artist_of("VEVO - Song (Official Music Video)"), None);
        assert_eq!(
            artist_of("Various Artists - Mix (Official Music Video)"),
            None
        );
        assert_eq!(artist_of("2023 - Recap (Official Music Video)"), None);
    }

    #[test]
    fn bare_marker_phrase_is_not_an_artist() {
        // passes the marker gate, but the whole title IS the marker — there
        // is no artist to extract
        assert_eq!(artist_of("official music video"), None);
        assert_eq!(artist_of("Official Music Video"), None);
        assert_eq!(artist_of("OFFICIAL MUSIC VIDEO"), None);
        // same for the secondary phrases when a structural split leaves only
        // the marker on the artist side
        assert_eq!(artist_of("Official Video - Official Music Video"), None);
        assert_eq!(artist_of("Official Audio (Official Music Video)"), None);
    }

    #[test]
    fn rejects_punctuation_only_artist() {
        assert_eq!(artist_of("... - Song (Official Music Video)"), None);
    }

    // The filter-implies-extractable property: anything accepted yields a
    // non-empty artist by construction of evaluate_title.
    #[test]
    fn accepted_always_extracts() {
        let titles = [
            "Alice - Song (Official Music Video)",
            "Bob feat. Carol - Hit (Official Music Video)",
            "Dave | Track Official Video",
            "Mina: Nightfall (Official Audio)",
            "Jay-Z - Song (Official Music Video)",
            "Alice (Official Music Video)",
        ];
        for t in titles {
            if let TitleVerdict::Accepted { artist } = evaluate_title(t, None) {
                assert!(!artist.trim().is_empty(), "empty artist for {t}");
            }
        }
    }
}
