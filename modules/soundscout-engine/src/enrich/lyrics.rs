//! Lyrics source: fetch lyrics pages for the artist's top tracks and hand
//! the text to the analyzer.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use soundscout_common::error::{Result, SoundscoutError};

use crate::cancel::CancelToken;
use crate::fetch::{FetchHints, StrategyFetcher};
use crate::merge::{union_capped, MAX_LYRIC_THEMES};
use crate::ports::Analyzer;
use crate::quota::BudgetGate;

use super::SourceOutcome;

const MIN_LYRICS_CHARS: usize = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsData {
    pub themes: Vec<String>,
    pub language: Option<String>,
    pub songs_analyzed: usize,
}

pub async fn enrich(
    fetcher: &StrategyFetcher,
    analyzer: &dyn Analyzer,
    artist: &str,
    track_titles: &[String],
    budget: &BudgetGate,
    cancel: &CancelToken,
) -> Result<SourceOutcome> {
    let mut data = LyricsData {
        themes: Vec::new(),
        language: None,
        songs_analyzed: 0,
    };

    for title in track_titles.iter().take(3) {
        if cancel.is_cancelled() {
            return Err(SoundscoutError::Cancelled);
        }
        if !budget.try_acquire("lyrics.page", 1) {
            break;
        }

        let Some(text) = fetch_lyrics(fetcher, artist, title, cancel).await else {
            continue;
        };

        match analyzer.analyze_lyrics(&text, data.language.as_deref()).await {
            Ok(analysis) => {
                union_capped(&mut data.themes, &analysis.themes, MAX_LYRIC_THEMES);
                if data.language.is_none() {
                    data.language = Some(analysis.language);
                }
                data.songs_analyzed += 1;
            }
            Err(e) => debug!(track = %title, error = %e, "Lyric analysis failed"),
        }
    }

    if data.songs_analyzed == 0 {
        return Err(SoundscoutError::NotFound(format!(
            "no analyzable lyrics for {artist}"
        )));
    }
    Ok(SourceOutcome::Lyrics(data))
}

/// Try the known lyric sites in order; first page with enough text wins.
async fn fetch_lyrics(
    fetcher: &StrategyFetcher,
    artist: &str,
    title: &str,
    cancel: &CancelToken,
) -> Option<String> {
    for url in candidate_urls(artist, title) {
        match fetcher.fetch(&url, &FetchHints::plain_first_only(), cancel).await {
            Ok(page) => {
                let text = extract_lyrics_text(&page.html);
                if text.chars().count() >= MIN_LYRICS_CHARS {
                    return Some(text);
                }
                debug!(url, "Lyrics page too short, trying next site");
            }
            Err(e) => debug!(url, error = %e, "Lyrics fetch failed, trying next site"),
        }
    }
    None
}

/// Candidate lyrics-page URLs across the supported sites.
pub fn candidate_urls(artist: &str, title: &str) -> Vec<String> {
    let artist_slug = slug(artist);
    let title_slug = slug(title);
    if artist_slug.is_empty() || title_slug.is_empty() {
        return Vec::new();
    }
    vec![
        format!("https://www.musixmatch.com/lyrics/{artist_slug}/{title_slug}"),
        format!(
            "https://genius.com/{}-{}-lyrics",
            capitalize(&artist_slug),
            title_slug
        ),
    ]
}

/// Normalize the lyrics page to a single text blob. Site-specific containers
/// first, whole-body text as a fallback.
pub fn extract_lyrics_text(html: &str) -> String {
    let document = Html::parse_document(html);
    for selector in [
        "div[data-lyrics-container=\"true\"]",
        "span.lyrics__content__ok",
        "div.lyrics",
    ] {
        let sel = Selector::parse(selector).expect("lyrics selector");
        let text: String = document
            .select(&sel)
            .flat_map(|el| el.text())
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let body_sel = Selector::parse("body").expect("body selector");
    document
        .select(&body_sel)
        .next()
        .map(|b| b.text().collect::<Vec<_>>().join(" ").trim().to_string())
        .unwrap_or_default()
}

fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

fn capitalize(slug: &str) -> String {
    let mut chars = slug.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_url_safe() {
        assert_eq!(slug("Life Is Good"), "life-is-good");
        assert_eq!(slug("What's Up?!"), "what-s-up");
        assert_eq!(slug("  Déjà Vu  "), "déjà-vu");
    }

    #[test]
    fn candidate_urls_cover_both_sites() {
        let urls = candidate_urls("Drake", "Life Is Good");
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], "https://www.musixmatch.com/lyrics/drake/life-is-good");
        assert_eq!(urls[1], "https://genius.com/Drake-life-is-good-lyrics");
    }

    #[test]
    fn empty_slugs_yield_no_urls() {
        assert!(candidate_urls("...", "song").is_empty());
    }

    #[test]
    fn extracts_genius_container() {
        let html = r#"<html><body>
            <div data-lyrics-container="true">Woke up this morning<br>sun in my eyes</div>
        </body></html>"#;
        let text = extract_lyrics_text(html);
        assert!(text.contains("Woke up this morning"));
        assert!(text.contains("sun in my eyes"));
    }

    #[test]
    fn falls_back_to_body_text() {
        let html = "<html><body><p>some page</p></body></html>";
        assert_eq!(extract_lyrics_text(html), "some page");
    }
}
