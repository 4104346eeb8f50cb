//! Spotify source: Web API lookup plus an artist-page scrape for the numbers
//! the API does not expose (monthly listeners, top city).

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use soundscout_common::error::{Result, SoundscoutError};
use soundscout_common::types::ArtistProfile;

use crate::cancel::CancelToken;
use crate::fetch::{FetchHints, StrategyFetcher};
use crate::numbers::parse_count;
use crate::ports::SpotifyApi;
use crate::quota::BudgetGate;

use super::{with_retries, SourceOutcome};

const TOP_TRACKS_FOR_LYRICS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyData {
    pub spotify_id: String,
    pub genres: Vec<String>,
    pub followers: Option<u64>,
    pub monthly_listeners: Option<u64>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub top_city: Option<String>,
    pub top_tracks: Vec<String>,
    pub artist_url: Option<String>,
}

fn monthly_listeners_res() -> &'static [Regex; 2] {
    static RES: OnceLock<[Regex; 2]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"(?i)([\d,.]+)\s*monthly\s*listeners?").expect("listeners text regex"),
            Regex::new(r#""monthlyListeners":(\d+)"#).expect("listeners json regex"),
        ]
    })
}

fn top_city_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""city":"([^"]+)""#).expect("city regex"))
}

pub async fn enrich(
    api: Option<&dyn SpotifyApi>,
    fetcher: &StrategyFetcher,
    profile: &ArtistProfile,
    budget: &BudgetGate,
    cancel: &CancelToken,
) -> Result<SourceOutcome> {
    let Some(api) = api else {
        return Err(SoundscoutError::NotFound(
            "spotify credentials not configured".into(),
        ));
    };

    let artist = match &profile.spotify_id {
        Some(id) => {
            if !budget.try_acquire("spotify.artist", 1) {
                return Err(SoundscoutError::RateLimited {
                    retry_after_secs: None,
                });
            }
            with_retries("spotify.artist", cancel, || api.artist(id)).await?
        }
        None => {
            if !budget.try_acquire("spotify.search", 1) {
                return Err(SoundscoutError::RateLimited {
                    retry_after_secs: None,
                });
            }
            let name = &profile.name;
            with_retries("spotify.search", cancel, || async move {
                api.search_artist(name).await?.ok_or_else(|| {
                    SoundscoutError::NotFound(format!("no spotify match for {name}"))
                })
            })
            .await?
        }
    };

    let top_tracks = if budget.try_acquire("spotify.top_tracks", 1) {
        match api.top_tracks(&artist.id).await {
            Ok(tracks) => tracks.into_iter().take(TOP_TRACKS_FOR_LYRICS).collect(),
            Err(e) => {
                debug!(error = %e, "Top-tracks lookup failed, continuing without");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    if artist.followers >= 1_000_000_000 {
        return Err(SoundscoutError::DataQuality(
            "implausible spotify follower count".into(),
        ));
    }

    let mut data = SpotifyData {
        spotify_id: artist.id.clone(),
        genres: artist.genres,
        followers: Some(artist.followers),
        monthly_listeners: None,
        avatar_url: artist.avatar_url,
        bio: None,
        top_city: None,
        top_tracks,
        artist_url: artist.artist_url,
    };

    // Page scrape for fields the API does not carry. Failure here only costs
    // the extra fields.
    let page_url = format!("https://open.spotify.com/artist/{}", artist.id);
    match fetcher.fetch(&page_url, &FetchHints::default(), cancel).await {
        Ok(page) => scrape_artist_page(&page.html, &mut data),
        Err(e) => debug!(error = %e, "Artist page scrape failed, API data only"),
    }

    Ok(SourceOutcome::Spotify(data))
}

/// Pull monthly listeners, top city, and a bio out of the rendered page.
pub fn scrape_artist_page(html: &str, data: &mut SpotifyData) {
    for re in monthly_listeners_res() {
        if let Some(captures) = re.captures(html) {
            if let Some(n) = parse_count(&captures[1]) {
                data.monthly_listeners = Some(n);
                break;
            }
        }
    }

    if let Some(captures) = top_city_re().captures(html) {
        data.top_city = Some(captures[1].to_string());
    }

    if data.bio.is_none() {
        let document = scraper::Html::parse_document(html);
        let selector = scraper::Selector::parse("meta[property=\"og:description\"]")
            .expect("og:description selector");
        data.bio = document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(str::to_string)
            .filter(|s| !s.is_empty());
    }
}
