//! Multi-source artist enrichment with per-source failure isolation.
//!
//! Each source runs under its own timeout, the budget gate, and a bounded
//! retry policy. One source failing never cancels its peers; its result is
//! simply absent from the merge.

pub mod instagram;
pub mod lyrics;
pub mod spotify;
pub mod tiktok;
pub mod youtube;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use soundscout_common::error::{Result, SoundscoutError};
use soundscout_common::types::ArtistProfile;

use crate::cancel::CancelToken;
use crate::fetch::StrategyFetcher;
use crate::merge::{union_capped, MAX_GENRES, MAX_LYRIC_THEMES};
use crate::ports::{Analyzer, SpotifyApi};
use crate::quota::BudgetGate;

pub use instagram::InstagramData;
pub use lyrics::LyricsData;
pub use spotify::SpotifyData;
pub use tiktok::TikTokData;
pub use youtube::ChannelData;

const MAX_RETRIES: u32 = 2;
const BACKOFF_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct SourceTimeouts {
    pub spotify: Duration,
    pub instagram: Duration,
    pub tiktok: Duration,
    pub youtube: Duration,
    pub lyrics: Duration,
}

impl Default for SourceTimeouts {
    fn default() -> Self {
        Self {
            spotify: Duration::from_secs(20),
            instagram: Duration::from_secs(15),
            tiktok: Duration::from_secs(15),
            youtube: Duration::from_secs(15),
            lyrics: Duration::from_secs(30),
        }
    }
}

/// One source's successful result, as a closed sum.
#[derive(Debug, Clone)]
pub enum SourceOutcome {
    Spotify(SpotifyData),
    Instagram(InstagramData),
    TikTok(TikTokData),
    YoutubeChannel(ChannelData),
    Lyrics(LyricsData),
}

impl SourceOutcome {
    pub fn source_name(&self) -> &'static str {
        match self {
            SourceOutcome::Spotify(_) => "spotify",
            SourceOutcome::Instagram(_) => "instagram",
            SourceOutcome::TikTok(_) => "tiktok",
            SourceOutcome::YoutubeChannel(_) => "youtube_channel",
            SourceOutcome::Lyrics(_) => "lyrics",
        }
    }

    /// Merge into the profile under the deterministic merge rules.
    pub fn apply(&self, profile: &mut ArtistProfile) {
        use crate::merge::fill_if_empty;
        match self {
            SourceOutcome::Spotify(d) => {
                fill_if_empty(&mut profile.spotify_id, Some(&d.spotify_id));
                fill_if_empty(&mut profile.avatar_url, d.avatar_url.as_deref());
                fill_if_empty(&mut profile.bio, d.bio.as_deref());
                fill_if_empty(&mut profile.location, d.top_city.as_deref());
                if let Some(url) = &d.artist_url {
                    profile.social_links.fill(soundscout_common::types::Platform::Spotify, url);
                }
                union_capped(&mut profile.genres, &d.genres, MAX_GENRES);
                let mut counts = soundscout_common::types::FollowerCounts::default();
                counts.spotify_followers = d.followers;
                counts.spotify_monthly_listeners = d.monthly_listeners;
                profile.follower_counts.merge_max(&counts);
            }
            SourceOutcome::Instagram(d) => {
                fill_if_empty(&mut profile.instagram_handle, Some(&d.handle));
                fill_if_empty(&mut profile.website, d.external_url.as_deref());
                fill_if_empty(&mut profile.email, d.email.as_deref());
                let mut counts = soundscout_common::types::FollowerCounts::default();
                counts.instagram_followers = d.followers;
                profile.follower_counts.merge_max(&counts);
            }
            SourceOutcome::TikTok(d) => {
                fill_if_empty(&mut profile.tiktok_handle, Some(&d.handle));
                let mut counts = soundscout_common::types::FollowerCounts::default();
                counts.tiktok_followers = d.followers;
                counts.tiktok_likes = d.likes;
                profile.follower_counts.merge_max(&counts);
            }
            SourceOutcome::YoutubeChannel(d) => {
                fill_if_empty(&mut profile.youtube_channel_id, d.channel_id.as_deref());
                fill_if_empty(&mut profile.email, d.email.as_deref());
                fill_if_empty(&mut profile.website, d.links.website.as_deref());
                profile.social_links.merge_missing(&d.links);
                let mut counts = soundscout_common::types::FollowerCounts::default();
                counts.youtube_subscribers = d.subscribers;
                profile.follower_counts.merge_max(&counts);
            }
            SourceOutcome::Lyrics(d) => {
                union_capped(&mut profile.lyric_themes, &d.themes, MAX_LYRIC_THEMES);
            }
        }
    }
}

/// Retry an operation on `Transient`/`RateLimited`, with exponential backoff
/// (base 1 s, ±25% jitter) honoring Retry-After when present.
pub async fn with_retries<T, F, Fut>(op: &str, cancel: &CancelToken, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut tries = 0u32;
    loop {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && tries < MAX_RETRIES => {
                let delay = match &e {
                    SoundscoutError::RateLimited {
                        retry_after_secs: Some(secs),
                    } => Duration::from_secs(*secs),
                    _ => {
                        let base = BACKOFF_BASE * 2u32.pow(tries);
                        let jitter = rand::rng().random_range(0.75..1.25);
                        base.mul_f64(jitter)
                    }
                };
                tries += 1;
                debug!(op, attempt = tries, delay_ms = delay.as_millis() as u64, error = %e, "Retrying source operation");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SoundscoutError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct EnrichmentCoordinator {
    fetcher: Arc<StrategyFetcher>,
    spotify: Option<Arc<dyn SpotifyApi>>,
    analyzer: Option<Arc<dyn Analyzer>>,
    timeouts: SourceTimeouts,
}

impl EnrichmentCoordinator {
    pub fn new(
        fetcher: Arc<StrategyFetcher>,
        spotify: Option<Arc<dyn SpotifyApi>>,
        analyzer: Option<Arc<dyn Analyzer>>,
        timeouts: SourceTimeouts,
    ) -> Self {
        Self {
            fetcher,
            spotify,
            analyzer,
            timeouts,
        }
    }

    /// Fan out across all applicable sources and merge their successes into a
    /// fresh copy of the profile. Always returns a profile; failures only
    /// reduce how much of it is filled in.
    pub async fn enrich(
        &self,
        profile: &ArtistProfile,
        budget: &BudgetGate,
        cancel: &CancelToken,
    ) -> ArtistProfile {
        let mut enriched = profile.clone();

        let spotify_fut = self.run_source(
            "spotify",
            self.timeouts.spotify,
            cancel,
            spotify::enrich(
                self.spotify.as_deref(),
                &self.fetcher,
                &enriched,
                budget,
                cancel,
            ),
        );
        let instagram_fut = self.run_source(
            "instagram",
            self.timeouts.instagram,
            cancel,
            instagram::enrich(&self.fetcher, &enriched, budget, cancel),
        );
        let tiktok_fut = self.run_source(
            "tiktok",
            self.timeouts.tiktok,
            cancel,
            tiktok::enrich(&self.fetcher, &enriched, budget, cancel),
        );
        let youtube_fut = self.run_source(
            "youtube_channel",
            self.timeouts.youtube,
            cancel,
            youtube::enrich(&self.fetcher, &enriched, budget, cancel),
        );

        let (spotify_res, instagram_res, tiktok_res, youtube_res) =
            tokio::join!(spotify_fut, instagram_fut, tiktok_fut, youtube_fut);

        // Lyrics depends on track titles surfaced by the Spotify source, so
        // it runs as a second phase.
        let track_titles: Vec<String> = match &spotify_res {
            Some(SourceOutcome::Spotify(d)) => d.top_tracks.clone(),
            _ => Vec::new(),
        };
        let lyrics_res = if self.analyzer.is_some() && !track_titles.is_empty() {
            self.run_source(
                "lyrics",
                self.timeouts.lyrics,
                cancel,
                lyrics::enrich(
                    &self.fetcher,
                    self.analyzer.as_deref().expect("checked above"),
                    &enriched.name,
                    &track_titles,
                    budget,
                    cancel,
                ),
            )
            .await
        } else {
            None
        };

        let mut applied = 0usize;
        for outcome in [spotify_res, instagram_res, tiktok_res, youtube_res, lyrics_res]
            .into_iter()
            .flatten()
        {
            debug!(artist = %enriched.name, source = outcome.source_name(), "Applying source result");
            outcome.apply(&mut enriched);
            applied += 1;
        }
        info!(artist = %enriched.name, sources_applied = applied, "Enrichment complete");

        enriched
    }

    /// Run one source under its timeout, converting every failure into an
    /// absent result so peers are never disturbed.
    async fn run_source(
        &self,
        name: &'static str,
        timeout: Duration,
        cancel: &CancelToken,
        fut: impl std::future::Future<Output = Result<SourceOutcome>>,
    ) -> Option<SourceOutcome> {
        let bounded = tokio::time::timeout(timeout, fut);
        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            r = bounded => r,
        };
        match result {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(SoundscoutError::Cancelled)) => None,
            Ok(Err(e)) => {
                warn!(source = name, kind = %e.kind(), error = %e, "Source failed");
                None
            }
            Err(_) => {
                warn!(source = name, timeout_secs = timeout.as_secs(), "Source timed out");
                None
            }
        }
    }
}
