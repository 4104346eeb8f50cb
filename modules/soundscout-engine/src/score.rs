//! Enrichment scoring — a pure function of the frozen profile.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use soundscout_common::types::ArtistProfile;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email regex compiles")
    })
}

const FOLLOWER_BONUS_THRESHOLD: u64 = 1000;

/// Deterministic 0..1 completeness score. Component weights sum to 1.0;
/// follower bonuses are additive and the total is clamped.
pub fn score(profile: &ArtistProfile) -> f32 {
    let mut total = 0.0f32;

    if profile
        .youtube_channel_id
        .as_deref()
        .is_some_and(|id| !id.is_empty())
    {
        total += 0.10;
    }
    if profile
        .instagram_handle
        .as_deref()
        .is_some_and(|h| !h.is_empty())
    {
        total += 0.15;
    }
    if profile.spotify_id.as_deref().is_some_and(|id| !id.is_empty()) {
        total += 0.15;
    }
    if profile
        .email
        .as_deref()
        .is_some_and(|e| email_re().is_match(e.trim()))
    {
        total += 0.20;
    }
    if profile.website.as_deref().is_some_and(is_absolute_url) {
        total += 0.10;
    }
    if !profile.genres.is_empty() {
        total += 0.10;
    }
    if profile
        .bio
        .as_deref()
        .is_some_and(|b| b.trim().chars().count() > 50)
    {
        total += 0.10;
    }
    if profile
        .avatar_url
        .as_deref()
        .is_some_and(|u| !u.is_empty())
    {
        total += 0.05;
    }
    if !profile.lyric_themes.is_empty() {
        total += 0.05;
    }

    if profile.follower_counts.instagram_followers.unwrap_or(0) > FOLLOWER_BONUS_THRESHOLD {
        total += 0.05;
    }
    if profile.follower_counts.spotify_followers.unwrap_or(0) > FOLLOWER_BONUS_THRESHOLD {
        total += 0.05;
    }

    total.clamp(0.0, 1.0)
}

fn is_absolute_url(candidate: &str) -> bool {
    Url::parse(candidate)
        .map(|u| u.scheme() == "http" || u.scheme() == "https")
        .unwrap_or(false)
}

/// Advisory artificial-inflation penalty in 0..1, reported alongside the
/// score, never mixed into it. Flags profiles whose audience is wildly
/// lopsided across platforms.
pub fn inflation_penalty(profile: &ArtistProfile) -> f32 {
    let metrics = profile.follower_counts.present();
    if metrics.len() < 2 {
        return 0.0;
    }
    let max = *metrics.iter().max().unwrap() as f64;
    let min = *metrics.iter().min().unwrap() as f64;
    if min == 0.0 {
        return 0.0;
    }
    let ratio = max / min;
    if ratio > 1000.0 {
        0.15
    } else if ratio > 100.0 {
        0.10
    } else if ratio > 50.0 {
        0.05
    } else {
        0.0
    }
}
