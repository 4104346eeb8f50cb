//! TikTok source: profile page scrape for follower and total-like counts.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use soundscout_common::error::{Result, SoundscoutError};
use soundscout_common::types::{ArtistProfile, Platform};

use crate::cancel::CancelToken;
use crate::fetch::{FetchHints, StrategyFetcher};
use crate::links::handle_from_url;
use crate::numbers::parse_follower_count;
use crate::quota::BudgetGate;

use super::SourceOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TikTokData {
    pub handle: String,
    pub followers: Option<u64>,
    pub likes: Option<u64>,
}

fn follower_res() -> &'static [Regex; 2] {
    static RES: OnceLock<[Regex; 2]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r#""followerCount":(\d+)"#).expect("follower json regex"),
            Regex::new(r"(?i)([\d,.]+[KMB]?)\s*Followers?").expect("follower text regex"),
        ]
    })
}

fn likes_res() -> &'static [Regex; 2] {
    static RES: OnceLock<[Regex; 2]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r#""heartCount":(\d+)"#).expect("likes json regex"),
            Regex::new(r"(?i)([\d,.]+[KMB]?)\s*Likes?").expect("likes text regex"),
        ]
    })
}

pub async fn enrich(
    fetcher: &StrategyFetcher,
    profile: &ArtistProfile,
    budget: &BudgetGate,
    cancel: &CancelToken,
) -> Result<SourceOutcome> {
    let handle = profile
        .tiktok_handle
        .clone()
        .or_else(|| {
            profile
                .social_links
                .get(Platform::TikTok)
                .and_then(|url| handle_from_url(Platform::TikTok, url))
        })
        .ok_or_else(|| SoundscoutError::NotFound("no tiktok handle".into()))?;

    if !budget.try_acquire("tiktok.profile", 1) {
        return Err(SoundscoutError::RateLimited {
            retry_after_secs: None,
        });
    }

    let url = format!("https://www.tiktok.com/@{handle}");
    let page = fetcher.fetch(&url, &FetchHints::default(), cancel).await?;

    Ok(SourceOutcome::TikTok(parse_profile_page(&handle, &page.html)))
}

pub fn parse_profile_page(handle: &str, html: &str) -> TikTokData {
    let followers = follower_res()
        .iter()
        .find_map(|re| re.captures(html))
        .and_then(|c| parse_follower_count(&c[1]));
    let likes = likes_res()
        .iter()
        .find_map(|re| re.captures(html))
        .and_then(|c| parse_follower_count(&c[1]));

    TikTokData {
        handle: handle.to_string(),
        followers,
        likes,
    }
}
