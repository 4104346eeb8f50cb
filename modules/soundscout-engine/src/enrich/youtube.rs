//! YouTube channel source: About-page scrape for subscriber count, contact
//! email, and the channel's own social links.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use soundscout_common::error::{Result, SoundscoutError};
use soundscout_common::types::{ArtistProfile, SocialLinks};

use crate::cancel::CancelToken;
use crate::fetch::{FetchHints, StrategyFetcher};
use crate::links::{extract_social_links, find_email};
use crate::numbers::parse_follower_count;
use crate::quota::BudgetGate;

use super::SourceOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelData {
    pub channel_id: Option<String>,
    pub subscribers: Option<u64>,
    pub links: SocialLinks,
    pub email: Option<String>,
}

fn subscriber_res() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r#""subscriberCountText":\{"runs":\[\{"text":"([^"]+)"#)
                .expect("runs regex"),
            Regex::new(r#""subscriberCount":"?(\d+)"#).expect("json regex"),
            Regex::new(r"(?i)([\d,.]+[KMB]?)\s*subscribers?").expect("text regex"),
        ]
    })
}

fn channel_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""channelId":"(UC[A-Za-z0-9_-]{22})""#).expect("channel id regex"))
}

pub async fn enrich(
    fetcher: &StrategyFetcher,
    profile: &ArtistProfile,
    budget: &BudgetGate,
    cancel: &CancelToken,
) -> Result<SourceOutcome> {
    let channel_url = profile
        .youtube_channel_url
        .clone()
        .or_else(|| {
            profile
                .youtube_channel_id
                .as_ref()
                .map(|id| format!("https://www.youtube.com/channel/{id}"))
        })
        .ok_or_else(|| SoundscoutError::NotFound("no youtube channel".into()))?;

    if !budget.try_acquire("youtube.channels", 1) {
        return Err(SoundscoutError::RateLimited {
            retry_after_secs: None,
        });
    }

    let about_url = format!("{}/about", channel_url.trim_end_matches('/'));
    let page = fetcher.fetch(&about_url, &FetchHints::default(), cancel).await?;

    let mut data = parse_about_page(&page.html);
    if data.channel_id.is_none() {
        data.channel_id = profile.youtube_channel_id.clone();
    }
    Ok(SourceOutcome::YoutubeChannel(data))
}

pub fn parse_about_page(html: &str) -> ChannelData {
    let subscribers = subscriber_res()
        .iter()
        .find_map(|re| re.captures(html))
        .and_then(|c| parse_follower_count(c[1].trim().trim_end_matches("subscribers").trim()));

    let channel_id = channel_id_re()
        .captures(html)
        .map(|c| c[1].to_string());

    let mut links = extract_social_links(html);
    // The channel's links section routinely lists its own videos; those are
    // already covered by the candidate itself.
    links.youtube = None;

    ChannelData {
        channel_id,
        subscribers,
        links,
        email: find_email(html),
    }
}
