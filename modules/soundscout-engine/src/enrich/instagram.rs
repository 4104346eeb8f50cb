//! Instagram source: profile page scrape for follower counts and a bio link.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use soundscout_common::error::{Result, SoundscoutError};
use soundscout_common::types::{ArtistProfile, Platform};

use crate::cancel::CancelToken;
use crate::fetch::{FetchHints, StrategyFetcher};
use crate::links::{find_email, handle_from_url};
use crate::numbers::parse_follower_count;
use crate::quota::BudgetGate;

use super::SourceOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramData {
    pub handle: String,
    pub followers: Option<u64>,
    pub posts: Option<u64>,
    pub external_url: Option<String>,
    pub email: Option<String>,
}

fn follower_res() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r#"content="([\d,.]+[KMBkmb]?)\s+Followers"#).expect("meta followers regex"),
            Regex::new(r#""edge_followed_by":\{"count":(\d+)\}"#).expect("json followers regex"),
            Regex::new(r"(?i)([\d,.]+[KMB]?)\s*followers?").expect("text followers regex"),
        ]
    })
}

fn posts_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)([\d,.]+[KMB]?)\s*posts?").expect("posts regex"))
}

fn external_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""external_url":"([^"]+)""#).expect("external url regex"))
}

pub async fn enrich(
    fetcher: &StrategyFetcher,
    profile: &ArtistProfile,
    budget: &BudgetGate,
    cancel: &CancelToken,
) -> Result<SourceOutcome> {
    let handle = profile
        .instagram_handle
        .clone()
        .or_else(|| {
            profile
                .social_links
                .get(Platform::Instagram)
                .and_then(|url| handle_from_url(Platform::Instagram, url))
        })
        .ok_or_else(|| SoundscoutError::NotFound("no instagram handle".into()))?;

    if !budget.try_acquire("instagram.profile", 1) {
        return Err(SoundscoutError::RateLimited {
            retry_after_secs: None,
        });
    }

    let url = format!("https://www.instagram.com/{handle}/");
    let page = fetcher.fetch(&url, &FetchHints::default(), cancel).await?;

    let data = parse_profile_page(&handle, &page.html)?;
    Ok(SourceOutcome::Instagram(data))
}

/// Parse the profile page. Counts above the follower sanity bound are a
/// `DataQuality` failure rather than silently wrong data.
pub fn parse_profile_page(handle: &str, html: &str) -> Result<InstagramData> {
    let mut followers = None;
    for re in follower_res() {
        if let Some(c) = re.captures(html) {
            if let Some(n) = parse_follower_count(&c[1]) {
                followers = Some(n);
                break;
            }
            // matched but implausible — bad selector or bot wall
            return Err(SoundscoutError::DataQuality(format!(
                "implausible instagram follower count for {handle}"
            )));
        }
    }

    let posts = posts_re()
        .captures(html)
        .and_then(|c| parse_follower_count(&c[1]));

    let external_url = external_url_re()
        .captures(html)
        .map(|c| c[1].replace("\\/", "/"))
        .filter(|u| u.starts_with("http"));

    Ok(InstagramData {
        handle: handle.to_string(),
        followers,
        posts,
        external_url,
        email: find_email(html),
    })
}
