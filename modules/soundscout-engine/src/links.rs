//! Social-link mining from video descriptions and channel pages.
//!
//! Links on the search surface are routinely wrapped in a redirect envelope
//! (`<host>/redirect?...&q=<url-encoded target>`); those are decoded before
//! bucketing, so a wrapped link always yields at least what the bare link
//! would.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use soundscout_common::types::{Platform, SocialLinks};

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s"'<>\\]+"#).expect("url regex compiles"))
}

/// Path segments that never identify a profile.
const GENERIC_SEGMENTS: &[&str] = &[
    "home", "explore", "login", "about", "accounts", "p", "reel", "reels", "stories", "share",
    "intent", "hashtag", "search", "results", "watch", "playlist", "feed",
];

/// Hosts that are link plumbing or media storefronts, not an artist website.
const NOISE_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "bit.ly",
    "smarturl.it",
    "ffm.to",
    "lnk.to",
    "music.apple.com",
    "apple.co",
    "soundcloud.com",
    "amazon.com",
    "google.com",
];

/// Collect all URLs from free text: redirect envelopes are decoded and their
/// targets emitted first, then bare URLs in order of appearance.
pub fn mine_urls(text: &str) -> Vec<String> {
    let mut pool = Vec::new();
    for m in url_re().find_iter(text) {
        let raw = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '"', '\'']);
        if let Some(target) = decode_redirect(raw) {
            pool.push(target);
        }
        pool.push(raw.to_string());
    }
    pool
}

/// Decode a `/redirect?q=...` envelope to its target URL, if this is one.
pub fn decode_redirect(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if parsed.path() != "/redirect" {
        return None;
    }
    parsed
        .query_pairs()
        .find(|(k, _)| k == "q")
        .map(|(_, v)| v.into_owned())
        .filter(|target| target.starts_with("http://") || target.starts_with("https://"))
}

/// Mine free text (a description or rendered channel HTML) into a
/// [`SocialLinks`] mapping. First hit per platform wins.
pub fn extract_social_links(text: &str) -> SocialLinks {
    let mut links = SocialLinks::default();
    for url in mine_urls(text) {
        bucket_url(&mut links, &url);
    }
    links
}

/// Bucket one URL into the mapping by host-and-path pattern.
pub fn bucket_url(links: &mut SocialLinks, url: &str) {
    let Ok(parsed) = Url::parse(url) else {
        return;
    };
    let Some(host) = parsed.host_str() else {
        return;
    };
    let host = host.trim_start_matches("www.").to_lowercase();

    let first_segment = parsed
        .path_segments()
        .and_then(|mut s| s.next().map(str::to_string))
        .unwrap_or_default();

    let has_profile_path =
        !first_segment.is_empty() && !GENERIC_SEGMENTS.contains(&first_segment.to_lowercase().as_str());

    match host.as_str() {
        "open.spotify.com" => {
            if first_segment == "artist" {
                links.fill(Platform::Spotify, url);
            }
        }
        "instagram.com" => {
            if has_profile_path {
                links.fill(Platform::Instagram, url);
            }
        }
        "tiktok.com" => {
            if first_segment.starts_with('@') {
                links.fill(Platform::TikTok, url);
            }
        }
        "twitter.com" | "x.com" => {
            if has_profile_path {
                links.fill(Platform::Twitter, url);
            }
        }
        "facebook.com" => {
            if has_profile_path {
                links.fill(Platform::Facebook, url);
            }
        }
        "youtube.com" | "m.youtube.com" => {
            if first_segment == "channel" || first_segment == "c" || first_segment.starts_with('@')
            {
                links.fill(Platform::Youtube, url);
            }
        }
        _ => {
            if !NOISE_HOSTS.iter().any(|n| host.ends_with(n)) && has_profile_path_or_root(&parsed) {
                links.fill(Platform::Website, url);
            }
        }
    }
}

fn has_profile_path_or_root(url: &Url) -> bool {
    // A bare domain is a fine website link; generic subpaths are not.
    let mut segments = url.path_segments().into_iter().flatten().filter(|s| !s.is_empty());
    match segments.next() {
        None => true,
        Some(first) => !GENERIC_SEGMENTS.contains(&first.to_lowercase().as_str()),
    }
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex compiles")
    })
}

/// First contact email in free text, skipping obvious non-contact addresses.
pub fn find_email(text: &str) -> Option<String> {
    email_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .find(|e| {
            let folded = e.to_lowercase();
            !folded.ends_with(".png")
                && !folded.ends_with(".jpg")
                && !folded.contains("example.com")
                && !folded.contains("@2x")
        })
}

/// Pull the platform handle out of a profile URL.
pub fn handle_from_url(platform: Platform, url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    let first = segments.next()?;
    match platform {
        Platform::Instagram | Platform::Twitter | Platform::Facebook => {
            let handle = first.trim_matches('@');
            (!handle.is_empty()).then(|| handle.to_string())
        }
        Platform::TikTok => {
            let handle = first.strip_prefix('@')?;
            (!handle.is_empty()).then(|| handle.to_string())
        }
        Platform::Spotify => {
            if first == "artist" {
                segments.next().map(|id| id.to_string())
            } else {
                None
            }
        }
        Platform::Youtube => {
            if first == "channel" {
                segments.next().map(|id| id.to_string())
            } else {
                Some(first.trim_matches('@').to_string())
            }
        }
        Platform::Website => None,
    }
}
