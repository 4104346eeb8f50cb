//! Deterministic profile merge rules.
//!
//! Shared by the enrichment coordinator (applying source results) and the
//! store's insert-or-merge path. Idempotent, and associative over
//! success-only inputs:
//!
//! - strong identifiers and text fields fill only when currently empty
//! - counts keep the element-wise max (monotonic growth model)
//! - genres union capped at 10, lyric themes at 8, first-seen order kept

use soundscout_common::types::ArtistProfile;

pub const MAX_GENRES: usize = 10;
pub const MAX_LYRIC_THEMES: usize = 8;

/// Fill `base` when empty; never replace.
pub fn fill_if_empty(base: &mut Option<String>, incoming: Option<&str>) {
    if base.as_deref().is_none_or(|s| s.is_empty()) {
        if let Some(v) = incoming {
            if !v.is_empty() {
                *base = Some(v.to_string());
            }
        }
    }
}

/// Union `incoming` into `base` preserving first-seen order, up to `cap`.
/// Comparison is case-folded; the first-seen surface form wins.
pub fn union_capped(base: &mut Vec<String>, incoming: &[String], cap: usize) {
    for item in incoming {
        if base.len() >= cap {
            break;
        }
        let folded = item.to_lowercase();
        if !base.iter().any(|existing| existing.to_lowercase() == folded) {
            base.push(item.clone());
        }
    }
    base.truncate(cap);
}

/// Merge `incoming` into `base` under the rules above.
pub fn merge_profiles(base: &mut ArtistProfile, incoming: &ArtistProfile) {
    fill_if_empty(&mut base.youtube_channel_id, incoming.youtube_channel_id.as_deref());
    fill_if_empty(&mut base.youtube_channel_url, incoming.youtube_channel_url.as_deref());
    fill_if_empty(&mut base.spotify_id, incoming.spotify_id.as_deref());
    fill_if_empty(&mut base.instagram_handle, incoming.instagram_handle.as_deref());
    fill_if_empty(&mut base.tiktok_handle, incoming.tiktok_handle.as_deref());
    fill_if_empty(&mut base.email, incoming.email.as_deref());
    fill_if_empty(&mut base.website, incoming.website.as_deref());
    fill_if_empty(&mut base.bio, incoming.bio.as_deref());
    fill_if_empty(&mut base.location, incoming.location.as_deref());
    fill_if_empty(&mut base.avatar_url, incoming.avatar_url.as_deref());
    fill_if_empty(&mut base.discovery_video_id, incoming.discovery_video_id.as_deref());
    fill_if_empty(&mut base.discovery_video_title, incoming.discovery_video_title.as_deref());

    base.social_links.merge_missing(&incoming.social_links);
    base.follower_counts.merge_max(&incoming.follower_counts);

    union_capped(&mut base.genres, &incoming.genres, MAX_GENRES);
    union_capped(&mut base.lyric_themes, &incoming.lyric_themes, MAX_LYRIC_THEMES);
}
