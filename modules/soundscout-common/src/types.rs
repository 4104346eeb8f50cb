use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, Result, SoundscoutError};

// --- Session request ---

/// Immutable input to a discovery session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub query: String,
    pub target_count: u32,
    #[serde(default)]
    pub filters: SearchFilters,
    /// Optional session-scoped cost ceiling in budget units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost_units: Option<u64>,
}

impl SessionRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            target_count: 50,
            filters: SearchFilters::default(),
            max_cost_units: None,
        }
    }

    pub fn with_target(mut self, target: u32) -> Self {
        self.target_count = target;
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_max_cost(mut self, units: u64) -> Self {
        self.max_cost_units = Some(units);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(SoundscoutError::InvalidRequest("query is empty".into()));
        }
        if self.target_count == 0 {
            return Err(SoundscoutError::InvalidRequest(
                "target_count must be positive".into(),
            ));
        }
        if self.max_cost_units == Some(0) {
            return Err(SoundscoutError::InvalidRequest(
                "max_cost_units must be positive".into(),
            ));
        }
        Ok(())
    }
}

// --- Search filters ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadDate {
    #[default]
    Any,
    Hour,
    Today,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoDuration {
    #[default]
    Any,
    Short,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Relevance,
    Date,
    Views,
    Rating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityHint {
    #[default]
    Any,
    Hd,
    FourK,
}

/// Recognized search-surface filter options.
///
/// Composing the same filters always produces the same URL, which doubles as
/// the harvest cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub upload_date: UploadDate,
    #[serde(default)]
    pub duration: VideoDuration,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default)]
    pub quality_hint: QualityHint,
}

impl SearchFilters {
    /// Apply a `key=value` option as accepted on the CLI and API surfaces.
    /// Unknown keys or values are an `InvalidRequest`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let unrecognized =
            || SoundscoutError::InvalidRequest(format!("unrecognized filter {key}={value}"));
        match key {
            "upload_date" => {
                self.upload_date = match value {
                    "any" => UploadDate::Any,
                    "hour" => UploadDate::Hour,
                    "today" => UploadDate::Today,
                    "week" => UploadDate::Week,
                    "month" => UploadDate::Month,
                    "year" => UploadDate::Year,
                    _ => return Err(unrecognized()),
                }
            }
            "duration" => {
                self.duration = match value {
                    "any" => VideoDuration::Any,
                    "short" => VideoDuration::Short,
                    "long" => VideoDuration::Long,
                    _ => return Err(unrecognized()),
                }
            }
            "sort" => {
                self.sort = match value {
                    "relevance" => SortOrder::Relevance,
                    "date" => SortOrder::Date,
                    "views" => SortOrder::Views,
                    "rating" => SortOrder::Rating,
                    _ => return Err(unrecognized()),
                }
            }
            "quality_hint" => {
                self.quality_hint = match value {
                    "any" => QualityHint::Any,
                    "hd" => QualityHint::Hd,
                    "4k" => QualityHint::FourK,
                    _ => return Err(unrecognized()),
                }
            }
            _ => return Err(unrecognized()),
        }
        Ok(())
    }
}

// --- Candidate video ---

/// A search-result item that has passed DOM extraction but no semantic
/// filtering yet. Two candidates with equal `video_id` are duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateVideo {
    /// 11-char opaque token, always derivable from `url`.
    pub video_id: String,
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_hint: Option<String>,
}

// --- Social links ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Spotify,
    Instagram,
    TikTok,
    Twitter,
    Facebook,
    Youtube,
    Website,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Spotify => write!(f, "spotify"),
            Platform::Instagram => write!(f, "instagram"),
            Platform::TikTok => write!(f, "tiktok"),
            Platform::Twitter => write!(f, "twitter"),
            Platform::Facebook => write!(f, "facebook"),
            Platform::Youtube => write!(f, "youtube"),
            Platform::Website => write!(f, "website"),
        }
    }
}

/// Per-platform profile URLs mined from descriptions and channel pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiktok: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl SocialLinks {
    pub fn get(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Spotify => self.spotify.as_deref(),
            Platform::Instagram => self.instagram.as_deref(),
            Platform::TikTok => self.tiktok.as_deref(),
            Platform::Twitter => self.twitter.as_deref(),
            Platform::Facebook => self.facebook.as_deref(),
            Platform::Youtube => self.youtube.as_deref(),
            Platform::Website => self.website.as_deref(),
        }
    }

    /// Set a link only when the slot is currently empty.
    pub fn fill(&mut self, platform: Platform, url: impl Into<String>) {
        let slot = match platform {
            Platform::Spotify => &mut self.spotify,
            Platform::Instagram => &mut self.instagram,
            Platform::TikTok => &mut self.tiktok,
            Platform::Twitter => &mut self.twitter,
            Platform::Facebook => &mut self.facebook,
            Platform::Youtube => &mut self.youtube,
            Platform::Website => &mut self.website,
        };
        if slot.is_none() {
            *slot = Some(url.into());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spotify.is_none()
            && self.instagram.is_none()
            && self.tiktok.is_none()
            && self.twitter.is_none()
            && self.facebook.is_none()
            && self.youtube.is_none()
            && self.website.is_none()
    }

    pub fn merge_missing(&mut self, other: &SocialLinks) {
        for platform in [
            Platform::Spotify,
            Platform::Instagram,
            Platform::TikTok,
            Platform::Twitter,
            Platform::Facebook,
            Platform::Youtube,
            Platform::Website,
        ] {
            if let Some(url) = other.get(platform) {
                self.fill(platform, url);
            }
        }
    }
}

// --- Follower counts ---

/// Cross-platform audience counts. Counts only ever grow during a session:
/// merges keep the element-wise max.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerCounts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_subscribers: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify_followers: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify_monthly_listeners: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_followers: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiktok_followers: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiktok_likes: Option<u64>,
}

fn max_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

impl FollowerCounts {
    /// Element-wise max merge (monotonic growth model).
    pub fn merge_max(&mut self, other: &FollowerCounts) {
        self.youtube_subscribers = max_opt(self.youtube_subscribers, other.youtube_subscribers);
        self.spotify_followers = max_opt(self.spotify_followers, other.spotify_followers);
        self.spotify_monthly_listeners =
            max_opt(self.spotify_monthly_listeners, other.spotify_monthly_listeners);
        self.instagram_followers = max_opt(self.instagram_followers, other.instagram_followers);
        self.tiktok_followers = max_opt(self.tiktok_followers, other.tiktok_followers);
        self.tiktok_likes = max_opt(self.tiktok_likes, other.tiktok_likes);
    }

    /// All populated counts, for cross-platform consistency heuristics.
    pub fn present(&self) -> Vec<u64> {
        [
            self.youtube_subscribers,
            self.spotify_followers,
            self.spotify_monthly_listeners,
            self.instagram_followers,
            self.tiktok_followers,
            self.tiktok_likes,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

// --- Artist profile ---

/// The mutable enrichment aggregate. Created at extraction, mutated only by
/// the enrichment coordinator, frozen before scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtistProfile {
    /// Canonical name, featured artists stripped.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_channel_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiktok_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub follower_counts: FollowerCounts,
    #[serde(default)]
    pub social_links: SocialLinks,
    #[serde(default)]
    pub lyric_themes: Vec<String>,
    /// Video that surfaced this artist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_video_title: Option<String>,
    /// Deterministic 0..1 score, set once after enrichment.
    #[serde(default)]
    pub enrichment_score: f32,
}

impl ArtistProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Normalized name: case-folded, punctuation stripped, whitespace collapsed.
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// Deterministic identity string. Strong identifiers joined in
    /// lexicographic order; name-only fallback when none exist.
    pub fn fingerprint(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(id) = &self.youtube_channel_id {
            parts.push(format!("yt:{id}"));
        }
        if let Some(id) = &self.spotify_id {
            parts.push(format!("sp:{id}"));
        }
        if let Some(handle) = &self.instagram_handle {
            parts.push(format!("ig:{}", handle.to_lowercase()));
        }
        if let Some(handle) = &self.tiktok_handle {
            parts.push(format!("tt:{}", handle.to_lowercase()));
        }
        if parts.is_empty() {
            return format!("name:{}", self.normalized_name());
        }
        parts.sort();
        parts.join("|")
    }
}

/// Case-fold, strip non-alphanumeric, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else if c.is_whitespace() {
            pending_space = true;
        }
        // punctuation is dropped without acting as a separator
    }
    out
}

// --- Lyric analysis ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricAnalysis {
    /// Ordered, at most 8.
    pub themes: Vec<String>,
    /// In [-1, 1].
    pub sentiment: f32,
    /// ISO-639-1 code.
    pub language: String,
}

// --- Session state ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Pending => write!(f, "pending"),
            SessionState::Running => write!(f, "running"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Failed => write!(f, "failed"),
            SessionState::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub videos_seen: u64,
    pub videos_accepted: u64,
    pub artists_enriched: u64,
    pub artists_stored: u64,
}

/// Point-in-time copy of a session's state and counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: SessionState,
    pub counters: SessionCounters,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorKind>,
    #[serde(default)]
    pub budget_exhausted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_validation_rejects_empty_query() {
        let req = SessionRequest::new("   ");
        assert!(matches!(
            req.validate(),
            Err(SoundscoutError::InvalidRequest(_))
        ));
    }

    #[test]
    fn request_validation_rejects_zero_target() {
        let req = SessionRequest::new("official music video").with_target(0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_defaults_to_fifty() {
        let req = SessionRequest::new("official music video");
        assert_eq!(req.target_count, 50);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn filters_set_known_keys() {
        let mut f = SearchFilters::default();
        f.set("upload_date", "week").unwrap();
        f.set("sort", "views").unwrap();
        f.set("duration", "short").unwrap();
        f.set("quality_hint", "4k").unwrap();
        assert_eq!(f.upload_date, UploadDate::Week);
        assert_eq!(f.sort, SortOrder::Views);
        assert_eq!(f.duration, VideoDuration::Short);
        assert_eq!(f.quality_hint, QualityHint::FourK);
    }

    #[test]
    fn filters_reject_unknown_key_and_value() {
        let mut f = SearchFilters::default();
        assert!(f.set("bitrate", "320").is_err());
        assert!(f.set("upload_date", "fortnight").is_err());
    }

    #[test]
    fn normalize_name_strips_punctuation_and_case() {
        assert_eq!(normalize_name("A$AP Rocky"), "aap rocky");
        assert_eq!(normalize_name("  Tyler,  The   Creator "), "tyler the creator");
        assert_eq!(normalize_name("MGMT"), "mgmt");
        assert_eq!(normalize_name("..."), "");
    }

    #[test]
    fn fingerprint_prefers_strong_ids() {
        let mut p = ArtistProfile::named("Drake");
        assert_eq!(p.fingerprint(), "name:drake");

        p.youtube_channel_id = Some("UCabc123".into());
        p.spotify_id = Some("3TVXtAsR".into());
        let fp = p.fingerprint();
        assert_eq!(fp, "sp:3TVXtAsR|yt:UCabc123");
    }

    #[test]
    fn fingerprint_is_order_stable() {
        let mut a = ArtistProfile::named("X");
        a.instagram_handle = Some("artistx".into());
        a.tiktok_handle = Some("artistx".into());

        let mut b = ArtistProfile::named("X");
        b.tiktok_handle = Some("artistx".into());
        b.instagram_handle = Some("ArtistX".into());

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn follower_counts_merge_is_elementwise_max() {
        let mut a = FollowerCounts {
            instagram_followers: Some(100),
            spotify_followers: Some(500),
            ..Default::default()
        };
        let b = FollowerCounts {
            instagram_followers: Some(80),
            spotify_followers: Some(900),
            tiktok_likes: Some(7),
            ..Default::default()
        };
        a.merge_max(&b);
        assert_eq!(a.instagram_followers, Some(100));
        assert_eq!(a.spotify_followers, Some(900));
        assert_eq!(a.tiktok_likes, Some(7));
        assert_eq!(a.youtube_subscribers, None);
    }

    #[test]
    fn social_links_fill_never_overwrites() {
        let mut links = SocialLinks::default();
        links.fill(Platform::Instagram, "https://instagram.com/a");
        links.fill(Platform::Instagram, "https://instagram.com/b");
        assert_eq!(links.instagram.as_deref(), Some("https://instagram.com/a"));
    }

    #[test]
    fn terminal_states_are_terminal() {
        assert!(!SessionState::Pending.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
    }
}
