//! Ports to external collaborators.
//!
//! The pipeline depends on these traits only; production implementations live
//! in `fetchers` / `analyzer` / the external store driver, and deterministic
//! fakes in `fixtures` power the test suite.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use soundscout_common::error::{Result, SoundscoutError};
use soundscout_common::events::ProgressEvent;
use soundscout_common::types::{ArtistProfile, LyricAnalysis, SessionSnapshot};

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Plain HTTP response, no rendering.
#[derive(Debug, Clone)]
pub struct PlainResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl PlainResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A fully rendered page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: String,
    pub html: String,
    pub network_log: Vec<String>,
}

/// Rendering options for `fetch_rendered` and harvest sessions.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub scroll_steps: u32,
    pub settle_ms: u64,
    pub user_agent: Option<String>,
    pub viewport: Option<(u32, u32)>,
    pub javascript_enabled: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scroll_steps: 0,
            settle_ms: 500,
            user_agent: None,
            viewport: None,
            javascript_enabled: true,
        }
    }
}

/// Web access abstraction: plain HTTP, rendered pages, and stateful
/// browser-like sessions for scroll harvesting.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_plain(&self, url: &str, deadline: Duration) -> Result<PlainResponse>;

    async fn fetch_rendered(
        &self,
        url: &str,
        options: &RenderOptions,
        deadline: Duration,
    ) -> Result<RenderedPage>;

    /// Open a browser-like session that keeps one page context alive across
    /// scroll steps.
    async fn open_session(&self, options: &RenderOptions) -> Result<Box<dyn FetchSession>>;
}

/// One live page context. Single-owner; dropped to release the context.
#[async_trait]
pub trait FetchSession: Send {
    /// Navigate and return the rendered DOM.
    async fn navigate(&mut self, url: &str) -> Result<String>;

    /// Scroll one viewport, wait for the page to settle, and return the
    /// updated DOM.
    async fn scroll(&mut self, settle_ms: u64) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Identifier used for read-through dedup checks, in check priority order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ArtistIdentifier {
    YoutubeChannelId(String),
    SpotifyId(String),
    InstagramHandle(String),
    TiktokHandle(String),
    NormalizedName(String),
}

/// A persisted artist row as the store reports it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistRecord {
    pub id: Uuid,
    pub fingerprint: String,
    pub profile: ArtistProfile,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Relational store port. The driver behind it owns atomicity: `upsert_artist`
/// is a single insert-or-merge by fingerprint with the same merge rules the
/// enrichment coordinator applies in memory.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_artist_by(&self, identifier: &ArtistIdentifier) -> Result<Option<ArtistRecord>>;

    async fn upsert_artist(&self, profile: &ArtistProfile) -> Result<ArtistRecord>;

    /// Idempotent by session id.
    async fn record_session(&self, snapshot: &SessionSnapshot) -> Result<()>;

    /// Append-only session journal.
    async fn append_session_event(&self, session_id: Uuid, event: &ProgressEvent) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Spotify API
// ---------------------------------------------------------------------------

/// An artist as reported by the Spotify Web API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyArtistInfo {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub followers: u64,
    pub avatar_url: Option<String>,
    pub artist_url: Option<String>,
}

/// Spotify Web API port. The production implementation wraps
/// [`spotify_client::SpotifyClient`]; tests substitute canned responses.
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    async fn search_artist(&self, name: &str) -> Result<Option<SpotifyArtistInfo>>;
    async fn artist(&self, id: &str) -> Result<SpotifyArtistInfo>;
    async fn top_tracks(&self, id: &str) -> Result<Vec<String>>;
}

fn convert_artist(artist: spotify_client::SpotifyArtist) -> SpotifyArtistInfo {
    SpotifyArtistInfo {
        avatar_url: artist.avatar_url().map(str::to_string),
        id: artist.id,
        name: artist.name,
        genres: artist.genres,
        followers: artist.followers.total,
        artist_url: artist.external_urls.spotify,
    }
}

fn map_spotify_err(err: spotify_client::SpotifyError) -> SoundscoutError {
    use spotify_client::SpotifyError;
    match err {
        SpotifyError::Network(msg) => SoundscoutError::Transient(msg),
        SpotifyError::RateLimited { retry_after_secs } => {
            SoundscoutError::RateLimited { retry_after_secs }
        }
        SpotifyError::Auth { status, message } => {
            SoundscoutError::Blocked(format!("spotify auth rejected ({status}): {message}"))
        }
        SpotifyError::Api { status: 404, .. } => {
            SoundscoutError::NotFound("spotify resource missing".into())
        }
        SpotifyError::Api { status: 403, message } => SoundscoutError::Blocked(message),
        SpotifyError::Api { status, message } if status >= 500 => {
            SoundscoutError::Transient(format!("spotify {status}: {message}"))
        }
        SpotifyError::Api { status, message } => {
            SoundscoutError::DataQuality(format!("spotify {status}: {message}"))
        }
    }
}

#[async_trait]
impl SpotifyApi for spotify_client::SpotifyClient {
    async fn search_artist(&self, name: &str) -> Result<Option<SpotifyArtistInfo>> {
        self.search_artist(name)
            .await
            .map(|found| found.map(convert_artist))
            .map_err(map_spotify_err)
    }

    async fn artist(&self, id: &str) -> Result<SpotifyArtistInfo> {
        self.artist(id).await.map(convert_artist).map_err(map_spotify_err)
    }

    async fn top_tracks(&self, id: &str) -> Result<Vec<String>> {
        self.top_tracks(id)
            .await
            .map(|tracks| tracks.into_iter().map(|t| t.name).collect())
            .map_err(map_spotify_err)
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Lyric text analysis. Deterministic for a given text up to rounding.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze_lyrics(
        &self,
        text: &str,
        language_hint: Option<&str>,
    ) -> Result<LyricAnalysis>;
}
