//! Deterministic fakes for the ports, shared by unit and integration tests.
//! No network, no browser — `cargo test` stays hermetic and fast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use soundscout_common::error::{Result, SoundscoutError};
use soundscout_common::types::LyricAnalysis;

use crate::ports::{
    Analyzer, FetchSession, Fetcher, PlainResponse, RenderOptions, RenderedPage, SpotifyApi,
    SpotifyArtistInfo,
};

// ---------------------------------------------------------------------------
// FakeFetcher
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Route {
    Html(String),
    RenderedOnly(String),
    Blocked,
    NotFound,
}

#[derive(Default)]
struct FakeState {
    routes: HashMap<String, Route>,
    search_pages: Vec<String>,
    delay: Option<Duration>,
}

/// Scriptable [`Fetcher`]: URL routes for plain/rendered fetches, a page
/// sequence for harvest sessions, and an optional per-call delay for
/// cancellation tests. Unknown URLs 404.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    state: Arc<Mutex<FakeState>>,
    plain_calls: Arc<AtomicU64>,
    rendered_calls: Arc<AtomicU64>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve this HTML for both plain and rendered fetches.
    pub fn serve(&self, url: &str, html: &str) {
        self.set_route(url, Route::Html(html.to_string()));
    }

    /// 403 on plain HTTP; succeed only through a headless strategy.
    pub fn serve_rendered_only(&self, url: &str, html: &str) {
        self.set_route(url, Route::RenderedOnly(html.to_string()));
    }

    /// 403 / blocked on every strategy.
    pub fn block_all(&self, url: &str) {
        self.set_route(url, Route::Blocked);
    }

    /// 404 on every strategy.
    pub fn not_found(&self, url: &str) {
        self.set_route(url, Route::NotFound);
    }

    /// Pages returned by harvest sessions: navigate yields the first, each
    /// scroll the next; the last page repeats once exhausted.
    pub fn search_pages(&self, pages: Vec<String>) {
        self.state.lock().expect("fake mutex").search_pages = pages;
    }

    /// Sleep this long before answering any call.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().expect("fake mutex").delay = Some(delay);
    }

    pub fn plain_call_count(&self) -> u64 {
        self.plain_calls.load(Ordering::Relaxed)
    }

    pub fn rendered_call_count(&self) -> u64 {
        self.rendered_calls.load(Ordering::Relaxed)
    }

    fn set_route(&self, url: &str, route: Route) {
        self.state
            .lock()
            .expect("fake mutex")
            .routes
            .insert(url.to_string(), route);
    }

    fn route(&self, url: &str) -> Option<Route> {
        self.state.lock().expect("fake mutex").routes.get(url).cloned()
    }

    async fn apply_delay(&self) {
        let delay = self.state.lock().expect("fake mutex").delay;
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_plain(&self, url: &str, _deadline: Duration) -> Result<PlainResponse> {
        self.plain_calls.fetch_add(1, Ordering::Relaxed);
        self.apply_delay().await;
        let (status, body) = match self.route(url) {
            Some(Route::Html(html)) => (200, html),
            Some(Route::RenderedOnly(_)) | Some(Route::Blocked) => (403, String::new()),
            Some(Route::NotFound) | None => (404, String::new()),
        };
        Ok(PlainResponse {
            status,
            headers: Vec::new(),
            body,
        })
    }

    async fn fetch_rendered(
        &self,
        url: &str,
        _options: &RenderOptions,
        _deadline: Duration,
    ) -> Result<RenderedPage> {
        self.rendered_calls.fetch_add(1, Ordering::Relaxed);
        self.apply_delay().await;
        match self.route(url) {
            Some(Route::Html(html)) | Some(Route::RenderedOnly(html)) => Ok(RenderedPage {
                final_url: url.to_string(),
                html,
                network_log: Vec::new(),
            }),
            Some(Route::Blocked) => Err(SoundscoutError::Blocked(format!("blocked: {url}"))),
            Some(Route::NotFound) | None => Err(SoundscoutError::NotFound(url.to_string())),
        }
    }

    async fn open_session(&self, _options: &RenderOptions) -> Result<Box<dyn FetchSession>> {
        let pages = self.state.lock().expect("fake mutex").search_pages.clone();
        Ok(Box::new(FakeSession {
            fetcher: self.clone(),
            pages,
            position: 0,
        }))
    }
}

struct FakeSession {
    fetcher: FakeFetcher,
    pages: Vec<String>,
    position: usize,
}

#[async_trait]
impl FetchSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<String> {
        self.fetcher.apply_delay().await;
        self.position = 0;
        match self.pages.first() {
            Some(page) => Ok(page.clone()),
            None => Err(SoundscoutError::Transient(format!(
                "no fixture pages for {url}"
            ))),
        }
    }

    async fn scroll(&mut self, _settle_ms: u64) -> Result<String> {
        self.fetcher.apply_delay().await;
        self.position = (self.position + 1).min(self.pages.len().saturating_sub(1));
        self.pages
            .get(self.position)
            .cloned()
            .ok_or_else(|| SoundscoutError::Transient("no fixture pages".into()))
    }
}

// ---------------------------------------------------------------------------
// Search-page builder
// ---------------------------------------------------------------------------

/// One fake search-result entry.
pub struct FakeVideo {
    pub video_id: &'static str,
    pub title: &'static str,
    pub channel_id: Option<&'static str>,
    pub description: Option<&'static str>,
}

impl FakeVideo {
    pub fn new(video_id: &'static str, title: &'static str) -> Self {
        Self {
            video_id,
            title,
            channel_id: None,
            description: None,
        }
    }

    pub fn with_channel(mut self, channel_id: &'static str) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    pub fn with_description(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }
}

/// Render fake search results the way the harvester's parser expects them.
pub fn search_page(videos: &[FakeVideo]) -> String {
    let mut html = String::from("<html><body>");
    for v in videos {
        html.push_str("<ytd-video-renderer>");
        html.push_str(&format!(
            r#"<a href="/watch?v={}" title="{}">{}</a>"#,
            v.video_id, v.title, v.title
        ));
        if let Some(channel) = v.channel_id {
            html.push_str(&format!(r#"<a href="/channel/{channel}">channel</a>"#));
        }
        if let Some(description) = v.description {
            html.push_str(&format!(r#"<div class="description">{description}</div>"#));
        }
        html.push_str("</ytd-video-renderer>");
    }
    html.push_str("</body></html>");
    html
}

// ---------------------------------------------------------------------------
// FakeSpotify
// ---------------------------------------------------------------------------

/// Canned Spotify Web API. Artists are matched case-insensitively by name;
/// `fail_with` makes every call return that error kind (source isolation
/// scenarios).
#[derive(Default)]
pub struct FakeSpotify {
    artists: Mutex<Vec<SpotifyArtistInfo>>,
    top_tracks: Mutex<HashMap<String, Vec<String>>>,
    failure: Mutex<Option<String>>,
}

impl FakeSpotify {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_artist(&self, artist: SpotifyArtistInfo) {
        self.artists.lock().expect("fake mutex").push(artist);
    }

    pub fn set_top_tracks(&self, artist_id: &str, tracks: Vec<String>) {
        self.top_tracks
            .lock()
            .expect("fake mutex")
            .insert(artist_id.to_string(), tracks);
    }

    /// Fail every call: "blocked", "rate_limited", or "transient".
    pub fn fail_with(&self, kind: &str) {
        *self.failure.lock().expect("fake mutex") = Some(kind.to_string());
    }

    fn failure(&self) -> Option<SoundscoutError> {
        self.failure
            .lock()
            .expect("fake mutex")
            .as_deref()
            .map(|kind| match kind {
                "blocked" => SoundscoutError::Blocked("spotify wall".into()),
                "rate_limited" => SoundscoutError::RateLimited {
                    retry_after_secs: None,
                },
                _ => SoundscoutError::Transient("spotify flaked".into()),
            })
    }
}

/// A minimal plausible artist record for tests.
pub fn spotify_artist(id: &str, name: &str, followers: u64) -> SpotifyArtistInfo {
    SpotifyArtistInfo {
        id: id.to_string(),
        name: name.to_string(),
        genres: vec!["indie".to_string()],
        followers,
        avatar_url: Some(format!("https://img.example/{id}.jpg")),
        artist_url: Some(format!("https://open.spotify.com/artist/{id}")),
    }
}

#[async_trait]
impl SpotifyApi for FakeSpotify {
    async fn search_artist(&self, name: &str) -> Result<Option<SpotifyArtistInfo>> {
        if let Some(err) = self.failure() {
            return Err(err);
        }
        Ok(self
            .artists
            .lock()
            .expect("fake mutex")
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn artist(&self, id: &str) -> Result<SpotifyArtistInfo> {
        if let Some(err) = self.failure() {
            return Err(err);
        }
        self.artists
            .lock()
            .expect("fake mutex")
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| SoundscoutError::NotFound(id.to_string()))
    }

    async fn top_tracks(&self, id: &str) -> Result<Vec<String>> {
        if let Some(err) = self.failure() {
            return Err(err);
        }
        Ok(self
            .top_tracks
            .lock()
            .expect("fake mutex")
            .get(id)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// FakeAnalyzer
// ---------------------------------------------------------------------------

/// Deterministic analyzer: themes are the first distinct long-ish words of
/// the text, sentiment is fixed at 0.
pub struct FakeAnalyzer;

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze_lyrics(
        &self,
        text: &str,
        language_hint: Option<&str>,
    ) -> Result<LyricAnalysis> {
        let mut themes: Vec<String> = Vec::new();
        for word in text.split_whitespace() {
            let cleaned: String = word
                .chars()
                .filter(|c| c.is_alphabetic())
                .collect::<String>()
                .to_lowercase();
            if cleaned.len() > 4 && !themes.contains(&cleaned) {
                themes.push(cleaned);
            }
            if themes.len() == 3 {
                break;
            }
        }
        Ok(LyricAnalysis {
            themes,
            sentiment: 0.0,
            language: language_hint.unwrap_or("en").to_string(),
        })
    }
}
