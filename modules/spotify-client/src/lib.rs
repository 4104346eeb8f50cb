pub mod error;
pub mod types;

pub use error::{Result, SpotifyError};
pub use types::{SpotifyArtist, SpotifyTrack};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;
use types::{SearchResponse, TokenResponse, TopTracksResponse};

const ACCOUNTS_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

/// Refresh the token this long before its reported expiry.
const TOKEN_SLACK_SECS: i64 = 60;

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Spotify Web API client using the client-credentials OAuth flow.
///
/// The bearer token is fetched lazily and cached until shortly before expiry;
/// concurrent callers share one token request.
pub struct SpotifyClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    async fn bearer_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let resp = self
            .client
            .post(ACCOUNTS_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SpotifyError::Auth {
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = resp.json().await?;
        let expires_at =
            Utc::now() + ChronoDuration::seconds(token.expires_in as i64 - TOKEN_SLACK_SECS);
        let access = token.access_token.clone();
        *guard = Some(CachedToken {
            access_token: token.access_token,
            expires_at,
        });
        tracing::debug!("Refreshed Spotify client-credentials token");
        Ok(access)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.bearer_token().await?;
        let resp = self.client.get(url).bearer_auth(token).send().await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after_secs = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(SpotifyError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SpotifyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }

    /// Search for an artist by name. Returns the best match, if any.
    pub async fn search_artist(&self, name: &str) -> Result<Option<SpotifyArtist>> {
        let url = url::Url::parse_with_params(
            &format!("{API_URL}/search"),
            &[("q", name), ("type", "artist"), ("limit", "5")],
        )
        .expect("static search URL is valid");

        let resp: SearchResponse = self.get_json(url.as_str()).await?;

        // Prefer an exact case-folded name match; otherwise take the top hit.
        let needle = name.to_lowercase();
        let exact = resp
            .artists
            .items
            .iter()
            .position(|a| a.name.to_lowercase() == needle);
        let mut items = resp.artists.items;
        Ok(match exact {
            Some(i) => Some(items.swap_remove(i)),
            None => items.into_iter().next(),
        })
    }

    /// Fetch a single artist by Spotify ID.
    pub async fn artist(&self, id: &str) -> Result<SpotifyArtist> {
        self.get_json(&format!("{API_URL}/artists/{id}")).await
    }

    /// Top tracks for an artist (US market), most popular first.
    pub async fn top_tracks(&self, id: &str) -> Result<Vec<SpotifyTrack>> {
        let resp: TopTracksResponse = self
            .get_json(&format!("{API_URL}/artists/{id}/top-tracks?market=US"))
            .await?;
        Ok(resp.tracks)
    }
}
