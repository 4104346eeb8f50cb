use std::env;

/// Process configuration loaded from environment variables.
///
/// Every field is optional at the core level: a missing credential disables
/// the feature it powers (no Spotify keys — no Spotify enrichment; no
/// Browserless URL — plain-HTTP fetching only).
#[derive(Debug, Clone, Default)]
pub struct Config {
    // Spotify Web API (client-credentials flow)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Lyric analyzer (OpenAI-compatible endpoint)
    pub analyzer_api_key: Option<String>,
    pub analyzer_base_url: Option<String>,

    // Relational store connection string, consumed by the external driver
    pub store_url: Option<String>,

    // Browserless-style rendering service for headless strategies
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,

    /// Search surface host. Defaults to "www.youtube.com".
    pub search_host: String,

    /// Process-wide cap on concurrently running sessions. Defaults to 4.
    pub max_concurrent_sessions: usize,

    /// Daily budget in cost units. 0 = unlimited.
    pub daily_cost_budget: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            spotify_client_id: env::var("SPOTIFY_CLIENT_ID").ok(),
            spotify_client_secret: env::var("SPOTIFY_CLIENT_SECRET").ok(),
            analyzer_api_key: env::var("ANALYZER_API_KEY").ok(),
            analyzer_base_url: env::var("ANALYZER_BASE_URL").ok(),
            store_url: env::var("STORE_URL").ok(),
            browserless_url: env::var("BROWSERLESS_URL").ok(),
            browserless_token: env::var("BROWSERLESS_TOKEN").ok(),
            search_host: env::var("SEARCH_HOST").unwrap_or_else(|_| "www.youtube.com".to_string()),
            max_concurrent_sessions: env::var("MAX_CONCURRENT_SESSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            daily_cost_budget: env::var("DAILY_COST_BUDGET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }

    pub fn spotify_enabled(&self) -> bool {
        self.spotify_client_id.is_some() && self.spotify_client_secret.is_some()
    }

    pub fn analyzer_enabled(&self) -> bool {
        self.analyzer_api_key.is_some()
    }

    /// Log which credentials are present without echoing their values.
    pub fn log_redacted(&self) {
        let vars = [
            ("SPOTIFY_CLIENT_ID", self.spotify_client_id.as_deref()),
            ("SPOTIFY_CLIENT_SECRET", self.spotify_client_secret.as_deref()),
            ("ANALYZER_API_KEY", self.analyzer_api_key.as_deref()),
            ("STORE_URL", self.store_url.as_deref()),
            ("BROWSERLESS_URL", self.browserless_url.as_deref()),
        ];
        for (name, value) in vars {
            match value {
                Some(v) => tracing::info!("{name} = ({} chars)", v.len()),
                None => tracing::info!("{name} = (unset)"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spotify_requires_both_credentials() {
        let mut config = Config {
            spotify_client_id: Some("id".into()),
            ..Default::default()
        };
        assert!(!config.spotify_enabled());
        config.spotify_client_secret = Some("secret".into());
        assert!(config.spotify_enabled());
    }
}
