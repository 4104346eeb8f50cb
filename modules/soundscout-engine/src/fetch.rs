//! Cascading-strategy page fetching.
//!
//! Strategies run fastest-first with per-strategy timeouts and a short
//! cooldown between attempts; the first success wins. Headless strategies
//! share a small process-wide concurrency limit to bound browser memory,
//! plain HTTP a larger one.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use soundscout_common::error::{Result, SoundscoutError};

use crate::cache::ResponseCache;
use crate::cancel::CancelToken;
use crate::ports::{Fetcher, RenderOptions};

pub const MAX_CONCURRENT_HEADLESS: usize = 4;
pub const MAX_CONCURRENT_PLAIN: usize = 32;

const COOLDOWN: Duration = Duration::from_secs(1);

const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
];

const VIEWPORT_POOL: &[(u32, u32)] = &[(1280, 800), (1366, 768), (1440, 900), (1920, 1080)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    PlainHttp,
    HeadlessDefault,
    HeadlessScroll,
    HeadlessStealth,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::PlainHttp,
        Strategy::HeadlessDefault,
        Strategy::HeadlessScroll,
        Strategy::HeadlessStealth,
    ];

    pub fn timeout(self) -> Duration {
        match self {
            Strategy::PlainHttp => Duration::from_secs(5),
            Strategy::HeadlessDefault => Duration::from_secs(10),
            Strategy::HeadlessScroll => Duration::from_secs(15),
            Strategy::HeadlessStealth => Duration::from_secs(20),
        }
    }

    pub fn is_headless(self) -> bool {
        !matches!(self, Strategy::PlainHttp)
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::PlainHttp => write!(f, "plain_http"),
            Strategy::HeadlessDefault => write!(f, "headless_default"),
            Strategy::HeadlessScroll => write!(f, "headless_scroll"),
            Strategy::HeadlessStealth => write!(f, "headless_stealth"),
        }
    }
}

/// Per-call tuning for [`StrategyFetcher::fetch`].
#[derive(Debug, Clone)]
pub struct FetchHints {
    /// Restrict the cascade to a subset (in cascade order). None = all.
    pub strategies: Option<Vec<Strategy>>,
    /// Consult and fill the response cache.
    pub use_cache: bool,
}

impl Default for FetchHints {
    fn default() -> Self {
        Self {
            strategies: None,
            use_cache: true,
        }
    }
}

impl FetchHints {
    /// Pages that serve meaningful HTML without scripts (lyrics pages).
    pub fn plain_first_only() -> Self {
        Self {
            strategies: Some(vec![Strategy::PlainHttp, Strategy::HeadlessDefault]),
            use_cache: true,
        }
    }
}

/// The final HTML plus how it was obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub final_url: String,
    pub html: String,
    pub strategy: Strategy,
    #[serde(default)]
    pub from_cache: bool,
}

/// Per-attempt outcome used to classify the overall failure.
enum AttemptError {
    Timeout,
    Blocked,
    RateLimited { retry_after_secs: Option<u64> },
    NotFound,
    Upstream(String),
}

pub struct StrategyFetcher {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<ResponseCache>,
    plain_permits: Arc<Semaphore>,
    headless_permits: Arc<Semaphore>,
}

impl StrategyFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: Arc<ResponseCache>) -> Self {
        Self {
            fetcher,
            cache,
            plain_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_PLAIN)),
            headless_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_HEADLESS)),
        }
    }

    /// Fetch a URL through the strategy cascade.
    pub async fn fetch(
        &self,
        url: &str,
        hints: &FetchHints,
        cancel: &CancelToken,
    ) -> Result<FetchedPage> {
        if hints.use_cache {
            if let Some(cached) = self.cache.get("fetch.page", &[("url", url)]) {
                if let Ok(mut page) = serde_json::from_str::<FetchedPage>(&cached) {
                    page.from_cache = true;
                    return Ok(page);
                }
            }
        }

        let default_order = Strategy::ALL.to_vec();
        let order = hints.strategies.as_ref().unwrap_or(&default_order);

        let mut saw_not_found_plain = false;
        let mut saw_blocked = false;
        let mut all_timed_out = true;
        let mut last_upstream: Option<String> = None;

        for (i, &strategy) in order.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SoundscoutError::Cancelled);
            }
            if i > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SoundscoutError::Cancelled),
                    _ = tokio::time::sleep(COOLDOWN) => {}
                }
            }

            match self.attempt(url, strategy, cancel).await {
                Ok(page) => {
                    debug!(url, %strategy, "Fetch succeeded");
                    if hints.use_cache {
                        if let Ok(serialized) = serde_json::to_string(&page) {
                            self.cache.put("fetch.page", &[("url", url)], serialized);
                        }
                    }
                    return Ok(page);
                }
                Err(AttemptError::Timeout) => {
                    warn!(url, %strategy, "Strategy timed out");
                }
                Err(AttemptError::Blocked) => {
                    warn!(url, %strategy, "Strategy blocked, escalating");
                    saw_blocked = true;
                    all_timed_out = false;
                }
                Err(AttemptError::RateLimited { retry_after_secs }) => {
                    warn!(url, %strategy, ?retry_after_secs, "Rate limited, escalating");
                    saw_blocked = true;
                    all_timed_out = false;
                }
                Err(AttemptError::NotFound) => {
                    if !strategy.is_headless() {
                        saw_not_found_plain = true;
                    }
                    all_timed_out = false;
                }
                Err(AttemptError::Upstream(msg)) => {
                    warn!(url, %strategy, error = %msg, "Strategy failed");
                    last_upstream = Some(msg);
                    all_timed_out = false;
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(SoundscoutError::Cancelled);
        }
        if saw_not_found_plain {
            return Err(SoundscoutError::NotFound(url.to_string()));
        }
        if saw_blocked {
            return Err(SoundscoutError::Blocked(format!(
                "all strategies blocked for {url}"
            )));
        }
        if all_timed_out {
            return Err(SoundscoutError::Transient(format!(
                "all strategies timed out for {url}"
            )));
        }
        Err(SoundscoutError::Transient(
            last_upstream.unwrap_or_else(|| format!("all strategies failed for {url}")),
        ))
    }

    async fn attempt(
        &self,
        url: &str,
        strategy: Strategy,
        cancel: &CancelToken,
    ) -> std::result::Result<FetchedPage, AttemptError> {
        let _permit = if strategy.is_headless() {
            self.headless_permits.acquire().await
        } else {
            self.plain_permits.acquire().await
        }
        .map_err(|_| AttemptError::Upstream("fetch semaphore closed".into()))?;

        let deadline = strategy.timeout();
        let work = self.run_strategy(url, strategy, deadline);
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(AttemptError::Upstream("cancelled".into())),
            r = tokio::time::timeout(deadline, work) => r,
        };

        match result {
            Err(_) => Err(AttemptError::Timeout),
            Ok(inner) => inner,
        }
    }

    async fn run_strategy(
        &self,
        url: &str,
        strategy: Strategy,
        deadline: Duration,
    ) -> std::result::Result<FetchedPage, AttemptError> {
        match strategy {
            Strategy::PlainHttp => {
                let resp = self
                    .fetcher
                    .fetch_plain(url, deadline)
                    .await
                    .map_err(classify_port_error)?;
                match resp.status {
                    200..=299 => Ok(FetchedPage {
                        url: url.to_string(),
                        final_url: url.to_string(),
                        html: resp.body,
                        strategy,
                        from_cache: false,
                    }),
                    403 => Err(AttemptError::Blocked),
                    404 => Err(AttemptError::NotFound),
                    429 => Err(AttemptError::RateLimited {
                        retry_after_secs: resp
                            .header("retry-after")
                            .and_then(|v| v.parse().ok()),
                    }),
                    s => Err(AttemptError::Upstream(format!("status {s}"))),
                }
            }
            Strategy::HeadlessDefault | Strategy::HeadlessScroll | Strategy::HeadlessStealth => {
                let options = self.render_options(strategy);
                let page = self
                    .fetcher
                    .fetch_rendered(url, &options, deadline)
                    .await
                    .map_err(classify_port_error)?;
                Ok(FetchedPage {
                    url: url.to_string(),
                    final_url: page.final_url,
                    html: page.html,
                    strategy,
                    from_cache: false,
                })
            }
        }
    }

    fn render_options(&self, strategy: Strategy) -> RenderOptions {
        match strategy {
            Strategy::PlainHttp | Strategy::HeadlessDefault => RenderOptions::default(),
            Strategy::HeadlessScroll => RenderOptions {
                scroll_steps: 3,
                settle_ms: 500,
                ..Default::default()
            },
            Strategy::HeadlessStealth => {
                let mut rng = rand::rng();
                let ua = USER_AGENT_POOL[rng.random_range(0..USER_AGENT_POOL.len())];
                let viewport = VIEWPORT_POOL[rng.random_range(0..VIEWPORT_POOL.len())];
                RenderOptions {
                    scroll_steps: 1,
                    settle_ms: 750,
                    user_agent: Some(ua.to_string()),
                    viewport: Some(viewport),
                    javascript_enabled: true,
                }
            }
        }
    }
}

fn classify_port_error(err: SoundscoutError) -> AttemptError {
    match err {
        SoundscoutError::Blocked(_) => AttemptError::Blocked,
        SoundscoutError::NotFound(_) => AttemptError::NotFound,
        SoundscoutError::RateLimited { retry_after_secs } => {
            AttemptError::RateLimited { retry_after_secs }
        }
        other => AttemptError::Upstream(other.to_string()),
    }
}
