//! Production [`Fetcher`] implementation: reqwest for plain HTTP, a
//! Browserless-style rendering service for everything that needs JavaScript.
//!
//! Without a rendering service configured, rendered fetches and harvest
//! sessions degrade to plain HTTP GETs — enough for markup-served pages and
//! for development against fixture servers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use headless_client::{HeadlessClient, RenderRequest, WaitUntil};
use tracing::debug;

use soundscout_common::error::{Result, SoundscoutError};

use crate::ports::{FetchSession, Fetcher, PlainResponse, RenderOptions, RenderedPage};

#[derive(Clone)]
pub struct WebFetcher {
    http: reqwest::Client,
    headless: Option<Arc<HeadlessClient>>,
}

impl WebFetcher {
    pub fn new(browserless_url: Option<&str>, browserless_token: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36")
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http,
            headless: browserless_url
                .map(|url| Arc::new(HeadlessClient::new(url, browserless_token))),
        }
    }

    /// Plain GET with transport-level failures folded into one causal chain.
    /// Status handling stays with the callers.
    async fn send_plain(&self, url: &str, deadline: Duration) -> anyhow::Result<reqwest::Response> {
        self.http
            .get(url)
            .timeout(deadline)
            .send()
            .await
            .with_context(|| format!("GET {url}"))
    }

    fn render_request(url: &str, options: &RenderOptions) -> RenderRequest {
        RenderRequest {
            url: url.to_string(),
            wait_until: if options.scroll_steps > 0 {
                WaitUntil::NetworkIdle
            } else {
                WaitUntil::DomContentLoaded
            },
            scroll_steps: options.scroll_steps,
            settle_ms: options.settle_ms,
            user_agent: options.user_agent.clone(),
            viewport: options.viewport,
            javascript_enabled: options.javascript_enabled,
        }
    }
}

#[async_trait]
impl Fetcher for WebFetcher {
    async fn fetch_plain(&self, url: &str, deadline: Duration) -> Result<PlainResponse> {
        let resp = self
            .send_plain(url, deadline)
            .await
            .map_err(|e| SoundscoutError::Transient(format!("{e:#}")))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = resp
            .text()
            .await
            .map_err(|e| SoundscoutError::Transient(e.to_string()))?;

        Ok(PlainResponse {
            status,
            headers,
            body,
        })
    }

    async fn fetch_rendered(
        &self,
        url: &str,
        options: &RenderOptions,
        deadline: Duration,
    ) -> Result<RenderedPage> {
        match &self.headless {
            Some(client) => {
                let request = Self::render_request(url, options);
                let rendered = client
                    .content(&request, deadline)
                    .await
                    .map_err(map_headless_err)?;
                Ok(RenderedPage {
                    final_url: rendered.final_url,
                    html: rendered.html,
                    network_log: Vec::new(),
                })
            }
            None => {
                debug!(url, "No rendering service, degrading to plain fetch");
                let plain = self.fetch_plain(url, deadline).await?;
                match plain.status {
                    200..=299 => Ok(RenderedPage {
                        final_url: url.to_string(),
                        html: plain.body,
                        network_log: Vec::new(),
                    }),
                    403 => Err(SoundscoutError::Blocked(format!("status 403 for {url}"))),
                    404 => Err(SoundscoutError::NotFound(url.to_string())),
                    s => Err(SoundscoutError::Transient(format!("status {s} for {url}"))),
                }
            }
        }
    }

    async fn open_session(&self, options: &RenderOptions) -> Result<Box<dyn FetchSession>> {
        Ok(Box::new(WebFetchSession {
            fetcher: self.clone(),
            options: options.clone(),
            current_url: None,
            scrolls_done: 0,
        }))
    }
}

fn map_headless_err(err: headless_client::HeadlessError) -> SoundscoutError {
    match err {
        headless_client::HeadlessError::Network(msg) => SoundscoutError::Transient(msg),
        headless_client::HeadlessError::Api { status: 403, message } => {
            SoundscoutError::Blocked(message)
        }
        headless_client::HeadlessError::Api { status: 404, .. } => {
            SoundscoutError::NotFound("rendered target missing".into())
        }
        headless_client::HeadlessError::Api { status: 429, .. } => SoundscoutError::RateLimited {
            retry_after_secs: None,
        },
        headless_client::HeadlessError::Api { status, message } => {
            SoundscoutError::Transient(format!("render service {status}: {message}"))
        }
    }
}

/// Stateless emulation of a browser session: each scroll step re-renders the
/// page with one more scroll applied. The rendering service keeps no state
/// between calls, so the trade is extra renders for a much simpler service
/// surface.
struct WebFetchSession {
    fetcher: WebFetcher,
    options: RenderOptions,
    current_url: Option<String>,
    scrolls_done: u32,
}

#[async_trait]
impl FetchSession for WebFetchSession {
    async fn navigate(&mut self, url: &str) -> Result<String> {
        self.current_url = Some(url.to_string());
        self.scrolls_done = 0;
        let page = self
            .fetcher
            .fetch_rendered(url, &self.options, Duration::from_secs(15))
            .await?;
        Ok(page.html)
    }

    async fn scroll(&mut self, settle_ms: u64) -> Result<String> {
        let url = self
            .current_url
            .clone()
            .ok_or_else(|| SoundscoutError::Fatal("scroll before navigate".into()))?;
        self.scrolls_done += 1;
        let options = RenderOptions {
            scroll_steps: self.scrolls_done,
            settle_ms,
            ..self.options.clone()
        };
        let page = self
            .fetcher
            .fetch_rendered(&url, &options, Duration::from_secs(20))
            .await?;
        Ok(page.html)
    }
}
