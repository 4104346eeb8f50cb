pub mod error;

pub use error::{HeadlessError, Result};

use std::time::Duration;

use serde::Serialize;

/// What readiness signal to wait for before capturing the DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitUntil {
    DomContentLoaded,
    NetworkIdle,
}

/// Rendering options for a single `/content` request.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: String,
    pub wait_until: WaitUntil,
    /// Viewport scrolls performed after load, each followed by `settle_ms`.
    pub scroll_steps: u32,
    pub settle_ms: u64,
    pub user_agent: Option<String>,
    pub viewport: Option<(u32, u32)>,
    pub javascript_enabled: bool,
}

impl RenderRequest {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            wait_until: WaitUntil::DomContentLoaded,
            scroll_steps: 0,
            settle_ms: 500,
            user_agent: None,
            viewport: None,
            javascript_enabled: true,
        }
    }
}

/// A rendered page as returned by the service.
#[derive(Debug, Clone)]
pub struct RenderedContent {
    pub final_url: String,
    pub html: String,
}

/// Thin client for a Browserless-style rendering service.
///
/// The service exposes a `/content` endpoint that loads a URL in a managed
/// browser and returns the final DOM as HTML. All session state lives on the
/// service side; each call is independent.
pub struct HeadlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HeadlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// Render a URL and return its final HTML.
    pub async fn content(&self, request: &RenderRequest, deadline: Duration) -> Result<RenderedContent> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let mut body = serde_json::json!({
            "url": request.url,
            "gotoOptions": {
                "waitUntil": request.wait_until,
                "timeout": deadline.as_millis() as u64,
            },
            "javascriptEnabled": request.javascript_enabled,
        });
        if request.scroll_steps > 0 {
            body["scroll"] = serde_json::json!({
                "steps": request.scroll_steps,
                "settleMs": request.settle_ms,
            });
        }
        if let Some(ref ua) = request.user_agent {
            body["userAgent"] = serde_json::json!(ua);
        }
        if let Some((width, height)) = request.viewport {
            body["viewport"] = serde_json::json!({ "width": width, "height": height });
        }

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .timeout(deadline + Duration::from_secs(5))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(HeadlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        // The service reports the post-redirect URL in a response header when
        // navigation moved; fall back to the requested URL.
        let final_url = resp
            .headers()
            .get("x-final-url")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(&request.url)
            .to_string();

        Ok(RenderedContent {
            final_url,
            html: resp.text().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_until_serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&WaitUntil::DomContentLoaded).unwrap(),
            "\"domContentLoaded\""
        );
        assert_eq!(
            serde_json::to_string(&WaitUntil::NetworkIdle).unwrap(),
            "\"networkIdle\""
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HeadlessClient::new("http://localhost:3000/", None);
        assert_eq!(client.base_url, "http://localhost:3000");
    }
}
