//! Production lyric analyzer: a thin client for an OpenAI-compatible
//! chat-completions endpoint, asked for a strict JSON reply at temperature 0
//! so results are deterministic up to provider rounding.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use soundscout_common::error::{Result, SoundscoutError};
use soundscout_common::types::LyricAnalysis;

use crate::ports::Analyzer;

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
const DEFAULT_MODEL: &str = "deepseek-chat";
const MAX_LYRICS_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You analyze song lyrics. Reply with a single JSON object: \
{\"themes\": [up to 8 short theme phrases, most salient first], \
\"sentiment\": number in [-1,1], \
\"language\": ISO-639-1 code of the lyrics}. No prose.";

pub struct LlmAnalyzer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct AnalysisReply {
    #[serde(default)]
    themes: Vec<String>,
    #[serde(default)]
    sentiment: f32,
    #[serde(default)]
    language: Option<String>,
}

impl LlmAnalyzer {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze_lyrics(
        &self,
        text: &str,
        language_hint: Option<&str>,
    ) -> Result<LyricAnalysis> {
        let mut prompt = String::new();
        if let Some(hint) = language_hint {
            prompt.push_str(&format!("Likely language: {hint}\n"));
        }
        prompt.push_str("Lyrics:\n");
        prompt.push_str(&truncate_chars(text, MAX_LYRICS_CHARS));

        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SoundscoutError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after_secs = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(SoundscoutError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SoundscoutError::Transient(format!(
                "analyzer {status}: {message}"
            )));
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| SoundscoutError::DataQuality(format!("analyzer response: {e}")))?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| SoundscoutError::DataQuality("analyzer returned no choices".into()))?;

        parse_reply(content, language_hint)
    }
}

fn parse_reply(content: &str, language_hint: Option<&str>) -> Result<LyricAnalysis> {
    let reply: AnalysisReply = serde_json::from_str(content.trim())
        .map_err(|e| SoundscoutError::DataQuality(format!("analyzer reply not JSON: {e}")))?;

    let mut themes = reply.themes;
    themes.truncate(8);
    themes.retain(|t| !t.trim().is_empty());

    Ok(LyricAnalysis {
        themes,
        sentiment: reply.sentiment.clamp(-1.0, 1.0),
        language: reply
            .language
            .filter(|l| !l.is_empty())
            .or_else(|| language_hint.map(str::to_string))
            .unwrap_or_else(|| "en".to_string()),
    })
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_reply() {
        let reply = r#"{"themes":["heartbreak","city nights"],"sentiment":-0.4,"language":"en"}"#;
        let analysis = parse_reply(reply, None).unwrap();
        assert_eq!(analysis.themes, vec!["heartbreak", "city nights"]);
        assert!((analysis.sentiment + 0.4).abs() < f32::EPSILON);
        assert_eq!(analysis.language, "en");
    }

    #[test]
    fn clamps_sentiment_and_caps_themes() {
        let reply = format!(
            r#"{{"themes":[{}],"sentiment":3.5,"language":"es"}}"#,
            (0..12).map(|i| format!("\"t{i}\"")).collect::<Vec<_>>().join(",")
        );
        let analysis = parse_reply(&reply, None).unwrap();
        assert_eq!(analysis.themes.len(), 8);
        assert_eq!(analysis.sentiment, 1.0);
    }

    #[test]
    fn missing_language_falls_back_to_hint_then_en() {
        let analysis = parse_reply(r#"{"themes":["a"],"sentiment":0}"#, Some("pt")).unwrap();
        assert_eq!(analysis.language, "pt");
        let analysis = parse_reply(r#"{"themes":["a"],"sentiment":0}"#, None).unwrap();
        assert_eq!(analysis.language, "en");
    }

    #[test]
    fn non_json_reply_is_data_quality() {
        assert!(matches!(
            parse_reply("the lyrics are about love", None),
            Err(SoundscoutError::DataQuality(_))
        ));
    }
}
