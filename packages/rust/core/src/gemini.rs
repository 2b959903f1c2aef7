//! Minimal Gemini `generateContent` client.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use ecospray_shared::{GeminiConfig, Result, SiteError};

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

/// Output mode requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Text,
    Json,
}

/// Text-in, text-out client for one Gemini model.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    fallback_key: Option<String>,
}

impl GeminiClient {
    /// Build a client. `fallback_key` is used only when a call supplies no key.
    pub fn new(config: &GeminiConfig, fallback_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SiteError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            fallback_key,
        })
    }

    /// The caller's key wins; the server key is a fallback.
    pub fn resolve_key<'a>(&'a self, caller_key: Option<&'a str>) -> Result<&'a str> {
        caller_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .or(self.fallback_key.as_deref())
            .ok_or_else(|| SiteError::validation("geminiKey is required"))
    }

    /// Send one prompt and return the concatenated text of the first candidate.
    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.len()))]
    pub async fn generate(
        &self,
        caller_key: Option<&str>,
        prompt: &str,
        mode: ResponseMode,
    ) -> Result<String> {
        let start_time = Instant::now();
        let api_key = self.resolve_key(caller_key)?;

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                response_mime_type: match mode {
                    ResponseMode::Json => Some("application/json"),
                    ResponseMode::Text => None,
                },
            },
        };

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        debug!(%url, "calling Gemini");

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| SiteError::request("Gemini", e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| format!("Gemini returned HTTP {status}"));
            return Err(SiteError::upstream(Some(status.as_u16()), message));
        }

        let raw = response
            .text()
            .await
            .map_err(|e| SiteError::request("Gemini", e.without_url()))?;
        let body: GeminiResponse = serde_json::from_str(&raw)
            .map_err(|e| SiteError::malformed(format!("unreadable Gemini response: {e}")))?;

        let text: String = body
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(SiteError::malformed("Gemini returned no text"));
        }

        info!(
            response_chars = text.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "Gemini call completed"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, fallback: Option<&str>) -> GeminiClient {
        let config = GeminiConfig {
            base_url: server.uri(),
            model: "gemini-test".into(),
            timeout_secs: 5,
            ..GeminiConfig::default()
        };
        GeminiClient::new(&config, fallback.map(String::from)).unwrap()
    }

    fn reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]
        }))
    }

    #[test]
    fn caller_key_wins_over_fallback() {
        let config = GeminiConfig::default();
        let c = GeminiClient::new(&config, Some("server-key".into())).unwrap();
        assert_eq!(c.resolve_key(Some("caller-key")).unwrap(), "caller-key");
        assert_eq!(c.resolve_key(Some("  ")).unwrap(), "server-key");
        assert_eq!(c.resolve_key(None).unwrap(), "server-key");

        let keyless = GeminiClient::new(&config, None).unwrap();
        assert!(matches!(
            keyless.resolve_key(None),
            Err(SiteError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn json_mode_sets_response_mime_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(query_param("key", "caller-key"))
            .and(body_partial_json(json!({
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .respond_with(reply(r#"{"services": []}"#))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server, Some("server-key"))
            .generate(Some("caller-key"), "extract", ResponseMode::Json)
            .await
            .unwrap();
        assert_eq!(text, r#"{"services": []}"#);
    }

    #[tokio::test]
    async fn upstream_rejection_keeps_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
            })))
            .mount(&server)
            .await;

        let err = client(&server, Some("k"))
            .generate(None, "hello", ResponseMode::Text)
            .await
            .unwrap_err();
        match err {
            SiteError::Upstream { status, message } => {
                assert_eq!(status, Some(429));
                assert_eq!(message, "Resource has been exhausted");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_candidates_are_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = client(&server, Some("k"))
            .generate(None, "hello", ResponseMode::Text)
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::MalformedAiResponse { .. }));
    }

    #[tokio::test]
    async fn non_json_success_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html>busy</html>", "text/html"))
            .mount(&server)
            .await;

        let err = client(&server, Some("k"))
            .generate(None, "hello", ResponseMode::Text)
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::MalformedAiResponse { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn slow_model_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply("late").set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let config = GeminiConfig {
            base_url: server.uri(),
            timeout_secs: 1,
            ..GeminiConfig::default()
        };
        let err = GeminiClient::new(&config, Some("k".into()))
            .unwrap()
            .generate(None, "hello", ResponseMode::Text)
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::Timeout(_)));
    }
}
