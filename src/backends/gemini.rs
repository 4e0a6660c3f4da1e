use async_trait::async_trait;
use caldraft_core::config::BackendConfig;
use caldraft_core::error::DraftResult;
use caldraft_core::model::{ExhaustionMarkers, ModelBackend};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{endpoint, send};

const DEFAULT_HOST: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated.
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        if text.is_empty() { None } else { Some(text) }
    }
}

/// Google Gemini through the `generateContent` REST call.
pub struct GeminiBackend {
    name: String,
    url: Url,
    api_key: String,
    client: Client,
    markers: ExhaustionMarkers,
}

impl GeminiBackend {
    pub fn new(
        name: &str,
        config: &BackendConfig,
        api_key: String,
        client: Client,
        markers: ExhaustionMarkers,
    ) -> DraftResult<Self> {
        let host = config.host.as_deref().unwrap_or(DEFAULT_HOST);
        let model = config.model.trim_start_matches("models/");
        Ok(GeminiBackend {
            name: name.to_string(),
            url: endpoint(host, &format!("v1beta/models/{}:generateContent", model))?,
            api_key,
            client,
            markers,
        })
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Option<String> {
        let request = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        send::<GenerateResponse>(
            &self.name,
            self.client
                .post(self.url.clone())
                .header("x-goog-api-key", &self.api_key)
                .json(&request),
            &self.markers,
        )
        .await
        .into_reply(GenerateResponse::text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_candidate_text_is_the_reply() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"summary\":"}, {"text": " \"x\"}"}], "role": "model"}}]}"#,
        )
        .unwrap();
        assert_eq!(body.text().as_deref(), Some("{\"summary\": \"x\"}"));

        let blocked: GenerateResponse = serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert_eq!(blocked.text(), None);
    }
}
