use async_trait::async_trait;
use caldraft_core::config::BackendConfig;
use caldraft_core::error::DraftResult;
use caldraft_core::model::{ExhaustionMarkers, ModelBackend};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{endpoint, send};

const DEFAULT_HOST: &str = "https://api.mistral.ai";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Mistral's OpenAI-style chat completions endpoint.
pub struct MistralBackend {
    name: String,
    model: String,
    url: Url,
    api_key: String,
    client: Client,
    markers: ExhaustionMarkers,
}

impl MistralBackend {
    pub fn new(
        name: &str,
        config: &BackendConfig,
        api_key: String,
        client: Client,
        markers: ExhaustionMarkers,
    ) -> DraftResult<Self> {
        let host = config.host.as_deref().unwrap_or(DEFAULT_HOST);
        Ok(MistralBackend {
            name: name.to_string(),
            model: config.model.clone(),
            url: endpoint(host, "v1/chat/completions")?,
            api_key,
            client,
            markers,
        })
    }
}

#[async_trait]
impl ModelBackend for MistralBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Option<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        send::<ChatResponse>(
            &self.name,
            self.client
                .post(self.url.clone())
                .bearer_auth(&self.api_key)
                .json(&request),
            &self.markers,
        )
        .await
        .into_reply(|body| body.choices.into_iter().next()?.message.content)
    }
}
