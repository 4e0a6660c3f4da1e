use async_trait::async_trait;
use caldraft_core::config::BackendConfig;
use caldraft_core::error::DraftResult;
use caldraft_core::model::{ExhaustionMarkers, ModelBackend};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{endpoint, send};

const DEFAULT_HOST: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Options {
    /// Context window sized to the prompt.
    num_ctx: usize,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// A model served by a local Ollama daemon.
pub struct OllamaBackend {
    name: String,
    model: String,
    url: Url,
    client: Client,
    markers: ExhaustionMarkers,
}

impl OllamaBackend {
    pub fn new(
        name: &str,
        config: &BackendConfig,
        client: Client,
        markers: ExhaustionMarkers,
    ) -> DraftResult<Self> {
        let host = config.host.as_deref().unwrap_or(DEFAULT_HOST);
        Ok(OllamaBackend {
            name: name.to_string(),
            model: config.model.clone(),
            url: endpoint(host, "api/chat")?,
            client,
            markers,
        })
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
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
            stream: false,
            options: Options {
                num_ctx: prompt.len(),
            },
        };

        send::<ChatResponse>(
            &self.name,
            self.client.post(self.url.clone()).json(&request),
            &self.markers,
        )
        .await
        .into_reply(|body| Some(body.message.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{default_markers, serve_once, test_backend};
    use caldraft_core::config::BackendKind;

    #[tokio::test]
    async fn chat_reply_is_message_content() {
        let (host, server) = serve_once(
            "200 OK",
            r#"{"model":"test-model","message":{"role":"assistant","content":"{\"summary\": \"Lunch\"}"},"done":true}"#,
        )
        .await;
        let backend = OllamaBackend::new(
            "local",
            &test_backend(BackendKind::Ollama, &host),
            Client::new(),
            default_markers(),
        )
        .unwrap();

        let reply = backend.generate("Find the lunch").await;
        let request = server.await.unwrap();

        assert_eq!(reply.as_deref(), Some(r#"{"summary": "Lunch"}"#));
        assert!(request.starts_with("POST /api/chat "));
        assert!(request.contains(r#""stream":false"#));
        assert!(request.contains(r#""num_ctx":14"#));
        assert!(request.contains(r#""content":"Find the lunch""#));
    }

    #[test]
    fn default_host_is_local_daemon() {
        let config = BackendConfig {
            host: None,
            ..test_backend(BackendKind::Ollama, "unused")
        };
        let backend = OllamaBackend::new("local", &config, Client::new(), default_markers()).unwrap();
        assert_eq!(backend.url.as_str(), "http://localhost:11434/api/chat");
    }
}
