//! HTTP model backends and the catalog that builds them from config.

mod gemini;
mod mistral;
mod ollama;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use caldraft_core::config::{BackendConfig, BackendKind, CaldraftConfig};
use caldraft_core::error::{DraftError, DraftResult};
use caldraft_core::model::{ExhaustionMarkers, ModelCatalog, ModelHandle};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use url::Url;

pub use gemini::GeminiBackend;
pub use mistral::MistralBackend;
pub use ollama::OllamaBackend;

/// Local models can take minutes on a cold start.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of one HTTP round trip to a backend.
pub(crate) enum Exchange<T> {
    Body(T),
    /// Error body carrying an exhaustion marker, passed on as reply text.
    Exhausted(String),
    Failed,
}

impl<T> Exchange<T> {
    /// Collapse into the `ModelBackend::generate` contract.
    pub(crate) fn into_reply(self, text: impl FnOnce(T) -> Option<String>) -> Option<String> {
        match self {
            Exchange::Body(body) => text(body),
            Exchange::Exhausted(message) => Some(message),
            Exchange::Failed => None,
        }
    }
}

pub(crate) async fn send<T: DeserializeOwned>(
    name: &str,
    request: RequestBuilder,
    markers: &ExhaustionMarkers,
) -> Exchange<T> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            error!("{}: request failed: {}", name, e);
            return Exchange::Failed;
        }
    };

    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            error!("{}: could not read response: {}", name, e);
            return Exchange::Failed;
        }
    };

    if !status.is_success() {
        error!("{}: {} {}", name, status, text.trim());
        return if markers.matches(&text) {
            Exchange::Exhausted(text)
        } else {
            Exchange::Failed
        };
    }

    debug!("{}: {} bytes", name, text.len());
    match serde_json::from_str(&text) {
        Ok(body) => Exchange::Body(body),
        Err(e) => {
            error!("{}: unexpected response: {}", name, e);
            Exchange::Failed
        }
    }
}

pub(crate) fn endpoint(host: &str, path: &str) -> DraftResult<Url> {
    let base = if host.ends_with('/') {
        host.to_string()
    } else {
        format!("{}/", host)
    };
    Url::parse(&base)
        .and_then(|url| url.join(path))
        .map_err(|e| DraftError::Config(format!("Invalid backend host '{}': {}", host, e)))
}

fn api_key(name: &str, config: &BackendConfig, default_env: &str) -> DraftResult<String> {
    let var = config.api_key_env.as_deref().unwrap_or(default_env);
    std::env::var(var).map_err(|_| {
        DraftError::Config(format!(
            "Backend '{}' needs an API key in ${}",
            name, var
        ))
    })
}

/// Backends declared under `[backends.*]`.
pub struct ConfiguredCatalog {
    backends: BTreeMap<String, BackendConfig>,
    fallback: Option<String>,
    markers: ExhaustionMarkers,
    client: Client,
}

impl ConfiguredCatalog {
    pub fn from_config(config: &CaldraftConfig) -> DraftResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DraftError::Config(format!("Could not build HTTP client: {e}")))?;

        Ok(ConfiguredCatalog {
            backends: config.backends.clone(),
            fallback: config.fallback_backend.clone(),
            markers: ExhaustionMarkers::new(&config.exhaustion_markers),
            client,
        })
    }

    pub fn config(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.get(name)
    }
}

impl ModelCatalog for ConfiguredCatalog {
    fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    fn open(&self, name: &str) -> DraftResult<ModelHandle> {
        let config = self.backends.get(name).ok_or_else(|| {
            DraftError::Config(format!(
                "Unknown backend '{}'. Available: {}",
                name,
                self.names().join(", ")
            ))
        })?;

        let client = self.client.clone();
        let markers = self.markers.clone();

        let handle: ModelHandle = match config.kind {
            BackendKind::Ollama => Arc::new(OllamaBackend::new(name, config, client, markers)?),
            BackendKind::Gemini => {
                let key = api_key(name, config, "GEMINI_API_KEY")?;
                Arc::new(GeminiBackend::new(name, config, key, client, markers)?)
            }
            BackendKind::Mistral => {
                let key = api_key(name, config, "MISTRAL_API_KEY")?;
                Arc::new(MistralBackend::new(name, config, key, client, markers)?)
            }
        };
        Ok(handle)
    }

    fn fallback(&self) -> Option<String> {
        self.fallback.clone()
    }
}

/// Serve one canned HTTP response on a local port. The handle yields the
/// raw request that was received.
#[cfg(test)]
pub(crate) async fn serve_once(
    status: &'static str,
    body: &'static str,
) -> (String, tokio::task::JoinHandle<String>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        while !request_complete(&received) {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        String::from_utf8_lossy(&received).into_owned()
    });

    (format!("http://{}", addr), handle)
}

#[cfg(test)]
fn request_complete(received: &[u8]) -> bool {
    let text = String::from_utf8_lossy(received);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let length = text[..header_end]
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    received.len() >= header_end + 4 + length
}

#[cfg(test)]
pub(crate) fn test_backend(kind: BackendKind, host: &str) -> BackendConfig {
    BackendConfig {
        kind,
        model: "test-model".into(),
        host: Some(host.to_string()),
        api_key_env: None,
    }
}

#[cfg(test)]
pub(crate) fn default_markers() -> ExhaustionMarkers {
    ExhaustionMarkers::new(caldraft_core::constants::DEFAULT_EXHAUSTION_MARKERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use caldraft_core::model::ModelBackend;

    const MEMORY_ERROR: &str =
        r#"{"error":"model requires more system memory (5.6 GiB) than is available (3.2 GiB)"}"#;

    async fn ollama_reply(status: &'static str, body: &'static str) -> Option<String> {
        let (host, server) = serve_once(status, body).await;
        let backend = OllamaBackend::new(
            "local",
            &test_backend(BackendKind::Ollama, &host),
            Client::new(),
            default_markers(),
        )
        .unwrap();

        let reply = backend.generate("Extract the event").await;
        server.await.unwrap();
        reply
    }

    #[tokio::test]
    async fn exhaustion_error_body_is_passed_on_as_reply() {
        let reply = ollama_reply("500 Internal Server Error", MEMORY_ERROR).await;
        assert_eq!(reply.as_deref(), Some(MEMORY_ERROR));
    }

    #[tokio::test]
    async fn plain_server_error_is_no_reply() {
        let reply = ollama_reply("500 Internal Server Error", r#"{"error":"llama runner crashed"}"#).await;
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn malformed_success_body_is_no_reply() {
        assert_eq!(ollama_reply("200 OK", r#"{"done":true}"#).await, None);
        assert_eq!(ollama_reply("200 OK", "<html>proxy</html>").await, None);
    }

    #[tokio::test]
    async fn unreachable_host_is_no_reply() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let backend = OllamaBackend::new(
            "local",
            &test_backend(BackendKind::Ollama, &host),
            Client::new(),
            default_markers(),
        )
        .unwrap();
        assert_eq!(backend.generate("Extract the event").await, None);
    }

    fn config(toml: &str) -> CaldraftConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml).unwrap();
        CaldraftConfig::load_from(&path).unwrap()
    }

    #[test]
    fn endpoint_joins_paths() {
        assert_eq!(
            endpoint("http://localhost:11434", "api/chat").unwrap().as_str(),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(
            endpoint("https://proxy.example.com/ollama/", "api/chat").unwrap().as_str(),
            "https://proxy.example.com/ollama/api/chat"
        );
        assert!(endpoint("not a url", "api/chat").is_err());
    }

    #[test]
    fn catalog_opens_configured_backends() {
        let catalog = ConfiguredCatalog::from_config(&config(
            r#"
fallback_backend = "small"

[backends.small]
kind = "ollama"
model = "qwen2.5:0.5b"

[backends.cloud]
kind = "mistral"
model = "mistral-small-latest"
api_key_env = "CALDRAFT_TEST_UNSET_MISTRAL_KEY"
"#,
        ))
        .unwrap();

        assert_eq!(catalog.names(), vec!["cloud", "small"]);
        assert_eq!(catalog.fallback().as_deref(), Some("small"));
        assert_eq!(catalog.open("small").unwrap().name(), "small");
        assert!(matches!(catalog.open("cloud"), Err(DraftError::Config(_))));
        assert!(matches!(catalog.open("missing"), Err(DraftError::Config(_))));
    }
}
