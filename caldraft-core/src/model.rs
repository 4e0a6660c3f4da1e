//! Model invocation layer.
//!
//! Backends are interchangeable text generators. Some report running out of
//! memory as ordinary reply text, so exhaustion is recognised by looking for
//! configured marker strings in the reply, whatever the provider.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{DraftError, DraftResult};
use crate::interaction::Interaction;
use crate::validation::Mode;

/// A text-generation backend.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `None` means no answer (empty reply, timeout, transport error).
    async fn generate(&self, prompt: &str) -> Option<String>;
}

/// Shared handle to a backend.
pub type ModelHandle = Arc<dyn ModelBackend>;

/// Where replacement backends come from.
pub trait ModelCatalog: Send + Sync {
    /// Names of every backend that can be opened.
    fn names(&self) -> Vec<String>;

    fn open(&self, name: &str) -> DraftResult<ModelHandle>;

    /// Lightweight backend used when nobody can be asked.
    fn fallback(&self) -> Option<String>;
}

/// Result of a single call to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Reply(String),
    NoResponse,
    ResourceExhausted(String),
}

/// Reply fragments that signal resource exhaustion. Matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExhaustionMarkers(Vec<String>);

impl ExhaustionMarkers {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ExhaustionMarkers(
            markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        )
    }

    pub fn matches(&self, reply: &str) -> bool {
        let reply = reply.to_lowercase();
        self.0.iter().any(|marker| reply.contains(marker.as_str()))
    }
}

impl Default for ExhaustionMarkers {
    fn default() -> Self {
        ExhaustionMarkers::new(crate::constants::DEFAULT_EXHAUSTION_MARKERS)
    }
}

/// Call `backend` once and classify the reply.
pub async fn invoke(backend: &dyn ModelBackend, prompt: &str, markers: &ExhaustionMarkers) -> Invocation {
    debug!("Prompting {} ({} chars)", backend.name(), prompt.len());

    match backend.generate(prompt).await {
        None => Invocation::NoResponse,
        Some(text) if text.trim().is_empty() => Invocation::NoResponse,
        Some(text) if markers.matches(&text) => Invocation::ResourceExhausted(text),
        Some(text) => Invocation::Reply(text),
    }
}

/// Pick a backend to replace `current`.
///
/// Interactive: the operator chooses by number or name from the backends not
/// yet tried; an empty answer or `none` declines. Unattended: the catalog's
/// fallback, unless it has already been tried.
pub fn choose_replacement(
    catalog: &dyn ModelCatalog,
    tried: &[String],
    mode: Mode,
    interaction: &mut dyn Interaction,
) -> DraftResult<Option<String>> {
    let candidates: Vec<String> = catalog
        .names()
        .into_iter()
        .filter(|name| !tried.contains(name))
        .collect();

    if mode == Mode::Unattended {
        return Ok(catalog.fallback().filter(|name| !tried.contains(name)));
    }

    if candidates.is_empty() {
        return Ok(None);
    }

    interaction.pick("Another backend", &candidates)
}

/// Invoke `backend`, swapping in replacements for as long as replies come
/// back exhausted.
///
/// Returns the backend that produced the final answer together with the
/// reply (`None` for no answer). Fails with `BackendResourceExhausted` when
/// no replacement can be found.
pub async fn invoke_with_substitution(
    backend: ModelHandle,
    prompt: &str,
    markers: &ExhaustionMarkers,
    catalog: &dyn ModelCatalog,
    mode: Mode,
    interaction: &mut dyn Interaction,
) -> DraftResult<(ModelHandle, Option<String>)> {
    let mut current = backend;
    let mut tried: Vec<String> = Vec::new();

    loop {
        match invoke(current.as_ref(), prompt, markers).await {
            Invocation::Reply(text) => return Ok((current, Some(text))),
            Invocation::NoResponse => {
                warn!("{} returned no response", current.name());
                return Ok((current, None));
            }
            Invocation::ResourceExhausted(text) => {
                warn!("{} is out of resources: {}", current.name(), text.trim());
                tried.push(current.name().to_string());

                let Some(name) = choose_replacement(catalog, &tried, mode, interaction)? else {
                    return Err(DraftError::BackendResourceExhausted(current.name().to_string()));
                };
                info!("Retrying with {}", name);
                current = catalog.open(&name)?;
            }
        }
    }
}

/// Backend that replays queued replies. Records every prompt it receives.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    name: String,
    replies: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new<I>(name: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        ScriptedBackend {
            name: name.to_string(),
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for backends that always answer.
    pub fn replying<I, S>(name: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedBackend::new(name, replies.into_iter().map(|r| Some(r.into())))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Option<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.replies.lock().ok()?.pop_front().flatten()
    }
}

/// Catalog over a fixed set of already-built backends.
#[derive(Default)]
pub struct StaticCatalog {
    order: Vec<String>,
    backends: HashMap<String, ModelHandle>,
    fallback: Option<String>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        StaticCatalog::default()
    }

    pub fn with(mut self, backend: ModelHandle) -> Self {
        let name = backend.name().to_string();
        if !self.backends.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.backends.insert(name, backend);
        self
    }

    pub fn with_fallback(mut self, name: &str) -> Self {
        self.fallback = Some(name.to_string());
        self
    }
}

impl ModelCatalog for StaticCatalog {
    fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    fn open(&self, name: &str) -> DraftResult<ModelHandle> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| DraftError::Config(format!("Unknown backend '{}'", name)))
    }

    fn fallback(&self) -> Option<String> {
        self.fallback.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{ScriptedInteraction, Unattended};

    const OOM: &str = "Error: model requires more system memory (12 GiB) than is available";

    #[tokio::test]
    async fn classifies_replies() {
        let markers = ExhaustionMarkers::default();
        let backend = ScriptedBackend::new(
            "local",
            [Some("{}".to_string()), Some("  ".to_string()), None, Some(OOM.to_string())],
        );

        assert_eq!(invoke(&backend, "p", &markers).await, Invocation::Reply("{}".into()));
        assert_eq!(invoke(&backend, "p", &markers).await, Invocation::NoResponse);
        assert_eq!(invoke(&backend, "p", &markers).await, Invocation::NoResponse);
        assert!(matches!(
            invoke(&backend, "p", &markers).await,
            Invocation::ResourceExhausted(_)
        ));
    }

    #[test]
    fn markers_match_case_insensitively() {
        let markers = ExhaustionMarkers::new(["Resource_Exhausted", ""]);
        assert!(markers.matches("status: RESOURCE_EXHAUSTED (429)"));
        assert!(!markers.matches("all good"));
    }

    #[tokio::test]
    async fn exhaustion_substitutes_once_and_retries_same_prompt() {
        let big = Arc::new(ScriptedBackend::replying("big", [OOM]));
        let small = Arc::new(ScriptedBackend::replying("small", ["{'summary': 'Lunch'}"]));
        let catalog = StaticCatalog::new()
            .with(big.clone())
            .with(small.clone())
            .with_fallback("small");

        let (used, reply) = invoke_with_substitution(
            big.clone(),
            "the prompt",
            &ExhaustionMarkers::default(),
            &catalog,
            Mode::Unattended,
            &mut Unattended,
        )
        .await
        .unwrap();

        assert_eq!(used.name(), "small");
        assert_eq!(reply.as_deref(), Some("{'summary': 'Lunch'}"));
        assert_eq!(big.prompts(), vec!["the prompt"]);
        assert_eq!(small.prompts(), vec!["the prompt"]);
    }

    #[tokio::test]
    async fn exhausted_fallback_is_not_retried() {
        let small = Arc::new(ScriptedBackend::replying("small", [OOM, "{}"]));
        let catalog = StaticCatalog::new().with(small.clone()).with_fallback("small");

        let result = invoke_with_substitution(
            small.clone(),
            "p",
            &ExhaustionMarkers::default(),
            &catalog,
            Mode::Unattended,
            &mut Unattended,
        )
        .await;

        assert!(matches!(result, Err(DraftError::BackendResourceExhausted(name)) if name == "small"));
        assert_eq!(small.prompts().len(), 1);
    }

    #[tokio::test]
    async fn no_response_is_not_retried() {
        let silent = Arc::new(ScriptedBackend::new("silent", [None]));
        let catalog = StaticCatalog::new().with(silent.clone()).with_fallback("silent");

        let (_, reply) = invoke_with_substitution(
            silent.clone(),
            "p",
            &ExhaustionMarkers::default(),
            &catalog,
            Mode::Interactive,
            &mut ScriptedInteraction::default(),
        )
        .await
        .unwrap();

        assert_eq!(reply, None);
        assert_eq!(silent.prompts().len(), 1);
    }

    #[test]
    fn operator_picks_replacement_by_number_or_name() {
        let idle = |name: &str| Arc::new(ScriptedBackend::replying(name, Vec::<String>::new()));
        let catalog = StaticCatalog::new()
            .with(idle("ollama"))
            .with(idle("gemini"))
            .with(idle("mistral"));
        let tried = vec!["ollama".to_string()];

        let mut script = ScriptedInteraction::new(["7", "2"]);
        let pick = choose_replacement(&catalog, &tried, Mode::Interactive, &mut script).unwrap();
        assert_eq!(pick.as_deref(), Some("mistral"));
        assert_eq!(script.notices.len(), 1);

        let mut script = ScriptedInteraction::new(["GEMINI"]);
        let pick = choose_replacement(&catalog, &tried, Mode::Interactive, &mut script).unwrap();
        assert_eq!(pick.as_deref(), Some("gemini"));

        let mut script = ScriptedInteraction::new(["none"]);
        let pick = choose_replacement(&catalog, &tried, Mode::Interactive, &mut script).unwrap();
        assert_eq!(pick, None);
    }
}
