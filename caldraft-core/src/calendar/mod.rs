//! Publication of finished drafts.
//!
//! A destination is either a local directory of `.ics` files or a calendar
//! behind a provider binary. Either way a successful publish yields a
//! receipt: the file path or the provider's event id.

pub mod event;
pub mod ics;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{error, info};

use crate::calendar::event::Event;
use crate::config::{DestinationConfig, expand_path};
use crate::draft::EventDraft;
use crate::error::{DraftError, DraftResult};
use crate::interaction::Interaction;
use crate::remote::provider::Provider;
use crate::remote::{Remote, RemoteConfig};
use crate::validation::Mode;

#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Local(PathBuf),
    Remote(Remote),
}

impl Destination {
    pub fn from_config(config: &DestinationConfig) -> Self {
        match config {
            DestinationConfig::Local { path } => Destination::Local(expand_path(path)),
            DestinationConfig::Provider { provider, params } => Destination::Remote(Remote::new(
                Provider::from_name(provider),
                RemoteConfig(params.clone()),
            )),
        }
    }

    pub async fn publish(&self, event: &Event) -> DraftResult<String> {
        match self {
            Destination::Local(dir) => {
                let path = write_local(dir, event)?;
                Ok(path.display().to_string())
            }
            Destination::Remote(remote) => remote.create_event(event).await,
        }
    }
}

/// Generate the base file name for an event: `YYYY-MM-DDTHHMM__slug`.
fn base_slug_for(event: &Event) -> String {
    let slug = match slug::slugify(&event.summary) {
        s if s.is_empty() => "event".to_string(),
        s => s,
    };
    format!("{}__{}", event.start.format("%Y-%m-%dT%H%M"), slug)
}

/// Pick a file name that doesn't collide with existing events.
/// If the base name exists, tries name-2, name-3, etc.
fn unique_path_for(dir: &Path, event: &Event) -> DraftResult<PathBuf> {
    let base = base_slug_for(event);

    let candidate = dir.join(format!("{}.ics", base));
    if !candidate.exists() {
        return Ok(candidate);
    }

    for n in 2..=100 {
        let candidate = dir.join(format!("{}-{}.ics", base, n));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(DraftError::PublicationRejected(format!(
        "Too many event name collisions for '{}'",
        base
    )))
}

fn write_local(dir: &Path, event: &Event) -> DraftResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = unique_path_for(dir, event)?;
    std::fs::write(&path, ics::generate_ics(event)?)?;
    Ok(path)
}

/// The calendar side of the pipeline.
#[async_trait]
pub trait CalendarSink: Send + Sync {
    /// Names of the destinations that can be published to.
    fn destinations(&self) -> Vec<String>;

    /// Destination to use without asking, if one is fixed.
    fn preferred(&self) -> Option<String>;

    /// Publish a normalized draft and return the receipt.
    async fn publish(&self, destination: &str, draft: &EventDraft) -> DraftResult<String>;
}

/// Decide where a draft goes.
///
/// A fixed destination wins, then a lone configured one. With several to
/// choose from the operator picks; unattended runs get `None`.
pub fn select_destination(
    sink: &dyn CalendarSink,
    mode: Mode,
    interaction: &mut dyn Interaction,
) -> DraftResult<Option<String>> {
    if let Some(name) = sink.preferred() {
        return Ok(Some(name));
    }

    let names = sink.destinations();
    match names.len() {
        0 => return Ok(None),
        1 => return Ok(names.into_iter().next()),
        _ if mode == Mode::Unattended => return Ok(None),
        _ => {}
    }

    interaction.pick("Calendar", &names)
}

/// Destinations built from config.
#[derive(Debug, Clone, Default)]
pub struct Router {
    destinations: BTreeMap<String, Destination>,
    preferred: Option<String>,
}

impl Router {
    pub fn new(destinations: BTreeMap<String, Destination>, preferred: Option<String>) -> Self {
        Router {
            destinations,
            preferred,
        }
    }

    pub fn from_config(
        configs: &BTreeMap<String, DestinationConfig>,
        preferred: Option<String>,
    ) -> DraftResult<Self> {
        if let Some(name) = preferred.as_ref().filter(|name| !configs.contains_key(*name)) {
            return Err(DraftError::Config(format!("Unknown destination '{}'", name)));
        }

        let destinations = configs
            .iter()
            .map(|(name, config)| (name.clone(), Destination::from_config(config)))
            .collect();
        Ok(Router::new(destinations, preferred))
    }
}

#[async_trait]
impl CalendarSink for Router {
    fn destinations(&self) -> Vec<String> {
        self.destinations.keys().cloned().collect()
    }

    fn preferred(&self) -> Option<String> {
        self.preferred.clone()
    }

    async fn publish(&self, destination: &str, draft: &EventDraft) -> DraftResult<String> {
        let target = self
            .destinations
            .get(destination)
            .ok_or_else(|| DraftError::PublicationRejected(format!("Unknown destination '{}'", destination)))?;

        let event = Event::from_draft(draft).map_err(|e| DraftError::PublicationRejected(e.to_string()))?;

        match target.publish(&event).await {
            Ok(receipt) => {
                info!("Published '{}' to {} ({})", event.summary, destination, receipt);
                Ok(receipt)
            }
            Err(e) => {
                error!("{} rejected '{}': {}", destination, event.summary, e);
                Err(DraftError::PublicationRejected(e.to_string()))
            }
        }
    }
}

/// Sink that keeps published drafts in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    names: Vec<String>,
    preferred: Option<String>,
    rejections: Mutex<u32>,
    published: Mutex<Vec<(String, EventDraft)>>,
}

impl RecordingSink {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RecordingSink {
            names: names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn preferring(mut self, name: &str) -> Self {
        self.preferred = Some(name.to_string());
        self
    }

    /// Reject the next `count` publications.
    pub fn rejecting(self, count: u32) -> Self {
        if let Ok(mut r) = self.rejections.lock() {
            *r = count;
        }
        self
    }

    pub fn published(&self) -> Vec<(String, EventDraft)> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CalendarSink for RecordingSink {
    fn destinations(&self) -> Vec<String> {
        self.names.clone()
    }

    fn preferred(&self) -> Option<String> {
        self.preferred.clone()
    }

    async fn publish(&self, destination: &str, draft: &EventDraft) -> DraftResult<String> {
        let mut rejections = self
            .rejections
            .lock()
            .map_err(|_| DraftError::PublicationRejected("sink poisoned".into()))?;
        if *rejections > 0 {
            *rejections -= 1;
            return Err(DraftError::PublicationRejected(format!("{} said no", destination)));
        }
        drop(rejections);

        let mut published = self
            .published
            .lock()
            .map_err(|_| DraftError::PublicationRejected("sink poisoned".into()))?;
        published.push((destination.to_string(), draft.clone()));
        Ok(format!("{}#{}", destination, published.len()))
    }
}
