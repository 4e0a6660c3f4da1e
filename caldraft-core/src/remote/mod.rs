pub mod protocol;
pub mod provider;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::calendar::event::Event;
use crate::error::DraftResult;
use crate::remote::protocol::{CreateEvent, ProviderEvent};
use crate::remote::provider::Provider;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RemoteConfig(pub HashMap<String, toml::Value>);

impl From<&RemoteConfig> for serde_json::Map<String, serde_json::Value> {
    fn from(config: &RemoteConfig) -> Self {
        config
            .0
            .iter()
            .filter_map(|(k, v)| serde_json::to_value(v).ok().map(|v| (k.clone(), v)))
            .collect()
    }
}

/// A calendar hosted behind a provider binary.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Remote {
    pub provider: Provider,
    #[serde(flatten)]
    pub config: RemoteConfig,
}

impl Remote {
    pub fn new(provider: Provider, config: RemoteConfig) -> Self {
        Remote { provider, config }
    }

    fn remote_config(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::from(&self.config)
    }

    /// Create the event remotely and return the provider's identifier for
    /// it, falling back to our own UID when the reply carries none.
    pub async fn create_event(&self, event: &Event) -> DraftResult<String> {
        let created = self
            .provider
            .call(CreateEvent {
                remote_config: self.remote_config(),
                event: ProviderEvent::from(event),
            })
            .await?;

        Ok(["id", "uid"]
            .iter()
            .find_map(|key| created.get(*key).and_then(|v| v.as_str()))
            .unwrap_or(&event.uid)
            .to_string())
    }
}
