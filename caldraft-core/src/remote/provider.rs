//! Provider subprocess calls.
//!
//! A provider is any executable named `caldir-provider-<name>` on the PATH
//! that speaks the JSON protocol in `protocol.rs`. Providers manage their own
//! credentials; caldraft only forwards the destination's settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{DraftError, DraftResult};
use crate::remote::protocol::{Command, ProviderCommand, Request, Response};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider(String);

impl Provider {
    pub fn from_name(name: &str) -> Self {
        Provider(name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn binary_name(&self) -> String {
        format!("caldir-provider-{}", self.0)
    }

    fn binary_path(&self) -> DraftResult<PathBuf> {
        let binary_name = self.binary_name();
        which::which(&binary_name).map_err(|_| DraftError::ProviderNotInstalled(binary_name))
    }

    /// Call a typed provider command and return the result.
    pub async fn call<C: ProviderCommand>(&self, cmd: C) -> DraftResult<C::Response> {
        timeout(PROVIDER_TIMEOUT, self.call_raw(C::command(), cmd))
            .await
            .map_err(|_| DraftError::ProviderTimeout(PROVIDER_TIMEOUT.as_secs()))?
    }

    /// Send a command with params and deserialize the response.
    async fn call_raw<P: Serialize, R: DeserializeOwned>(
        &self,
        command: Command,
        params: P,
    ) -> DraftResult<R> {
        let params = serde_json::to_value(params)?;
        let request = Request { command, params };
        let request_json = serde_json::to_string(&request)?;

        let binary_path = self.binary_path()?;
        debug!("Calling {} ({:?})", binary_path.display(), command);

        let mut child = TokioCommand::new(&binary_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DraftError::Provider(format!("Failed to spawn {}: {}", binary_path.display(), e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DraftError::Provider("Provider stdin unavailable".into()))?;
        stdin
            .write_all(format!("{request_json}\n").as_bytes())
            .await?;
        drop(stdin);

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(DraftError::Provider(format!(
                "Provider exited with status: {}",
                output.status.code().unwrap_or(-1)
            )));
        }

        let response_str = String::from_utf8_lossy(&output.stdout);
        if response_str.trim().is_empty() {
            return Err(DraftError::Provider("Provider returned no response".into()));
        }

        let response: Response<R> = serde_json::from_str(&response_str)
            .map_err(|e| DraftError::Provider(format!("Failed to parse response: {}", e)))?;

        match response {
            Response::Success { data } => Ok(data),
            Response::Error { error } => Err(DraftError::Provider(error)),
        }
    }
}
