//! Global caldraft configuration.
//!
//! Lives at `~/.config/caldraft/config.toml`. Every key can be overridden
//! from the environment with a `CALDRAFT_` prefix, e.g.
//! `CALDRAFT_DEFAULT_TIMEZONE=America/New_York`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_EXHAUSTION_MARKERS, DEFAULT_MAX_AGE_DAYS, DEFAULT_RETRY_CAP, DEFAULT_TIMEZONE};
use crate::error::{DraftError, DraftResult};

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_retry_cap() -> u32 {
    DEFAULT_RETRY_CAP
}

fn default_true() -> bool {
    true
}

fn default_exhaustion_markers() -> Vec<String> {
    DEFAULT_EXHAUSTION_MARKERS.iter().map(|m| m.to_string()).collect()
}

fn default_max_age_days() -> i64 {
    DEFAULT_MAX_AGE_DAYS
}

/// Which backend unattended runs use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnattendedBackend {
    /// Whatever `--backend` or `default_backend` names.
    #[default]
    Selected,
    /// Always `fallback_backend`, ignoring the selection.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ollama,
    Gemini,
    Mistral,
}

/// One `[backends.<name>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub model: String,
    /// Base URL; each kind has its own default.
    pub host: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
}

/// One `[destinations.<name>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DestinationConfig {
    /// A directory of `.ics` files.
    Local { path: PathBuf },
    /// A `caldir-provider-<provider>` executable. Remaining keys are passed
    /// to it verbatim.
    Provider {
        provider: String,
        #[serde(flatten)]
        params: HashMap<String, toml::Value>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaldraftConfig {
    /// IANA zone for times without one, or `local`.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    #[serde(default = "default_retry_cap")]
    pub retry_cap: u32,

    /// Ask before publishing in interactive mode.
    #[serde(default = "default_true")]
    pub confirm: bool,

    #[serde(default = "default_exhaustion_markers")]
    pub exhaustion_markers: Vec<String>,

    pub prompt_template: Option<PathBuf>,
    pub artifact_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,

    pub default_backend: Option<String>,
    pub fallback_backend: Option<String>,
    #[serde(default)]
    pub unattended_backend: UnattendedBackend,

    pub default_destination: Option<String>,

    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,

    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,

    #[serde(default)]
    pub destinations: BTreeMap<String, DestinationConfig>,
}

impl CaldraftConfig {
    pub fn config_path() -> DraftResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DraftError::Config("Could not determine config directory".into()))?
            .join("caldraft");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the global config, writing a commented-out default first if
    /// there is none yet.
    pub fn load() -> DraftResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> DraftResult<Self> {
        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("CALDRAFT")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("exhaustion_markers"),
            )
            .build()
            .map_err(|e| DraftError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| DraftError::Config(e.to_string()))
    }

    /// Resolve `default_timezone` to a zone.
    pub fn timezone(&self) -> DraftResult<Tz> {
        resolve_timezone(&self.default_timezone)
    }

    pub fn artifact_path(&self) -> Option<PathBuf> {
        match &self.artifact_dir {
            Some(dir) => Some(expand_path(dir)),
            None => dirs::data_dir().map(|d| d.join("caldraft").join("artifacts")),
        }
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        match &self.log_file {
            Some(file) => Some(expand_path(file)),
            None => dirs::data_dir().map(|d| d.join("caldraft").join("caldraft.log")),
        }
    }

    pub fn prompt_template_path(&self) -> Option<PathBuf> {
        self.prompt_template.as_deref().map(expand_path)
    }

    /// Backend used when nobody picked one: `default_backend`, else the
    /// first configured.
    pub fn default_backend_name(&self) -> Option<String> {
        self.default_backend
            .clone()
            .or_else(|| self.backends.keys().next().cloned())
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> DraftResult<()> {
        let contents = format!(
            "\
# caldraft configuration

# Zone for times that come back without one (IANA name, or \"local\"):
# default_timezone = \"{}\"

# Recovery attempts per item (alternate backends + invalid answers):
# retry_cap = {}

# Ask before publishing when running interactively:
# confirm = true

# Items older than this many days need confirmation (skipped unattended):
# max_age_days = {}

# Reply fragments meaning the backend ran out of resources:
# exhaustion_markers = [\"model requires more system memory\", \"out of memory\", \"RESOURCE_EXHAUSTED\"]

# Custom prompt with {{event}}, {{reference}}, {{timezone}} and {{content}} placeholders:
# prompt_template = \"~/.config/caldraft/prompt.txt\"

# artifact_dir = \"~/.local/share/caldraft/artifacts\"
# log_file = \"~/.local/share/caldraft/caldraft.log\"

# default_backend = \"local\"
# fallback_backend = \"gemini\"
# Unattended runs use the selected backend, or always the fallback:
# unattended_backend = \"selected\"

# [backends.local]
# kind = \"ollama\"
# model = \"llama3.1\"
# host = \"http://localhost:11434\"

# [backends.gemini]
# kind = \"gemini\"
# model = \"gemini-1.5-flash-latest\"
# api_key_env = \"GEMINI_API_KEY\"

# [backends.mistral]
# kind = \"mistral\"
# model = \"mistral-small-latest\"
# api_key_env = \"MISTRAL_API_KEY\"

# default_destination = \"drafts\"

# [destinations.drafts]
# kind = \"local\"
# path = \"~/calendar/drafts\"

# [destinations.work]
# kind = \"provider\"
# provider = \"google\"
# google_account = \"me@example.com\"
# google_calendar_id = \"primary\"
",
            DEFAULT_TIMEZONE, DEFAULT_RETRY_CAP, DEFAULT_MAX_AGE_DAYS
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DraftError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| DraftError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

/// Parse an IANA zone name; `local` asks the operating system.
pub fn resolve_timezone(name: &str) -> DraftResult<Tz> {
    let name = if name.trim().eq_ignore_ascii_case("local") {
        iana_time_zone::get_timezone()
            .map_err(|e| DraftError::Config(format!("Could not determine local time zone: {e}")))?
    } else {
        name.trim().to_string()
    };

    name.parse::<Tz>()
        .map_err(|_| DraftError::Config(format!("Unknown time zone '{}'", name)))
}

pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
