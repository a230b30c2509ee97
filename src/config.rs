//! Configuration Management
//!
//! Settings are read once at startup from a JSON or YAML file and passed
//! into the dispatcher. A file may define named profiles; the caller picks
//! one explicitly with `--profile`.

use crate::wait::PollPolicy;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("gcpact/", env!("CARGO_PKG_VERSION"));

/// Base URLs of the REST APIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub certificate_manager: Url,
    pub compute: Url,
    pub iam: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            certificate_manager: parse_builtin("https://certificatemanager.googleapis.com/v1"),
            compute: parse_builtin("https://compute.googleapis.com/compute/v1"),
            iam: parse_builtin("https://iam.googleapis.com/v1"),
        }
    }
}

fn parse_builtin(url: &str) -> Url {
    Url::parse(url).unwrap_or_else(|e| unreachable!("built-in endpoint {url} is invalid: {e}"))
}

/// Effective settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds between instance status checks during a restart
    pub restart_poll_interval_secs: u64,
    /// Seconds to wait for an instance to stop before giving up on a restart
    pub restart_timeout_secs: u64,
    pub operation_poll_interval_secs: u64,
    pub operation_timeout_secs: u64,
    pub endpoints: Endpoints,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            restart_poll_interval_secs: 5,
            restart_timeout_secs: 540,
            operation_poll_interval_secs: 2,
            operation_timeout_secs: 600,
            endpoints: Endpoints::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Per-profile overrides; unset fields keep the base value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsOverride {
    #[serde(default)]
    pub restart_poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub restart_timeout_secs: Option<u64>,
    #[serde(default)]
    pub operation_poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
    #[serde(default)]
    pub certificate_manager_endpoint: Option<Url>,
    #[serde(default)]
    pub compute_endpoint: Option<Url>,
    #[serde(default)]
    pub iam_endpoint: Option<Url>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl SettingsOverride {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(v) = self.restart_poll_interval_secs {
            settings.restart_poll_interval_secs = v;
        }
        if let Some(v) = self.restart_timeout_secs {
            settings.restart_timeout_secs = v;
        }
        if let Some(v) = self.operation_poll_interval_secs {
            settings.operation_poll_interval_secs = v;
        }
        if let Some(v) = self.operation_timeout_secs {
            settings.operation_timeout_secs = v;
        }
        if let Some(url) = &self.certificate_manager_endpoint {
            settings.endpoints.certificate_manager = url.clone();
        }
        if let Some(url) = &self.compute_endpoint {
            settings.endpoints.compute = url.clone();
        }
        if let Some(url) = &self.iam_endpoint {
            settings.endpoints.iam = url.clone();
        }
        if let Some(agent) = &self.user_agent {
            settings.user_agent = agent.clone();
        }
    }
}

/// On-disk layout: base settings plus named profiles
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(flatten)]
    pub base: Settings,
    #[serde(default)]
    pub profiles: BTreeMap<String, SettingsOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from a file extension (JSON unless `.yaml`/`.yml`)
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }
}

impl ConfigFile {
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Json => serde_json::from_str(content).context("Invalid JSON config"),
            ConfigFormat::Yaml => serde_yaml::from_str(content).context("Invalid YAML config"),
        }
    }

    /// Base settings with the named profile applied
    pub fn resolve(self, profile: Option<&str>) -> Result<Settings> {
        let mut settings = self.base;

        if let Some(name) = profile {
            let Some(overrides) = self.profiles.get(name) else {
                let known: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
                bail!("Unknown profile '{}' (known: {})", name, known.join(", "));
            };
            tracing::info!("Using configuration profile '{}'", name);
            overrides.apply(&mut settings);
        }

        settings.validate()?;
        Ok(settings)
    }
}

impl Settings {
    /// Default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gcpact").join("config.json"))
    }

    /// Load settings from `path`, or from the default location if `None`.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>, profile: Option<&str>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (Some(p.to_path_buf()), true),
            None => (Self::config_path(), false),
        };

        let file = match path {
            Some(path) if explicit || path.exists() => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                tracing::debug!("Loaded config from {}", path.display());
                ConfigFile::parse(&content, ConfigFormat::from_path(&path))?
            },
            _ => ConfigFile::default(),
        };

        file.resolve(profile)
    }

    fn validate(&self) -> Result<()> {
        if self.restart_poll_interval_secs == 0 {
            bail!("restart_poll_interval_secs must be greater than zero");
        }
        if self.operation_poll_interval_secs == 0 {
            bail!("operation_poll_interval_secs must be greater than zero");
        }
        Ok(())
    }

    /// Stop-wait policy for VM restarts
    pub fn restart_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.restart_poll_interval_secs),
            Duration::from_secs(self.restart_timeout_secs),
        )
    }

    /// Wait policy for long-running operations
    pub fn operation_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.operation_poll_interval_secs),
            Duration::from_secs(self.operation_timeout_secs),
        )
    }
}
