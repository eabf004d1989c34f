//! Configuration loading.
//!
//! Settings merge in order: built-in defaults, then the global config file
//! (`<config_dir>/shipkit/config.toml`), then the project file
//! (`shipkit.toml` in the working directory), then environment overrides.
//! An explicit `--config` path replaces the file layers entirely.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShipError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub stub: StubConfig,
}

/// Remote broker endpoint and credential.
///
/// Both values must be present to publish against a real broker; with both
/// absent the local simulator is used instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub url: Option<String>,
    pub device_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Directory where bundle archives are written before upload.
    /// Defaults to `<temp_dir>/shipkit`.
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StubConfig {
    /// How long the simulator retains finished jobs, in seconds.
    pub retention_secs: u64,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
        }
    }
}

/// A fully-resolved broker configuration (both url and credential present).
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub url: String,
    pub device_token: String,
}

impl Config {
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| env_nonempty("SHIPKIT_CONFIG").map(PathBuf::from));

        if let Some(path) = explicit {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch);
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_patch(Path::new("shipkit.toml"))? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Resolve the broker settings, if a broker is configured.
    ///
    /// Returns `None` when neither url nor token is set (simulator mode).
    /// A partial configuration is a local precondition failure, not a
    /// network error.
    pub fn broker_settings(&self) -> Result<Option<BrokerSettings>> {
        match (&self.broker.url, &self.broker.device_token) {
            (None, None) => Ok(None),
            (Some(url), Some(token)) => Ok(Some(BrokerSettings {
                url: url.trim_end_matches('/').to_string(),
                device_token: token.clone(),
            })),
            (Some(_), None) => Err(ShipError::MissingConfig(
                "broker.device_token (broker.url is set)".to_string(),
            )),
            (None, Some(_)) => Err(ShipError::MissingConfig(
                "broker.url (broker.device_token is set)".to_string(),
            )),
        }
    }

    /// Directory where bundle archives are written.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.bundle
            .output_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("shipkit"))
    }

    /// Simulator retention window for finished jobs.
    #[must_use]
    pub fn stub_retention(&self) -> Duration {
        Duration::from_secs(self.stub.retention_secs)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&config_dir.join("shipkit/config.toml"))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| ShipError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| ShipError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(broker) = patch.broker {
            if broker.url.is_some() {
                self.broker.url = broker.url;
            }
            if broker.device_token.is_some() {
                self.broker.device_token = broker.device_token;
            }
        }
        if let Some(bundle) = patch.bundle {
            if bundle.output_dir.is_some() {
                self.bundle.output_dir = bundle.output_dir;
            }
        }
        if let Some(stub) = patch.stub {
            if let Some(retention) = stub.retention_secs {
                self.stub.retention_secs = retention;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(url) = env_nonempty("SHIPKIT_BROKER_URL") {
            self.broker.url = Some(url);
        } else if std::env::var("SHIPKIT_BROKER_URL").is_ok() {
            // An explicitly empty variable force-unsets the file value.
            self.broker.url = None;
        }
        if let Some(token) = env_nonempty("SHIPKIT_DEVICE_TOKEN") {
            self.broker.device_token = Some(token);
        } else if std::env::var("SHIPKIT_DEVICE_TOKEN").is_ok() {
            self.broker.device_token = None;
        }
        if let Some(dir) = env_nonempty("SHIPKIT_OUTPUT_DIR") {
            self.bundle.output_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = env_nonempty("SHIPKIT_STUB_RETENTION_SECS") {
            let secs = raw.parse().map_err(|_| {
                ShipError::Config(format!("SHIPKIT_STUB_RETENTION_SECS is not a number: {raw}"))
            })?;
            self.stub.retention_secs = secs;
        }
        Ok(())
    }
}

/// Partial config parsed from a single file; `None` fields leave the
/// current value untouched.
#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    broker: Option<BrokerPatch>,
    bundle: Option<BundlePatch>,
    stub: Option<StubPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BrokerPatch {
    url: Option<String>,
    device_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BundlePatch {
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct StubPatch {
    retention_secs: Option<u64>,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
