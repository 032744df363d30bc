//! Peripheral configuration.

use std::path::{Path, PathBuf};
use std::{fs, io};

use tracing::debug;

use crate::dev::DEFAULT_MTU;

/// Configuration error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("default MTU {0} is below the minimum of 23")]
    InvalidMtu(u16),
    #[error("user configuration directory not available")]
    NoUserDir,
}

/// Number of responses sent for a write request.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponsePolicy {
    /// Exactly one response per request.
    #[default]
    Single,
    /// A write to an unknown characteristic is answered with a failure and
    /// then, if the client requested a response, with a success.
    Legacy,
}

/// Peripheral configuration. Missing keys take their default values.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Write response policy.
    pub response_policy: ResponsePolicy,
    /// Whether to subscribe to the notifications of connected centrals.
    pub mirror_client: bool,
    /// ATT MTU assumed for new connections until the platform reports the
    /// negotiated value.
    pub default_mtu: u16,
    /// Whether a value written by a central is pushed to all connected
    /// centrals.
    pub notify_on_remote_write: bool,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            response_policy: ResponsePolicy::default(),
            mirror_client: true,
            default_mtu: DEFAULT_MTU,
            notify_on_remote_write: true,
        }
    }
}

impl Config {
    const FILE_NAME: &'static str = "peripheral.json";

    /// Parses a JSON configuration.
    pub fn from_json(s: &str) -> Result<Self, Error> {
        let v: serde_json::Value = serde_json::from_str(s)?;
        if !v.is_object() {
            return Err(Error::Json(serde::de::Error::custom(
                "configuration must be a JSON object",
            )));
        }
        let cfg: Self = serde_json::from_value(v)?;
        cfg.validate()
    }

    /// Loads configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let cfg = Self::from_json(&fs::read_to_string(path)?)?;
        debug!("Loaded configuration: {}", path.display());
        Ok(cfg)
    }

    /// Saves configuration to a JSON file, creating parent directories as
    /// needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Wrote: {}", path.display());
        Ok(())
    }

    /// Loads configuration from the current user's configuration directory.
    /// Returns the default configuration if the file does not exist.
    #[cfg(feature = "fs")]
    pub fn per_user(app: impl AsRef<Path>) -> Result<Self, Error> {
        match Self::load(Self::per_user_path(app)?) {
            Err(Error::Io(e)) if matches!(e.kind(), io::ErrorKind::NotFound) => Ok(Self::default()),
            r => r,
        }
    }

    /// Returns the configuration file path in the current user's
    /// configuration directory.
    #[cfg(feature = "fs")]
    pub fn per_user_path(app: impl AsRef<Path>) -> Result<PathBuf, Error> {
        let dir = dirs::config_dir().ok_or(Error::NoUserDir)?;
        Ok(dir.join(app.as_ref()).join(Self::FILE_NAME))
    }

    /// Returns the configuration file path in directory `root`.
    #[inline]
    #[must_use]
    pub fn path_in(root: impl AsRef<Path>) -> PathBuf {
        root.as_ref().join(Self::FILE_NAME)
    }

    fn validate(self) -> Result<Self, Error> {
        if self.default_mtu < DEFAULT_MTU {
            return Err(Error::InvalidMtu(self.default_mtu));
        }
        Ok(self)
    }
}
