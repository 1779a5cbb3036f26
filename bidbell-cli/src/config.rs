//! File-backed configuration with command-line overrides.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, environment
//! variables, flags. Environment and flags both arrive through clap.

use bidbell::ClientConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cli::Args;
use crate::error::{AppError, Result};

const APP_DIR: &str = "bidbell";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Bearer token; prefer BIDBELL_TOKEN over storing it on disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    pub client: ClientConfig,
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load `path`, or the default file if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(AppError::ConfigNotFound(path.to_path_buf()));
                }
                Self::from_file(path)
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading configuration");
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|source| AppError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply values given on the command line or through the environment.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ws_url) = &args.ws_url {
            self.client.ws_url = ws_url.clone();
        }
        if let Some(api_url) = &args.api_url {
            self.client.api_url = api_url.clone();
        }
        if let Some(token) = &args.token {
            self.token = Some(token.clone());
        }
        if let Some(log_dir) = &args.log_dir {
            self.log_dir = Some(log_dir.clone());
        }
    }

    pub fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AppError::MissingToken)
    }

    /// TOML rendering of the client settings. The token is never printed.
    pub fn show(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.token = None;
        Ok(toml::to_string_pretty(&shown)?)
    }
}
