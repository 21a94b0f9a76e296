//! Build configuration.
//!
//! A build is described by a YAML or JSON file (picked by extension). A few
//! values can be supplied through the environment instead so secrets and
//! per-machine settings stay out of checked-in files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use imagesmith_api::PollSettings;
use imagesmith_util::{ResourceNames, expand_tilde, redact_sensitive};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const CONFIG_ENV: &str = "IMAGESMITH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "imagesmith.yaml";
pub const SUBSCRIPTION_ENV: &str = "AZURE_SUBSCRIPTION_ID";
pub const LOCATION_ENV: &str = "AZURE_LOCATION";
pub const ADMIN_PASSWORD_ENV: &str = "IMAGESMITH_ADMIN_PASSWORD";

const DEFAULT_TEMPLATE: &str = include_str!("../templates/vm.json");
const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Marketplace image the build VM boots from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    #[serde(default = "default_image_version")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub location: String,
    /// Generated from a timestamp when absent, as are the two names below.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
    pub storage_account: String,
    #[serde(default = "default_storage_container")]
    pub storage_container: String,
    #[serde(default = "default_capture_name_prefix")]
    pub capture_name_prefix: String,
    pub image: ImageReference,
    #[serde(default = "default_vm_size")]
    pub vm_size: String,
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
    /// ARM template replacing the built-in single-VM template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_file: Option<PathBuf>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub polling: PollSettings,
}

fn default_image_version() -> String {
    "latest".into()
}

fn default_storage_container() -> String {
    "images".into()
}

fn default_capture_name_prefix() -> String {
    "imagesmith".into()
}

fn default_vm_size() -> String {
    "Standard_A1".into()
}

fn default_admin_username() -> String {
    "imagesmith".into()
}

impl BuildConfig {
    /// Reads, overrides from the environment and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parses a config file without touching the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match path.extension().and_then(|extension| extension.to_str()) {
            Some("json") => serde_json::from_str(&content).map_err(|error| parse_error(error.to_string())),
            _ => serde_yaml::from_str(&content).map_err(|error| parse_error(error.to_string())),
        }
    }

    /// Picks the config path: explicit argument, then `IMAGESMITH_CONFIG`,
    /// then `imagesmith.yaml` in the working directory.
    pub fn resolve_path(explicit: Option<&str>) -> PathBuf {
        let from_env = std::env::var(CONFIG_ENV).ok().filter(|value| !value.trim().is_empty());
        let raw = explicit.map(str::to_string).or(from_env).unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
        expand_tilde(&raw)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(subscription_id) = env_value(SUBSCRIPTION_ENV) {
            self.subscription_id = subscription_id;
        }
        if let Some(location) = env_value(LOCATION_ENV) {
            self.location = location;
        }
        if let Some(password) = env_value(ADMIN_PASSWORD_ENV) {
            self.admin_password = Some(password);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("subscription_id", &self.subscription_id),
            ("location", &self.location),
            ("storage_account", &self.storage_account),
            ("storage_container", &self.storage_container),
            ("image.publisher", &self.image.publisher),
            ("image.offer", &self.image.offer),
            ("image.sku", &self.image.sku),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("`{field}` must be set")));
        }
        if self.admin_password.as_deref().is_none_or(|password| password.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "`admin_password` must be set in the config file or via {ADMIN_PASSWORD_ENV}"
            )));
        }
        if let Some(compute_name) = &self.compute_name
            && compute_name.len() > 15
        {
            return Err(ConfigError::Invalid(format!(
                "`compute_name` '{compute_name}' exceeds 15 characters"
            )));
        }
        if self.polling.max_attempts == 0 {
            return Err(ConfigError::Invalid("`polling.max_attempts` must be at least 1".into()));
        }
        Ok(())
    }

    /// YAML rendering with the admin password masked.
    ///
    /// The password is replaced on the struct itself; [`redact_sensitive`] then
    /// catches credentials that leak through other fields such as tags.
    pub fn render_redacted(&self) -> Result<String, serde_yaml::Error> {
        let mut masked = self.clone();
        masked.admin_password = masked.admin_password.map(|_| REDACTED.to_string());
        let rendered = serde_yaml::to_string(&masked)?;
        Ok(redact_sensitive(&rendered))
    }

    /// Resource names for this build; configured names win over generated ones.
    pub fn resource_names(&self, generated: ResourceNames) -> ResourceNames {
        ResourceNames {
            resource_group: self.resource_group_name.clone().unwrap_or(generated.resource_group),
            compute: self.compute_name.clone().unwrap_or(generated.compute),
            deployment: self.deployment_name.clone().unwrap_or(generated.deployment),
        }
    }

    /// The ARM template to deploy: `template_file` if set, otherwise the
    /// built-in single-VM template.
    pub fn template(&self) -> Result<Value, ConfigError> {
        match &self.template_file {
            Some(path) => {
                let path = expand_tilde(&path.to_string_lossy());
                let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                serde_json::from_str(&content).map_err(|error| ConfigError::Parse {
                    path,
                    message: error.to_string(),
                })
            }
            None => serde_json::from_str(DEFAULT_TEMPLATE).map_err(|error| ConfigError::Parse {
                path: PathBuf::from("templates/vm.json"),
                message: error.to_string(),
            }),
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
