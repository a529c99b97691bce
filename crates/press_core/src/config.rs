use std::{fs, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const CONFIG_FILE: &str = "press.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value {0}")]
    Missing(&'static str),
    #[error("invalid auth domain '{domain}': {source}")]
    InvalidAuthDomain {
        domain: String,
        source: url::ParseError,
    },
}

/// Connection identifiers for the identity, document and blob
/// collaborators, plus the address that receives the admin role at signup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    pub admin_email: String,
}

impl ClientConfig {
    /// `press.toml` in the working directory, overridden by `PRESS_*`
    /// environment variables.
    pub fn load() -> Self {
        let file = fs::read_to_string(CONFIG_FILE).ok();
        Self::from_sources(file.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn load_from(path: &Path) -> Self {
        let file = fs::read_to_string(path)
            .map_err(|error| warn!(path = %path.display(), %error, "config file not readable"))
            .ok();
        Self::from_sources(file.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn from_sources(file: Option<&str>, var: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = match file.map(toml::from_str::<ClientConfig>) {
            Some(Ok(cfg)) => cfg,
            Some(Err(error)) => {
                warn!(%error, "ignoring unparsable {CONFIG_FILE}");
                ClientConfig::default()
            }
            None => ClientConfig::default(),
        };

        let slots: [(&str, &mut Option<String>); 6] = [
            ("PRESS_API_KEY", &mut cfg.api_key),
            ("PRESS_AUTH_DOMAIN", &mut cfg.auth_domain),
            ("PRESS_PROJECT_ID", &mut cfg.project_id),
            ("PRESS_STORAGE_BUCKET", &mut cfg.storage_bucket),
            ("PRESS_MESSAGING_SENDER_ID", &mut cfg.messaging_sender_id),
            ("PRESS_APP_ID", &mut cfg.app_id),
        ];
        for (key, slot) in slots {
            if let Some(value) = var(key) {
                *slot = Some(value);
            }
            *slot = slot.take().filter(|value| !value.trim().is_empty());
        }
        if let Some(value) = var("PRESS_ADMIN_EMAIL") {
            cfg.admin_email = value;
        }
        cfg.admin_email = cfg.admin_email.trim().to_string();

        debug!(
            project_id = cfg.project_id.as_deref().unwrap_or("-"),
            has_api_key = cfg.api_key.is_some(),
            "client config loaded"
        );
        cfg
    }

    /// Backend base URL derived from the auth domain; `https://` is assumed
    /// when no scheme is given. Always ends with `/` so endpoints can be
    /// joined onto it.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let domain = self
            .auth_domain
            .as_deref()
            .map(str::trim)
            .ok_or(ConfigError::Missing("PRESS_AUTH_DOMAIN"))?;
        let with_scheme = if domain.contains("://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        let mut url = Url::parse(&with_scheme).map_err(|source| ConfigError::InvalidAuthDomain {
            domain: domain.to_string(),
            source,
        })?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn bucket(&self) -> &str {
        self.storage_bucket.as_deref().unwrap_or("press")
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
