use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub server_public_url: Option<String>,
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub jwt_secret: String,
    pub session_ttl_seconds: i64,
    pub admin_email: String,
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8787".into(),
            database_url: "sqlite://./data/press.db".into(),
            server_public_url: None,
            api_key: None,
            project_id: None,
            jwt_secret: "dev-session-secret".into(),
            session_ttl_seconds: 7 * 24 * 3600,
            admin_email: String::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Settings {
    /// Address handed out in blob download URLs.
    pub fn public_url(&self) -> String {
        self.server_public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.server_bind))
            .trim_end_matches('/')
            .to_string()
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    if settings.jwt_secret == Settings::default().jwt_secret {
        warn!("APP__JWT_SECRET not set; using the development session secret");
    }
    settings
}

pub(crate) fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, toml::Value>>(raw) {
        Ok(cfg) => cfg,
        Err(error) => {
            warn!(%error, "ignoring unparsable server.toml");
            return;
        }
    };
    let text = |key: &str| {
        file_cfg.get(key).map(|v| match v {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    };

    if let Some(v) = text("bind_addr") {
        settings.server_bind = v;
    }
    if let Some(v) = text("database_url") {
        settings.database_url = v;
    }
    if let Some(v) = text("server_public_url") {
        settings.server_public_url = Some(v);
    }
    if let Some(v) = text("api_key") {
        settings.api_key = Some(v);
    }
    if let Some(v) = text("project_id") {
        settings.project_id = Some(v);
    }
    if let Some(v) = text("jwt_secret") {
        settings.jwt_secret = v;
    }
    if let Some(v) = text("admin_email") {
        settings.admin_email = v;
    }
    if let Some(parsed) = text("session_ttl_seconds").and_then(|v| v.parse().ok()) {
        settings.session_ttl_seconds = parsed;
    }
    if let Some(parsed) = text("max_upload_bytes").and_then(|v| v.parse().ok()) {
        settings.max_upload_bytes = parsed;
    }
}

pub(crate) fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = var("SERVER_PUBLIC_URL") {
        settings.server_public_url = Some(v);
    }
    if let Some(v) = var("APP__PUBLIC_URL") {
        settings.server_public_url = Some(v);
    }

    if let Some(v) = var("PRESS_API_KEY") {
        settings.api_key = Some(v);
    }
    if let Some(v) = var("APP__API_KEY") {
        settings.api_key = Some(v);
    }

    if let Some(v) = var("PRESS_PROJECT_ID") {
        settings.project_id = Some(v);
    }
    if let Some(v) = var("APP__PROJECT_ID") {
        settings.project_id = Some(v);
    }

    if let Some(v) = var("PRESS_ADMIN_EMAIL") {
        settings.admin_email = v;
    }
    if let Some(v) = var("APP__ADMIN_EMAIL") {
        settings.admin_email = v;
    }

    if let Some(v) = var("APP__JWT_SECRET") {
        settings.jwt_secret = v;
    }

    if let Some(v) = var("APP__SESSION_TTL_SECONDS") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.session_ttl_seconds = parsed;
        }
    }
    if let Some(v) = var("APP__MAX_UPLOAD_BYTES") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.max_upload_bytes = parsed;
        }
    }

    settings.api_key = settings.api_key.take().filter(|v| !v.trim().is_empty());
    settings.project_id = settings.project_id.take().filter(|v| !v.trim().is_empty());
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
