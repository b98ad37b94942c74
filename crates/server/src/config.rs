use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use serde::Deserialize;

const DEFAULT_ADMIN_PASSWORD: &str = "change-me";
const DEFAULT_TOKEN_SECRET: &str = "dev-token-secret";
const MAX_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 3600;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub admin_password: String,
    pub token_secret: String,
    pub token_ttl_seconds: i64,
    /// Lets the server start with the built-in password and token secret.
    pub allow_default_secrets: bool,
    /// Category labels; empty means an uncategorized leaderboard.
    pub games: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/leaderboard.db".into(),
            admin_password: DEFAULT_ADMIN_PASSWORD.into(),
            token_secret: DEFAULT_TOKEN_SECRET.into(),
            token_ttl_seconds: 8 * 3600,
            allow_default_secrets: false,
            games: Vec::new(),
        }
    }
}

impl Settings {
    pub fn uses_default_secrets(&self) -> bool {
        self.admin_password == DEFAULT_ADMIN_PASSWORD || self.token_secret == DEFAULT_TOKEN_SECRET
    }

    /// Refuses the built-in credentials unless explicitly allowed.
    pub fn ensure_secrets_configured(&self) -> anyhow::Result<()> {
        if self.uses_default_secrets() && !self.allow_default_secrets {
            bail!(
                "admin password or token secret left at development defaults; \
                 set APP__ADMIN_PASSWORD and APP__TOKEN_SECRET, \
                 or APP__ALLOW_DEFAULT_SECRETS=true for local development"
            );
        }
        Ok(())
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new("server.toml"), |key| std::env::var(key).ok())
}

/// Layers `server.toml` keys and then environment variables over the defaults.
pub fn load_settings_from(file: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(file) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("bind_addr") {
                settings.server_bind = v.clone();
            }
            if let Some(v) = file_cfg.get("database_url") {
                settings.database_url = v.clone();
            }
            if let Some(v) = file_cfg.get("admin_password") {
                settings.admin_password = v.clone();
            }
            if let Some(v) = file_cfg.get("token_secret") {
                settings.token_secret = v.clone();
            }
            if let Some(ttl) = file_cfg.get("token_ttl_seconds").and_then(|v| parse_ttl(v)) {
                settings.token_ttl_seconds = ttl;
            }
            if let Some(v) = file_cfg.get("allow_default_secrets") {
                settings.allow_default_secrets = parse_flag(v);
            }
            if let Some(v) = file_cfg.get("games") {
                settings.games = split_games(v);
            }
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__ADMIN_PASSWORD") {
        settings.admin_password = v;
    }
    if let Some(v) = env("APP__TOKEN_SECRET") {
        settings.token_secret = v;
    }
    if let Some(ttl) = env("APP__TOKEN_TTL_SECONDS").and_then(|v| parse_ttl(&v)) {
        settings.token_ttl_seconds = ttl;
    }
    if let Some(v) = env("APP__ALLOW_DEFAULT_SECRETS") {
        settings.allow_default_secrets = parse_flag(&v);
    }

    if let Some(v) = env("APP__GAMES") {
        settings.games = split_games(&v);
    }

    settings
}

/// Accepts lifetimes from one second up to thirty days; anything else keeps
/// the previous value.
fn parse_ttl(raw: &str) -> Option<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|ttl| (1..=MAX_TOKEN_TTL_SECONDS).contains(ttl))
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn split_games(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
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

    if raw_database_url.starts_with("sqlite::memory:") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        if has_drive_prefix(path) {
            return format!("sqlite:{}", path.replace('\\', "/"));
        }
        return raw_database_url.to_string();
    }

    if raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url)
        .replace('\\', "/");
    if has_drive_prefix(&path) {
        format!("sqlite:{path}")
    } else {
        format!("sqlite://{path}")
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
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
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
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
