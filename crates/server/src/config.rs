use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use shared::schema::RequestSchemas;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: String,
    pub keycloak_url: Option<String>,
    pub keycloak_realm: String,
    pub keycloak_client_id: String,
    pub keycloak_client_secret: Option<String>,
    pub mail_relay_url: Option<String>,
    pub mail_from: String,
    pub schema_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/requests.db".into(),
            keycloak_url: None,
            keycloak_realm: "research".into(),
            keycloak_client_id: "requests".into(),
            keycloak_client_secret: None,
            mail_relay_url: None,
            mail_from: "no-reply@localhost".into(),
            schema_path: None,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        return;
    };
    for (key, value) in file_cfg {
        apply_key(settings, &key, value);
    }
}

/// Later keys win, so each `APP__*` name is listed after its legacy alias.
const ENV_KEYS: &[(&str, &str)] = &[
    ("SERVER_BIND", "bind_addr"),
    ("APP__BIND_ADDR", "bind_addr"),
    ("DATABASE_URL", "database_url"),
    ("APP__DATABASE_URL", "database_url"),
    ("APP__KEYCLOAK_URL", "keycloak_url"),
    ("APP__KEYCLOAK_REALM", "keycloak_realm"),
    ("APP__KEYCLOAK_CLIENT_ID", "keycloak_client_id"),
    ("APP__KEYCLOAK_CLIENT_SECRET", "keycloak_client_secret"),
    ("APP__MAIL_RELAY_URL", "mail_relay_url"),
    ("APP__MAIL_FROM", "mail_from"),
    ("APP__SCHEMA_PATH", "schema_path"),
];

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    for (var, key) in ENV_KEYS {
        if let Some(value) = lookup(var) {
            apply_key(settings, key, value);
        }
    }
}

fn apply_key(settings: &mut Settings, key: &str, value: String) {
    match key {
        "bind_addr" => settings.bind_addr = value,
        "database_url" => settings.database_url = value,
        "keycloak_url" => settings.keycloak_url = Some(value),
        "keycloak_realm" => settings.keycloak_realm = value,
        "keycloak_client_id" => settings.keycloak_client_id = value,
        "keycloak_client_secret" => settings.keycloak_client_secret = Some(value),
        "mail_relay_url" => settings.mail_relay_url = Some(value),
        "mail_from" => settings.mail_from = value,
        "schema_path" => settings.schema_path = Some(value),
        _ => {}
    }
}

/// Keycloak's base URL with a trailing slash so realm paths join below it.
pub fn keycloak_base_url(raw: &str) -> anyhow::Result<Url> {
    let raw = raw.trim();
    let raw = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&raw).with_context(|| format!("invalid keycloak url '{raw}'"))
}

pub fn load_schemas(schema_path: Option<&str>) -> anyhow::Result<RequestSchemas> {
    let Some(path) = schema_path else {
        return Ok(RequestSchemas::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read form schemas from '{path}'"))?;
    let schemas: RequestSchemas =
        toml::from_str(&raw).with_context(|| format!("invalid form schemas in '{path}'"))?;
    schemas
        .validate()
        .with_context(|| format!("invalid form schemas in '{path}'"))?;
    Ok(schemas)
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
