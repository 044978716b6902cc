//! Application configuration for NetWiki.
//!
//! User config lives at `~/.netwiki/netwiki.toml`; `--config` points elsewhere.
//! Secrets never live in the file: it names the environment variables that
//! hold them, and those are read once at startup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{NetWikiError, Result};
use crate::types::FieldMapping;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "netwiki.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".netwiki";

/// Default field mapping database file name, inside the config directory.
const DATABASE_FILE_NAME: &str = "fields.db";

// ---------------------------------------------------------------------------
// Config structs (matching netwiki.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Confluence connection settings.
    #[serde(default)]
    pub confluence: ConfluenceConfig,

    /// Webhook endpoint settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Field mapping store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Statically configured field mappings, registered before stored ones.
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
}

/// `[confluence]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceConfig {
    /// Base URL of the Confluence instance.
    #[serde(default = "default_confluence_url")]
    pub url: String,

    /// User the updater authenticates as.
    #[serde(default = "default_username")]
    pub username: String,

    /// Name of the env var holding the password or API token.
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Space that holds the `partials-*` pages.
    #[serde(default = "default_space_key")]
    pub space_key: String,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            url: default_confluence_url(),
            username: default_username(),
            password_env: default_password_env(),
            space_key: default_space_key(),
            timeout_secs: default_request_timeout(),
        }
    }
}

fn default_confluence_url() -> String {
    "http://localhost:8090".into()
}
fn default_username() -> String {
    "netwiki".into()
}
fn default_password_env() -> String {
    "NETWIKI_CONFLUENCE_PASSWORD".into()
}
fn default_space_key() -> String {
    "NETBOX".into()
}
fn default_request_timeout() -> u64 {
    30
}

/// `[webhook]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Address the webhook server listens on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Name of the env var holding the shared secret NetBox sends.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Upper bound on one whole update (fetch + patch + push).
    #[serde(default = "default_update_timeout")]
    pub update_timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            token_env: default_token_env(),
            update_timeout_secs: default_update_timeout(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".into()
}
fn default_token_env() -> String {
    "NETWIKI_WEBHOOK_TOKEN".into()
}
fn default_update_timeout() -> u64 {
    60
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Field mapping database; defaults to `~/.netwiki/fields.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl StorageConfig {
    /// Resolve the database path, expanding a leading `~/`.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database {
            Some(path) => expand_home(path),
            None => Ok(config_dir()?.join(DATABASE_FILE_NAME)),
        }
    }
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| NetWikiError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

// ---------------------------------------------------------------------------
// Runtime settings (resolved once at startup, passed into constructors)
// ---------------------------------------------------------------------------

/// Resolved Confluence settings, including the secret read from the env.
#[derive(Clone)]
pub struct ConfluenceSettings {
    /// Base URL, without trailing slash semantics issues.
    pub base_url: Url,
    /// Basic auth user.
    pub username: String,
    /// Basic auth password or API token.
    pub password: String,
    /// Space key.
    pub space_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for ConfluenceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfluenceSettings")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("space_key", &self.space_key)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ConfluenceSettings {
    /// Resolve settings from config, reading the password env var.
    pub fn resolve(config: &AppConfig) -> Result<Self> {
        let section = &config.confluence;
        let var_name = &section.password_env;
        let password = match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => val,
            _ => {
                return Err(NetWikiError::config(format!(
                    "Confluence password not found. Set the {var_name} environment variable."
                )));
            }
        };
        Self::from_parts(section, password)
    }

    /// Build settings from a config section and an explicit password.
    pub fn from_parts(section: &ConfluenceConfig, password: String) -> Result<Self> {
        let base_url = Url::parse(&section.url).map_err(|e| {
            NetWikiError::config(format!("invalid confluence.url {:?}: {e}", section.url))
        })?;
        if section.space_key.trim().is_empty() {
            return Err(NetWikiError::config("confluence.space_key must not be empty"));
        }
        if section.username.is_empty() {
            return Err(NetWikiError::config("confluence.username must not be empty"));
        }

        Ok(Self {
            base_url,
            username: section.username.clone(),
            password,
            space_key: section.space_key.clone(),
            timeout: Duration::from_secs(section.timeout_secs),
        })
    }
}

/// Resolved webhook settings.
///
/// A missing token is not a startup failure: every request is then rejected
/// with a distinct "token not set" error so operators see what is wrong.
#[derive(Clone)]
pub struct WebhookSettings {
    /// Listen address.
    pub bind: SocketAddr,
    /// Shared secret, if configured.
    pub token: Option<String>,
    /// Name of the env var the token is read from, for error messages.
    pub token_env: String,
    /// Timeout for one whole update.
    pub update_timeout: Duration,
}

impl std::fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("bind", &self.bind)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_env", &self.token_env)
            .field("update_timeout", &self.update_timeout)
            .finish()
    }
}

impl WebhookSettings {
    /// Resolve settings from config, reading the token env var.
    pub fn resolve(config: &AppConfig) -> Result<Self> {
        let section = &config.webhook;
        let bind = section.bind.parse().map_err(|e| {
            NetWikiError::config(format!("invalid webhook.bind {:?}: {e}", section.bind))
        })?;
        let token = std::env::var(&section.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(
                env = %section.token_env,
                "webhook token not set; all triggers will be rejected"
            );
        }

        Ok(Self {
            bind,
            token,
            token_env: section.token_env.clone(),
            update_timeout: Duration::from_secs(section.update_timeout_secs),
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.netwiki/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| NetWikiError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.netwiki/netwiki.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| NetWikiError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| NetWikiError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
/// An existing file is left untouched.
pub fn init_config_at(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(NetWikiError::config(format!(
            "config file already exists: {}",
            path.display()
        )));
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| NetWikiError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| NetWikiError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| NetWikiError::io(path, e))?;
    tracing::info!(?path, "created default config file");
    Ok(())
}
