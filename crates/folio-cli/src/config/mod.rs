//! Configuration loading and resolution.
//!
//! Every setting resolves as: explicit flag, then environment variable, then
//! default. Resolution happens once at startup; nothing reads the
//! environment afterwards.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{json, Value};

use folio::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use folio::{Catalog, CatalogError, ConfigError, GeminiConfig, TrackerConfig};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const MODEL_ENV: &str = "FOLIO_MODEL";
pub const BASE_URL_ENV: &str = "FOLIO_BASE_URL";
pub const CATALOG_ENV: &str = "FOLIO_CATALOG";
pub const TOKEN_ENV: &str = "FOLIO_TOKEN";

/// Catalog picked up from the working directory when nothing else is given.
pub const LOCAL_CATALOG: &str = "folio.json";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Where the entity catalog comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    File(PathBuf),
    Builtin,
}

impl CatalogSource {
    pub fn load(&self) -> Result<Catalog, CatalogError> {
        match self {
            CatalogSource::File(path) => Catalog::load(path),
            CatalogSource::Builtin => Catalog::builtin(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            CatalogSource::File(path) => path.display().to_string(),
            CatalogSource::Builtin => "<builtin>".to_string(),
        }
    }
}

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub catalog: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub catalog: CatalogSource,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Per-attempt HTTP timeout.
    pub http_timeout: Duration,
    pub max_retries: u32,
}

impl Settings {
    /// Resolve settings from flags and the process environment.
    pub fn resolve(overrides: &Overrides) -> Self {
        let http_timeout =
            Duration::from_secs(overrides.timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS));

        Self {
            catalog: resolve_catalog_source(overrides.catalog.as_deref()),
            api_key: first_non_empty(overrides.api_key.as_deref(), env_var(API_KEY_ENV)),
            model: first_non_empty(overrides.model.as_deref(), env_var(MODEL_ENV))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: first_non_empty(overrides.base_url.as_deref(), env_var(BASE_URL_ENV))
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http_timeout,
            max_retries: overrides.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        }
    }

    /// Client settings; fails when no API key was found.
    pub fn gemini_config(&self) -> Result<GeminiConfig, ConfigError> {
        let api_key = self.api_key.clone().ok_or(ConfigError::MissingApiKey)?;
        let base = GeminiConfig::new(api_key);
        let backoff = base.retry_backoff;
        Ok(base
            .with_model(&self.model)
            .with_base_url(&self.base_url)
            .with_timeout(self.http_timeout)
            .with_retries(self.max_retries, backoff))
    }

    /// Tracker deadline covers every retry plus one spare attempt.
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            request_timeout: self
                .http_timeout
                .checked_mul(self.max_retries.saturating_add(2))
                .unwrap_or(Duration::MAX),
            ..TrackerConfig::default()
        }
    }

    /// Settings as JSON with the API key redacted.
    pub fn redacted(&self) -> Value {
        json!({
            "catalog": self.catalog.describe(),
            "api_key": self.api_key.as_ref().map(|_| "<redacted>"),
            "model": self.model,
            "base_url": self.base_url,
            "http_timeout_secs": self.http_timeout.as_secs(),
            "max_retries": self.max_retries,
        })
    }
}

/// Resolve the catalog source.
pub fn resolve_catalog_source(explicit: Option<&str>) -> CatalogSource {
    if let Some(path) = first_non_empty(explicit, env_var(CATALOG_ENV)) {
        return CatalogSource::File(PathBuf::from(path));
    }

    let local = PathBuf::from(LOCAL_CATALOG);
    if local.exists() {
        return CatalogSource::File(local);
    }

    CatalogSource::Builtin
}

/// Resolve the bearer token guarding the HTTP surface.
pub fn resolve_token(explicit: Option<&str>) -> Option<String> {
    first_non_empty(explicit, env_var(TOKEN_ENV))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn first_non_empty(explicit: Option<&str>, env: Option<String>) -> Option<String> {
    explicit
        .map(str::to_string)
        .into_iter()
        .chain(env)
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}
