use crate::error::ApixError;
use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Token in `directory_path_for_api_logs` replaced by `root_directory_path`.
pub const ROOT_PATH_TEMPLATE: &str = "{Root}";

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApixConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Request/response bodies larger than this are not copied into API logs.
    #[serde(default = "default_max_logged_body")]
    pub max_logged_body_bytes: usize,
}

/// API log writer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base directory for per-request JSON files. May contain `{Root}`.
    #[serde(default)]
    pub directory_path_for_api_logs: Option<String>,
    /// Substituted for `{Root}` in `directory_path_for_api_logs`.
    #[serde(default)]
    pub root_directory_path: Option<String>,
    /// Queue capacity. 0 = unbounded.
    #[serde(default)]
    pub queue_capacity: usize,
    /// Upper bound on the shutdown drain. Unset = wait until drained.
    #[serde(default)]
    pub shutdown_timeout_ms: Option<u64>,
    /// Attach the request-logging middleware to the HTTP app.
    #[serde(default = "default_true")]
    pub request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// Cache stores exposed through the cache-store endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub stores: Vec<CacheStoreConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStoreConfig {
    pub alias: String,
    #[serde(default = "default_true")]
    pub bulk_remove_enabled: bool,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_addr() -> String { "0.0.0.0:8080".into() }
fn default_max_logged_body() -> usize { 64 * 1024 }
fn default_true() -> bool { true }
fn default_metrics_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            max_logged_body_bytes: default_max_logged_body(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory_path_for_api_logs: None,
            root_directory_path: None,
            queue_capacity: 0,
            shutdown_timeout_ms: None,
            request_logging: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

impl ApixConfig {
    /// Load configuration from YAML file + env overrides.
    ///
    /// A missing file contributes nothing; env overrides still apply.
    ///
    /// Env keys use `__` as the nesting separator, e.g.
    /// `APIX_LOGGING__ROOT_DIRECTORY_PATH=/data`.
    pub fn load(path: &Path) -> Result<Self, ApixError> {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("APIX_").split("__"))
            .extract()
            .map_err(|e| ApixError::Config(e.to_string()))
    }
}

impl LoggingConfig {
    /// Resolve the API log base directory, substituting `{Root}`.
    ///
    /// Fails when the directory is unset, or when it uses `{Root}` and no
    /// root directory is configured.
    pub fn api_log_directory(&self) -> Result<PathBuf, ApixError> {
        let raw = self
            .directory_path_for_api_logs
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ApixError::Config(
                    "logging.directory_path_for_api_logs is not configured".to_string(),
                )
            })?;

        if !raw.contains(ROOT_PATH_TEMPLATE) {
            return Ok(PathBuf::from(raw));
        }

        let root = self
            .root_directory_path
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ApixError::Config("logging.root_directory_path is not configured".to_string())
            })?;

        Ok(PathBuf::from(raw.replace(ROOT_PATH_TEMPLATE, root)))
    }
}
