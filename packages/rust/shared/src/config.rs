//! Application configuration for graphfeat.
//!
//! User config lives at `~/.graphfeat/graphfeat.toml`. CLI flags override
//! config file values, which override defaults. The file is resolved once at
//! start-up into an immutable [`Settings`] value that every component borrows.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{GraphFeatError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "graphfeat.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".graphfeat";

// ---------------------------------------------------------------------------
// Config structs (matching graphfeat.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    #[serde(default)]
    pub algorithm: AlgorithmConfig,

    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Downloaded sources and per-run work directories.
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: String,

    /// Directly uploaded source files.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            tmp_dir: default_tmp_dir(),
            uploads_dir: default_uploads_dir(),
        }
    }
}

fn default_tmp_dir() -> String {
    "tmp".into()
}
fn default_uploads_dir() -> String {
    "tmp/uploads".into()
}

/// `[acquisition]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Whole-request timeout for downloading a source.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Largest source accepted, in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    300
}
fn default_max_bytes() -> u64 {
    512 * 1024 * 1024
}

/// `[algorithm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Interpreter used to run the embedding scripts.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Directory holding the embedding scripts.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,

    /// Upper bound on one embedding process run.
    #[serde(default = "default_algorithm_timeout")]
    pub timeout_secs: u64,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            scripts_dir: default_scripts_dir(),
            timeout_secs: default_algorithm_timeout(),
        }
    }
}

fn default_interpreter() -> String {
    "python3".into()
}
fn default_scripts_dir() -> String {
    "python".into()
}
fn default_algorithm_timeout() -> u64 {
    3600
}

/// `[repository]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Base URL of the dataset repository.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Timeout for the upload call.
    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_publish_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.openml.org".into()
}
fn default_api_key_env() -> String {
    "OPENML_API_KEY".into()
}
fn default_publish_timeout() -> u64 {
    120
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

// ---------------------------------------------------------------------------
// Resolved settings (immutable, built once at start-up)
// ---------------------------------------------------------------------------

/// Runtime settings for the acquisition step.
#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub timeout: Duration,
    pub max_bytes: u64,
}

/// Runtime settings for the algorithm dispatcher.
#[derive(Debug, Clone)]
pub struct AlgorithmSettings {
    pub interpreter: String,
    pub scripts_dir: PathBuf,
    pub timeout: Duration,
}

/// Runtime settings for the repository client.
#[derive(Clone)]
pub struct RepositorySettings {
    pub base_url: Url,
    pub api_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for RepositorySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositorySettings")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Everything a pipeline run needs from configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tmp_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub acquisition: AcquisitionSettings,
    pub algorithm: AlgorithmSettings,
    pub repository: RepositorySettings,
}

impl Settings {
    /// Resolve settings from a loaded config, reading the repository API key
    /// from the environment.
    pub fn resolve(config: &AppConfig) -> Result<Self> {
        let api_key = resolve_api_key(config)?;
        Self::with_api_key(config, api_key)
    }

    /// Resolve settings with an explicitly supplied API key.
    pub fn with_api_key(config: &AppConfig, api_key: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(&config.repository.base_url).map_err(|e| {
            GraphFeatError::config(format!(
                "invalid repository base_url '{}': {e}",
                config.repository.base_url
            ))
        })?;

        Ok(Self {
            tmp_dir: PathBuf::from(&config.paths.tmp_dir),
            uploads_dir: PathBuf::from(&config.paths.uploads_dir),
            acquisition: AcquisitionSettings {
                timeout: Duration::from_secs(config.acquisition.timeout_secs),
                max_bytes: config.acquisition.max_bytes,
            },
            algorithm: AlgorithmSettings {
                interpreter: config.algorithm.interpreter.clone(),
                scripts_dir: PathBuf::from(&config.algorithm.scripts_dir),
                timeout: Duration::from_secs(config.algorithm.timeout_secs),
            },
            repository: RepositorySettings {
                base_url,
                api_key: api_key.into(),
                timeout: Duration::from_secs(config.repository.timeout_secs),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.graphfeat/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GraphFeatError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.graphfeat/graphfeat.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| GraphFeatError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        GraphFeatError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GraphFeatError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GraphFeatError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GraphFeatError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the repository API key from the env var named in the config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.repository.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(GraphFeatError::config(format!(
            "repository API key not found. Set the {var_name} environment variable."
        ))),
    }
}
