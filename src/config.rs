//! Configuration management
//!
//! Settings are read from `config.toml` in the platform config directory (or
//! an explicit path), then overridden by environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::{ForestParams, LoadPolicy};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Where snapshots and feedback live
    #[serde(default)]
    pub storage: StorageConfig,
    /// Model hyperparameters
    #[serde(default)]
    pub training: TrainingConfig,
    /// Default tracing directive, `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins accepted by CORS
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:4200".to_string(),
        "http://localhost:3002".to_string(),
    ]
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            environment: default_environment(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `encoder_<id>.json` / `classifier_<id>.json` pairs
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    /// JSON-lines feedback ledger
    #[serde(default = "default_feedback_file")]
    pub feedback_file: PathBuf,
    /// Snapshots kept after each training run. Values below 1 keep one,
    /// so the snapshot just written always survives.
    #[serde(default = "default_keep_latest")]
    pub keep_latest: usize,
    #[serde(default)]
    pub load_policy: LoadPolicy,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("./models")
}

fn default_feedback_file() -> PathBuf {
    PathBuf::from("./data/feedback.jsonl")
}

fn default_keep_latest() -> usize {
    5
}

impl StorageConfig {
    /// Number of snapshots retention keeps, never fewer than one
    pub fn retained_snapshots(&self) -> usize {
        self.keep_latest.max(1)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            feedback_file: default_feedback_file(),
            keep_latest: default_keep_latest(),
            load_policy: LoadPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Answered questions required before a model is fitted
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    /// Vocabulary cap for the text encoder
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_min_observations() -> usize {
    5
}

fn default_max_features() -> usize {
    100
}

fn default_n_trees() -> usize {
    ForestParams::default().n_trees
}

fn default_max_depth() -> usize {
    ForestParams::default().max_depth
}

fn default_seed() -> u64 {
    ForestParams::default().seed
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_observations: default_min_observations(),
            max_features: default_max_features(),
            n_trees: default_n_trees(),
            max_depth: default_max_depth(),
            seed: default_seed(),
        }
    }
}

impl TrainingConfig {
    /// Forest hyperparameters derived from this section
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.n_trees.max(1),
            max_depth: self.max_depth.max(1),
            seed: self.seed,
            ..ForestParams::default()
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            training: TrainingConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Defaults with models and feedback stored under `dir`
    pub fn with_data_dir(dir: &Path) -> Self {
        let mut config = Config::default();
        config.storage.model_dir = dir.join("models");
        config.storage.feedback_file = dir.join("data").join("feedback.jsonl");
        config
    }

    /// Load configuration from the default location, then apply the
    /// environment. A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from `path`, then apply the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Config::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply `PORT`, `HOST`, `MODEL_PATH`, `FEEDBACK_FILE`,
    /// `ALLOWED_ORIGINS`, `ENVIRONMENT` and `LOG_LEVEL` from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value '{}'", port))?;
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(origins) = get("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(environment) = get("ENVIRONMENT") {
            self.server.environment = environment;
        }
        if let Some(model_dir) = get("MODEL_PATH") {
            self.storage.model_dir = PathBuf::from(model_dir);
        }
        if let Some(feedback_file) = get("FEEDBACK_FILE") {
            self.storage.feedback_file = PathBuf::from(feedback_file);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
        Ok(())
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "audit-ml", "audit-ml")
        .context("Failed to get project directories")
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Print the effective configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("Server:");
    println!("  bind:            {}", config.server.bind_address());
    println!("  environment:     {}", config.server.environment);
    println!("  allowed origins: {}", config.server.allowed_origins.join(", "));
    println!("Storage:");
    println!("  model dir:       {}", config.storage.model_dir.display());
    println!("  feedback file:   {}", config.storage.feedback_file.display());
    println!("  keep latest:     {}", config.storage.keep_latest);
    println!("  load policy:     {:?}", config.storage.load_policy);
    println!("Training:");
    println!("  min observations: {}", config.training.min_observations);
    println!("  max features:     {}", config.training.max_features);
    println!(
        "  forest:           {} trees, depth {}, seed {}",
        config.training.n_trees, config.training.max_depth, config.training.seed
    );
    println!("Log level: {}", config.log_level);
    Ok(())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
