//! CLI interface for audit-ml

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Map};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audit::AuditInstance;
use crate::config::{self, Config};
use crate::feedback::FeedbackEvent;
use crate::service::{join_training, MlService};
use crate::types::Level;

#[derive(Parser)]
#[command(name = "audit-ml")]
#[command(about = "Recommendation service for compliance audits", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Read configuration from this file instead of the default location
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Override the configured host
        #[arg(long)]
        host: Option<String>,
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Train a new model from a JSON file of audit instances
    Train {
        /// `{"instances": [...]}` or a bare array of instances
        file: PathBuf,
    },
    /// Retrain on historical instances plus the feedback ledger
    Retrain {
        file: PathBuf,
    },
    /// Ask the active model for a recommendation
    Recommend {
        /// Question text
        #[arg(short, long)]
        question: String,
        /// Current response score (0-3)
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..=3))]
        current: i64,
        #[arg(long, default_value = "")]
        comment: String,
        /// Section compliance percentage
        #[arg(long)]
        section: Option<f64>,
        /// Overall compliance percentage
        #[arg(long)]
        overall: Option<f64>,
    },
    /// Append a feedback event read from a JSON file
    Feedback {
        file: PathBuf,
    },
    /// Show model and ledger status
    Health,
    /// Inspect configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
        /// Print the default configuration as TOML
        #[arg(long)]
        defaults: bool,
        /// Write the default configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

/// Instance files come either wrapped or as a bare array
#[derive(Deserialize)]
#[serde(untagged)]
enum InstanceFile {
    Wrapped { instances: Vec<AuditInstance> },
    Bare(Vec<AuditInstance>),
}

impl Cli {
    /// Configuration selected by `--config`, with environment overrides
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
    }
}

/// Run the parsed command against `config`
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            crate::server::start(config).await?;
        }
        Commands::Train { file } => {
            let instances = read_instances(&file)?;
            let service = open_service(config)?;
            let metrics = join_training(service.spawn_train(instances)).await?;
            print_json(&json!({ "status": "success", "metrics": metrics }))?;
        }
        Commands::Retrain { file } => {
            let instances = read_instances(&file)?;
            let service = open_service(config)?;
            let report = join_training(service.spawn_retrain(instances)).await?;
            print_json(&report)?;
        }
        Commands::Recommend {
            question,
            current,
            comment,
            section,
            overall,
        } => {
            let current = Level::from_score(current)
                .with_context(|| format!("current must be between 0 and 3, got {}", current))?;
            let mut context = Map::new();
            if let Some(section) = section {
                context.insert("section_compliance".into(), json!(section));
            }
            if let Some(overall) = overall {
                context.insert("overall_compliance".into(), json!(overall));
            }

            let service = open_service(config)?;
            let recommendation = service.predict(&question, current, &comment, &context)?;
            print_json(&recommendation)?;
        }
        Commands::Feedback { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let event: FeedbackEvent = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse feedback event in {}", file.display()))?;

            let service = open_service(config)?;
            let receipt = service.submit_feedback(&event)?;
            print_json(&receipt)?;
        }
        Commands::Health => {
            let service = open_service(config)?;
            print_json(&service.health()?)?;
        }
        Commands::Config {
            show,
            defaults,
            init,
        } => {
            if defaults {
                println!("{}", config::default_config_toml());
            } else if init {
                let path = match cli.config {
                    Some(path) => path,
                    None => config::config_path()?,
                };
                if path.exists() {
                    anyhow::bail!("Config file already exists: {}", path.display());
                }
                Config::default().save_to(&path)?;
                println!("Wrote default configuration to {}", path.display());
            } else {
                if !show {
                    println!("Config file: {}", config::config_path()?.display());
                }
                config::show_config(&config)?;
            }
        }
    }

    Ok(())
}

fn open_service(config: Config) -> Result<Arc<MlService>> {
    let service = MlService::open(config).context("Failed to open model storage")?;
    Ok(Arc::new(service))
}

fn read_instances(path: &Path) -> Result<Vec<AuditInstance>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: InstanceFile = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse audit instances in {}", path.display()))?;
    Ok(match file {
        InstanceFile::Wrapped { instances } => instances,
        InstanceFile::Bare(instances) => instances,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
