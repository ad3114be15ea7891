//! Audit Recommender - learns from completed compliance audits
//!
//! - Flattens audit instances into labelled observations
//! - Fits a TF-IDF encoder and a decision-tree ensemble on them
//! - Persists versioned (encoder, classifier) snapshots
//! - Recommends target levels and actions for a single question
//! - Replays positive user feedback as extra training data
//!
//! # Example
//!
//! ```ignore
//! use audit_recommender::{Config, Level, MlService};
//! use serde_json::Map;
//!
//! let service = MlService::open(Config::default())?;
//! service.train(&instances)?;
//! let rec = service.predict("¿Existe un plan de emergencia?", Level::Critical, "", &Map::new())?;
//! println!("{} -> {}", rec.current_level, rec.target_level);
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod types;
pub mod error;
pub mod audit;
pub mod model;
pub mod recommend;
pub mod feedback;
pub mod service;
pub mod config;
pub mod server;
pub mod cli;

// Re-export commonly used types for convenience
pub use types::Level;
pub use error::{MlError, Result};

pub use audit::{AuditInstance, Observation, Question, Response, Section};

pub use model::{LoadPolicy, ModelRegistry, ModelStore, VersionId};

pub use recommend::{Priority, Recommendation};

pub use feedback::{FeedbackEvent, FeedbackLedger, FeedbackType};

pub use service::{HealthReport, MlService, RetrainReport, TrainingMetrics};

pub use config::Config;

pub use server::{router, start as start_server, ServerState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Audit recommendation library", NAME, VERSION)
}
