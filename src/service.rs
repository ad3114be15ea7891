//! Model lifecycle service
//!
//! Ties the snapshot store, the active model registry and the feedback ledger
//! together behind the five operations exposed to callers: train, predict,
//! submit feedback, retrain with feedback and health.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::{self, AuditInstance};
use crate::config::Config;
use crate::error::{MlError, Result};
use crate::feedback::{self, FeedbackEvent, FeedbackLedger, FeedbackReceipt, FeedbackStats};
use crate::model::{self, ActiveModel, ComplianceContext, ModelRegistry, ModelStore, VersionId};
use crate::recommend::{self, Recommendation};
use crate::types::Level;

/// Feedback count at which a retrain is suggested in the logs
const RETRAIN_HINT_INTERVAL: usize = 50;

/// Outcome of a successful training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingMetrics {
    /// Self-score on the training matrix
    pub accuracy: f64,
    pub training_samples: usize,
    pub instances_used: usize,
    pub features: usize,
    pub timestamp: DateTime<Utc>,
    pub version: VersionId,
}

/// Training metrics plus what the ledger contributed
#[derive(Debug, Clone, Serialize)]
pub struct RetrainReport {
    #[serde(flatten)]
    pub metrics: TrainingMetrics,
    pub feedback_stats: FeedbackStats,
}

/// Details of the snapshot currently answering predictions
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub filename: String,
    pub timestamp: String,
    pub size_mb: f64,
    pub total_models: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub trained: bool,
    pub active_version: Option<VersionId>,
    pub model_info: Option<ModelInfo>,
    pub feedback_count: usize,
    pub feedback_file: String,
    pub timestamp: DateTime<Local>,
}

pub struct MlService {
    config: Config,
    store: ModelStore,
    registry: ModelRegistry,
    ledger: FeedbackLedger,
    /// Serializes whole training runs (fit, save, retain, install)
    training_lock: Mutex<()>,
}

impl MlService {
    /// Open storage and activate the latest stored model, if any
    pub fn open(config: Config) -> Result<Self> {
        let store = ModelStore::open(&config.storage.model_dir)?;
        let ledger = FeedbackLedger::open(&config.storage.feedback_file)?;
        let registry = ModelRegistry::new();

        match store.load_latest(config.storage.load_policy)? {
            Some(snapshot) => {
                info!("Loaded pre-trained model {}", snapshot.version);
                registry.install(ActiveModel::from(snapshot));
            }
            None => info!("No pre-trained model found, waiting for initial training"),
        }

        Ok(Self {
            config,
            store,
            registry,
            ledger,
            training_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &FeedbackLedger {
        &self.ledger
    }

    /// Fit a new model on `instances`, persist it and make it active.
    ///
    /// Blocks for the duration of the fit; use [`MlService::spawn_train`]
    /// from async code.
    pub fn train(&self, instances: &[AuditInstance]) -> Result<TrainingMetrics> {
        let cleaned: Vec<AuditInstance> = instances.iter().map(AuditInstance::cleaned).collect();
        info!("Cleaned {} instances for training", cleaned.len());

        let observations = audit::extract(&cleaned);
        info!("Extracted {} observations", observations.len());

        let required = self.config.training.min_observations;
        if observations.len() < required {
            return Err(MlError::InsufficientData {
                observations: observations.len(),
                instances: cleaned.len(),
                required,
            });
        }

        let _guard = self.training_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let fitted = model::fit(
            &observations,
            self.config.training.max_features,
            self.config.training.forest_params(),
        )?;
        info!(
            "Model trained: accuracy {:.3}, {} features",
            fitted.accuracy, fitted.features
        );

        let version = self.store.save(&fitted.encoder, &fitted.classifier)?;
        let retired = self.store.retain(self.config.storage.retained_snapshots())?;
        if !retired.is_empty() {
            debug!("Retired {} old snapshots", retired.len());
        }

        self.registry.install(ActiveModel {
            version,
            encoder: fitted.encoder,
            classifier: fitted.classifier,
        });

        Ok(TrainingMetrics {
            accuracy: fitted.accuracy,
            training_samples: observations.len(),
            instances_used: cleaned.len(),
            features: fitted.features,
            timestamp: version.timestamp(),
            version,
        })
    }

    /// Recommend actions for one question
    pub fn predict(
        &self,
        question_text: &str,
        current_response: Level,
        comment: &str,
        context: &Map<String, Value>,
    ) -> Result<Recommendation> {
        let active = self.registry.current().ok_or(MlError::NotTrained)?;
        let text = format!("{} {}", question_text, comment);
        let prediction = active.predict(&text, &ComplianceContext::from_map(context))?;
        debug!(
            "Predicted level {} with confidence {:.2} using {}",
            prediction.level, prediction.confidence, active.version
        );
        Ok(recommend::synthesize(
            current_response,
            prediction.level,
            prediction.confidence,
            question_text,
            comment,
        ))
    }

    /// Validate and append a feedback event
    pub fn submit_feedback(&self, event: &FeedbackEvent) -> Result<FeedbackReceipt> {
        event.validate()?;
        self.ledger.append(event)?;
        let pending_count = self.ledger.count()?;
        info!("Total feedback accumulated: {}", pending_count);
        if pending_count > 0 && pending_count % RETRAIN_HINT_INTERVAL == 0 {
            info!(
                "{} feedback events reached, consider retraining with feedback",
                pending_count
            );
        }
        Ok(FeedbackReceipt {
            accepted: true,
            pending_count,
        })
    }

    /// Retrain on `historical` plus synthetic instances replayed from the
    /// whole ledger
    pub fn retrain_with_feedback(&self, mut historical: Vec<AuditInstance>) -> Result<RetrainReport> {
        let events = self.ledger.read_all()?;
        info!(
            "Retraining with {} historical instances and {} feedback events",
            historical.len(),
            events.len()
        );

        let synthetic = feedback::synthesize_instances(&events);
        let synthetic_instances_added = synthetic.len();
        info!("Added {} synthetic instances from feedback", synthetic_instances_added);
        historical.extend(synthetic);

        let metrics = self.train(&historical)?;
        Ok(RetrainReport {
            metrics,
            feedback_stats: FeedbackStats {
                total_feedbacks: events.len(),
                synthetic_instances_added,
                feedback_file: self.ledger.path().display().to_string(),
            },
        })
    }

    pub fn health(&self) -> Result<HealthReport> {
        let active_version = self.registry.active_version();
        let model_info = match active_version {
            Some(version) => self.model_info(&version),
            None => None,
        };
        Ok(HealthReport {
            status: "healthy",
            trained: active_version.is_some(),
            active_version,
            model_info,
            feedback_count: self.ledger.count()?,
            feedback_file: self.ledger.path().display().to_string(),
            timestamp: Local::now(),
        })
    }

    fn model_info(&self, version: &VersionId) -> Option<ModelInfo> {
        let info = self.store.info(version)?;
        let total_models = match self.store.versions() {
            Ok(versions) => versions.len(),
            Err(e) => {
                warn!("Failed to list model snapshots: {}", e);
                return None;
            }
        };
        Some(ModelInfo {
            filename: info.filename,
            timestamp: info.version.to_string(),
            size_mb: info.size_mb,
            total_models,
        })
    }

    /// Run [`MlService::train`] on the blocking pool
    pub fn spawn_train(self: &Arc<Self>, instances: Vec<AuditInstance>) -> JoinHandle<Result<TrainingMetrics>> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.train(&instances))
    }

    /// Run [`MlService::retrain_with_feedback`] on the blocking pool
    pub fn spawn_retrain(self: &Arc<Self>, historical: Vec<AuditInstance>) -> JoinHandle<Result<RetrainReport>> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.retrain_with_feedback(historical))
    }
}

/// Await a training handle, folding a panicked or cancelled task into
/// [`MlError::Task`]
pub async fn join_training<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    handle.await.map_err(|e| MlError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{Question, Response, Section};
    use crate::feedback::test_support::event;
    use tempfile::TempDir;

    fn instance(scores: &[i64]) -> AuditInstance {
        let questions = scores
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                Question::new(
                    &format!("¿Control número {} documentado?", i),
                    if s < 2 { "faltan registros" } else { "" },
                    Response::Scored(Level::from_score(s).unwrap()),
                    s as f64,
                )
            })
            .collect();
        AuditInstance::new(vec![Section::new(questions, 60.0)], 70.0)
    }

    #[test]
    fn test_train_activates_saved_snapshot() {
        let dir = TempDir::new().unwrap();
        let service = MlService::open(Config::with_data_dir(dir.path())).unwrap();
        assert!(!service.registry().is_trained());

        let metrics = service.train(&[instance(&[0, 1, 2, 3, 2, 1])]).unwrap();
        assert_eq!(metrics.training_samples, 6);
        assert_eq!(metrics.instances_used, 1);
        assert_eq!(service.registry().active_version(), Some(metrics.version));
        assert_eq!(service.store().versions().unwrap(), vec![metrics.version]);
    }

    #[test]
    fn test_insufficient_data_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let service = MlService::open(Config::with_data_dir(dir.path())).unwrap();
        let err = service.train(&[instance(&[0, 1, 2, 3])]).unwrap_err();
        assert!(matches!(
            err,
            MlError::InsufficientData { observations: 4, instances: 1, required: 5 }
        ));
        assert!(service.store().versions().unwrap().is_empty());
    }

    #[test]
    fn test_predict_requires_model() {
        let dir = TempDir::new().unwrap();
        let service = MlService::open(Config::with_data_dir(dir.path())).unwrap();
        let err = service
            .predict("pregunta", Level::Critical, "", &Map::new())
            .unwrap_err();
        assert!(matches!(err, MlError::NotTrained));
    }

    #[test]
    fn test_feedback_rejects_out_of_range_score() {
        let dir = TempDir::new().unwrap();
        let service = MlService::open(Config::with_data_dir(dir.path())).unwrap();
        assert!(matches!(
            service.submit_feedback(&event(true, 3.0)),
            Err(MlError::InvalidFeedback { .. })
        ));
        let receipt = service.submit_feedback(&event(true, 1.0)).unwrap();
        assert!(receipt.accepted);
        assert_eq!(receipt.pending_count, 1);
    }

    #[test]
    fn test_health_reports_model_info() {
        let dir = TempDir::new().unwrap();
        let service = MlService::open(Config::with_data_dir(dir.path())).unwrap();
        let before = service.health().unwrap();
        assert!(!before.trained);
        assert!(before.model_info.is_none());

        let metrics = service.train(&[instance(&[0, 1, 2, 3, 2, 1])]).unwrap();
        service.submit_feedback(&event(false, 0.0)).unwrap();

        let after = service.health().unwrap();
        assert!(after.trained);
        assert_eq!(after.feedback_count, 1);
        let info = after.model_info.unwrap();
        assert_eq!(info.filename, format!("classifier_{}.json", metrics.version));
        assert_eq!(info.total_models, 1);
    }

    #[test]
    fn test_zero_keep_latest_keeps_active_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::with_data_dir(dir.path());
        config.storage.keep_latest = 0;
        let service = MlService::open(config.clone()).unwrap();

        service.train(&[instance(&[0, 1, 2, 3, 2, 1])]).unwrap();
        let metrics = service.train(&[instance(&[3, 2, 1, 0, 1, 2])]).unwrap();
        assert_eq!(service.store().versions().unwrap(), vec![metrics.version]);
        drop(service);

        let reopened = MlService::open(config).unwrap();
        assert_eq!(reopened.registry().active_version(), Some(metrics.version));
    }

    #[test]
    fn test_feedback_rejects_off_scale_response() {
        let dir = TempDir::new().unwrap();
        let service = MlService::open(Config::with_data_dir(dir.path())).unwrap();
        let mut off_scale = event(true, 1.0);
        off_scale.current_response = 7;
        assert!(matches!(
            service.submit_feedback(&off_scale),
            Err(MlError::InvalidFeedback { .. })
        ));
        assert_eq!(service.ledger().count().unwrap(), 0);
    }

    #[test]
    fn test_retrain_counts_only_replayable_feedback() {
        let dir = TempDir::new().unwrap();
        let service = MlService::open(Config::with_data_dir(dir.path())).unwrap();
        service.submit_feedback(&event(true, 1.0)).unwrap();

        // an off-scale line written by an older client, bypassing validation
        let mut off_scale = event(true, 1.0);
        off_scale.current_response = 7;
        service.ledger().append(&off_scale).unwrap();

        let historical = vec![instance(&[0, 1, 2, 3, 2])];
        let report = service.retrain_with_feedback(historical).unwrap();
        assert_eq!(report.feedback_stats.total_feedbacks, 2);
        assert_eq!(report.feedback_stats.synthetic_instances_added, 1);
        assert_eq!(report.metrics.training_samples, 5 + 1);
        assert_eq!(report.metrics.instances_used, 2);
    }

    #[test]
    fn test_corrupt_ledger_bytes_do_not_break_service() {
        use std::io::Write;

        let dir = TempDir::new().unwrap();
        let service = MlService::open(Config::with_data_dir(dir.path())).unwrap();
        service.submit_feedback(&event(true, 1.0)).unwrap();

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(service.ledger().path())
            .unwrap();
        file.write_all(b"{\"bad\": \"\xff\xfe\"}\n\xff\xfe\n").unwrap();
        drop(file);

        assert_eq!(service.health().unwrap().feedback_count, 3);
        let receipt = service.submit_feedback(&event(true, 2.0)).unwrap();
        assert_eq!(receipt.pending_count, 4);

        let report = service
            .retrain_with_feedback(vec![instance(&[0, 1, 2, 3, 2])])
            .unwrap();
        assert_eq!(report.feedback_stats.total_feedbacks, 2);
        assert_eq!(report.feedback_stats.synthetic_instances_added, 2);
    }

    #[tokio::test]
    async fn test_spawned_training_completes() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(MlService::open(Config::with_data_dir(dir.path())).unwrap());
        let handle = service.spawn_train(vec![instance(&[0, 1, 2, 3, 2, 1])]);
        let metrics = join_training(handle).await.unwrap();
        assert_eq!(service.registry().active_version(), Some(metrics.version));
    }
}
