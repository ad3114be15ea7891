//! Active model registry
//!
//! Holds the (encoder, classifier) pair used for inference. The pair lives in
//! one `Arc<ActiveModel>`; installing a new model swaps the `Arc` under a
//! write lock, so readers see either the old pair or the new one.

use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use super::classifier::{ForestClassifier, Prediction};
use super::encoder::{ComplianceContext, FeatureEncoder};
use super::store::{LoadedSnapshot, VersionId};
use crate::error::Result;

/// A fitted encoder and classifier that were trained together
#[derive(Debug)]
pub struct ActiveModel {
    pub version: VersionId,
    pub encoder: FeatureEncoder,
    pub classifier: ForestClassifier,
}

impl ActiveModel {
    /// Encode `text` with the fitted vocabulary and classify it
    pub fn predict(&self, text: &str, context: &ComplianceContext) -> Result<Prediction> {
        let row = self.encoder.transform(text, context);
        self.classifier.predict_one(&row)
    }
}

impl From<LoadedSnapshot> for ActiveModel {
    fn from(snapshot: LoadedSnapshot) -> Self {
        Self {
            version: snapshot.version,
            encoder: snapshot.encoder,
            classifier: snapshot.classifier,
        }
    }
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    active: RwLock<Option<Arc<ActiveModel>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The model currently answering predictions, if any
    pub fn current(&self) -> Option<Arc<ActiveModel>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the active model, returning the one it displaced
    pub fn install(&self, model: ActiveModel) -> Option<Arc<ActiveModel>> {
        let model = Arc::new(model);
        info!("Activating model {}", model.version);
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        active.replace(model)
    }

    pub fn is_trained(&self) -> bool {
        self.current().is_some()
    }

    pub fn active_version(&self) -> Option<VersionId> {
        self.current().map(|model| model.version)
    }
}
