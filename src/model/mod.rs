//! Model lifecycle: feature encoding, classification, snapshots
//!
//! Training flows observations through [`FeatureEncoder::fit_transform`] and
//! [`ForestClassifier::fit`]; the fitted pair is persisted by [`ModelStore`]
//! and served through [`ModelRegistry`].

pub mod classifier;
pub mod encoder;
pub mod registry;
pub mod stopwords;
pub mod store;

pub use classifier::{ForestClassifier, ForestParams, Prediction, NEUTRAL_CONFIDENCE};
pub use encoder::{ComplianceContext, FeatureEncoder, NEUTRAL_COMPLIANCE};
pub use registry::{ActiveModel, ModelRegistry};
pub use store::{LoadPolicy, LoadedSnapshot, ModelStore, SnapshotFiles, SnapshotInfo, VersionId};

use tracing::info;

use crate::audit::Observation;
use crate::error::Result;
use crate::types::Level;

/// Encoder and classifier fitted on the same observations
#[derive(Debug)]
pub struct FittedModel {
    pub encoder: FeatureEncoder,
    pub classifier: ForestClassifier,
    /// Self-score on the training matrix
    pub accuracy: f64,
    pub features: usize,
}

/// Fit a fresh encoder and classifier on `observations`
pub fn fit(observations: &[Observation], max_features: usize, params: ForestParams) -> Result<FittedModel> {
    let mut encoder = FeatureEncoder::new(max_features);
    let records = encoder.fit_transform(observations);
    let labels: Vec<Level> = observations.iter().map(|o| o.label).collect();

    info!(
        "Training classifier on {} samples with {} features",
        records.nrows(),
        records.ncols()
    );
    let classifier = ForestClassifier::fit(params, &records, &labels)?;
    let accuracy = classifier.score(&records, &labels)?;

    Ok(FittedModel {
        features: records.ncols(),
        encoder,
        classifier,
        accuracy,
    })
}
