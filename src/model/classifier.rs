//! Bagged decision tree ensemble
//!
//! Each tree is a `linfa-trees` Gini tree fit on a bootstrap resample of the
//! training rows, restricted to a random subset of `ceil(sqrt(n_features))`
//! columns. Both draws come from one seeded RNG, so a given training set
//! always produces the same forest. Class probabilities are the share of
//! trees voting for each class.
//!
//! `linfa-trees` has no per-split feature sampling, so the decorrelation is
//! done per tree (random subspace) rather than per split.

use linfa::prelude::{Dataset, Fit, Predict};
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MlError, Result};
use crate::types::Level;

/// Confidence reported when the predicted class has no probability entry
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// Fixed ensemble hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: f32,
    pub min_samples_leaf: f32,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 20,
            max_depth: 5,
            min_samples_split: 2.0,
            min_samples_leaf: 1.0,
            seed: 42,
        }
    }
}

/// Result of classifying a single row
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub level: Level,
    pub confidence: f64,
    /// Probability per class in [`ForestClassifier::classes`] order
    pub probabilities: Vec<f64>,
}

/// One ensemble member and the input columns it was fit on
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubspaceTree {
    /// Ascending column indices into the full feature row
    columns: Vec<usize>,
    tree: DecisionTree<f64, usize>,
}

impl SubspaceTree {
    fn predict(&self, records: &Array2<f64>) -> Array1<usize> {
        self.tree.predict(&records.select(Axis(1), &self.columns))
    }
}

/// Columns each tree sees: `ceil(sqrt(n))`, at least one
fn subspace_size(n_features: usize) -> usize {
    ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features.max(1))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestClassifier {
    params: ForestParams,
    /// Distinct labels seen during training, ascending
    classes: Vec<usize>,
    n_features: usize,
    trees: Vec<SubspaceTree>,
}

impl ForestClassifier {
    /// Fit the ensemble on `records` (one row per observation) and `labels`.
    pub fn fit(params: ForestParams, records: &Array2<f64>, labels: &[Level]) -> Result<Self> {
        let n_rows = records.nrows();
        if n_rows == 0 || n_rows != labels.len() {
            return Err(MlError::Classifier(format!(
                "{} rows do not match {} labels",
                n_rows,
                labels.len()
            )));
        }
        if params.n_trees == 0 {
            return Err(MlError::Classifier("ensemble needs at least one tree".to_string()));
        }
        let n_features = records.ncols();
        if n_features == 0 {
            return Err(MlError::Classifier("records have no feature columns".to_string()));
        }
        let subspace = subspace_size(n_features);

        let targets: Array1<usize> = labels.iter().map(|l| l.score() as usize).collect();
        let mut classes: Vec<usize> = targets.to_vec();
        classes.sort_unstable();
        classes.dedup();

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_trees);
        for _ in 0..params.n_trees {
            let sample: Vec<usize> = (0..n_rows).map(|_| rng.random_range(0..n_rows)).collect();
            let mut columns = index::sample(&mut rng, n_features, subspace).into_vec();
            columns.sort_unstable();

            let rows = records.select(Axis(0), &sample).select(Axis(1), &columns);
            let dataset = Dataset::new(rows, targets.select(Axis(0), &sample));
            let tree = DecisionTree::<f64, usize>::params()
                .split_quality(SplitQuality::Gini)
                .max_depth(Some(params.max_depth))
                .min_weight_split(params.min_samples_split)
                .min_weight_leaf(params.min_samples_leaf)
                .fit(&dataset)
                .map_err(|e| MlError::Classifier(e.to_string()))?;
            trees.push(SubspaceTree { columns, tree });
        }

        debug!(
            "Fitted {} trees on {} rows x {} features ({} per tree), classes {:?}",
            trees.len(),
            n_rows,
            n_features,
            subspace,
            classes
        );

        Ok(Self {
            params,
            classes,
            n_features,
            trees,
        })
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Labels the ensemble has seen, ascending
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Vote share per seen class for every row
    pub fn predict_proba(&self, records: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(records.ncols())?;
        let mut votes = Array2::<f64>::zeros((records.nrows(), self.classes.len()));
        for member in &self.trees {
            let predicted = member.predict(records);
            for (row, label) in predicted.iter().enumerate() {
                if let Some(position) = self.classes.iter().position(|c| c == label) {
                    votes[[row, position]] += 1.0;
                }
            }
        }
        votes /= self.trees.len() as f64;
        Ok(votes)
    }

    /// Most voted class for every row, ties resolved to the lower class
    pub fn predict(&self, records: &Array2<f64>) -> Result<Vec<Level>> {
        let probabilities = self.predict_proba(records)?;
        probabilities
            .outer_iter()
            .map(|row| self.argmax_level(row))
            .collect()
    }

    /// Classify one encoded row and report the predicted level's confidence
    pub fn predict_one(&self, row: &Array1<f64>) -> Result<Prediction> {
        let records = row.view().insert_axis(Axis(0)).to_owned();
        let probabilities = self.predict_proba(&records)?;
        let probabilities = probabilities.row(0);
        let level = self.argmax_level(probabilities)?;

        let confidence = self
            .classes
            .iter()
            .position(|&c| c == level.score() as usize)
            .and_then(|position| probabilities.get(position).copied())
            .unwrap_or(NEUTRAL_CONFIDENCE);

        Ok(Prediction {
            level,
            confidence,
            probabilities: probabilities.to_vec(),
        })
    }

    /// Fraction of rows whose predicted label equals the given label.
    ///
    /// On the training matrix this measures fit quality, not accuracy on
    /// unseen audits.
    pub fn score(&self, records: &Array2<f64>, labels: &[Level]) -> Result<f64> {
        if labels.is_empty() {
            return Ok(0.0);
        }
        let predicted = self.predict(records)?;
        let hits = predicted.iter().zip(labels).filter(|(p, l)| p == l).count();
        Ok(hits as f64 / labels.len() as f64)
    }

    fn argmax_level(&self, probabilities: ArrayView1<f64>) -> Result<Level> {
        let mut best: Option<(usize, f64)> = None;
        for (position, &p) in probabilities.iter().enumerate() {
            if best.map_or(true, |(_, top)| p > top) {
                best = Some((position, p));
            }
        }
        let (position, _) =
            best.ok_or_else(|| MlError::Classifier("ensemble has no classes".to_string()))?;
        Level::from_score(self.classes[position] as i64)
            .ok_or_else(|| MlError::Classifier(format!("unknown class {}", self.classes[position])))
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.n_features {
            return Err(MlError::Classifier(format!(
                "expected {} features, got {}",
                self.n_features, width
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Vec<Level>) {
        let records = array![
            [0.0, 10.0],
            [0.1, 12.0],
            [1.0, 40.0],
            [1.1, 42.0],
            [2.0, 70.0],
            [2.1, 72.0],
            [3.0, 95.0],
            [3.1, 97.0],
        ];
        let labels = vec![
            Level::Critical,
            Level::Critical,
            Level::Deficient,
            Level::Deficient,
            Level::Acceptable,
            Level::Acceptable,
            Level::Optimal,
            Level::Optimal,
        ];
        (records, labels)
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (records, labels) = separable();
        let a = ForestClassifier::fit(ForestParams::default(), &records, &labels).unwrap();
        let b = ForestClassifier::fit(ForestParams::default(), &records, &labels).unwrap();
        assert_eq!(a.predict_proba(&records).unwrap(), b.predict_proba(&records).unwrap());
    }

    #[test]
    fn test_trees_use_random_column_subsets() {
        let records = Array2::from_shape_fn((12, 9), |(r, c)| ((r * 7 + c * 3) % 11) as f64);
        let labels: Vec<Level> = (0..12)
            .map(|r| Level::from_score((r % 4) as i64).unwrap())
            .collect();
        let forest = ForestClassifier::fit(ForestParams::default(), &records, &labels).unwrap();

        for member in &forest.trees {
            assert_eq!(member.columns.len(), 3);
            assert!(member.columns.windows(2).all(|w| w[0] < w[1]));
            assert!(member.columns.iter().all(|&c| c < 9));
        }
        let first = &forest.trees[0].columns;
        assert!(forest.trees.iter().any(|member| &member.columns != first));

        let again = ForestClassifier::fit(ForestParams::default(), &records, &labels).unwrap();
        let columns = |f: &ForestClassifier| f.trees.iter().map(|t| t.columns.clone()).collect::<Vec<_>>();
        assert_eq!(columns(&forest), columns(&again));
        assert_eq!(forest.predict_proba(&records).unwrap(), again.predict_proba(&records).unwrap());
    }

    #[test]
    fn test_subspace_size() {
        assert_eq!(subspace_size(1), 1);
        assert_eq!(subspace_size(2), 2);
        assert_eq!(subspace_size(9), 3);
        assert_eq!(subspace_size(102), 11);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (records, labels) = separable();
        let forest = ForestClassifier::fit(ForestParams::default(), &records, &labels).unwrap();
        let probabilities = forest.predict_proba(&records).unwrap();
        assert_eq!(probabilities.ncols(), 4);
        for row in probabilities.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_score_matches_prediction_agreement() {
        let (records, labels) = separable();
        let forest = ForestClassifier::fit(ForestParams::default(), &records, &labels).unwrap();
        let predicted = forest.predict(&records).unwrap();
        let expected = predicted.iter().zip(&labels).filter(|(p, l)| p == l).count() as f64
            / labels.len() as f64;
        assert_eq!(forest.score(&records, &labels).unwrap(), expected);
    }

    #[test]
    fn test_classes_only_include_seen_labels() {
        let records = array![[0.0], [0.0], [1.0], [1.0], [1.0]];
        let labels = vec![
            Level::Acceptable,
            Level::Acceptable,
            Level::Optimal,
            Level::Optimal,
            Level::Optimal,
        ];
        let forest = ForestClassifier::fit(ForestParams::default(), &records, &labels).unwrap();
        assert_eq!(forest.classes(), &[2, 3]);

        let prediction = forest.predict_one(&array![1.0]).unwrap();
        assert_eq!(prediction.probabilities.len(), 2);
        assert!(prediction.level >= Level::Acceptable);
        assert!(prediction.confidence > 0.0 && prediction.confidence <= 1.0);
    }

    #[test]
    fn test_rejects_wrong_width() {
        let (records, labels) = separable();
        let forest = ForestClassifier::fit(ForestParams::default(), &records, &labels).unwrap();
        assert!(forest.predict_one(&array![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_rejects_mismatched_labels() {
        let (records, _) = separable();
        assert!(ForestClassifier::fit(ForestParams::default(), &records, &[Level::Critical]).is_err());
    }
}
