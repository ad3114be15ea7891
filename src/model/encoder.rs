//! Feature encoder - TF-IDF text vector plus compliance context
//!
//! Each row is `[tfidf(text)..., section_compliance, overall_compliance]`.
//! Compliance values stay on their 0-100 scale. The vocabulary is learned
//! once by [`FeatureEncoder::fit_transform`] and reused by
//! [`FeatureEncoder::transform`].
//!
//! Weighting follows the usual smoothed formulation:
//! `idf(t) = ln((1 + n) / (1 + df(t))) + 1`, raw term counts, L2 row norm.

use ndarray::{Array1, Array2};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

use super::stopwords::is_stop_word;
use crate::audit::{coerce_f64, Observation};

/// Neutral compliance used when a prediction request carries no context
pub const NEUTRAL_COMPLIANCE: f64 = 50.0;

/// Number of numeric context columns appended after the text features
pub const CONTEXT_COLUMNS: usize = 2;

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("token pattern is valid"));

/// Compliance context attached to a prediction request
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceContext {
    #[serde(default)]
    pub section_compliance: Option<f64>,
    #[serde(default)]
    pub overall_compliance: Option<f64>,
}

impl ComplianceContext {
    pub fn new(section_compliance: f64, overall_compliance: f64) -> Self {
        Self {
            section_compliance: Some(section_compliance),
            overall_compliance: Some(overall_compliance),
        }
    }

    /// Read the known keys out of a free-form context object
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let read = |key: &str| map.get(key).filter(|v| !v.is_null()).map(coerce_f64);
        Self {
            section_compliance: read("section_compliance"),
            overall_compliance: read("overall_compliance"),
        }
    }

    fn values(&self) -> [f64; CONTEXT_COLUMNS] {
        [
            self.section_compliance.unwrap_or(NEUTRAL_COMPLIANCE),
            self.overall_compliance.unwrap_or(NEUTRAL_COMPLIANCE),
        ]
    }
}

/// Stateful text + context encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    max_features: usize,
    /// term -> column, columns assigned in lexical term order
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl FeatureEncoder {
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features,
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
        }
    }

    /// Number of text columns learned at fit time
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Total row width, text columns plus context columns
    pub fn n_features(&self) -> usize {
        self.vocabulary.len() + CONTEXT_COLUMNS
    }

    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        self.vocabulary.keys().map(String::as_str)
    }

    /// Learn the vocabulary from the observation texts and encode every row.
    ///
    /// An empty vocabulary is not an error: rows then only carry the two
    /// compliance columns.
    pub fn fit_transform(&mut self, observations: &[Observation]) -> Array2<f64> {
        let documents: Vec<Vec<String>> = observations.iter().map(|o| analyze(&o.text)).collect();

        let mut term_counts: HashMap<&str, usize> = HashMap::new();
        let mut document_counts: HashMap<&str, usize> = HashMap::new();
        for terms in &documents {
            let mut seen = HashSet::new();
            for term in terms {
                *term_counts.entry(term.as_str()).or_insert(0) += 1;
                if seen.insert(term.as_str()) {
                    *document_counts.entry(term.as_str()).or_insert(0) += 1;
                }
            }
        }

        // Most frequent terms first, ties in lexical order
        let mut ranked: Vec<(&str, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.max_features);

        let mut kept: Vec<&str> = ranked.into_iter().map(|(term, _)| term).collect();
        kept.sort_unstable();

        let n_documents = documents.len() as f64;
        self.vocabulary = kept
            .iter()
            .enumerate()
            .map(|(column, term)| (term.to_string(), column))
            .collect();
        self.idf = kept
            .iter()
            .map(|term| {
                let df = document_counts.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n_documents) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        if self.vocabulary.is_empty() {
            warn!("Text vectorization produced no vocabulary, using compliance features only");
        } else {
            debug!("Learned {} text features", self.vocabulary.len());
        }

        let mut matrix = Array2::zeros((observations.len(), self.n_features()));
        for (row, (observation, terms)) in observations.iter().zip(&documents).enumerate() {
            let context = ComplianceContext::new(observation.section_compliance, observation.overall_compliance);
            matrix.row_mut(row).assign(&self.encode_terms(terms, &context));
        }
        matrix
    }

    /// Encode a single text with the fitted vocabulary.
    ///
    /// Text with no known terms yields an all-zero text block.
    pub fn transform(&self, text: &str, context: &ComplianceContext) -> Array1<f64> {
        self.encode_terms(&analyze(text), context)
    }

    fn encode_terms(&self, terms: &[String], context: &ComplianceContext) -> Array1<f64> {
        let width = self.vocabulary.len();
        let mut row = Array1::zeros(width + CONTEXT_COLUMNS);

        for term in terms {
            if let Some(&column) = self.vocabulary.get(term) {
                row[column] += 1.0;
            }
        }
        for column in 0..width {
            row[column] *= self.idf[column];
        }
        let norm = (0..width).map(|c| row[c] * row[c]).sum::<f64>().sqrt();
        if norm > 0.0 {
            for column in 0..width {
                row[column] /= norm;
            }
        }

        let [section, overall] = context.values();
        row[width] = section;
        row[width + 1] = overall;
        row
    }
}

/// Lowercase, tokenize, drop stop words, then emit unigrams and bigrams
fn analyze(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|token| !is_stop_word(token))
        .collect();

    let mut terms: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    terms.extend(tokens.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    terms
}
