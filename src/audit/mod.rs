//! Audit instance schema
//!
//! Instances arrive as loosely typed JSON documents: numbers may be strings,
//! empty or missing, and responses may be "N/A". The schema below states the
//! default-value rules once:
//!
//! - numeric fields that are empty, missing or unparseable become `0.0`
//! - a response that is "N/A", empty, missing, `-1` or not an integral score
//!   in 0..=3 becomes [`Response::NotApplicable`]
//!
//! [`AuditInstance::cleaned`] produces the copy the training path
//! works on, leaving the caller's instance untouched.

pub mod extract;

pub use extract::{extract, Observation};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::types::Level;

/// Placeholder used for questions answered without a comment
pub const EMPTY_COMMENT: &str = "sin comentario";

/// Wire value used for not-applicable responses
const NOT_APPLICABLE: &str = "N/A";

/// Response recorded for a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Response {
    Scored(Level),
    #[default]
    NotApplicable,
}

impl Response {
    pub fn level(self) -> Option<Level> {
        match self {
            Response::Scored(level) => Some(level),
            Response::NotApplicable => None,
        }
    }

    fn from_value(value: &Value) -> Self {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case(NOT_APPLICABLE) {
                    None
                } else {
                    s.parse::<f64>().ok()
                }
            }
            _ => None,
        };
        parsed
            .and_then(Level::from_f64)
            .map(Response::Scored)
            .unwrap_or(Response::NotApplicable)
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Response::Scored(level) => serializer.serialize_u8(level.score()),
            Response::NotApplicable => serializer.serialize_str(NOT_APPLICABLE),
        }
    }
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Response::from_value(&value))
    }
}

/// Accept numbers, numeric strings, empty strings and nulls
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_f64(&value))
}

pub(crate) fn coerce_f64(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Accept strings, numbers and nulls for free-text fields
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// A single audit question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default, deserialize_with = "lenient_string")]
    pub question_text: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub comment: String,
    #[serde(default)]
    pub response: Response,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub points: f64,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Question {
    pub fn new(question_text: &str, comment: &str, response: Response, points: f64) -> Self {
        Self {
            question_text: question_text.to_string(),
            comment: comment.to_string(),
            response,
            points,
            metadata: Map::new(),
        }
    }
}

/// A section groups questions and carries its own compliance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub compliance_percentage: f64,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Section {
    pub fn new(questions: Vec<Question>, compliance_percentage: f64) -> Self {
        Self {
            questions,
            compliance_percentage,
            metadata: Map::new(),
        }
    }
}

/// One completed audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInstance {
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub overall_compliance_percentage: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_obtained_points: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_applicable_points: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_max_points: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl AuditInstance {
    pub fn new(sections: Vec<Section>, overall_compliance_percentage: f64) -> Self {
        Self {
            sections,
            overall_compliance_percentage,
            total_obtained_points: 0.0,
            total_applicable_points: 0.0,
            total_max_points: 0.0,
            status: String::new(),
            metadata: Map::new(),
        }
    }

    /// Copy of the instance ready for training
    ///
    /// Not-applicable questions carry zero points and blank comments are
    /// replaced by [`EMPTY_COMMENT`].
    pub fn cleaned(&self) -> AuditInstance {
        let mut copy = self.clone();
        for question in copy.sections.iter_mut().flat_map(|s| s.questions.iter_mut()) {
            if question.comment.trim().is_empty() {
                question.comment = EMPTY_COMMENT.to_string();
            }
            if question.response == Response::NotApplicable {
                question.points = 0.0;
            }
        }
        copy
    }

    /// Number of questions across all sections
    pub fn question_count(&self) -> usize {
        self.sections.iter().map(|s| s.questions.len()).sum()
    }
}
