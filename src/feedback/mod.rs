//! Feedback loop
//!
//! User decisions on past recommendations are appended to a JSON-lines
//! ledger and replayed as synthetic training instances on retrain.

pub mod ledger;
pub mod synthetic;

pub use ledger::FeedbackLedger;
pub use synthetic::{qualifies, synthesize_instances, SYNTHETIC_SCORE_THRESHOLD};

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{MlError, Result};
use crate::types::Level;

/// Lowest accepted feedback score
pub const MIN_FEEDBACK_SCORE: f64 = -1.0;
/// Highest accepted feedback score
pub const MAX_FEEDBACK_SCORE: f64 = 2.0;

/// What the user did with the recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    #[serde(alias = "guardado")]
    Saved,
    #[serde(alias = "cerrado")]
    Closed,
    #[serde(alias = "aprobado")]
    Approved,
    #[serde(alias = "rechazado")]
    Rejected,
}

impl std::fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackType::Saved => write!(f, "saved"),
            FeedbackType::Closed => write!(f, "closed"),
            FeedbackType::Approved => write!(f, "approved"),
            FeedbackType::Rejected => write!(f, "rejected"),
        }
    }
}

/// One logged decision. Never modified once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub question_text: String,
    pub current_response: i64,
    #[serde(default)]
    pub comment: String,
    pub accion_seleccionada: String,
    pub fue_recomendacion_ml: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indice_recomendacion: Option<i64>,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub feedback_type: FeedbackType,
    pub feedback_score: f64,
    /// Local wall-clock time of the decision, filled on submission if absent
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<NaiveDateTime>,
}

/// Accept naive ISO timestamps as well as RFC 3339 ones with an offset
fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<NaiveDateTime>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    raw.parse::<NaiveDateTime>()
        .or_else(|_| DateTime::parse_from_rfc3339(&raw).map(|dt| dt.naive_local()))
        .map(Some)
        .map_err(serde::de::Error::custom)
}

impl FeedbackEvent {
    /// Level of the answer the recommendation was made for, if it is on the scale
    pub fn level(&self) -> Option<Level> {
        Level::from_score(self.current_response)
    }

    /// Reject events whose answer is off the 0..=3 scale or whose score is
    /// outside the accepted range
    pub fn validate(&self) -> Result<()> {
        if self.level().is_none() {
            return Err(MlError::InvalidFeedback {
                reason: format!("current_response {} outside 0..=3", self.current_response),
            });
        }
        if !self.feedback_score.is_finite()
            || !(MIN_FEEDBACK_SCORE..=MAX_FEEDBACK_SCORE).contains(&self.feedback_score)
        {
            return Err(MlError::InvalidFeedback {
                reason: format!(
                    "feedback_score {} outside {}..={}",
                    self.feedback_score, MIN_FEEDBACK_SCORE, MAX_FEEDBACK_SCORE
                ),
            });
        }
        Ok(())
    }
}

/// Reply to a feedback submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReceipt {
    pub accepted: bool,
    pub pending_count: usize,
}

/// Feedback numbers reported by a retrain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub total_feedbacks: usize,
    pub synthetic_instances_added: usize,
    pub feedback_file: String,
}


#[cfg(test)]
mod tests {
    use super::test_support::event;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feedback_type_accepts_spanish_names() {
        let parsed: FeedbackType = serde_json::from_value(json!("guardado")).unwrap();
        assert_eq!(parsed, FeedbackType::Saved);
        let parsed: FeedbackType = serde_json::from_value(json!("rejected")).unwrap();
        assert_eq!(parsed, FeedbackType::Rejected);
        assert_eq!(serde_json::to_value(FeedbackType::Closed).unwrap(), json!("closed"));
    }

    #[test]
    fn test_validate_score_range() {
        assert!(event(true, -1.0).validate().is_ok());
        assert!(event(true, 2.0).validate().is_ok());
        assert!(event(true, 2.5).validate().is_err());
        assert!(event(true, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_validate_current_response_scale() {
        let mut off_scale = event(true, 1.0);
        off_scale.current_response = 7;
        let err = off_scale.validate().unwrap_err();
        assert!(matches!(err, MlError::InvalidFeedback { ref reason } if reason.contains("current_response 7")));

        off_scale.current_response = -1;
        assert!(off_scale.validate().is_err());

        let mut top = event(true, 1.0);
        top.current_response = 3;
        assert!(top.validate().is_ok());
        assert_eq!(top.level(), Some(Level::Optimal));
    }

    #[test]
    fn test_event_defaults() {
        let parsed: FeedbackEvent = serde_json::from_value(json!({
            "question_text": "q",
            "current_response": 0,
            "accion_seleccionada": "a",
            "fue_recomendacion_ml": false,
            "feedback_type": "cerrado",
            "feedback_score": 0.0
        }))
        .unwrap();
        assert_eq!(parsed.comment, "");
        assert!(parsed.context.is_empty());
        assert!(parsed.timestamp.is_none());
    }

    #[test]
    fn test_timestamp_formats() {
        let mut raw = serde_json::to_value(event(true, 1.0)).unwrap();
        raw["timestamp"] = json!("2025-11-22T08:51:49.123456");
        let naive: FeedbackEvent = serde_json::from_value(raw.clone()).unwrap();
        assert!(naive.timestamp.is_some());

        raw["timestamp"] = json!("2025-11-22T08:51:49+01:00");
        let offset: FeedbackEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(offset.timestamp.unwrap().to_string(), "2025-11-22 08:51:49");
    }
}
