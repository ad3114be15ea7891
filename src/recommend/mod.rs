//! Recommendation synthesis
//!
//! Turns a predicted level into the recommendation shown to auditors:
//! level labels, gap, priority, canned actions and a short analysis.

use serde::{Deserialize, Serialize};

use crate::types::Level;

/// Urgency of acting on a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "Baja")]
    Low,
    #[serde(rename = "Media")]
    Medium,
    #[serde(rename = "Alta")]
    High,
}

impl Priority {
    /// Priority for `gap = predicted - current`
    pub fn from_gap(gap: i32) -> Self {
        if gap >= 2 {
            Priority::High
        } else if gap > 0 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "Baja"),
            Priority::Medium => write!(f, "Media"),
            Priority::High => write!(f, "Alta"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub current_score: u8,
    pub predicted_optimal_score: u8,
    pub current_level: String,
    pub target_level: String,
    pub confidence: f64,
    pub improvement_gap: i32,
    pub priority: Priority,
    pub recommended_actions: Vec<String>,
    pub analysis: String,
}

/// Build the recommendation for a question scored `current` and predicted
/// to deserve `predicted`.
///
/// The question text and comment are accepted for parity with the
/// prediction request; the wording does not depend on them.
pub fn synthesize(
    current: Level,
    predicted: Level,
    confidence: f64,
    _question_text: &str,
    _comment: &str,
) -> Recommendation {
    let gap = predicted.score() as i32 - current.score() as i32;

    let analysis = if gap > 0 {
        format!(
            "Brecha de {} punto(s). Puede alcanzar nivel {}/3 con las acciones recomendadas.",
            gap,
            predicted.score()
        )
    } else {
        format!(
            "Observación en nivel esperado ({}/3). Mantener estándares actuales.",
            predicted.score()
        )
    };

    Recommendation {
        current_score: current.score(),
        predicted_optimal_score: predicted.score(),
        current_level: current.label().to_string(),
        target_level: predicted.label().to_string(),
        confidence: (confidence * 100.0).round() / 100.0,
        improvement_gap: gap,
        priority: Priority::from_gap(gap),
        recommended_actions: predicted.actions().iter().map(|a| a.to_string()).collect(),
        analysis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_thresholds() {
        assert_eq!(Priority::from_gap(3), Priority::High);
        assert_eq!(Priority::from_gap(2), Priority::High);
        assert_eq!(Priority::from_gap(1), Priority::Medium);
        assert_eq!(Priority::from_gap(0), Priority::Low);
        assert_eq!(Priority::from_gap(-2), Priority::Low);
    }

    #[test]
    fn test_gap_recommendation() {
        let rec = synthesize(Level::Critical, Level::Acceptable, 0.876, "¿Existe plan?", "");
        assert_eq!(rec.current_level, "Crítico");
        assert_eq!(rec.target_level, "Aceptable");
        assert_eq!(rec.improvement_gap, 2);
        assert_eq!(rec.priority, Priority::High);
        assert_eq!(rec.confidence, 0.88);
        assert_eq!(rec.recommended_actions[0], "Reforzar prácticas");
        assert!(rec.analysis.starts_with("Brecha de 2 punto(s)"));
        assert!(rec.analysis.contains("2/3"));
    }

    #[test]
    fn test_no_gap_recommendation() {
        let rec = synthesize(Level::Optimal, Level::Deficient, 0.5, "q", "c");
        assert_eq!(rec.improvement_gap, -2);
        assert_eq!(rec.priority, Priority::Low);
        assert_eq!(rec.analysis, "Observación en nivel esperado (1/3). Mantener estándares actuales.");
        assert_eq!(rec.recommended_actions, Level::Deficient.actions().to_vec());
    }

    #[test]
    fn test_priority_wire_format() {
        let rec = synthesize(Level::Deficient, Level::Acceptable, 1.0, "q", "c");
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["priority"], "Media");
        assert_eq!(json["current_score"], 1);
        assert_eq!(json["predicted_optimal_score"], 2);
    }
}
