//! Shared types used across modules
//!
//! The compliance level scale is used by the audit data model, the classifier
//! labels and the recommendation output, so it lives here to avoid circular
//! dependencies.

use serde::{Deserialize, Serialize};

/// Ordinal compliance level a question can be scored with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Level {
    Critical,
    Deficient,
    Acceptable,
    Optimal,
}

impl Level {
    pub const ALL: [Level; 4] = [
        Level::Critical,
        Level::Deficient,
        Level::Acceptable,
        Level::Optimal,
    ];

    /// Numeric score of the level (0..=3)
    pub fn score(self) -> u8 {
        match self {
            Level::Critical => 0,
            Level::Deficient => 1,
            Level::Acceptable => 2,
            Level::Optimal => 3,
        }
    }

    /// Parse a numeric score, `None` when outside 0..=3
    pub fn from_score(score: i64) -> Option<Self> {
        match score {
            0 => Some(Level::Critical),
            1 => Some(Level::Deficient),
            2 => Some(Level::Acceptable),
            3 => Some(Level::Optimal),
            _ => None,
        }
    }

    /// Parse a floating point score; only integral values in range are levels
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value.fract() != 0.0 {
            return None;
        }
        Self::from_score(value as i64)
    }

    /// Human readable label shown to auditors
    pub fn label(self) -> &'static str {
        match self {
            Level::Critical => "Crítico",
            Level::Deficient => "Deficiente",
            Level::Acceptable => "Aceptable",
            Level::Optimal => "Óptimo",
        }
    }

    /// Canned actions suggested when this level is the predicted target
    pub fn actions(self) -> &'static [&'static str] {
        match self {
            Level::Critical => &[
                "Implementar plan correctivo inmediato",
                "Documentar no conformidad",
                "Asignar responsable",
            ],
            Level::Deficient => &[
                "Desarrollar procedimiento",
                "Capacitar personal",
                "Establecer controles",
            ],
            Level::Acceptable => &[
                "Reforzar prácticas",
                "Documentar lecciones",
                "Mantener monitoreo",
            ],
            Level::Optimal => &[
                "Mantener estándares",
                "Compartir mejores prácticas",
                "Usar como caso de estudio",
            ],
        }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.score()
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Level::from_score(value as i64).ok_or_else(|| format!("score {} is outside 0..=3", value))
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_score_bijection() {
        for level in Level::ALL {
            assert_eq!(Level::from_score(level.score() as i64), Some(level));
        }
        assert_eq!(Level::from_score(-1), None);
        assert_eq!(Level::from_score(4), None);
    }

    #[test]
    fn test_level_from_f64_rejects_fractions() {
        assert_eq!(Level::from_f64(2.0), Some(Level::Acceptable));
        assert_eq!(Level::from_f64(2.5), None);
        assert_eq!(Level::from_f64(f64::NAN), None);
    }

    #[test]
    fn test_level_labels() {
        assert_eq!(Level::Critical.label(), "Crítico");
        assert_eq!(Level::Optimal.to_string(), "Óptimo");
        assert_eq!(Level::Deficient.actions().len(), 3);
    }
}
