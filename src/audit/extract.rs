//! Observation extraction - flattens audit instances into training rows

use super::AuditInstance;
use crate::types::Level;

/// One training row derived from a single answered question
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Question text and comment joined by a space
    pub text: String,
    pub label: Level,
    pub points: f64,
    pub section_compliance: f64,
    pub overall_compliance: f64,
}

/// Walk every question of every section of every instance, in order.
///
/// Questions whose response is not a valid score are skipped.
pub fn extract(instances: &[AuditInstance]) -> Vec<Observation> {
    let mut observations = Vec::new();
    for instance in instances {
        for section in &instance.sections {
            for question in &section.questions {
                let Some(label) = question.response.level() else {
                    continue;
                };
                observations.push(Observation {
                    text: format!("{} {}", question.question_text, question.comment),
                    label,
                    points: question.points,
                    section_compliance: section.compliance_percentage,
                    overall_compliance: instance.overall_compliance_percentage,
                });
            }
        }
    }
    observations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{Question, Response, Section};

    fn scored(text: &str, score: i64) -> Question {
        let response = Level::from_score(score)
            .map(Response::Scored)
            .unwrap_or(Response::NotApplicable);
        Question::new(text, "nota", response, score as f64)
    }

    #[test]
    fn test_extract_skips_not_applicable() {
        let instance = AuditInstance::new(
            vec![
                Section::new(vec![scored("a", 0), scored("b", -1), scored("c", 3)], 40.0),
                Section::new(vec![scored("d", 2)], 90.0),
            ],
            65.0,
        );

        let observations = extract(&[instance]);
        assert_eq!(observations.len(), 3);
        assert_eq!(observations[0].text, "a nota");
        assert_eq!(observations[0].label, Level::Critical);
        assert_eq!(observations[0].section_compliance, 40.0);
        assert_eq!(observations[2].text, "d nota");
        assert_eq!(observations[2].section_compliance, 90.0);
        assert!(observations.iter().all(|o| o.overall_compliance == 65.0));
    }

    #[test]
    fn test_extract_preserves_instance_order() {
        let first = AuditInstance::new(vec![Section::new(vec![scored("uno", 1)], 10.0)], 10.0);
        let second = AuditInstance::new(vec![Section::new(vec![scored("dos", 2)], 20.0)], 20.0);

        let texts: Vec<String> = extract(&[first, second]).into_iter().map(|o| o.text).collect();
        assert_eq!(texts, vec!["uno nota", "dos nota"]);
    }

    #[test]
    fn test_extract_empty_input() {
        assert!(extract(&[]).is_empty());
    }
}
