//! Synthetic training instances built from positive feedback

use serde_json::{json, Map, Value};

use super::FeedbackEvent;
use crate::audit::{coerce_f64, AuditInstance, Question, Response, Section, EMPTY_COMMENT};
use crate::types::Level;

/// Events scoring at or below this never become training data
pub const SYNTHETIC_SCORE_THRESHOLD: f64 = 0.5;

/// Points available on a single question
const MAX_QUESTION_POINTS: f64 = 3.0;

/// Whether `event` should be replayed as a training instance. Events whose
/// answer is off the level scale never qualify.
pub fn qualifies(event: &FeedbackEvent) -> bool {
    event.fue_recomendacion_ml
        && event.feedback_score > SYNTHETIC_SCORE_THRESHOLD
        && event.level().is_some()
}

/// One single-question instance per qualifying event, in ledger order
pub fn synthesize_instances(events: &[FeedbackEvent]) -> Vec<AuditInstance> {
    events
        .iter()
        .filter(|e| qualifies(e))
        .filter_map(|e| e.level().map(|level| synthesize(e, level)))
        .collect()
}

fn synthesize(event: &FeedbackEvent, level: Level) -> AuditInstance {
    let response = Response::Scored(level);
    let comment = if event.comment.trim().is_empty() {
        EMPTY_COMMENT
    } else {
        event.comment.as_str()
    };
    let points = event.feedback_score * MAX_QUESTION_POINTS;

    let mut question = Question::new(&event.question_text, comment, response, points);
    question
        .metadata
        .insert("accion_aplicada".into(), Value::String(event.accion_seleccionada.clone()));
    question
        .metadata
        .insert("context".into(), Value::Object(event.context.clone()));

    let section_compliance = context_number(&event.context, "section_compliance").unwrap_or(0.0);
    let overall_compliance = context_number(&event.context, "overall_compliance")
        .unwrap_or_else(|| (event.feedback_score * 100.0).min(100.0));

    let mut instance = AuditInstance::new(
        vec![Section::new(vec![question], section_compliance)],
        overall_compliance,
    );
    instance.total_obtained_points = points;
    instance.total_applicable_points = MAX_QUESTION_POINTS;
    instance.total_max_points = MAX_QUESTION_POINTS;
    instance.metadata.insert("_synthetic".into(), json!(true));
    instance
        .metadata
        .insert("_feedback_type".into(), json!(event.feedback_type.to_string()));
    instance.metadata.insert(
        "_timestamp".into(),
        json!(event.timestamp.map(|t| t.to_string()).unwrap_or_default()),
    );
    instance
}

fn context_number(context: &Map<String, Value>, key: &str) -> Option<f64> {
    context.get(key).filter(|v| !v.is_null()).map(coerce_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::extract;
    use crate::feedback::test_support::event;

    #[test]
    fn test_qualifying_events() {
        assert!(qualifies(&event(true, 1.0)));
        assert!(qualifies(&event(true, 0.51)));
        assert!(!qualifies(&event(true, 0.5)));
        assert!(!qualifies(&event(false, 2.0)));
        assert!(!qualifies(&event(true, -1.0)));
    }

    #[test]
    fn test_one_instance_per_qualifying_event() {
        let events = vec![event(true, 1.0), event(false, 1.0), event(true, 0.2), event(true, 2.0)];
        let instances = synthesize_instances(&events);
        assert_eq!(instances.len(), 2);
        assert_eq!(extract(&instances).len(), 2);
    }

    #[test]
    fn test_off_scale_answers_are_not_replayed() {
        // written to the ledger by hand, bypassing validation
        let mut off_scale = event(true, 1.5);
        off_scale.current_response = 7;
        assert!(!qualifies(&off_scale));

        let events = vec![off_scale, event(true, 1.5)];
        let instances = synthesize_instances(&events);
        assert_eq!(instances.len(), 1);
        assert_eq!(extract(&instances).len(), instances.len());
    }

    #[test]
    fn test_synthetic_instance_shape() {
        let mut source = event(true, 1.0);
        source.context.insert("section_compliance".into(), json!(40));
        let instance = &synthesize_instances(&[source])[0];

        let question = &instance.sections[0].questions[0];
        assert_eq!(question.response, Response::Scored(Level::Deficient));
        assert_eq!(question.points, 3.0);
        assert_eq!(question.metadata["accion_aplicada"], json!("Establecer controles"));
        assert_eq!(instance.sections[0].compliance_percentage, 40.0);
        assert_eq!(instance.overall_compliance_percentage, 100.0);
        assert_eq!(instance.total_max_points, 3.0);
        assert_eq!(instance.metadata["_synthetic"], json!(true));
        assert_eq!(instance.metadata["_feedback_type"], json!("approved"));

        let observation = &extract(std::slice::from_ref(instance))[0];
        assert_eq!(observation.label, Level::Deficient);
        assert_eq!(observation.text, "¿Se registran las inspecciones? registro incompleto");
    }

    #[test]
    fn test_blank_comment_uses_placeholder() {
        let mut source = event(true, 1.5);
        source.comment = String::new();
        let instance = &synthesize_instances(&[source])[0];
        assert_eq!(instance.sections[0].questions[0].comment, EMPTY_COMMENT);
        assert_eq!(instance.overall_compliance_percentage, 100.0);
    }
}
