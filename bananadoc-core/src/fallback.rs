//! Templated answers used when the LLM is unavailable or gave up.
//!
//! Pure string work: never fails, never blocks.

use crate::models::PredictionRecord;

pub const GENERIC_RESPONSE: &str = "I'm here to help with banana plant nutrition questions. \
Please upload a leaf image for analysis, or ask me about common nutrient deficiencies, \
treatment methods, or prevention strategies.";

const NOT_AVAILABLE: &str = "not available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Symptoms,
    Treatment,
    Prevention,
}

fn topic_of(query: &str) -> Option<Topic> {
    let q = query.to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| q.contains(w));

    if any(&["symptom", "sign", "look like"]) {
        Some(Topic::Symptoms)
    } else if any(&["treat", "fix", "remedy", "what should i do"]) {
        Some(Topic::Treatment)
    } else if any(&["prevent", "avoid", "future"]) {
        Some(Topic::Prevention)
    } else {
        None
    }
}

fn field(text: &str) -> &str {
    let text = text.trim().trim_end_matches('.');
    if text.is_empty() {
        NOT_AVAILABLE
    } else {
        text
    }
}

/// Answer `query` from the diagnosis alone.
///
/// Without a diagnosis every query gets [`GENERIC_RESPONSE`].
pub fn respond(query: &str, prediction: Option<&PredictionRecord>) -> String {
    let Some(p) = prediction.filter(|p| p.has_diagnosis()) else {
        return GENERIC_RESPONSE.to_string();
    };
    let deficiency = p.deficiency.as_str();

    match topic_of(query) {
        Some(Topic::Symptoms) => format!(
            "Based on the analysis, the {deficiency} deficiency symptoms include: {}. \
             These symptoms typically appear on the leaves and can affect plant growth and fruit quality.",
            field(&p.symptoms)
        ),
        Some(Topic::Treatment) => format!(
            "For treating {deficiency} deficiency in your banana plants: {}. \
             It's important to follow the recommended application rates and timing for best results.",
            field(&p.treatment)
        ),
        Some(Topic::Prevention) => format!(
            "To prevent {deficiency} deficiency: {}. \
             Regular soil testing and balanced fertilization are key to maintaining healthy banana plants.",
            field(&p.prevention)
        ),
        None if deficiency == "Healthy" => format!(
            "The analysis indicates your banana plant is healthy (confidence: {:.1}%). \
             I can help you keep it that way with fertilization and prevention advice. \
             What would you like to know?",
            p.confidence * 100.0
        ),
        None => format!(
            "The analysis indicates a {deficiency} deficiency in your banana plant \
             (confidence: {:.1}%). I can help you understand the symptoms, treatment options, \
             and prevention measures. What specific information would you like to know?",
            p.confidence * 100.0
        ),
    }
}

const INLINE_DEFICIENCIES: [&str; 8] = [
    "calcium",
    "nitrogen",
    "potassium",
    "phosphorus",
    "magnesium",
    "iron",
    "zinc",
    "boron",
];

/// Legacy compatibility: older clients embed the diagnosis in the query text
/// as `deficiency: iron`, `symptoms: ...`, `treatment: ...` lines.
///
/// Returns a record only when a deficiency marker is found. Prefer sending a
/// structured context alongside the query.
pub fn parse_inline_context(query: &str) -> Option<PredictionRecord> {
    let lower = query.to_lowercase();

    let deficiency = INLINE_DEFICIENCIES.iter().find(|d| {
        lower.contains(&format!("deficiency: {d}")) || lower.contains(&format!("deficiency type: {d}"))
    })?;

    let mut record = PredictionRecord::new(capitalize(deficiency), 0.0);
    record.symptoms = marker_value(query, &lower, "symptoms:");
    record.treatment = marker_value(query, &lower, "treatment:");
    record.prevention = marker_value(query, &lower, "prevention:");
    Some(record)
}

/// Text after `marker` up to the end of its line, taken from the original-case query.
fn marker_value(query: &str, lower: &str, marker: &str) -> String {
    let Some(start) = lower.find(marker).map(|i| i + marker.len()) else {
        return String::new();
    };
    let end = lower[start..]
        .find('\n')
        .map(|i| start + i)
        .unwrap_or(lower.len());
    query.get(start..end).unwrap_or_default().trim().to_string()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn iron() -> PredictionRecord {
        let mut record = PredictionRecord::new("Iron", 0.92);
        record.symptoms = "Yellowing between veins of young leaves.".into();
        record.treatment = "Apply iron sulfate.".into();
        record.prevention = "Avoid waterlogging.".into();
        record
    }

    #[test]
    fn test_treatment_question_uses_prediction() {
        let mut record = PredictionRecord::new("Iron", 0.9);
        record.treatment = "Apply iron sulfate.".into();

        let answer = respond("How do I treat this?", Some(&record));
        assert!(answer.contains("Iron"), "{answer}");
        assert!(answer.contains("Apply iron sulfate."), "{answer}");
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let answer = respond("What are the SIGNS?", Some(&iron()));
        assert!(answer.contains("Yellowing between veins"));

        let answer = respond("How can I Prevent it in the FUTURE", Some(&iron()));
        assert!(answer.contains("Avoid waterlogging"));
    }

    #[test]
    fn test_symptom_keyword_wins_over_treatment() {
        let answer = respond("symptoms and how to treat", Some(&iron()));
        assert!(answer.contains("symptoms include"));
    }

    #[test]
    fn test_no_keyword_summarizes_diagnosis() {
        let answer = respond("Tell me more", Some(&iron()));
        assert!(answer.contains("Iron deficiency"));
        assert!(answer.contains("92.0%"));
    }

    #[test]
    fn test_no_prediction_returns_generic_prompt() {
        assert_eq!(respond("hello", None), GENERIC_RESPONSE);
        assert_eq!(respond("how do I treat it?", None), GENERIC_RESPONSE);
        assert_eq!(
            respond("hello", Some(&PredictionRecord::default())),
            GENERIC_RESPONSE
        );
    }

    #[test]
    fn test_missing_field_says_not_available() {
        let bare = PredictionRecord::new("Zinc", 0.5);
        let answer = respond("how to fix?", Some(&bare));
        assert!(answer.contains("Zinc deficiency in your banana plants: not available."));
    }

    #[test]
    fn test_inline_context_extraction() {
        let query = "Deficiency: Potassium\nSymptoms: Orange leaf margins\n\
                     Treatment: Apply Potassium Sulfate\nWhat should I do?";
        let record = parse_inline_context(query).expect("inline context");

        assert_eq!(record.deficiency, "Potassium");
        assert_eq!(record.symptoms, "Orange leaf margins");
        assert_eq!(record.treatment, "Apply Potassium Sulfate");
        assert!(record.prevention.is_empty());
    }

    #[test]
    fn test_inline_context_requires_deficiency_marker() {
        assert!(parse_inline_context("symptoms: yellow leaves").is_none());
        assert!(parse_inline_context("my iron deficiency").is_none());
    }
}
