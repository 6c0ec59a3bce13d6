//! Prompt assembly for the chat assistant.
//!
//! Layout, top to bottom: persona preamble, diagnosis context (or the
//! no-diagnosis variant), optional language instruction, optional
//! conversation history, and finally the user's question.

use crate::models::{ConversationTurn, PredictionRecord};

/// Number of ranked class probabilities shown to the model.
pub const TOP_PROBABILITIES: usize = 3;

pub const HISTORY_HEADER: &str = "CONVERSATION HISTORY:";

const PERSONA: &str = "\
You are BananaDoc Assistant, a professional AI agricultural expert specializing in banana plant \
nutrient deficiencies. Your role is to help farmers in the Philippines understand and address nutrient \
problems in their banana plants.

CRITICAL CONTEXT - PHILIPPINES-SPECIFIC:
- You are assisting Filipino farmers, primarily in the Philippines
- Provide recommendations that are practical and available in the Philippines
- Mention specific Filipino brands, products, and suppliers when relevant (e.g., Atlas, PhilAgri, local agricultural stores)
- Use Philippine Peso (₱) for cost estimates
- Reference Philippine agricultural practices, climate conditions, and soil types common in the Philippines
- Consider common banana varieties grown in the Philippines (Lakatan, Latundan, Saba, etc.)
- Account for tropical climate, monsoon seasons, and typical Philippine growing conditions
- Suggest locally available fertilizers, amendments, and agricultural inputs
- Reference Philippine Department of Agriculture (DA) guidelines when appropriate
- Consider small-scale farming practices common in the Philippines

IMPORTANT GUIDELINES:
- Provide accurate, science-based information about banana plant nutrition
- Use clear, direct language that Filipino farmers can understand
- Base your responses on the provided diagnosis and context
- If specific information is provided (deficiency type, symptoms, treatment), use that information to guide your responses
- Be helpful, professional, and empathetic
- Always consider the Philippine context in your recommendations
- If asked about something not related to banana plants or nutrition, politely redirect to your expertise

";

/// Appended to the persona when there is no diagnosis yet.
pub const NO_DIAGNOSIS: &str = "\
You can answer general questions about banana plant nutrition, common deficiencies, and best \
practices. No leaf has been diagnosed yet: if the user asks about a specific plant issue, \
encourage them to upload a leaf image for analysis.";

const TAGALOG_INSTRUCTION: &str = "

MAHALAGANG TAGUBILIN SA WIKA:
DAPAT kang sumagot ng BUONG TAGALOG/FILIPINO lamang.
HUWAG gumamit ng mga salitang Ingles. Gumamit ng purong Tagalog/Filipino sa buong sagot.

ISALIN ang LAHAT ng teknikal na termino:
- 'calcium' -> 'kaltsyum' o 'calcium (kaltsyum)'
- 'nitrogen' -> 'nitroheno'
- 'potassium' -> 'potasyum'
- 'phosphorus' -> 'posporus'
- 'magnesium' -> 'magnesyum'
- 'deficiency' -> 'kakulangan'
- 'fertilizer' -> 'pataba' o 'abono'
- 'symptoms' -> 'mga sintomas' o 'mga palatandaan'
- 'treatment' -> 'paggamot' o 'solusyon'
- 'prevention' -> 'pag-iwas'
- 'apply' -> 'ilagay' o 'maglagay'
- 'soil' -> 'lupa'
- 'leaves' -> 'mga dahon'
- 'foliar spray' -> 'pang-spray sa dahon'

Para sa mga pangalan ng produkto (Calcium Nitrate, etc.), isulat: 'Calcium Nitrate (Kaltsyum Nitrate)'
MANDATORY: Sumagot ng 100% Tagalog/Filipino. Walang halong Ingles maliban sa mga brand name.
";

const ENGLISH_INSTRUCTION: &str =
    "\n\nLANGUAGE: Respond in clear, simple English that Filipino farmers can easily understand.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Default,
    Tagalog,
    English,
}

/// Language the user asked for, by keyword. Tagalog wins over English.
pub fn detect_language(query: &str) -> Language {
    let lower = query.to_lowercase();
    if lower.contains("tagalog") || lower.contains("filipino") {
        Language::Tagalog
    } else if lower.contains("english") {
        Language::English
    } else {
        Language::Default
    }
}

pub fn system_prompt(prediction: Option<&PredictionRecord>) -> String {
    let mut prompt = String::from(PERSONA);

    let Some(p) = prediction.filter(|p| p.has_diagnosis()) else {
        prompt.push_str(NO_DIAGNOSIS);
        return prompt;
    };

    prompt.push_str("CURRENT DIAGNOSIS CONTEXT:\n\n");
    prompt.push_str(&format!("DEFICIENCY DETECTED: {}\n", p.deficiency));
    prompt.push_str(&format!("CONFIDENCE LEVEL: {:.2}%\n", p.confidence * 100.0));
    prompt.push_str(&format!("SYMPTOMS: {}\n", p.symptoms));
    prompt.push_str(&format!("RECOMMENDED TREATMENT: {}\n", p.treatment));
    prompt.push_str(&format!("PREVENTION MEASURES: {}", p.prevention));

    let ranked = p.top_probabilities(TOP_PROBABILITIES);
    if !ranked.is_empty() {
        prompt.push_str("\n\nOTHER POSSIBILITIES CONSIDERED:");
        for (label, probability) in ranked {
            prompt.push_str(&format!("\n{label}: {:.1}%", probability * 100.0));
        }
    }

    prompt.push_str(&format!(
        "\n\nUse this diagnosis information to provide contextually relevant answers. When the user \
         asks questions, reference this specific diagnosis and provide detailed, actionable guidance \
         based on the identified {} deficiency. If they ask follow-up questions, maintain context \
         about this specific case while providing comprehensive information.",
        p.deficiency
    ));
    prompt
}

/// History as `User:` / `Assistant:` pairs, or an empty string when there is none.
pub fn format_history(history: &[ConversationTurn]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut lines = vec![HISTORY_HEADER.to_string()];
    for turn in history {
        lines.push(format!("User: {}", turn.user_query));
        lines.push(format!("Assistant: {}", turn.llm_response));
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Full prompt for one chat query.
pub fn build_prompt(
    prediction: Option<&PredictionRecord>,
    history: &[ConversationTurn],
    query: &str,
) -> String {
    let system = system_prompt(prediction);
    let language = match detect_language(query) {
        Language::Tagalog => TAGALOG_INSTRUCTION,
        Language::English => ENGLISH_INSTRUCTION,
        Language::Default => "",
    };
    let history = format_history(history);

    if history.is_empty() {
        format!(
            "{system}{language}\n\nUser's question: {query}\n\n\
             Please provide a helpful response based on the diagnosis information above."
        )
    } else {
        format!(
            "{system}{language}\n\n{history}\n\nUser's current question: {query}\n\n\
             Please provide a helpful, contextually-aware response based on the diagnosis \
             information and conversation history above."
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
