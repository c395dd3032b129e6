//! Instruction sent to every remote extraction tier.

use medharvest_llm::{LlmRequest, Message};

pub const SYSTEM_PROMPT: &str = "You are an assistant that analyses biomedical research abstracts. \
Return exactly one JSON object and nothing else: no prose, no markdown. \
The object must have exactly these keys, each with a string value:\n\
- what_done: what the paper did (aims, methods, experimental design, key findings), 300-500 words at most\n\
- ai_role: what AI was used for (its role, the task it solved, how it was applied), 200-300 words at most\n\
- models: model names, algorithm families or architectures, using their original English names\n\
- data_sources: datasets or data resources (origin, size, modality)\n\
- metrics: evaluation metrics, if any are reported\n\
All five keys are required. If a value cannot be determined from the abstract, use an empty string. \
Report only what the abstract states; do not invent details.";

/// System instruction with the language for the free-text fields.
pub fn system_prompt(language: &str) -> String {
    format!(
        "{SYSTEM_PROMPT}\nWrite the what_done and ai_role values in {language}. \
Keep the JSON keys and the model names exactly as written above."
    )
}

/// Chat request for one abstract.
pub fn build_request(abstract_text: &str, language: &str) -> LlmRequest {
    let user = format!(
        "Abstract:\n\"\"\"\n{abstract_text}\n\"\"\"\n\nExtract the fields from the abstract above. Return only the JSON object."
    );
    LlmRequest {
        messages: vec![Message::system(system_prompt(language)), Message::user(user)],
        model: None,
        max_tokens: None,
        temperature: Some(0.0),
    }
}
