use crate::core::retry::RetryPolicy;
use crate::domain::model::{Category, Classification, CompletionPurpose, CompletionRequest};
use crate::domain::ports::CompletionClient;
use crate::utils::error::{Result, TriageError};
use crate::utils::validation::validate_user_text;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_MAX_INPUT_CHARS: usize = 10_000;

const TRIAGE_INSTRUCTIONS: &str = r#"You are the triage step of a patient-facing joint surgery assistant.
Read the patient's message and assign exactly one category. Do not answer the message.

EMERGENCY - the message describes a situation that needs 911 or the emergency room now:
severe chest, abdominal or head pain; trouble breathing; fainting or severe confusion;
heavy or uncontrolled bleeding; stroke signs (face drooping, arm weakness, slurred speech);
poisoning, overdose or a severe allergic reaction; severe burns; choking; heart attack signs;
thoughts of suicide or self-harm; major trauma; seizures that do not stop; sudden vision loss;
sudden paralysis; severe abdominal pain with vomiting; high fever with stiff neck, confusion or rash;
any mention that 911 has been called or paramedics are on the way.
When you are unsure whether something is an emergency, choose EMERGENCY.

ADVICE_REQUEST - the patient wants a personal clinical judgement: interpreting their own
symptoms or results ("Why is my knee swollen?"), choosing or comparing medications or treatments
("Should I take ibuprofen or Tylenol?"), risk or triage questions ("Is this normal?",
"Should I go to the ER?"), or personal next steps ("Can I drive yet?", "When can I go back to work?").

DOMAIN_INFO - general, non-personalized education about joint replacement surgery, preparation,
hospital stay or recovery ("What is ERAS?", "What should I bring to the hospital?"),
checklists from the care guide, or care team contact information.

GREETING - a greeting, thanks, or small talk with no question in it.

Return JSON with "category" set to one of EMERGENCY, ADVICE_REQUEST, DOMAIN_INFO, GREETING
and "rationale" set to one short sentence that refers to the patient's message."#;

/// 結構化輸出 schema：category 限定四個標籤
pub fn triage_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "category": {
                "type": "string",
                "enum": Category::MODEL_LABELS,
            },
            "rationale": { "type": "string" }
        },
        "required": ["category", "rationale"],
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TriagePayload {
    Labelled {
        category: String,
        #[serde(default, alias = "reason")]
        rationale: Option<String>,
    },
    // 舊版分診輸出：兩個布林旗標
    Flags {
        is_medical_emergency: bool,
        is_medical_advice: bool,
        #[serde(default)]
        reason: Option<String>,
    },
}

pub struct ClassifierGateway<C: CompletionClient> {
    client: Arc<C>,
    retry: RetryPolicy,
    max_input_chars: usize,
}

impl<C: CompletionClient> ClassifierGateway<C> {
    pub fn new(client: Arc<C>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    pub fn validate(&self, text: &str) -> Result<()> {
        validate_user_text(text, self.max_input_chars)
    }

    /// 對單一訊息分類；模型輸出無法解析時回傳 UNKNOWN 而不是錯誤
    pub async fn classify(&self, text: &str) -> Result<Classification> {
        self.validate(text)?;

        let request = CompletionRequest {
            purpose: CompletionPurpose::Triage,
            system_prompt: TRIAGE_INSTRUCTIONS.to_string(),
            user_text: text.to_string(),
            response_schema: Some(triage_schema()),
        };

        let raw = self
            .retry
            .run("triage classification", || self.client.complete(&request))
            .await?;

        Ok(parse_classification(&raw))
    }
}

pub fn parse_classification(raw: &str) -> Classification {
    match try_parse_classification(raw) {
        Ok(classification) => {
            tracing::debug!(
                "🧭 Classified as {} ({})",
                classification.category,
                classification.rationale.as_deref().unwrap_or("no rationale")
            );
            classification
        }
        Err(e) => {
            tracing::warn!("⚠️ {}; routing as UNKNOWN", e);
            Classification::unknown(raw)
        }
    }
}

fn try_parse_classification(raw: &str) -> Result<Classification> {
    let body = strip_code_fence(raw);
    let payload: TriagePayload =
        serde_json::from_str(body).map_err(|e| TriageError::ClassificationParse {
            message: format!("not valid triage JSON: {}", e),
        })?;

    let (category, rationale) = match payload {
        TriagePayload::Labelled {
            category,
            rationale,
        } => {
            let parsed = Category::from_label(&category).ok_or_else(|| {
                TriageError::ClassificationParse {
                    message: format!("unrecognized category label {:?}", category),
                }
            })?;
            (parsed, rationale)
        }
        TriagePayload::Flags {
            is_medical_emergency,
            is_medical_advice,
            reason,
        } => {
            let category = if is_medical_emergency {
                Category::Emergency
            } else if is_medical_advice {
                Category::AdviceRequest
            } else {
                Category::DomainInfo
            };
            (category, reason)
        }
    };

    Ok(Classification {
        category,
        rationale: rationale.filter(|r| !r.trim().is_empty()),
        raw_model_output: raw.to_string(),
    })
}

/// 移除模型偶爾包上的 ```json ... ``` 區塊
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_output() {
        let classification =
            parse_classification(r#"{"category": "EMERGENCY", "rationale": "chest pain"}"#);
        assert_eq!(classification.category, Category::Emergency);
        assert_eq!(classification.rationale.as_deref(), Some("chest pain"));
    }

    #[test]
    fn test_parse_fenced_and_lowercase_label() {
        let raw = "```json\n{\"category\": \"domain_info\", \"rationale\": \"education\"}\n```";
        assert_eq!(parse_classification(raw).category, Category::DomainInfo);
    }

    #[test]
    fn test_parse_legacy_flag_shape() {
        let emergency = parse_classification(
            r#"{"is_medical_emergency": true, "is_medical_advice": true, "reason": "stroke signs"}"#,
        );
        let advice = parse_classification(
            r#"{"is_medical_emergency": false, "is_medical_advice": true, "reason": "asks about meds"}"#,
        );
        let info = parse_classification(
            r#"{"is_medical_emergency": false, "is_medical_advice": false, "reason": "general"}"#,
        );

        assert_eq!(emergency.category, Category::Emergency);
        assert_eq!(advice.category, Category::AdviceRequest);
        assert_eq!(info.category, Category::DomainInfo);
    }

    #[test]
    fn test_malformed_output_becomes_unknown() {
        for raw in [
            "EMERGENCY",
            "not json at all",
            r#"{"category": "URGENT_CARE"}"#,
            r#"{"category": null}"#,
            r#"{"label": "GREETING"}"#,
            "",
        ] {
            let classification = parse_classification(raw);
            assert_eq!(classification.category, Category::Unknown, "input: {raw:?}");
            assert_eq!(classification.raw_model_output, raw);
        }
    }

    #[test]
    fn test_schema_lists_only_model_labels() {
        let schema = triage_schema();
        let labels = schema["properties"]["category"]["enum"].as_array().unwrap();
        assert_eq!(labels.len(), 4);
        assert!(!labels.iter().any(|l| l == "UNKNOWN"));
    }
}
