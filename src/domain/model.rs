use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 單一使用者訊息；建立後不可變
#[derive(Debug, Clone)]
pub struct Request {
    pub raw_text: String,
    pub received_at: DateTime<Utc>,
    pub request_id: Uuid,
    pub trace_id: Uuid,
}

impl Request {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            received_at: Utc::now(),
            request_id: Uuid::new_v4(),
            trace_id: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Emergency,
    AdviceRequest,
    DomainInfo,
    Greeting,
    Unknown,
}

impl Category {
    /// 模型可輸出的四個標籤 (UNKNOWN 只由本地解析產生)
    pub const MODEL_LABELS: [&'static str; 4] =
        ["EMERGENCY", "ADVICE_REQUEST", "DOMAIN_INFO", "GREETING"];

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Emergency => "EMERGENCY",
            Self::AdviceRequest => "ADVICE_REQUEST",
            Self::DomainInfo => "DOMAIN_INFO",
            Self::Greeting => "GREETING",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// 不分大小寫比對標籤；無法辨識時回傳 None
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "EMERGENCY" => Some(Self::Emergency),
            "ADVICE_REQUEST" => Some(Self::AdviceRequest),
            "DOMAIN_INFO" => Some(Self::DomainInfo),
            "GREETING" => Some(Self::Greeting),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub rationale: Option<String>,
    pub raw_model_output: String,
}

impl Classification {
    pub fn unknown(raw_model_output: impl Into<String>) -> Self {
        Self {
            category: Category::Unknown,
            rationale: None,
            raw_model_output: raw_model_output.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Emergency,
    AdviceDisclaimer,
    DomainInfo,
    Greeting,
}

impl HandlerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Emergency => "Emergency Handler",
            Self::AdviceDisclaimer => "Advice-Disclaimer Handler",
            Self::DomainInfo => "Domain-Info Handler",
            Self::Greeting => "Greeting Handler",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for HandlerKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingDecision {
    pub category: Category,
    pub selected_handler: HandlerKind,
}

pub const WARNING_EMERGENCY: &str = "emergency";
pub const WARNING_NOT_MEDICAL_ADVICE: &str = "not medical advice";
pub const WARNING_DEGRADED: &str = "degraded";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub text: String,
    pub handler_used: HandlerKind,
    pub warnings: Vec<String>,
    pub request_id: Uuid,
}

impl Response {
    pub fn new(request: &Request, handler_used: HandlerKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            handler_used,
            warnings: Vec::new(),
            request_id: request.request_id,
        }
    }

    pub fn with_warning(mut self, warning: &str) -> Self {
        if !self.warnings.iter().any(|w| w == warning) {
            self.warnings.push(warning.to_string());
        }
        self
    }

    pub fn has_warning(&self, warning: &str) -> bool {
        self.warnings.iter().any(|w| w == warning)
    }
}

/// 上游呼叫用途，用來挑選模型部署
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionPurpose {
    Triage,
    Answer,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub purpose: CompletionPurpose,
    pub system_prompt: String,
    pub user_text: String,
    /// 有值時要求上游以 JSON schema 結構化輸出
    pub response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRating {
    Up,
    Down,
}

impl FeedbackRating {
    pub fn score(&self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Down => 0.0,
        }
    }
}

/// 一次請求的可觀測紀錄，以 trace_id 為鍵送往追蹤後端
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub trace_id: Uuid,
    pub request_id: Uuid,
    pub input: String,
    pub output: String,
    /// 分類失敗或逾時時為 None
    pub category: Option<Category>,
    pub handler: HandlerKind,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl TraceRecord {
    pub fn new(request: &Request, response: &Response, category: Option<Category>) -> Self {
        Self {
            trace_id: request.trace_id,
            request_id: request.request_id,
            input: request.raw_text.clone(),
            output: response.text.clone(),
            category,
            handler: response.handler_used,
            warnings: response.warnings.clone(),
            started_at: request.received_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    #[default]
    Triage,
    Direct,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_labels_round_trip_through_serde() {
        let parsed: Category = serde_json::from_str("\"ADVICE_REQUEST\"").unwrap();
        assert_eq!(parsed, Category::AdviceRequest);
        assert_eq!(Category::from_label(" greeting "), Some(Category::Greeting));
        assert_eq!(Category::from_label("URGENT"), None);
    }

    #[test]
    fn test_handler_serializes_as_display_name() {
        let json = serde_json::to_string(&HandlerKind::Emergency).unwrap();
        assert_eq!(json, "\"Emergency Handler\"");
    }

    #[test]
    fn test_warnings_are_not_duplicated() {
        let request = Request::new("hi");
        let response = Response::new(&request, HandlerKind::Greeting, "hello")
            .with_warning(WARNING_DEGRADED)
            .with_warning(WARNING_DEGRADED);
        assert_eq!(response.warnings, vec![WARNING_DEGRADED.to_string()]);
        assert_eq!(response.request_id, request.request_id);
    }
}
