use crate::domain::model::{CompletionPurpose, CompletionRequest};
use crate::domain::ports::{CompletionClient, ConfigProvider};
use crate::utils::error::{Result, TriageError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_API_VERSION: &str = "2024-12-01-preview";
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Azure OpenAI chat completions；同一個 reqwest::Client 供所有請求共用
#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    triage_deployment: String,
    answer_deployment: String,
}

impl AzureOpenAiClient {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        api_version: &str,
        triage_deployment: &str,
        answer_deployment: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_version: api_version.to_string(),
            triage_deployment: triage_deployment.to_string(),
            answer_deployment: answer_deployment.to_string(),
        })
    }

    pub fn from_config<P: ConfigProvider + ?Sized>(config: &P) -> Result<Self> {
        Self::new(
            config.model_endpoint(),
            config.api_key(),
            config.api_version(),
            config.deployment(CompletionPurpose::Triage),
            config.deployment(CompletionPurpose::Answer),
            config.call_timeout(),
        )
    }

    fn deployment(&self, purpose: CompletionPurpose) -> &str {
        match purpose {
            CompletionPurpose::Triage => &self.triage_deployment,
            CompletionPurpose::Answer => &self.answer_deployment,
        }
    }

    fn url(&self, purpose: CompletionPurpose) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint,
            self.deployment(purpose)
        )
    }
}

fn response_format(schema: &serde_json::Value) -> serde_json::Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "triage_result",
            "strict": true,
            "schema": schema,
        }
    })
}

#[async_trait]
impl CompletionClient for AzureOpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatCompletionBody {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_text,
                },
            ],
            // 分診要求穩定輸出
            temperature: match request.purpose {
                CompletionPurpose::Triage => 0.0,
                CompletionPurpose::Answer => 0.3,
            },
            response_format: request.response_schema.as_ref().map(response_format),
        };

        let url = self.url(request.purpose);
        tracing::debug!("📡 Calling {:?} deployment: {}", request.purpose, url);

        let response = self
            .client
            .post(&url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("📡 Model response status: {}", status);

        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                text.truncate(end);
            }
            return Err(TriageError::UpstreamStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: ChatCompletionResponse = response.json().await?;
        let Some(choice) = payload.choices.into_iter().next() else {
            tracing::warn!("⚠️ Model returned no choices");
            return Ok(String::new());
        };

        if choice.finish_reason.as_deref() == Some("content_filter") {
            tracing::warn!("⚠️ Model output was filtered");
        }

        Ok(choice.message.content.unwrap_or_default())
    }
}
