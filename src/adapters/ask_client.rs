use crate::core::evaluation::Respondent;
use crate::utils::error::{Result, TriageError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct AskReply {
    response: String,
}

/// 對執行中的服務呼叫 POST /ask
#[derive(Debug, Clone)]
pub struct AskServiceClient {
    client: Client,
    url: String,
}

impl AskServiceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/ask", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Respondent for AskServiceClient {
    async fn respond(&self, input: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": input }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TriageError::UpstreamStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json::<AskReply>().await?.response)
    }
}
