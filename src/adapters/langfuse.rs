use crate::domain::model::{FeedbackRating, TraceRecord};
use crate::domain::ports::FeedbackSink;
use crate::utils::error::{Result, TriageError};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

const SCORE_NAME: &str = "user-feedback";
const TRACE_NAME: &str = "care-triage";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreBody<'a> {
    trace_id: String,
    name: &'static str,
    value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct IngestionBatch<'a> {
    batch: Vec<IngestionEvent<'a>>,
}

#[derive(Debug, Serialize)]
struct IngestionEvent<'a> {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: String,
    body: TraceBody<'a>,
}

#[derive(Debug, Serialize)]
struct TraceBody<'a> {
    id: String,
    name: &'static str,
    timestamp: String,
    input: &'a str,
    output: &'a str,
    metadata: serde_json::Value,
    tags: Vec<&'static str>,
}

impl<'a> TraceBody<'a> {
    fn from_record(trace: &'a TraceRecord) -> Self {
        let category = trace.category.map(|c| c.as_label());
        let mut tags = vec![trace.handler.name()];
        tags.extend(category);

        Self {
            id: trace.trace_id.to_string(),
            name: TRACE_NAME,
            timestamp: trace.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            input: &trace.input,
            output: &trace.output,
            metadata: serde_json::json!({
                "request_id": trace.request_id.to_string(),
                "category": category,
                "handler": trace.handler.name(),
                "warnings": trace.warnings,
            }),
            tags,
        }
    }
}

/// Langfuse 公開 API：追蹤 (POST /api/public/ingestion) 與評分 (POST /api/public/scores)
#[derive(Debug, Clone)]
pub struct LangfuseSink {
    client: Client,
    host: String,
    public_key: String,
    secret_key: String,
}

impl LangfuseSink {
    pub fn new(host: &str, public_key: &str, secret_key: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            public_key: public_key.to_string(),
            secret_key: secret_key.to_string(),
        })
    }
}

impl LangfuseSink {
    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .json(body)
            .send()
            .await?;

        // ingestion 成功時回 207，逐筆結果放在 body 裡
        let status = response.status();
        if !status.is_success() {
            return Err(TriageError::UpstreamStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FeedbackSink for LangfuseSink {
    async fn export_trace(&self, trace: &TraceRecord) -> Result<()> {
        let batch = IngestionBatch {
            batch: vec![IngestionEvent {
                id: Uuid::new_v4().to_string(),
                kind: "trace-create",
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                body: TraceBody::from_record(trace),
            }],
        };

        self.post("/api/public/ingestion", &batch).await?;
        tracing::debug!(trace_id = %trace.trace_id, "📡 Trace exported");
        Ok(())
    }

    async fn record(&self, trace_id: Uuid, rating: FeedbackRating, comment: Option<&str>) -> Result<()> {
        let body = ScoreBody {
            trace_id: trace_id.to_string(),
            name: SCORE_NAME,
            value: rating.score(),
            comment,
        };

        self.post("/api/public/scores", &body).await?;
        tracing::debug!(trace_id = %trace_id, "📝 Feedback score recorded");
        Ok(())
    }
}

/// 未設定 Langfuse 時只寫日誌
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFeedbackSink;

#[async_trait]
impl FeedbackSink for LogFeedbackSink {
    async fn export_trace(&self, trace: &TraceRecord) -> Result<()> {
        tracing::debug!(
            trace_id = %trace.trace_id,
            handler = %trace.handler,
            category = ?trace.category,
            "📊 Trace completed"
        );
        Ok(())
    }

    async fn record(&self, trace_id: Uuid, rating: FeedbackRating, comment: Option<&str>) -> Result<()> {
        tracing::info!(
            trace_id = %trace_id,
            score = rating.score(),
            comment = comment.unwrap_or(""),
            "📝 Feedback received"
        );
        Ok(())
    }
}
