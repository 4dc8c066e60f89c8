use crate::domain::model::{
    CompletionPurpose, CompletionRequest, FeedbackRating, Request, Response, RoutingMode, TraceRecord,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// 生成式模型服務的請求/回應契約
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[async_trait]
pub trait ResponseHandler: Send + Sync {
    async fn handle(&self, request: &Request) -> Response;
}

/// 追蹤與使用者評分的外部接收端，失敗只記錄不往上拋
///
/// 同一個 trace_id 的 `export_trace` 一定先於 `record` 送出。
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn export_trace(&self, trace: &TraceRecord) -> Result<()>;
    async fn record(&self, trace_id: Uuid, rating: FeedbackRating, comment: Option<&str>) -> Result<()>;
}

pub trait ConfigProvider: Send + Sync {
    fn model_endpoint(&self) -> &str;
    fn api_key(&self) -> &str;
    fn api_version(&self) -> &str;
    fn deployment(&self, purpose: CompletionPurpose) -> &str;
    fn call_timeout(&self) -> Duration;
    fn retry_attempts(&self) -> u32;
    fn retry_base_delay(&self) -> Duration;
    fn retry_max_delay(&self) -> Duration;
    fn request_timeout(&self) -> Duration;
    fn routing_mode(&self) -> RoutingMode;
    fn max_input_chars(&self) -> usize;
    fn guide_path(&self) -> &str;
    fn excerpt_top_k(&self) -> usize;
    fn max_context_chars(&self) -> usize;
    fn trace_ttl(&self) -> Duration;
    fn trace_capacity(&self) -> usize;
    /// (host, public_key, secret_key)；未設定時不送出評分
    fn langfuse(&self) -> Option<(&str, &str, &str)>;
    fn monitoring_enabled(&self) -> bool;
}
