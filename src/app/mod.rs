// Application wiring shared by the server, the one-shot CLI and the Lambda entry point.

use crate::adapters::langfuse::{LangfuseSink, LogFeedbackSink};
use crate::adapters::openai::AzureOpenAiClient;
use crate::core::knowledge::KnowledgeBase;
use crate::core::orchestrator::TriageEngine;
use crate::domain::ports::{ConfigProvider, FeedbackSink};
use crate::utils::error::Result;
use std::sync::Arc;

/// 依配置組出追蹤與評分接收端；沒有 Langfuse 金鑰時只寫日誌
pub fn feedback_sink<P: ConfigProvider + ?Sized>(config: &P) -> Result<Arc<dyn FeedbackSink>> {
    match config.langfuse() {
        Some((host, public_key, secret_key)) => {
            tracing::info!("📡 Traces and feedback scores will be sent to {}", host);
            Ok(Arc::new(LangfuseSink::new(host, public_key, secret_key)?))
        }
        None => {
            tracing::info!("📝 Langfuse not configured; feedback is logged only");
            Ok(Arc::new(LogFeedbackSink))
        }
    }
}

/// 載入參考文件並建立完整的分診引擎
pub fn build_engine<P: ConfigProvider + ?Sized>(config: &P) -> Result<TriageEngine<AzureOpenAiClient>> {
    let knowledge = Arc::new(KnowledgeBase::from_file(config.guide_path())?);
    let client = Arc::new(AzureOpenAiClient::from_config(config)?);
    let sink = feedback_sink(config)?;

    tracing::info!(
        "🧭 Routing mode: {:?}, guide chunks: {}",
        config.routing_mode(),
        knowledge.len()
    );

    Ok(TriageEngine::from_config(client, knowledge, config, Some(sink)))
}
