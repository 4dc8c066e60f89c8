#[cfg(feature = "lambda")]
use care_triage::adapters::openai::AzureOpenAiClient;
#[cfg(feature = "lambda")]
use care_triage::app::build_engine;
#[cfg(feature = "lambda")]
use care_triage::utils::{logger, validation::Validate};
#[cfg(feature = "lambda")]
use care_triage::{EnvConfig, HandlerKind, TriageEngine, TriageError};
#[cfg(feature = "lambda")]
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
#[cfg(feature = "lambda")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "lambda")]
use std::sync::Arc;

#[cfg(feature = "lambda")]
#[derive(Deserialize)]
pub struct Request {
    #[serde(alias = "question")]
    pub text: String,
}

#[cfg(feature = "lambda")]
#[derive(Serialize)]
pub struct Response {
    pub response: String,
    pub handler: HandlerKind,
    pub warnings: Vec<String>,
    pub request_id: String,
}

#[cfg(feature = "lambda")]
async fn function_handler(
    engine: &TriageEngine<AzureOpenAiClient>,
    event: LambdaEvent<Request>,
) -> Result<Response, Error> {
    let response = engine
        .process(&event.payload.text)
        .await
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;

    Ok(Response {
        response: response.text,
        handler: response.handler_used,
        warnings: response.warnings,
        request_id: response.request_id.to_string(),
    })
}

#[cfg(feature = "lambda")]
fn init_engine() -> Result<TriageEngine<AzureOpenAiClient>, TriageError> {
    let config = EnvConfig::from_env()?;
    config.validate()?;
    build_engine(&config)
}

#[cfg(feature = "lambda")]
#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_lambda_logger();

    // 冷啟動時載入一次參考文件與模型客戶端
    let engine = Arc::new(init_engine().map_err(|e| {
        tracing::error!("❌ Lambda init failed: {} ({})", e, e.recovery_suggestion());
        Box::new(e) as Box<dyn std::error::Error + Send + Sync>
    })?);

    run(service_fn(move |event: LambdaEvent<Request>| {
        let engine = Arc::clone(&engine);
        async move { function_handler(&engine, event).await }
    }))
    .await
}

