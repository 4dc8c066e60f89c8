use crate::core::orchestrator::TriageEngine;
use crate::domain::model::{FeedbackRating, HandlerKind, Response as TriageResponse, RoutingMode};
use crate::domain::ports::CompletionClient;
use crate::utils::error::TriageError;
use crate::utils::monitor::{SystemMonitor, SystemStats};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub struct AppState<C: CompletionClient> {
    engine: Arc<TriageEngine<C>>,
    monitor: Arc<SystemMonitor>,
}

impl<C: CompletionClient> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            monitor: Arc::clone(&self.monitor),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(alias = "question")]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub response: String,
    pub handler: HandlerKind,
    pub warnings: Vec<String>,
    pub request_id: Uuid,
}

impl From<TriageResponse> for AskResponse {
    fn from(response: TriageResponse) -> Self {
        Self {
            response: response.text,
            handler: response.handler_used,
            warnings: response.warnings,
            request_id: response.request_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub request_id: Uuid,
    pub rating: FeedbackRating,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub routing_mode: RoutingMode,
    pub guide_chunks: usize,
    pub active_traces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<SystemStats>,
    pub checked_at: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

pub fn router<C: CompletionClient + 'static>(
    engine: Arc<TriageEngine<C>>,
    monitor: Arc<SystemMonitor>,
) -> Router {
    Router::new()
        .route("/ask", post(ask::<C>))
        .route("/feedback", post(feedback::<C>))
        .route("/health", get(health::<C>))
        .with_state(AppState { engine, monitor })
}

pub async fn ask<C: CompletionClient + 'static>(
    State(state): State<AppState<C>>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::info!("🚫 Rejected /ask body: {}", rejection.body_text());
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state.engine.process(&body.text).await {
        Ok(response) => (StatusCode::OK, Json(AskResponse::from(response))).into_response(),
        Err(e @ TriageError::InvalidInput { .. }) => {
            error_response(StatusCode::BAD_REQUEST, e.user_friendly_message())
        }
        Err(e) => {
            tracing::error!(
                "❌ Unhandled triage failure: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.user_friendly_message())
        }
    }
}

pub async fn feedback<C: CompletionClient + 'static>(
    State(state): State<AppState<C>>,
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    if state
        .engine
        .record_feedback(body.request_id, body.rating, body.comment)
    {
        StatusCode::ACCEPTED.into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            format!("unknown or expired request_id {}", body.request_id),
        )
    }
}

pub async fn health<C: CompletionClient + 'static>(
    State(state): State<AppState<C>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ready",
        routing_mode: state.engine.routing_mode(),
        guide_chunks: state.engine.knowledge().len(),
        active_traces: state.engine.traces().len(),
        process: state.monitor.get_stats(),
        checked_at: Utc::now().to_rfc3339(),
    })
}

/// 綁定位址並服務到收到 Ctrl-C 為止
pub async fn serve(bind_address: &str, port: u16, app: Router) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("🚀 Listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("🛑 Shutdown signal received");
        })
        .await
}
