use crate::core::classifier::ClassifierGateway;
use crate::core::feedback::{FeedbackRecorder, TraceStore};
use crate::core::handlers::{AdviceDisclaimerHandler, DomainInfoHandler, EmergencyHandler, GreetingHandler};
use crate::core::knowledge::KnowledgeBase;
use crate::core::retry::RetryPolicy;
use crate::core::router::route_for_mode;
use crate::domain::model::{
    Category, Classification, FeedbackRating, HandlerKind, Request, Response, RoutingDecision,
    RoutingMode, TraceRecord, WARNING_DEGRADED,
};
use crate::domain::ports::{CompletionClient, ConfigProvider, FeedbackSink, ResponseHandler};
use crate::utils::error::{Result, TriageError};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 單一請求流程：驗證 → 分類 → 路由 → 處理器 → 回應
pub struct TriageEngine<C: CompletionClient> {
    classifier: ClassifierGateway<C>,
    emergency: EmergencyHandler,
    disclaimer: AdviceDisclaimerHandler,
    greeting: GreetingHandler,
    domain_info: DomainInfoHandler<C>,
    knowledge: Arc<KnowledgeBase>,
    mode: RoutingMode,
    request_timeout: Duration,
    feedback: Option<FeedbackRecorder>,
    traces: Arc<TraceStore>,
}

impl<C: CompletionClient> TriageEngine<C> {
    pub fn new(client: Arc<C>, knowledge: Arc<KnowledgeBase>, retry: RetryPolicy) -> Self {
        Self {
            classifier: ClassifierGateway::new(Arc::clone(&client), retry.clone()),
            emergency: EmergencyHandler,
            disclaimer: AdviceDisclaimerHandler,
            greeting: GreetingHandler,
            domain_info: DomainInfoHandler::new(client, Arc::clone(&knowledge), retry),
            knowledge,
            mode: RoutingMode::Triage,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            feedback: None,
            traces: Arc::new(TraceStore::default()),
        }
    }

    pub fn from_config<P: ConfigProvider + ?Sized>(
        client: Arc<C>,
        knowledge: Arc<KnowledgeBase>,
        config: &P,
        sink: Option<Arc<dyn FeedbackSink>>,
    ) -> Self {
        let retry = RetryPolicy::from_config(config);
        let traces = Arc::new(TraceStore::new(config.trace_ttl(), config.trace_capacity()));

        let mut engine = Self::new(client, knowledge, retry)
            .with_routing_mode(config.routing_mode())
            .with_request_timeout(config.request_timeout())
            .with_max_input_chars(config.max_input_chars())
            .with_context_limits(config.excerpt_top_k(), config.max_context_chars());
        engine.traces = Arc::clone(&traces);
        if let Some(sink) = sink {
            engine.feedback = Some(FeedbackRecorder::new(traces, sink));
        }
        engine
    }

    pub fn with_routing_mode(mut self, mode: RoutingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.classifier = self.classifier.with_max_input_chars(max_input_chars);
        self
    }

    pub fn with_context_limits(mut self, top_k: usize, max_context_chars: usize) -> Self {
        self.domain_info = self.domain_info.with_context_limits(top_k, max_context_chars);
        self
    }

    pub fn with_feedback_sink(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = Some(FeedbackRecorder::new(Arc::clone(&self.traces), sink));
        self
    }

    pub fn routing_mode(&self) -> RoutingMode {
        self.mode
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn traces(&self) -> &TraceStore {
        &self.traces
    }

    fn handler(&self, kind: HandlerKind) -> &dyn ResponseHandler {
        match kind {
            HandlerKind::Emergency => &self.emergency,
            HandlerKind::AdviceDisclaimer => &self.disclaimer,
            HandlerKind::DomainInfo => &self.domain_info,
            HandlerKind::Greeting => &self.greeting,
        }
    }

    /// 只回傳 InvalidInput；其餘失敗都轉成免責聲明回應
    pub async fn process(&self, raw_text: &str) -> Result<Response> {
        self.classifier.validate(raw_text)?;

        let request = Request::new(raw_text);
        self.traces.insert(request.request_id, request.trace_id);

        let span = tracing::info_span!(
            "triage",
            request_id = %request.request_id,
            trace_id = %request.trace_id
        );

        let (response, category) =
            match tokio::time::timeout(self.request_timeout, self.run(&request).instrument(span)).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(
                        request_id = %request.request_id,
                        "⏱️ Request exceeded {:?}; returning disclaimer",
                        self.request_timeout
                    );
                    (self.degraded_disclaimer(&request).await, None)
                }
            };

        if let Some(recorder) = &self.feedback {
            recorder.export(TraceRecord::new(&request, &response, category));
        }
        Ok(response)
    }

    /// 回傳回應與分類結果；分類失敗時分類為 None
    async fn run(&self, request: &Request) -> Result<(Response, Option<Category>)> {
        tracing::debug!("📨 Received message ({} chars)", request.raw_text.chars().count());

        let classification = match self.classifier.classify(&request.raw_text).await {
            Ok(classification) => classification,
            Err(e @ TriageError::InvalidInput { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!("⚠️ Classification failed: {}; falling back to disclaimer", e);
                return Ok((self.degraded_disclaimer(request).await, None));
            }
        };

        let decision = route_for_mode(self.mode, &classification);
        tracing::info!(
            category = %decision.category,
            handler = %decision.selected_handler,
            "🧭 Routed request"
        );

        let response = self.handler(decision.selected_handler).handle(request).await;
        tracing::info!(
            handler = %response.handler_used,
            warnings = ?response.warnings,
            "✅ Response ready"
        );
        Ok((response, Some(decision.category)))
    }

    async fn degraded_disclaimer(&self, request: &Request) -> Response {
        self.disclaimer
            .handle(request)
            .await
            .with_warning(WARNING_DEGRADED)
    }

    /// 只分類與路由，不呼叫處理器 (CLI dry-run 使用)
    pub async fn triage_only(&self, raw_text: &str) -> Result<(Classification, RoutingDecision)> {
        let classification = self.classifier.classify(raw_text).await?;
        let decision = route_for_mode(self.mode, &classification);
        Ok((classification, decision))
    }

    pub fn record_feedback(
        &self,
        request_id: Uuid,
        rating: FeedbackRating,
        comment: Option<String>,
    ) -> bool {
        match &self.feedback {
            Some(recorder) => recorder.record(request_id, rating, comment),
            None => {
                let known = self.traces.lookup(&request_id).is_some();
                tracing::info!(
                    request_id = %request_id,
                    rating = ?rating,
                    "📝 Feedback received (no sink configured)"
                );
                known
            }
        }
    }
}
