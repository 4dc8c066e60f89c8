use crate::core::knowledge::{Excerpt, KnowledgeBase, DEFAULT_MAX_CONTEXT_CHARS, DEFAULT_TOP_K};
use crate::core::retry::RetryPolicy;
use crate::domain::model::{
    CompletionPurpose, CompletionRequest, HandlerKind, Request, Response, WARNING_DEGRADED,
    WARNING_EMERGENCY, WARNING_NOT_MEDICAL_ADVICE,
};
use crate::domain::ports::{CompletionClient, ResponseHandler};
use async_trait::async_trait;
use std::fmt::Write;
use std::sync::Arc;

pub const EMERGENCY_TEXT: &str = "This sounds like it could be a medical emergency. \
Call 911 now or go to the nearest emergency room. \
If you are not alone, ask someone to stay with you until help arrives.";

pub const DISCLAIMER_TEXT: &str = "I'm not able to give personal medical advice, \
so I can't answer questions about your own symptoms, medications, or next steps. \
Please contact your care team or health care provider, who know your situation. \
If you feel this is urgent, call 911 or go to the nearest emergency room.";

pub const GREETING_TEXT: &str = "Hi there! I'm here to help with general questions about \
total joint replacement surgery, like getting ready for surgery, your hospital stay, and recovery. \
What would you like to know?";

pub const DOMAIN_FALLBACK_TEXT: &str =
    "I'm unable to answer right now. Please contact your care team.";

/// 緊急處理器沒有持有任何上游 client
#[derive(Debug, Default, Clone, Copy)]
pub struct EmergencyHandler;

#[async_trait]
impl ResponseHandler for EmergencyHandler {
    async fn handle(&self, request: &Request) -> Response {
        Response::new(request, HandlerKind::Emergency, EMERGENCY_TEXT).with_warning(WARNING_EMERGENCY)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AdviceDisclaimerHandler;

#[async_trait]
impl ResponseHandler for AdviceDisclaimerHandler {
    async fn handle(&self, request: &Request) -> Response {
        Response::new(request, HandlerKind::AdviceDisclaimer, DISCLAIMER_TEXT)
            .with_warning(WARNING_NOT_MEDICAL_ADVICE)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GreetingHandler;

#[async_trait]
impl ResponseHandler for GreetingHandler {
    async fn handle(&self, request: &Request) -> Response {
        Response::new(request, HandlerKind::Greeting, GREETING_TEXT)
    }
}

const DOMAIN_INSTRUCTIONS: &str = r#"You answer questions about total joint replacement surgery for patients.

Rules:
- Use ONLY the numbered guide excerpts below. Do not use outside knowledge.
- Cite the excerpts you rely on with their numbers, for example [1] or [2][3].
- If the question is not about joint surgery, politely say you only answer joint surgery questions.
- If the excerpts do not contain the answer, say so plainly and suggest asking the care team.
- Never interpret the patient's own symptoms or recommend personal treatment.
- Write warmly and simply, at about a 5th grade reading level, in short paragraphs."#;

pub struct DomainInfoHandler<C: CompletionClient> {
    client: Arc<C>,
    knowledge: Arc<KnowledgeBase>,
    retry: RetryPolicy,
    top_k: usize,
    max_context_chars: usize,
}

impl<C: CompletionClient> DomainInfoHandler<C> {
    pub fn new(client: Arc<C>, knowledge: Arc<KnowledgeBase>, retry: RetryPolicy) -> Self {
        Self {
            client,
            knowledge,
            retry,
            top_k: DEFAULT_TOP_K,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    pub fn with_context_limits(mut self, top_k: usize, max_context_chars: usize) -> Self {
        self.top_k = top_k;
        self.max_context_chars = max_context_chars;
        self
    }

    fn build_prompt(&self, excerpts: &[Excerpt]) -> String {
        let mut prompt = String::from(DOMAIN_INSTRUCTIONS);
        prompt.push_str("\n\nGUIDE EXCERPTS:\n");
        for (i, excerpt) in excerpts.iter().enumerate() {
            let _ = write!(prompt, "\n[{}] {}\n", i + 1, excerpt.text);
        }
        prompt
    }

    fn fallback(request: &Request) -> Response {
        Response::new(request, HandlerKind::DomainInfo, DOMAIN_FALLBACK_TEXT).with_warning(WARNING_DEGRADED)
    }
}

#[async_trait]
impl<C: CompletionClient> ResponseHandler for DomainInfoHandler<C> {
    async fn handle(&self, request: &Request) -> Response {
        let excerpts = self
            .knowledge
            .context_for(&request.raw_text, self.top_k, self.max_context_chars);
        tracing::debug!(
            request_id = %request.request_id,
            "📚 Using {} guide excerpt(s): {:?}",
            excerpts.len(),
            excerpts.iter().map(|e| e.chunk_index).collect::<Vec<_>>()
        );

        let completion = CompletionRequest {
            purpose: CompletionPurpose::Answer,
            system_prompt: self.build_prompt(&excerpts),
            user_text: request.raw_text.clone(),
            response_schema: None,
        };

        match self
            .retry
            .run("domain answer", || self.client.complete(&completion))
            .await
        {
            Ok(text) if !text.trim().is_empty() => {
                Response::new(request, HandlerKind::DomainInfo, text.trim())
            }
            Ok(_) => {
                tracing::warn!(request_id = %request.request_id, "⚠️ Empty answer from model; using fallback");
                Self::fallback(request)
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    "⚠️ Domain answer unavailable: {}; using fallback",
                    e
                );
                Self::fallback(request)
            }
        }
    }
}
