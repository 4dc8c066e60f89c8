#![allow(dead_code)]

use async_trait::async_trait;
use care_triage::core::knowledge::KnowledgeBase;
use care_triage::core::retry::RetryPolicy;
use care_triage::domain::model::{CompletionPurpose, CompletionRequest, FeedbackRating, TraceRecord};
use care_triage::domain::ports::{CompletionClient, FeedbackSink};
use care_triage::{Result, TriageEngine, TriageError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const GUIDE_PATH: &str = "knowledge/joint_replacement_guide.md";
pub const ANSWER: &str = "ERAS is a program that helps you recover faster [1].";

/// What the stub returns for one purpose.
#[derive(Debug, Clone)]
pub enum Script {
    Reply(String),
    Fail(u16),
    Hang,
}

pub fn label(category: &str) -> Script {
    Script::Reply(
        serde_json::json!({ "category": category, "rationale": "scripted" }).to_string(),
    )
}

/// In-process completion client that counts calls per purpose.
pub struct StubClient {
    triage: Script,
    answer: Script,
    triage_calls: AtomicUsize,
    answer_calls: AtomicUsize,
    last_answer_prompt: Mutex<Option<String>>,
}

impl StubClient {
    pub fn classifying(category: &str) -> Self {
        Self::scripted(label(category), Script::Reply(ANSWER.to_string()))
    }

    pub fn scripted(triage: Script, answer: Script) -> Self {
        Self {
            triage,
            answer,
            triage_calls: AtomicUsize::new(0),
            answer_calls: AtomicUsize::new(0),
            last_answer_prompt: Mutex::new(None),
        }
    }

    pub fn triage_calls(&self) -> usize {
        self.triage_calls.load(Ordering::SeqCst)
    }

    pub fn answer_calls(&self) -> usize {
        self.answer_calls.load(Ordering::SeqCst)
    }

    pub fn last_answer_prompt(&self) -> Option<String> {
        self.last_answer_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for StubClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let script = match request.purpose {
            CompletionPurpose::Triage => {
                self.triage_calls.fetch_add(1, Ordering::SeqCst);
                &self.triage
            }
            CompletionPurpose::Answer => {
                self.answer_calls.fetch_add(1, Ordering::SeqCst);
                *self.last_answer_prompt.lock().unwrap() = Some(request.system_prompt.clone());
                &self.answer
            }
        };

        match script {
            Script::Reply(text) => Ok(text.clone()),
            Script::Fail(status) => Err(TriageError::UpstreamStatus {
                status: *status,
                body: "scripted failure".to_string(),
            }),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }
}

/// Feedback sink that keeps every trace and score in memory.
#[derive(Default)]
pub struct RecordingSink {
    pub traces: Mutex<Vec<TraceRecord>>,
    pub scores: Mutex<Vec<(Uuid, f64, Option<String>)>>,
}

#[async_trait]
impl FeedbackSink for RecordingSink {
    async fn export_trace(&self, trace: &TraceRecord) -> Result<()> {
        self.traces.lock().unwrap().push(trace.clone());
        Ok(())
    }

    async fn record(&self, trace_id: Uuid, rating: FeedbackRating, comment: Option<&str>) -> Result<()> {
        self.scores
            .lock()
            .unwrap()
            .push((trace_id, rating.score(), comment.map(str::to_string)));
        Ok(())
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        attempt_timeout: Duration::from_millis(500),
    }
}

pub fn guide() -> Arc<KnowledgeBase> {
    Arc::new(KnowledgeBase::from_file(GUIDE_PATH).unwrap())
}

pub fn engine(client: &Arc<StubClient>) -> TriageEngine<StubClient> {
    TriageEngine::new(Arc::clone(client), guide(), fast_retry())
}
