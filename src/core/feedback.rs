use crate::domain::model::{FeedbackRating, TraceRecord};
use crate::domain::ports::FeedbackSink;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::mpsc;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const DEFAULT_TRACE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_TRACE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct TraceEntry {
    trace_id: Uuid,
    inserted_at: Instant,
}

/// request_id → trace_id 的有界對照表 (TTL + 容量上限)
#[derive(Debug)]
pub struct TraceStore {
    entries: Mutex<HashMap<Uuid, TraceEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for TraceStore {
    fn default() -> Self {
        Self::new(DEFAULT_TRACE_TTL, DEFAULT_TRACE_CAPACITY)
    }
}

impl TraceStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn insert(&self, request_id: Uuid, trace_id: Uuid) {
        self.insert_at(request_id, trace_id, Instant::now());
    }

    fn insert_at(&self, request_id: Uuid, trace_id: Uuid, now: Instant) {
        let Ok(mut entries) = self.entries.lock() else {
            tracing::warn!("⚠️ Trace store lock poisoned; skipping trace for {}", request_id);
            return;
        };

        entries.retain(|_, entry| now.duration_since(entry.inserted_at) < self.ttl);

        // 仍然超過上限時淘汰最舊的
        while entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    entries.remove(&id);
                }
                None => break,
            }
        }

        entries.insert(
            request_id,
            TraceEntry {
                trace_id,
                inserted_at: now,
            },
        );
    }

    pub fn lookup(&self, request_id: &Uuid) -> Option<Uuid> {
        self.lookup_at(request_id, Instant::now())
    }

    fn lookup_at(&self, request_id: &Uuid, now: Instant) -> Option<Uuid> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(request_id) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => Some(entry.trace_id),
            Some(_) => {
                entries.remove(request_id);
                None
            }
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 送往接收端的事件；同一條佇列依序處理，保證追蹤先於評分
#[derive(Debug)]
enum SinkEvent {
    Trace(TraceRecord),
    Score {
        trace_id: Uuid,
        rating: FeedbackRating,
        comment: Option<String>,
    },
}

pub const SINK_QUEUE_CAPACITY: usize = 1024;

pub struct FeedbackRecorder {
    traces: Arc<TraceStore>,
    sink: Arc<dyn FeedbackSink>,
    queue: OnceLock<mpsc::Sender<SinkEvent>>,
}

impl FeedbackRecorder {
    pub fn new(traces: Arc<TraceStore>, sink: Arc<dyn FeedbackSink>) -> Self {
        Self {
            traces,
            sink,
            queue: OnceLock::new(),
        }
    }

    pub fn traces(&self) -> &Arc<TraceStore> {
        &self.traces
    }

    /// 請求完成後送出追蹤，不等待結果
    pub fn export(&self, trace: TraceRecord) {
        self.enqueue(SinkEvent::Trace(trace));
    }

    /// 找不到 request_id 時回傳 false；評分送出不等待結果
    pub fn record(&self, request_id: Uuid, rating: FeedbackRating, comment: Option<String>) -> bool {
        let Some(trace_id) = self.traces.lookup(&request_id) else {
            tracing::info!("🔍 Feedback for unknown or expired request {}", request_id);
            return false;
        };

        self.enqueue(SinkEvent::Score {
            trace_id,
            rating,
            comment,
        });
        true
    }

    // 第一次使用時才啟動背景工作，必須在 tokio runtime 內呼叫
    fn enqueue(&self, event: SinkEvent) {
        let queue = self.queue.get_or_init(|| {
            let (tx, rx) = mpsc::channel(SINK_QUEUE_CAPACITY);
            tokio::spawn(deliver(Arc::clone(&self.sink), rx));
            tx
        });

        if let Err(e) = queue.try_send(event) {
            tracing::warn!("⚠️ Feedback queue unavailable, dropping event: {}", e);
        }
    }
}

async fn deliver(sink: Arc<dyn FeedbackSink>, mut rx: mpsc::Receiver<SinkEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SinkEvent::Trace(trace) => {
                if let Err(e) = sink.export_trace(&trace).await {
                    tracing::warn!(trace_id = %trace.trace_id, "⚠️ Failed to export trace: {}", e);
                }
            }
            SinkEvent::Score {
                trace_id,
                rating,
                comment,
            } => {
                if let Err(e) = sink.record(trace_id, rating, comment.as_deref()).await {
                    tracing::warn!(trace_id = %trace_id, "⚠️ Failed to record feedback: {}", e);
                }
            }
        }
    }
}
