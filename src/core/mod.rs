pub mod classifier;
pub mod evaluation;
pub mod feedback;
pub mod handlers;
pub mod knowledge;
pub mod orchestrator;
pub mod retry;
pub mod router;

pub use crate::domain::model::{Category, Classification, HandlerKind, Request, Response, RoutingDecision};
pub use crate::domain::ports::{CompletionClient, ConfigProvider, FeedbackSink, ResponseHandler};
pub use crate::utils::error::Result;
