// Adapters layer: concrete implementations for external systems (model endpoint, feedback sink, http surface).

pub mod ask_client;
pub mod http;
pub mod langfuse;
pub mod openai;
