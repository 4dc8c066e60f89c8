pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::openai::AzureOpenAiClient;
pub use config::{EnvConfig, TomlConfig};
pub use core::orchestrator::TriageEngine;
pub use domain::model::{Category, Classification, HandlerKind, Response, RoutingMode};
pub use utils::error::{Result, TriageError};
