use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Upstream model unavailable after {attempts} attempt(s): {message}")]
    UpstreamUnavailable { attempts: u32, message: String },

    #[error("Classification output did not match schema: {message}")]
    ClassificationParse { message: String },

    #[error("Upstream returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Upstream call timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid configuration value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Upstream,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl TriageError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput { .. } => ErrorCategory::Input,
            Self::UpstreamUnavailable { .. }
            | Self::ClassificationParse { .. }
            | Self::UpstreamStatus { .. }
            | Self::Timeout { .. }
            | Self::ApiError(_) => ErrorCategory::Upstream,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::IoError(_) | Self::SerializationError(_) | Self::CsvError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ClassificationParse { .. } => ErrorSeverity::Low,
            Self::InvalidInput { .. }
            | Self::UpstreamUnavailable { .. }
            | Self::UpstreamStatus { .. }
            | Self::Timeout { .. }
            | Self::ApiError(_) => ErrorSeverity::Medium,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. }
            | Self::SerializationError(_)
            | Self::CsvError(_) => ErrorSeverity::High,
            Self::IoError(_) => ErrorSeverity::Critical,
        }
    }

    /// 命令列程式依嚴重程度決定退出碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    /// 判斷上游錯誤是否值得重試 (逾時、連線失敗、429、5xx)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            Self::ApiError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "Send a non-empty question in the `text` field",
            Self::UpstreamUnavailable { .. } | Self::Timeout { .. } | Self::ApiError(_) => {
                "Check network access to the model endpoint and retry later"
            }
            Self::UpstreamStatus { status, .. } if *status == 401 || *status == 403 => {
                "Check AZURE_OPENAI_API_KEY and the deployment permissions"
            }
            Self::UpstreamStatus { .. } => "Check the deployment name and api-version",
            Self::ClassificationParse { .. } => "No action needed; the request was routed to the disclaimer path",
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => {
                "Review the TOML config file or the AZURE_OPENAI_* environment variables"
            }
            Self::IoError(_) => "Check that the configured files exist and are readable",
            Self::SerializationError(_) => "Check the JSON payload format",
            Self::CsvError(_) => "Check that the dataset has `input` and `expected_output` columns",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::InvalidInput { message } => format!("Your message could not be processed: {}", message),
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => format!("Configuration problem: {}", self),
            _ => "The service is having trouble right now. Please try again shortly.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
