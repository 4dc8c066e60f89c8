use crate::adapters::openai::DEFAULT_API_VERSION;
use crate::core::classifier::DEFAULT_MAX_INPUT_CHARS;
use crate::core::feedback::{DEFAULT_TRACE_CAPACITY, DEFAULT_TRACE_TTL};
use crate::core::knowledge::{DEFAULT_MAX_CONTEXT_CHARS, DEFAULT_TOP_K};
use crate::core::orchestrator::DEFAULT_REQUEST_TIMEOUT;
use crate::core::retry::RetryPolicy;
use crate::domain::model::{CompletionPurpose, RoutingMode};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{Result, TriageError};
use crate::utils::validation::Validate;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GUIDE_PATH: &str = "knowledge/joint_replacement_guide.md";

/// 從環境變數組出的配置 (Lambda 與未指定 --config 的伺服器)
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub triage_deployment: String,
    pub answer_deployment: String,
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub routing_mode: RoutingMode,
    pub max_input_chars: usize,
    pub guide_path: String,
    pub top_k: usize,
    pub max_context_chars: usize,
    pub trace_ttl: Duration,
    pub trace_capacity: usize,
    pub langfuse: Option<LangfuseKeys>,
    pub monitoring: bool,
}

#[derive(Debug, Clone)]
pub struct LangfuseKeys {
    pub host: String,
    pub public_key: String,
    pub secret_key: String,
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| TriageError::InvalidConfigValueError {
            field: key.to_string(),
            value: raw.clone(),
            reason: "could not be parsed".to_string(),
        }),
    }
}

impl EnvConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 以任意查詢函式取值，空字串視同未設定
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| TriageError::MissingConfigError {
                field: key.to_string(),
            })
        };

        // 未分別指定時兩個用途共用同一個部署
        let shared_deployment = get("AZURE_OPENAI_DEPLOYMENT");
        let deployment = |key: &str| {
            get(key)
                .or_else(|| shared_deployment.clone())
                .ok_or_else(|| TriageError::MissingConfigError {
                    field: key.to_string(),
                })
        };

        let defaults = RetryPolicy::default();
        let call_timeout = Duration::from_secs(parse_or(
            get("MODEL_TIMEOUT_SECONDS"),
            "MODEL_TIMEOUT_SECONDS",
            defaults.attempt_timeout.as_secs(),
        )?);
        let retry = RetryPolicy {
            max_retries: parse_or(get("MODEL_RETRY_ATTEMPTS"), "MODEL_RETRY_ATTEMPTS", defaults.max_retries)?,
            base_delay: Duration::from_millis(parse_or(
                get("MODEL_RETRY_BASE_DELAY_MS"),
                "MODEL_RETRY_BASE_DELAY_MS",
                defaults.base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                get("MODEL_RETRY_MAX_DELAY_MS"),
                "MODEL_RETRY_MAX_DELAY_MS",
                defaults.max_delay.as_millis() as u64,
            )?),
            attempt_timeout: call_timeout,
        };

        let routing_mode = match get("ROUTING_MODE").map(|m| m.to_ascii_lowercase()) {
            None => RoutingMode::Triage,
            Some(m) if m == "triage" => RoutingMode::Triage,
            Some(m) if m == "direct" => RoutingMode::Direct,
            Some(other) => {
                return Err(TriageError::InvalidConfigValueError {
                    field: "ROUTING_MODE".to_string(),
                    value: other,
                    reason: "expected 'triage' or 'direct'".to_string(),
                })
            }
        };

        let langfuse = match (
            get("LANGFUSE_HOST"),
            get("LANGFUSE_PUBLIC_KEY"),
            get("LANGFUSE_SECRET_KEY"),
        ) {
            (Some(host), Some(public_key), Some(secret_key)) => Some(LangfuseKeys {
                host,
                public_key,
                secret_key,
            }),
            _ => None,
        };

        Ok(Self {
            endpoint: required("AZURE_OPENAI_ENDPOINT")?,
            api_key: required("AZURE_OPENAI_API_KEY")?,
            api_version: get("AZURE_OPENAI_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            triage_deployment: deployment("AZURE_OPENAI_TRIAGE_MODEL")?,
            answer_deployment: deployment("AZURE_OPENAI_CARE_NAV_MODEL")?,
            call_timeout,
            retry,
            request_timeout: Duration::from_secs(parse_or(
                get("REQUEST_TIMEOUT_SECONDS"),
                "REQUEST_TIMEOUT_SECONDS",
                DEFAULT_REQUEST_TIMEOUT.as_secs(),
            )?),
            routing_mode,
            max_input_chars: parse_or(get("MAX_INPUT_CHARS"), "MAX_INPUT_CHARS", DEFAULT_MAX_INPUT_CHARS)?,
            guide_path: get("JOINT_GUIDE_PATH").unwrap_or_else(|| DEFAULT_GUIDE_PATH.to_string()),
            top_k: parse_or(get("GUIDE_TOP_K"), "GUIDE_TOP_K", DEFAULT_TOP_K)?,
            max_context_chars: parse_or(
                get("GUIDE_MAX_CONTEXT_CHARS"),
                "GUIDE_MAX_CONTEXT_CHARS",
                DEFAULT_MAX_CONTEXT_CHARS,
            )?,
            trace_ttl: Duration::from_secs(parse_or(
                get("TRACE_TTL_SECONDS"),
                "TRACE_TTL_SECONDS",
                DEFAULT_TRACE_TTL.as_secs(),
            )?),
            trace_capacity: parse_or(get("TRACE_MAX_ENTRIES"), "TRACE_MAX_ENTRIES", DEFAULT_TRACE_CAPACITY)?,
            langfuse,
            monitoring: parse_or(get("MONITORING_ENABLED"), "MONITORING_ENABLED", false)?,
        })
    }
}

impl ConfigProvider for EnvConfig {
    fn model_endpoint(&self) -> &str {
        &self.endpoint
    }

    fn api_key(&self) -> &str {
        &self.api_key
    }

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn deployment(&self, purpose: CompletionPurpose) -> &str {
        match purpose {
            CompletionPurpose::Triage => &self.triage_deployment,
            CompletionPurpose::Answer => &self.answer_deployment,
        }
    }

    fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    fn retry_attempts(&self) -> u32 {
        self.retry.max_retries
    }

    fn retry_base_delay(&self) -> Duration {
        self.retry.base_delay
    }

    fn retry_max_delay(&self) -> Duration {
        self.retry.max_delay
    }

    fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn routing_mode(&self) -> RoutingMode {
        self.routing_mode
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn guide_path(&self) -> &str {
        &self.guide_path
    }

    fn excerpt_top_k(&self) -> usize {
        self.top_k
    }

    fn max_context_chars(&self) -> usize {
        self.max_context_chars
    }

    fn trace_ttl(&self) -> Duration {
        self.trace_ttl
    }

    fn trace_capacity(&self) -> usize {
        self.trace_capacity
    }

    fn langfuse(&self) -> Option<(&str, &str, &str)> {
        self.langfuse
            .as_ref()
            .map(|k| (k.host.as_str(), k.public_key.as_str(), k.secret_key.as_str()))
    }

    fn monitoring_enabled(&self) -> bool {
        self.monitoring
    }
}

impl Validate for EnvConfig {
    fn validate(&self) -> Result<()> {
        use crate::utils::validation::*;

        // 驗證模型端點
        validate_url("AZURE_OPENAI_ENDPOINT", &self.endpoint)?;
        validate_non_empty_string("AZURE_OPENAI_API_KEY", &self.api_key)?;
        validate_range("MODEL_RETRY_ATTEMPTS", self.retry.max_retries, 0, 5)?;
        validate_range("MODEL_TIMEOUT_SECONDS", self.call_timeout.as_secs(), 1, 120)?;
        validate_range("MAX_INPUT_CHARS", self.max_input_chars, 1, 1_000_000)?;

        // 驗證參考文件
        validate_document_path("JOINT_GUIDE_PATH", &self.guide_path)?;
        validate_range("GUIDE_TOP_K", self.top_k, 1, 20)?;
        validate_range("GUIDE_MAX_CONTEXT_CHARS", self.max_context_chars, 1, 1_000_000)?;
        validate_range("TRACE_MAX_ENTRIES", self.trace_capacity, 1, 1_000_000)?;

        self.retry
            .check_request_timeout("REQUEST_TIMEOUT_SECONDS", self.request_timeout)?;

        if let Some(keys) = &self.langfuse {
            validate_url("LANGFUSE_HOST", &keys.host)?;
        }

        tracing::info!("✅ Environment configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com"),
        ("AZURE_OPENAI_API_KEY", "key"),
        ("AZURE_OPENAI_DEPLOYMENT", "gpt-4o"),
    ];

    #[test]
    fn test_defaults_from_minimal_environment() {
        let config = EnvConfig::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.deployment(CompletionPurpose::Triage), "gpt-4o");
        assert_eq!(config.deployment(CompletionPurpose::Answer), "gpt-4o");
        assert_eq!(config.api_version(), DEFAULT_API_VERSION);
        assert_eq!(config.guide_path(), DEFAULT_GUIDE_PATH);
        assert_eq!(config.routing_mode(), RoutingMode::Triage);
        assert!(config.langfuse().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_per_purpose_deployments_override_shared() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("AZURE_OPENAI_TRIAGE_MODEL", "gpt-4o-mini"));
        let config = EnvConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.deployment(CompletionPurpose::Triage), "gpt-4o-mini");
        assert_eq!(config.deployment(CompletionPurpose::Answer), "gpt-4o");
    }

    #[test]
    fn test_missing_api_key_is_reported() {
        let result = EnvConfig::from_lookup(lookup(&[
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com"),
            ("AZURE_OPENAI_DEPLOYMENT", "gpt-4o"),
        ]));

        match result {
            Err(TriageError::MissingConfigError { field }) => assert_eq!(field, "AZURE_OPENAI_API_KEY"),
            other => panic!("expected missing api key, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_routing_mode_and_numbers() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ROUTING_MODE", "sideways"));
        assert!(EnvConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MODEL_RETRY_ATTEMPTS", "many"));
        assert!(EnvConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_direct_mode_and_langfuse_keys() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("ROUTING_MODE", "Direct"),
            ("LANGFUSE_HOST", "https://cloud.langfuse.com"),
            ("LANGFUSE_PUBLIC_KEY", "pk"),
            ("LANGFUSE_SECRET_KEY", "sk"),
        ]);
        let config = EnvConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.routing_mode(), RoutingMode::Direct);
        assert_eq!(config.langfuse(), Some(("https://cloud.langfuse.com", "pk", "sk")));
    }

    #[test]
    fn test_request_timeout_must_cover_retry_budget() {
        // 3 attempts x 10s per stage no longer fit in a 30s request
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("MODEL_TIMEOUT_SECONDS", "10"), ("REQUEST_TIMEOUT_SECONDS", "30")]);
        let config = EnvConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(matches!(
            config.validate(),
            Err(TriageError::ConfigValidationError { ref field, .. }) if field == "REQUEST_TIMEOUT_SECONDS"
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("MODEL_TIMEOUT_SECONDS", "10"), ("REQUEST_TIMEOUT_SECONDS", "62")]);
        let config = EnvConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        for key in ["MAX_INPUT_CHARS", "GUIDE_MAX_CONTEXT_CHARS", "TRACE_MAX_ENTRIES"] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, "0"));
            let config = EnvConfig::from_lookup(lookup(&pairs)).unwrap();

            match config.validate() {
                Err(TriageError::InvalidConfigValueError { field, .. }) => assert_eq!(field, key),
                other => panic!("expected {} to be rejected, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_request_timeout_shorter_than_call_timeout_is_invalid() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("MODEL_TIMEOUT_SECONDS", "20"), ("REQUEST_TIMEOUT_SECONDS", "5")]);
        let config = EnvConfig::from_lookup(lookup(&pairs)).unwrap();

        assert!(config.validate().is_err());
    }
}
