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
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub service: ServiceConfig,
    pub model: ModelConfig,
    pub knowledge: KnowledgeConfig,
    pub feedback: Option<FeedbackConfig>,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub routing_mode: RoutingMode,
    pub request_timeout_seconds: Option<u64>,
    pub max_input_chars: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: Option<String>,
    pub triage_deployment: String,
    pub answer_deployment: String,
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    pub guide_path: String,
    pub top_k: Option<usize>,
    pub max_context_chars: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    pub langfuse_host: Option<String>,
    pub langfuse_public_key: Option<String>,
    pub langfuse_secret_key: Option<String>,
    pub trace_ttl_seconds: Option<u64>,
    pub max_traces: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub json_logs: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| TriageError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${AZURE_OPENAI_API_KEY})；未設定的保留原樣，交給驗證階段報錯
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::{Captures, Regex};

        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| TriageError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.into_owned())
    }

    fn feedback_field<'a>(&'a self, pick: impl Fn(&'a FeedbackConfig) -> Option<&'a String>) -> Option<&'a str> {
        self.feedback
            .as_ref()
            .and_then(pick)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty() && !v.starts_with("${"))
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        use crate::utils::validation::*;

        validate_url("model.endpoint", &self.model.endpoint)?;
        validate_non_empty_string("model.api_key", &self.model.api_key)?;
        validate_non_empty_string("model.triage_deployment", &self.model.triage_deployment)?;
        validate_non_empty_string("model.answer_deployment", &self.model.answer_deployment)?;
        validate_range("model.retry_attempts", self.retry_attempts(), 0, 5)?;
        validate_range("model.timeout_seconds", self.call_timeout().as_secs(), 1, 120)?;
        validate_range("service.max_input_chars", self.max_input_chars(), 1, 1_000_000)?;
        validate_document_path("knowledge.guide_path", &self.knowledge.guide_path)?;
        validate_range("knowledge.top_k", self.excerpt_top_k(), 1, 20)?;
        validate_range("knowledge.max_context_chars", self.max_context_chars(), 1, 1_000_000)?;
        validate_range("feedback.max_traces", self.trace_capacity(), 1, 1_000_000)?;

        // 整體逾時必須容納分類與回答兩個階段的完整重試
        RetryPolicy::from_config(self)
            .check_request_timeout("service.request_timeout_seconds", self.request_timeout())?;

        if let Some(host) = self.feedback_field(|f| f.langfuse_host.as_ref()) {
            validate_url("feedback.langfuse_host", host)?;
        }

        tracing::info!("✅ TOML configuration validation passed");
        Ok(())
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.json_logs)
            .unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn model_endpoint(&self) -> &str {
        &self.model.endpoint
    }

    fn api_key(&self) -> &str {
        &self.model.api_key
    }

    fn api_version(&self) -> &str {
        self.model.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
    }

    fn deployment(&self, purpose: CompletionPurpose) -> &str {
        match purpose {
            CompletionPurpose::Triage => &self.model.triage_deployment,
            CompletionPurpose::Answer => &self.model.answer_deployment,
        }
    }

    fn call_timeout(&self) -> Duration {
        self.model
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(RetryPolicy::default().attempt_timeout)
    }

    fn retry_attempts(&self) -> u32 {
        self.model
            .retry_attempts
            .unwrap_or(RetryPolicy::default().max_retries)
    }

    fn retry_base_delay(&self) -> Duration {
        self.model
            .retry_base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(RetryPolicy::default().base_delay)
    }

    fn retry_max_delay(&self) -> Duration {
        self.model
            .retry_max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(RetryPolicy::default().max_delay)
    }

    fn request_timeout(&self) -> Duration {
        self.service
            .request_timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    fn routing_mode(&self) -> RoutingMode {
        self.service.routing_mode
    }

    fn max_input_chars(&self) -> usize {
        self.service.max_input_chars.unwrap_or(DEFAULT_MAX_INPUT_CHARS)
    }

    fn guide_path(&self) -> &str {
        &self.knowledge.guide_path
    }

    fn excerpt_top_k(&self) -> usize {
        self.knowledge.top_k.unwrap_or(DEFAULT_TOP_K)
    }

    fn max_context_chars(&self) -> usize {
        self.knowledge
            .max_context_chars
            .unwrap_or(DEFAULT_MAX_CONTEXT_CHARS)
    }

    fn trace_ttl(&self) -> Duration {
        self.feedback
            .as_ref()
            .and_then(|f| f.trace_ttl_seconds)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TRACE_TTL)
    }

    fn trace_capacity(&self) -> usize {
        self.feedback
            .as_ref()
            .and_then(|f| f.max_traces)
            .unwrap_or(DEFAULT_TRACE_CAPACITY)
    }

    fn langfuse(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.feedback_field(|f| f.langfuse_host.as_ref())?,
            self.feedback_field(|f| f.langfuse_public_key.as_ref())?,
            self.feedback_field(|f| f.langfuse_secret_key.as_ref())?,
        ))
    }

    fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
[service]
name = "care-triage"

[model]
endpoint = "https://example.openai.azure.com"
api_key = "test-key"
triage_deployment = "gpt-4o-mini"
answer_deployment = "gpt-4o"

[knowledge]
guide_path = "knowledge/joint_replacement_guide.md"
"#;

    #[test]
    fn test_parse_basic_toml_config() {
        let config = TomlConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(config.service.name, "care-triage");
        assert_eq!(config.routing_mode(), RoutingMode::Triage);
        assert_eq!(config.deployment(CompletionPurpose::Triage), "gpt-4o-mini");
        assert_eq!(config.deployment(CompletionPurpose::Answer), "gpt-4o");
        assert_eq!(config.api_version(), DEFAULT_API_VERSION);
        assert_eq!(config.retry_attempts(), 2);
        assert!(config.langfuse().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("CARE_TRIAGE_TEST_API_KEY", "from-env");

        let toml_content = BASIC.replace("\"test-key\"", "\"${CARE_TRIAGE_TEST_API_KEY}\"");
        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert_eq!(config.api_key(), "from-env");

        std::env::remove_var("CARE_TRIAGE_TEST_API_KEY");
    }

    #[test]
    fn test_missing_env_var_fails_validation() {
        let toml_content = BASIC.replace("\"test-key\"", "\"${CARE_TRIAGE_TEST_UNSET_KEY}\"");
        let config = TomlConfig::from_toml_str(&toml_content).unwrap();

        assert_eq!(config.api_key(), "${CARE_TRIAGE_TEST_UNSET_KEY}");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_bad_endpoint() {
        let toml_content = BASIC.replace("https://example.openai.azure.com", "invalid-url");
        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_direct_mode_and_feedback_section() {
        let toml_content = format!(
            "{}\n[feedback]\nlangfuse_host = \"https://cloud.langfuse.com\"\nlangfuse_public_key = \"pk\"\nlangfuse_secret_key = \"sk\"\ntrace_ttl_seconds = 60\n",
            BASIC.replace("name = \"care-triage\"", "name = \"care-triage\"\nrouting_mode = \"direct\"")
        );
        let config = TomlConfig::from_toml_str(&toml_content).unwrap();

        assert_eq!(config.routing_mode(), RoutingMode::Direct);
        assert_eq!(
            config.langfuse(),
            Some(("https://cloud.langfuse.com", "pk", "sk"))
        );
        assert_eq!(config.trace_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_long_model_timeout_needs_longer_request_timeout() {
        let slow = BASIC.replace(
            "answer_deployment = \"gpt-4o\"",
            "answer_deployment = \"gpt-4o\"\ntimeout_seconds = 10",
        );
        let config = TomlConfig::from_toml_str(&slow).unwrap();
        assert!(matches!(
            config.validate(),
            Err(TriageError::ConfigValidationError { ref field, .. }) if field == "service.request_timeout_seconds"
        ));

        let patient = slow.replace(
            "name = \"care-triage\"",
            "name = \"care-triage\"\nrequest_timeout_seconds = 62",
        );
        assert!(TomlConfig::from_toml_str(&patient).unwrap().validate().is_ok());
    }

    #[test]
    fn test_zero_limits_fail_validation() {
        let cases = [
            ("service.max_input_chars", BASIC.replace("name = \"care-triage\"", "name = \"care-triage\"\nmax_input_chars = 0")),
            (
                "knowledge.max_context_chars",
                format!("{}max_context_chars = 0\n", BASIC),
            ),
            ("feedback.max_traces", format!("{}\n[feedback]\nmax_traces = 0\n", BASIC)),
        ];

        for (field, toml_content) in cases {
            let config = TomlConfig::from_toml_str(&toml_content).unwrap();
            match config.validate() {
                Err(TriageError::InvalidConfigValueError { field: reported, .. }) => assert_eq!(reported, field),
                other => panic!("expected {} to be rejected, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.service.name, "care-triage");
    }
}
