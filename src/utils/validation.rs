use crate::utils::error::{Result, TriageError};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> TriageError {
    TriageError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// 檢查使用者訊息：不可為空白，長度不可超過上限
pub fn validate_user_text(text: &str, max_chars: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(TriageError::invalid_input("message text is empty"));
    }

    let length = text.chars().count();
    if length > max_chars {
        return Err(TriageError::invalid_input(format!(
            "message is {} characters long; the limit is {}",
            length, max_chars
        )));
    }

    Ok(())
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    let url = Url::parse(url_str)
        .map_err(|e| invalid(field_name, url_str, format!("Invalid URL format: {}", e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(invalid(
            field_name,
            url_str,
            format!("Unsupported URL scheme: {}", scheme),
        )),
    }
}

/// 參考文件只接受純文字或 Markdown
pub fn validate_document_path(field_name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() || path.contains('\0') {
        return Err(invalid(field_name, path, "Path cannot be empty or contain null bytes"));
    }

    match std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some("md" | "txt") => Ok(()),
        Some(other) => Err(invalid(
            field_name,
            path,
            format!("Unsupported document extension: {}. Allowed: md, txt", other),
        )),
        None => Err(invalid(field_name, path, "Document has no extension")),
    }
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TriageError::MissingConfigError {
            field: field_name.to_string(),
        });
    }

    // ${VAR} 沒被替換代表環境變數缺漏
    if value.starts_with("${") && value.ends_with('}') {
        return Err(TriageError::ConfigValidationError {
            field: field_name.to_string(),
            message: format!("environment variable {} is not set", value),
        });
    }

    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}
