use crate::utils::error::{IdentError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl ToString, reason: impl Into<String>) -> IdentError {
    IdentError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// 後端位址只接受 http 與 https
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

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

/// 檢查 `#RRGGBB` 或 `#RRGGBBAA` 格式的顏色
pub fn validate_hex_color(field_name: &str, value: &str) -> Result<()> {
    let digits = value.strip_prefix('#').unwrap_or("");
    let valid = matches!(digits.len(), 6 | 8) && digits.chars().all(|c| c.is_ascii_hexdigit());

    if !valid {
        return Err(invalid(
            field_name,
            value,
            "Expected a color in #RRGGBB or #RRGGBBAA format",
        ));
    }
    Ok(())
}

/// 空字串或殘留 `${VAR}` 佔位符都視為未設定
pub fn validate_secret(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(field_name, value, "Value cannot be empty or whitespace-only"));
    }
    if value.contains("${") {
        return Err(invalid(field_name, value, "Environment variable is not set"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("api.base_url", "https://example.com").is_ok());
        assert!(validate_url("api.base_url", "http://example.com").is_ok());
        assert!(validate_url("api.base_url", "").is_err());
        assert!(validate_url("api.base_url", "invalid-url").is_err());
        assert!(validate_url("api.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("api.timeout_seconds", 5, 1).is_ok());
        assert!(validate_positive_number("api.timeout_seconds", 0, 1).is_err());
    }

    #[test]
    fn test_validate_hex_color() {
        assert!(validate_hex_color("theme.primary_color", "#FF5A00").is_ok());
        assert!(validate_hex_color("theme.primary_color", "#ff5a00cc").is_ok());
        assert!(validate_hex_color("theme.primary_color", "FF5A00").is_err());
        assert!(validate_hex_color("theme.primary_color", "#FF5A0").is_err());
        assert!(validate_hex_color("theme.primary_color", "#GG5A00").is_err());
    }

    #[test]
    fn test_validate_secret() {
        assert!(validate_secret("api.session_token", "abc").is_ok());
        assert!(validate_secret("api.session_token", "   ").is_err());
        assert!(validate_secret("api.session_token", "${IDENTHUB_TOKEN}").is_err());
    }
}
