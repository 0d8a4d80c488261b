use crate::config::theme::{Colors, Configuration};
use crate::utils::error::{IdentError, Result};
use crate::utils::validation::{
    validate_path, validate_positive_number, validate_secret, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// SDK 主機端設定檔
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub theme: Option<Colors>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub session_token: String,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: String,
    /// 關閉時鍵值資料只留在記憶體
    pub persist: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub verbose: Option<bool>,
    pub json: Option<bool>,
}

impl SdkConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(IdentError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| IdentError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${IDENTHUB_SESSION_TOKEN})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| IdentError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }

    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(&self.storage.root)
    }

    pub fn persist_storage(&self) -> bool {
        self.storage.persist.unwrap_or(true)
    }

    pub fn verbose(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.verbose)
            .unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }

    pub fn configuration(&self) -> Configuration {
        Configuration {
            colors: self.theme.clone().unwrap_or_default(),
            locale: None,
        }
    }
}

impl Validate for SdkConfig {
    fn validate(&self) -> Result<()> {
        validate_url("api.base_url", &self.api.base_url)?;
        validate_secret("api.session_token", &self.api.session_token)?;
        if let Some(timeout) = self.api.timeout_seconds {
            validate_positive_number("api.timeout_seconds", timeout, 1)?;
        }
        validate_path("storage.root", &self.storage.root)?;
        if let Some(colors) = &self.theme {
            colors.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r##"
[api]
base_url = "https://api.identhub.example"
session_token = "token-123"

[storage]
root = "./identhub-data"
"##;

    #[test]
    fn test_parse_basic_config() {
        let config = SdkConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(config.api.base_url, "https://api.identhub.example");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.persist_storage());
        assert!(!config.verbose());
        assert_eq!(config.configuration(), Configuration::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("IDENTHUB_TEST_TOKEN", "secret-from-env");

        let config = SdkConfig::from_toml_str(
            r#"
[api]
base_url = "https://api.identhub.example"
session_token = "${IDENTHUB_TEST_TOKEN}"

[storage]
root = "./data"
persist = false
"#,
        )
        .unwrap();

        assert_eq!(config.api.session_token, "secret-from-env");
        assert!(!config.persist_storage());

        std::env::remove_var("IDENTHUB_TEST_TOKEN");
    }

    #[test]
    fn test_unset_token_variable_fails_validation() {
        let config = SdkConfig::from_toml_str(
            r#"
[api]
base_url = "https://api.identhub.example"
session_token = "${IDENTHUB_TOKEN_THAT_IS_NOT_SET}"

[storage]
root = "./data"
"#,
        )
        .unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_theme_color_fails_validation() {
        let content = format!(
            "{}\n[theme]\nprimary = \"orange\"\nprimary_accent = \"#FFF1E5\"\nsecondary = \"#24282E\"\nbackground = \"#FFFFFF\"\nerror = \"#E34234\"\nsuccess = \"#21A366\"\n",
            BASIC
        );
        let config = SdkConfig::from_toml_str(&content).unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("theme.primary"));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(format!("{}\n[logging]\nverbose = true\n", BASIC).as_bytes())
            .unwrap();

        let config = SdkConfig::from_file(temp_file.path()).unwrap();
        assert!(config.verbose());
        assert_eq!(config.storage_root(), PathBuf::from("./identhub-data"));
    }

    #[test]
    fn test_missing_section_is_config_error() {
        let result = SdkConfig::from_toml_str("[api]\nbase_url = \"https://x.example\"\n");
        assert!(matches!(result, Err(IdentError::ConfigError { .. })));
    }
}
