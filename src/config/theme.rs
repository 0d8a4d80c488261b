use crate::utils::error::Result;
use crate::utils::validation::{validate_hex_color, Validate};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// 所有模組共用、可在執行期更新的設定
pub type SharedConfiguration = Arc<RwLock<Configuration>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Colors {
    pub primary: String,
    pub primary_accent: String,
    pub secondary: String,
    pub background: String,
    pub error: String,
    pub success: String,
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            primary: "#FF7500".to_string(),
            primary_accent: "#FFF1E5".to_string(),
            secondary: "#24282E".to_string(),
            background: "#FFFFFF".to_string(),
            error: "#E34234".to_string(),
            success: "#21A366".to_string(),
        }
    }
}

impl Validate for Colors {
    fn validate(&self) -> Result<()> {
        validate_hex_color("theme.primary", &self.primary)?;
        validate_hex_color("theme.primary_accent", &self.primary_accent)?;
        validate_hex_color("theme.secondary", &self.secondary)?;
        validate_hex_color("theme.background", &self.background)?;
        validate_hex_color("theme.error", &self.error)?;
        validate_hex_color("theme.success", &self.success)?;
        Ok(())
    }
}

/// 畫面層讀取的外觀與語系設定
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub colors: Colors,
    pub locale: Option<String>,
}

impl Configuration {
    pub fn shared(self) -> SharedConfiguration {
        Arc::new(RwLock::new(self))
    }
}
