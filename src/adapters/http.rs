use crate::config::SdkConfig;
use crate::domain::model::{ApiError, IdentificationMethod};
use crate::domain::ports::NetworkClient;
use crate::utils::error::{IdentError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

const IDENTIFICATION_METHOD_PATH: &str = "v1/identification_method";

/// 以 session token 呼叫 IdentHub 後端的 HTTP 客戶端
#[derive(Debug, Clone)]
pub struct HttpNetworkClient {
    client: Client,
    base_url: Url,
    session_token: String,
}

impl HttpNetworkClient {
    pub fn new(base_url: &str, session_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url).map_err(|e| IdentError::InvalidConfigValueError {
            field: "api.base_url".to_string(),
            value: base_url.to_string(),
            reason: e.to_string(),
        })?;
        // join() 會取代最後一段路徑，確保結尾有斜線
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            session_token: session_token.into(),
        })
    }

    pub fn from_config(config: &SdkConfig) -> Result<Self> {
        Self::new(
            &config.api.base_url,
            config.api.session_token.clone(),
            config.timeout(),
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| IdentError::ConfigError {
                message: format!("Invalid endpoint '{}': {}", path, e),
            })
    }
}

#[async_trait]
impl NetworkClient for HttpNetworkClient {
    async fn fetch_identification_method(&self) -> Result<IdentificationMethod> {
        let url = self.endpoint(IDENTIFICATION_METHOD_PATH)?;
        tracing::debug!("Fetching identification method from {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.session_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("⚠️ Identification method request failed with {}", status);
            return Err(ApiError::from_status(status.as_u16(), body).into());
        }

        let method: IdentificationMethod = response.json().await?;
        tracing::info!(
            "📋 Identification method: first step {}, fallback {:?}",
            method.first_step,
            method.fallback_step.map(|s| s.to_string())
        );
        Ok(method)
    }
}
