use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{
    ContentGenerator, GenerationRequest, GenerationResponse, GeneratorError, InitializeRequest,
};
use crate::config::EngineConfig;

/// HTTP adapter for the content-generator service. Bounded request timeout,
/// bounded retries with fixed backoff on transport and server errors.
pub struct HttpContentGenerator {
    client: reqwest::Client,
    base_url: String,
    enabled: bool,
    retry_attempts: u32,
    retry_backoff: std::time::Duration,
}

impl HttpContentGenerator {
    pub fn new(config: &EngineConfig) -> Result<Self, GeneratorError> {
        let client = reqwest::Client::builder()
            .timeout(config.generator_timeout)
            .build()
            .map_err(|e| GeneratorError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.generator_base_url.trim_end_matches('/').to_string(),
            enabled: config.generator_enabled,
            retry_attempts: config.generator_retry_attempts.max(1),
            retry_backoff: config.generator_retry_backoff,
        })
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, GeneratorError> {
        if !self.enabled {
            return Err(GeneratorError::Disabled);
        }
        let url = format!("{}{path}", self.base_url);

        let mut last_error = GeneratorError::Transport("no attempts made".into());
        for attempt in 1..=self.retry_attempts {
            match self.client.post(&url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<R>()
                            .await
                            .map_err(|e| GeneratorError::Malformed(e.to_string()));
                    }
                    // Client errors will not improve on retry.
                    if status.is_client_error() {
                        return Err(GeneratorError::Transport(format!(
                            "{url} returned {status}"
                        )));
                    }
                    last_error = GeneratorError::Transport(format!("{url} returned {status}"));
                }
                Err(err) if err.is_timeout() => last_error = GeneratorError::Timeout,
                Err(err) => last_error = GeneratorError::Transport(err.to_string()),
            }

            if attempt < self.retry_attempts {
                warn!(%url, attempt, error = %last_error, "generator call failed, retrying");
                tokio::time::sleep(self.retry_backoff).await;
            }
        }
        Err(last_error)
    }

    fn check_success(response: GenerationResponse) -> Result<GenerationResponse, GeneratorError> {
        if response.success {
            debug!(messages = response.messages.len(), "generator responded");
            Ok(response)
        } else {
            Err(GeneratorError::Rejected(
                response
                    .error_message
                    .unwrap_or_else(|| "no error message provided".to_string()),
            ))
        }
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn initialize(
        &self,
        request: InitializeRequest,
    ) -> Result<GenerationResponse, GeneratorError> {
        let response = self.post("/initialize-simulation", &request).await?;
        Self::check_success(response)
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GeneratorError> {
        let response = self.post("/generate-message", &request).await?;
        Self::check_success(response)
    }
}
