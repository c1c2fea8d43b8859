//! Session title generation via the backend's title endpoint.

use serde::{Deserialize, Serialize};

use parley_core::transport::TitleGenerator;
use parley_types::chat::{OutboundMessage, Role};
use parley_types::config::EngineConfig;
use parley_types::error::TransportError;

use super::{build_client, endpoint, ensure_success, network_error};

#[derive(Debug, Serialize)]
struct TitleRequest {
    messages: [OutboundMessage; 2],
}

#[derive(Debug, Deserialize)]
struct TitleResponse {
    title: String,
}

/// [`TitleGenerator`] that asks the backend to name a conversation.
#[derive(Debug, Clone)]
pub struct HttpTitleGenerator {
    client: reqwest::Client,
    url: String,
}

impl HttpTitleGenerator {
    pub fn new(config: &EngineConfig) -> Result<Self, TransportError> {
        Ok(Self::with_client(
            build_client(config)?,
            endpoint(&config.base_url, &config.title_path),
        ))
    }

    pub fn with_client(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

impl TitleGenerator for HttpTitleGenerator {
    #[tracing::instrument(
        name = "http_generate_title",
        skip(self, first_user_message, first_assistant_message),
        fields(url = %self.url)
    )]
    async fn generate_title(
        &self,
        first_user_message: &str,
        first_assistant_message: &str,
    ) -> Result<String, TransportError> {
        let body = TitleRequest {
            messages: [
                OutboundMessage {
                    role: Role::User,
                    content: first_user_message.to_string(),
                },
                OutboundMessage {
                    role: Role::Assistant,
                    content: first_assistant_message.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        let response = ensure_success(response).await?;

        let parsed: TitleResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(format!("failed to parse title response: {e}")))?;
        Ok(parsed.title)
    }
}
