//! Streaming chat transport over reqwest.
//!
//! POSTs the request body as JSON and hands the response body to the core
//! decoder as raw byte buffers. Waiting for response headers is raced
//! against the call's cancellation token; body reads are raced by the
//! orchestrator.

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use tokio_util::sync::CancellationToken;

use parley_core::stream::decoder::ByteStream;
use parley_core::transport::ChatTransport;
use parley_types::chat::ChatRequestBody;
use parley_types::config::EngineConfig;
use parley_types::error::TransportError;

use super::{build_client, endpoint, ensure_success, network_error};

/// [`ChatTransport`] backed by the backend's streaming chat endpoint.
#[derive(Debug, Clone)]
pub struct HttpChatTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpChatTransport {
    pub fn new(config: &EngineConfig) -> Result<Self, TransportError> {
        Ok(Self::with_client(
            build_client(config)?,
            endpoint(&config.base_url, &config.chat_path),
        ))
    }

    pub fn with_client(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

impl ChatTransport for HttpChatTransport {
    async fn open(
        &self,
        body: &ChatRequestBody,
        cancel: CancellationToken,
    ) -> Result<ByteStream, TransportError> {
        let request = self
            .client
            .post(&self.url)
            .header(ACCEPT, "text/event-stream")
            .json(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            response = request => response.map_err(network_error)?,
        };
        let response = ensure_success(response).await?;
        tracing::debug!(status = response.status().as_u16(), "chat stream opened");

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(network_error));
        Ok(bytes.boxed())
    }
}
