//! Port traits for the chat backend.
//!
//! `ChatTransport` opens the streaming chat request; `TitleGenerator` asks
//! the backend for a session title. Both use native async fn in traits
//! (RPITIT, Rust 2024 edition). Implementations live in parley-infra.

use tokio_util::sync::CancellationToken;

use parley_types::chat::ChatRequestBody;
use parley_types::error::TransportError;

use crate::stream::decoder::ByteStream;

/// Opens the streaming chat request and exposes the response body.
pub trait ChatTransport: Send + Sync {
    /// Send `body` and return the response body as a byte stream.
    ///
    /// Must resolve to `TransportError::Cancelled` if `cancel` fires while
    /// waiting for response headers. A non-success status becomes a single
    /// `TransportError::Http` carrying the server's detail text when
    /// available.
    fn open(
        &self,
        body: &ChatRequestBody,
        cancel: CancellationToken,
    ) -> impl std::future::Future<Output = Result<ByteStream, TransportError>> + Send;
}

/// Produces a short title from a conversation's first exchange.
pub trait TitleGenerator: Send + Sync {
    fn generate_title(
        &self,
        first_user_message: &str,
        first_assistant_message: &str,
    ) -> impl std::future::Future<Output = Result<String, TransportError>> + Send;
}
