//! Application state wiring the engine to its infrastructure.
//!
//! AppState loads configuration and the session store once. The chat
//! orchestrator is generic over transport/storage/title traits; the alias
//! below pins it to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use parley_core::chat::orchestrator::ChatOrchestrator;
use parley_core::session::store::SessionStore;
use parley_infra::config::load_engine_config;
use parley_infra::filesystem::{FileStorage, resolve_data_dir};
use parley_infra::http::chat::HttpChatTransport;
use parley_infra::http::title::HttpTitleGenerator;
use parley_types::config::EngineConfig;

pub type ConcreteStore = SessionStore<FileStorage>;

pub type ConcreteOrchestrator =
    ChatOrchestrator<HttpChatTransport, FileStorage, HttpTitleGenerator>;

/// Shared state for CLI commands.
pub struct AppState {
    pub config: EngineConfig,
    pub data_dir: PathBuf,
    pub store: Arc<ConcreteStore>,
}

impl AppState {
    /// Resolve the data dir, load config, and open the session store.
    ///
    /// `base_url` overrides the configured backend.
    pub async fn init(base_url: Option<String>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let mut config = load_engine_config(&data_dir).await;
        if let Some(base_url) = base_url {
            config.base_url = base_url;
        }

        let storage = FileStorage::new(&data_dir);
        let store = SessionStore::load(storage, config.store_config()).await?;
        tracing::debug!(
            data_dir = %data_dir.display(),
            sessions = store.sessions().len(),
            "session store loaded"
        );

        Ok(Self {
            config,
            data_dir,
            store: Arc::new(store),
        })
    }

    /// Build a chat orchestrator over the shared store.
    pub fn orchestrator(&self) -> anyhow::Result<ConcreteOrchestrator> {
        let transport = HttpChatTransport::new(&self.config)?;
        let titles = HttpTitleGenerator::new(&self.config)?;
        Ok(ChatOrchestrator::new(
            transport,
            Arc::clone(&self.store),
            titles,
            self.config.max_file_bytes,
        ))
    }
}
