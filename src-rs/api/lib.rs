pub mod handlers;
pub mod server;

use std::sync::Arc;

use thiserror::Error;

use crate::agent::{Agent, AgentError};
use crate::config::Settings;
use crate::helpers::build_engine;
use crate::llm::{ProviderAdapter, ProviderError};
use crate::store::{DocumentStore, MemoryStore, StoreError};

pub use server::{build_router, serve, ServerError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open procurement data: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build reasoning engine: {0}")]
    Provider(#[from] ProviderError),

    #[error("failed to build agent: {0}")]
    Agent(#[from] AgentError),
}

/// Shared services handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub store: Arc<dyn DocumentStore>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(agent: Arc<Agent>, store: Arc<dyn DocumentStore>, settings: Settings) -> Self {
        Self {
            agent,
            store,
            settings: Arc::new(settings),
        }
    }

    /// Opens the collection, builds the engine and compiles the agent.
    pub fn start(settings: Settings) -> Result<Self, StartupError> {
        tracing::info!("starting California procurement assistant");
        let store: Arc<dyn DocumentStore> =
            Arc::new(MemoryStore::open(&settings.data_path, &settings.collection_name)?);
        store.ping()?;
        let engine: Arc<dyn ProviderAdapter> = build_engine(&settings)?;
        let agent = Agent::new(settings.agent.clone(), engine, store.clone())?;
        tracing::info!(collection = store.collection_name(), "backend ready");
        Ok(Self::new(Arc::new(agent), store, settings))
    }

    pub fn shutdown(&self) {
        tracing::info!(collection = self.store.collection_name(), "shutting down, closing store");
    }
}
