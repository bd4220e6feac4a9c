//! Builds the long-lived components from one [`AppConfig`].

use std::sync::Arc;

use anyhow::{Context, bail};
use docsage_agent::Orchestrator;
use docsage_config::{AppConfig, IndexBackend};
use docsage_core::event::EventBus;
use docsage_core::filter::{QueryFilter, QueryFilterBuilder};
use docsage_core::index::{DocumentStore, Embedder, VectorIndex};
use docsage_core::provider::Provider;
use docsage_index::{
    HashEmbedder, InMemoryDocumentStore, InMemoryVectorIndex, ProviderEmbedder, Retriever,
    SqliteIndex,
};
use docsage_ingest::{Chunker, IngestionPipeline};
use docsage_providers::ProviderRouter;
use docsage_tools::{ToolDeps, ToolFactories};
use tracing::{info, warn};

pub struct Runtime {
    pub config: AppConfig,
    pub events: Arc<EventBus>,
    router: ProviderRouter,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
}

impl Runtime {
    pub async fn open(config: AppConfig) -> anyhow::Result<Self> {
        let router = docsage_providers::router::build_from_config(&config);
        let embedder = build_embedder(&config, &router)?;
        let (index, store) = build_index(&config).await?;

        info!(
            provider = %config.default_provider,
            model = %config.default_model,
            embedder = embedder.model(),
            index = index.name(),
            "Runtime ready"
        );

        Ok(Self {
            config,
            events: Arc::new(EventBus::default()),
            router,
            embedder,
            index,
            store,
        })
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn pipeline(&self) -> IngestionPipeline {
        IngestionPipeline::new(self.embedder.clone(), self.index.clone(), self.store.clone())
            .with_chunker(Chunker::from_config(&self.config.ingestion))
            .with_concurrency(self.config.ingestion.concurrency)
            .with_events(self.events.clone())
    }

    pub fn chat_provider(&self) -> anyhow::Result<Arc<dyn Provider>> {
        if !self.config.has_api_key() {
            warn!(
                provider = %self.config.default_provider,
                "No API key configured; set DOCSAGE_API_KEY or OPENAI_API_KEY"
            );
        }
        self.router
            .default_provider()
            .context("No chat provider available")
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(self.index.clone(), self.embedder.clone())
            .with_top_k(self.config.retrieval.top_k)
            .with_min_score(self.config.retrieval.min_score)
    }

    /// The visibility filter for one request.
    pub fn filter(&self, allow: &[String], restrict: &[String]) -> anyhow::Result<QueryFilter> {
        let mut builder =
            QueryFilterBuilder::new(self.config.retrieval.visibility).allow(allow.iter().cloned());
        if !restrict.is_empty() {
            builder = builder.restrict_to(restrict.iter().cloned());
        }
        builder.build().context("Invalid document filter")
    }

    pub fn orchestrator(&self) -> anyhow::Result<Orchestrator> {
        let provider = self.chat_provider()?;
        let retriever = Arc::new(
            self.retriever()
                .with_synthesizer(provider.clone(), self.config.default_model.clone()),
        );

        let loaded =
            ToolFactories::builtin().load(&self.config.tools, &ToolDeps::with_retriever(retriever));
        for failure in &loaded.failures {
            warn!(error = %failure, "Tool unavailable for this session");
        }

        Ok(
            Orchestrator::from_config(provider, Arc::new(loaded.registry), &self.config)
                .with_events(self.events.clone()),
        )
    }
}

fn build_embedder(config: &AppConfig, router: &ProviderRouter) -> anyhow::Result<Arc<dyn Embedder>> {
    let embedding = &config.embedding;
    if embedding.provider == "hash" {
        return Ok(Arc::new(HashEmbedder::new(embedding.dimensions)));
    }
    let provider = router
        .require(&embedding.provider)
        .with_context(|| format!("Embedding provider '{}' is not configured", embedding.provider))?;
    Ok(Arc::new(ProviderEmbedder::new(provider, embedding.model.clone())))
}

async fn build_index(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn VectorIndex>, Arc<dyn DocumentStore>)> {
    match config.index.backend {
        IndexBackend::Memory => Ok((
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(InMemoryDocumentStore::new()),
        )),
        IndexBackend::Sqlite => {
            let path = config.index.resolved_path();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Cannot create {}", parent.display()))?;
            }
            let Some(path_str) = path.to_str() else {
                bail!("Index path is not valid UTF-8: {}", path.display());
            };
            let sqlite = Arc::new(
                SqliteIndex::open(path_str)
                    .await
                    .with_context(|| format!("Cannot open index at {}", path.display()))?,
            );
            Ok((sqlite.clone(), sqlite))
        }
    }
}
