use crate::config::SystemConfig;
use crate::core::rag::InMemoryVectorIndex;
use crate::core::{
    ConfigEnvironment, EnvironmentSource, Orchestrator, QueryClassifier, Retriever, TaskRegistry,
};
use crate::errors::Error;
use crate::event::EventSink;
use crate::export::FileExporter;
use crate::llm::{build_embedder, LlmClient, LlmProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Shared state of the service, built once at startup and injected everywhere
pub struct App {
    pub config: SystemConfig,
    pub registry: Arc<TaskRegistry>,
    pub environment: Arc<dyn EnvironmentSource>,
    pub llm: Arc<dyn LlmProvider>,
    pub orchestrator: Orchestrator,
    started: Instant,
}

impl App {
    /// Wires the registry, backends and orchestrator described by the config
    pub fn from_config(config: SystemConfig, events: Arc<dyn EventSink>) -> Result<Self, Error> {
        let registry = Arc::new(TaskRegistry::new(config.paths.tasks_dir.clone()));
        let environment = Arc::new(ConfigEnvironment::new(
            config.environment,
            config.policy.clone(),
        ));
        let llm = Arc::new(LlmClient::new(&config.llm)?);
        Self::with_parts(config, registry, environment, llm, events)
    }

    /// Wires the service around already built collaborators
    pub fn with_parts(
        config: SystemConfig,
        registry: Arc<TaskRegistry>,
        environment: Arc<dyn EnvironmentSource>,
        llm: Arc<dyn LlmProvider>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, Error> {
        let embedder = build_embedder(&config.embedder)?;
        let retriever = Retriever::new(Arc::new(InMemoryVectorIndex::new(embedder)));
        let classifier =
            QueryClassifier::new(llm.clone(), registry.clone(), config.routing.clone())?;
        let exporter = Arc::new(FileExporter::new(config.paths.exports_dir.clone()));
        let orchestrator = Orchestrator::new(
            registry.clone(),
            environment.clone(),
            llm.clone(),
            retriever,
            classifier,
            exporter,
            events,
        )
        .with_generation_mode(config.llm.mode);

        info!(
            "Service ready: environment={}, tasks_dir={}",
            environment.current_environment(),
            config.paths.tasks_dir.display()
        );
        Ok(Self {
            config,
            registry,
            environment,
            llm,
            orchestrator,
            started: Instant::now(),
        })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
