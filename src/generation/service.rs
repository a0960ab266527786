//! Generation launch surface.
//!
//! Resolves the configured completion client, claims the graph, and runs the job on
//! the ambient tokio runtime.

use super::{GenerationJob, JobOutcome, JobRegistry};
use crate::config::{DialogueGenConfig, GenerationSettings};
use crate::error::GenerationError;
use crate::graph::GraphHandle;
use crate::linearize::linearize_selection;
use crate::provider::{ClientRegistry, HttpTransport, ReqwestTransport};
use crate::request::{build_request, DialogueContext};
use crate::types::{JobId, NodeId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Handle to a spawned generation job
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Wait for the job to reach a terminal state
    pub async fn wait(self) -> Result<JobOutcome, GenerationError> {
        self.task
            .await
            .map_err(|e| GenerationError::Runtime(format!("generation task ended abnormally: {}", e)))
    }
}

/// Entry point hosts use to start generation
pub struct GenerationService {
    settings: GenerationSettings,
    clients: ClientRegistry,
    transport: Arc<dyn HttpTransport>,
    jobs: Arc<JobRegistry>,
}

impl GenerationService {
    pub fn new(settings: GenerationSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_clients(settings, ClientRegistry::with_defaults(), transport)
    }

    pub fn with_clients(
        settings: GenerationSettings,
        clients: ClientRegistry,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            settings,
            clients,
            transport,
            jobs: JobRegistry::new(),
        }
    }

    /// Build a service that talks to the configured endpoint over reqwest
    pub fn from_config(config: &DialogueGenConfig) -> Result<Self, GenerationError> {
        let transport = ReqwestTransport::new(config.generation.request_timeout())?;
        Ok(Self::new(config.generation.clone(), Arc::new(transport)))
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    /// Start generation for the selected nodes.
    ///
    /// Returns `false` when generation could not start: bad configuration, an empty
    /// selection, or a job already running for this graph. The result is delivered
    /// later by mutating the graph.
    pub fn launch_generation(
        &self,
        graph: &GraphHandle,
        selected: impl IntoIterator<Item = NodeId>,
    ) -> bool {
        match self.spawn_generation(graph, selected) {
            Ok(_) => true,
            Err(GenerationError::AlreadyGenerating) => {
                warn!(graph_id = graph.id().as_u64(), "Dialogue is already generating");
                false
            }
            Err(err) => {
                warn!(graph_id = graph.id().as_u64(), error = %err, "Generation not started");
                false
            }
        }
    }

    /// Start generation and return a handle to the running job
    pub fn spawn_generation(
        &self,
        graph: &GraphHandle,
        selected: impl IntoIterator<Item = NodeId>,
    ) -> Result<JobHandle, GenerationError> {
        let selected: BTreeSet<NodeId> = selected.into_iter().collect();
        if selected.is_empty() {
            return Err(GenerationError::EmptySelection);
        }

        let client = self.clients.resolve(&self.settings, Arc::clone(&self.transport))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GenerationError::Runtime(e.to_string()))?;

        let job = GenerationJob::start(graph, selected)?.register_with(&self.jobs, graph);
        let job_id = job.id();
        let task = runtime.spawn(async move { client.run(job).await });

        info!(job_id = %job_id, graph_id = graph.id().as_u64(), "Generation launched");
        Ok(JobHandle { job_id, task })
    }

    /// The request body a job would send for this selection, without sending it
    pub fn preview_request(
        &self,
        graph: &GraphHandle,
        selected: impl IntoIterator<Item = NodeId>,
    ) -> Result<String, GenerationError> {
        let selected: BTreeSet<NodeId> = selected.into_iter().collect();
        if selected.is_empty() {
            return Err(GenerationError::EmptySelection);
        }
        graph.with_graph(|g| {
            let lines = linearize_selection(g, &selected)?;
            build_request(&DialogueContext::from_graph(g), &lines, &self.settings)
        })
    }
}
