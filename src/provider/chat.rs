//! Chat-completions client.

use super::{CompletionClient, HttpRequest, HttpTransport};
use crate::config::GenerationSettings;
use crate::error::{GenerationError, TransportError};
use crate::generation::{GenerationJob, JobOutcome, JobState};
use crate::graph::DialogueGraph;
use crate::linearize::linearize_selection;
use crate::request::{build_request, DialogueContext};
use crate::types::NodeId;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Completion client for OpenAI-style `/chat/completions` endpoints
pub struct ChatCompletionClient {
    settings: GenerationSettings,
    transport: Arc<dyn HttpTransport>,
}

impl ChatCompletionClient {
    pub fn new(settings: GenerationSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    fn http_request(&self, body: String) -> HttpRequest {
        HttpRequest {
            url: self.settings.endpoint.clone(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                (
                    "Authorization".to_string(),
                    format!("Bearer {}", self.settings.api_key),
                ),
            ],
            body,
        }
    }

    fn request_body(
        &self,
        graph: &DialogueGraph,
        selected: &BTreeSet<NodeId>,
    ) -> Result<String, GenerationError> {
        let lines = linearize_selection(graph, selected)?;
        debug!(lines = %lines, "Linearized selection");
        build_request(&DialogueContext::from_graph(graph), &lines, &self.settings)
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn run(&self, mut job: GenerationJob) -> JobOutcome {
        let Some(graph) = job.graph() else {
            return job.abort_stale();
        };
        let body = match graph.with_graph(|g| self.request_body(g, job.selected())) {
            Ok(body) => body,
            Err(err) => return job.fail(err),
        };
        // Only the weak reference crosses the await
        drop(graph);

        job.advance(JobState::Requesting);
        info!(
            job_id = %job.id(),
            model = %self.settings.resolved_model(),
            selected = job.selected().len(),
            "Sending generation request"
        );

        let timeout = self.settings.request_timeout();
        let sent = tokio::time::timeout(timeout, self.transport.post(self.http_request(body))).await;

        let Some(graph) = job.graph() else {
            return job.abort_stale();
        };

        let response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return job.fail(err.into()),
            Err(_) => {
                return job.fail(
                    TransportError::timed_out(format!("no response after {:?}", timeout)).into(),
                )
            }
        };

        if !response.is_ok() {
            return job.fail(GenerationError::Status {
                status: response.status,
                body: response.body,
            });
        }
        if response.body.trim().is_empty() {
            return job.fail(GenerationError::EmptyResponse);
        }

        job.merge_response(&graph, &response.body)
    }
}
