//! Generation Job
//!
//! One request/response/merge cycle against a dialogue graph. A job owns the graph's
//! generating flag for its whole lifetime and only reaches the graph through a weak
//! back-reference, so a graph torn down mid-flight is detected rather than touched.
//!
//! ```text
//! Idle -> Requesting -> Merging -> Done
//!   \          \
//!    `----------`-----> Failed
//! ```

use crate::error::GenerationError;
use crate::graph::{GraphHandle, GraphRef};
use crate::linearize::DialogueLines;
use crate::provider::envelope::{parse_content, parse_envelope, service_error_message};
use crate::provider::CompletionStats;
use crate::types::{JobId, NodeId};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod merge;
pub mod registry;
pub mod service;

pub use crate::graph::GeneratingGuard;
pub use merge::{is_placeholder_text, merge_lines, MergeReport};
pub use registry::{ActiveJob, JobRegistration, JobRegistry};
pub use service::{GenerationService, JobHandle};

/// Lifecycle state of a generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Requesting,
    Merging,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    pub fn can_advance_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Idle, JobState::Requesting)
                | (JobState::Idle, JobState::Failed)
                | (JobState::Requesting, JobState::Merging)
                | (JobState::Requesting, JobState::Failed)
                | (JobState::Merging, JobState::Done)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Requesting => "requesting",
            JobState::Merging => "merging",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a job ended
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Reply decoded and merged
    Merged {
        job_id: JobId,
        stats: CompletionStats,
        report: MergeReport,
    },
    /// A response arrived but could not be merged; the graph is untouched
    NotMerged {
        job_id: JobId,
        stats: Option<CompletionStats>,
        error: GenerationError,
    },
    /// No usable response, or the graph went away
    Failed { job_id: JobId, error: GenerationError },
}

impl JobOutcome {
    pub fn job_id(&self) -> JobId {
        match self {
            JobOutcome::Merged { job_id, .. }
            | JobOutcome::NotMerged { job_id, .. }
            | JobOutcome::Failed { job_id, .. } => *job_id,
        }
    }

    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Merged { .. } | JobOutcome::NotMerged { .. } => JobState::Done,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }

    pub fn error(&self) -> Option<&GenerationError> {
        match self {
            JobOutcome::Merged { .. } => None,
            JobOutcome::NotMerged { error, .. } | JobOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn report(&self) -> Option<&MergeReport> {
        match self {
            JobOutcome::Merged { report, .. } => Some(report),
            _ => None,
        }
    }

    pub fn stats(&self) -> Option<&CompletionStats> {
        match self {
            JobOutcome::Merged { stats, .. } => Some(stats),
            JobOutcome::NotMerged { stats, .. } => stats.as_ref(),
            JobOutcome::Failed { .. } => None,
        }
    }
}

/// A single generation run against one graph
///
/// Dropping the job, in any state, releases the graph's generating flag.
pub struct GenerationJob {
    id: JobId,
    state: JobState,
    selected: BTreeSet<NodeId>,
    graph: GraphRef,
    registration: Option<JobRegistration>,
    _guard: GeneratingGuard,
}

impl GenerationJob {
    /// Claim the graph for a new job.
    ///
    /// Fails without side effects when the selection is empty or another job
    /// already holds the graph.
    pub fn start(graph: &GraphHandle, selected: BTreeSet<NodeId>) -> Result<Self, GenerationError> {
        if selected.is_empty() {
            return Err(GenerationError::EmptySelection);
        }
        let guard = graph
            .try_begin_generation()
            .ok_or(GenerationError::AlreadyGenerating)?;

        let job = Self {
            id: JobId::next(),
            state: JobState::Idle,
            selected,
            graph: graph.downgrade(),
            registration: None,
            _guard: guard,
        };
        info!(
            job_id = %job.id,
            graph_id = graph.id().as_u64(),
            selected = job.selected.len(),
            "Generation job started"
        );
        Ok(job)
    }

    /// List the job in `registry` until it ends
    pub fn register_with(mut self, registry: &Arc<JobRegistry>, graph: &GraphHandle) -> Self {
        self.registration = Some(registry.register(ActiveJob {
            job_id: self.id,
            graph_id: graph.id(),
            selected_count: self.selected.len(),
            started_at: Utc::now(),
        }));
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn selected(&self) -> &BTreeSet<NodeId> {
        &self.selected
    }

    /// Resolve the graph, or `None` once its owner is gone
    pub fn graph(&self) -> Option<GraphHandle> {
        self.graph.resolve()
    }

    pub fn advance(&mut self, next: JobState) {
        if !self.state.can_advance_to(next) {
            warn!(job_id = %self.id, from = %self.state, to = %next, "Unexpected job transition");
        }
        debug!(job_id = %self.id, from = %self.state, to = %next, "Job state change");
        self.state = next;
    }

    /// End the job without a usable response
    pub fn fail(mut self, error: GenerationError) -> JobOutcome {
        self.advance(JobState::Failed);
        match &error {
            GenerationError::Status { status, body } => {
                error!(job_id = %self.id, status, body = %body, "Generation request was rejected");
            }
            other => error!(job_id = %self.id, error = %other, "Generation request failed"),
        }
        JobOutcome::Failed {
            job_id: self.id,
            error,
        }
    }

    /// End the job quietly because its graph is gone
    pub fn abort_stale(mut self) -> JobOutcome {
        self.advance(JobState::Failed);
        debug!(job_id = %self.id, "Dialogue went away, dropping generation result");
        JobOutcome::Failed {
            job_id: self.id,
            error: GenerationError::StaleReference,
        }
    }

    /// Decode a successful response body and merge it into `graph`
    pub fn merge_response(mut self, graph: &GraphHandle, body: &str) -> JobOutcome {
        self.advance(JobState::Merging);

        let envelope = match parse_envelope(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                if let Some(message) = service_error_message(body) {
                    warn!(job_id = %self.id, service_message = %message, "Service returned an error body");
                }
                return self.finish_without_merge(None, err, body);
            }
        };
        info!(job_id = %self.id, stats = %envelope.stats, "Completion received");

        let lines = match parse_content(&envelope.content) {
            Ok(lines) => lines,
            Err(err) => return self.finish_without_merge(Some(envelope.stats), err, &envelope.content),
        };
        log_generated_lines(self.id, &lines);

        let report = graph.with_graph_mut(|g| merge_lines(g, &self.selected, &lines.dialogue_lines));
        if report.changed_anything() {
            graph.mark_details_changed();
        }

        self.advance(JobState::Done);
        info!(
            job_id = %self.id,
            applied = report.applied_count(),
            skipped = report.skipped_count(),
            "Generated lines merged"
        );
        JobOutcome::Merged {
            job_id: self.id,
            stats: envelope.stats,
            report,
        }
    }

    fn finish_without_merge(
        mut self,
        stats: Option<CompletionStats>,
        error: GenerationError,
        raw: &str,
    ) -> JobOutcome {
        self.advance(JobState::Done);
        if error.is_content_error() {
            warn!(
                job_id = %self.id,
                error = %error,
                content = %raw,
                "Generated content is malformed, try a slightly different request"
            );
        } else {
            error!(job_id = %self.id, error = %error, body = %raw, "Unexpected completion envelope");
        }
        JobOutcome::NotMerged {
            job_id: self.id,
            stats,
            error,
        }
    }
}

impl fmt::Debug for GenerationJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationJob")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("selected", &self.selected)
            .field("registered", &self.registration.is_some())
            .finish()
    }
}

fn log_generated_lines(job_id: JobId, lines: &DialogueLines) {
    match serde_json::to_string_pretty(lines) {
        Ok(pretty) => debug!(job_id = %job_id, "Generated lines:\n{}", pretty),
        Err(err) => debug!(job_id = %job_id, error = %err, "Generated lines could not be printed"),
    }
}
