//! CLI route: single route table and run context. Dispatches to the generation service and output.

use crate::cli::output::{
    format_config_toml, format_generation_result_json, format_generation_result_text,
    format_models_text,
};
use crate::cli::parse::{Commands, SelectionArgs};
use crate::config::{ConfigLoader, DialogueGenConfig};
use crate::generation::{GenerationService, JobOutcome};
use crate::graph::{DialogueGraph, GraphHandle};
use crate::types::NodeId;
use anyhow::{anyhow, bail, Context};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Runtime context for CLI execution: workspace root and loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: DialogueGenConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => ConfigLoader::load(&workspace_root).context("Failed to load configuration")?,
        };
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn config(&self) -> &DialogueGenConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> anyhow::Result<String> {
        match command {
            Commands::Preview { selection } => self.handle_preview(selection),
            Commands::Generate {
                selection,
                output,
                format,
            } => self.handle_generate(selection, output.as_deref(), format),
            Commands::Models => Ok(format_models_text(&self.config.generation)),
            Commands::Config => format_config_toml(&self.config).context("Failed to render configuration"),
        }
    }

    fn handle_preview(&self, selection: &SelectionArgs) -> anyhow::Result<String> {
        let (graph, _) = self.load_dialogue(selection)?;
        let ids = resolve_selection(&graph, selection)?;
        let service = GenerationService::new(
            self.config.generation.clone(),
            Arc::new(crate::provider::ReqwestTransport::new(
                self.config.generation.request_timeout(),
            )?),
        );
        let body = service.preview_request(&graph, ids)?;
        let value: serde_json::Value = serde_json::from_str(&body)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }

    fn handle_generate(
        &self,
        selection: &SelectionArgs,
        output: Option<&Path>,
        format: &str,
    ) -> anyhow::Result<String> {
        if format != "text" && format != "json" {
            bail!("Invalid format: {} (must be 'text' or 'json')", format);
        }
        let (graph, source) = self.load_dialogue(selection)?;
        let ids = resolve_selection(&graph, selection)?;
        let service = GenerationService::from_config(&self.config)?;

        let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
        let outcome = runtime.block_on(async {
            let handle = service.spawn_generation(&graph, ids)?;
            handle.wait().await
        })?;

        let (stats, report) = match outcome {
            JobOutcome::Merged { stats, report, .. } => (stats, report),
            JobOutcome::NotMerged { error, .. } | JobOutcome::Failed { error, .. } => {
                return Err(anyhow!(error).context("Generation did not complete"));
            }
        };

        let saved_to = if graph.take_refresh_details() {
            let target = output.map(|p| self.resolve_path(p)).unwrap_or(source);
            graph
                .snapshot()
                .save(&target)
                .with_context(|| format!("Failed to save dialogue to {}", target.display()))?;
            info!(path = %target.display(), "Merged dialogue saved");
            Some(target)
        } else {
            None
        };

        Ok(if format == "json" {
            format_generation_result_json(&stats, &report, saved_to.as_deref())
        } else {
            format_generation_result_text(&stats, &report, saved_to.as_deref())
        })
    }

    fn load_dialogue(&self, selection: &SelectionArgs) -> anyhow::Result<(GraphHandle, PathBuf)> {
        let path = self.resolve_path(&selection.dialogue);
        let graph = DialogueGraph::load(&path)
            .with_context(|| format!("Failed to load dialogue from {}", path.display()))?;
        Ok((GraphHandle::new(graph), path))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }
}

fn resolve_selection(graph: &GraphHandle, selection: &SelectionArgs) -> anyhow::Result<Vec<NodeId>> {
    let ids: Vec<NodeId> = if selection.all {
        graph.with_graph(|g| g.nodes().iter().map(|n| n.id).collect())
    } else {
        selection.nodes.clone()
    };
    if ids.is_empty() {
        bail!("No nodes selected (use --nodes or --all)");
    }
    Ok(ids)
}
