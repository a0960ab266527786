//! CLI output: error mapping and text/json formatters.

use crate::config::{DialogueGenConfig, GenerationSettings};
use crate::generation::MergeReport;
use crate::provider::CompletionStats;
use crate::types::NodeId;
use serde_json::json;
use std::path::Path;

/// Map errors to a string for CLI output, including their causes.
pub fn map_error(e: &anyhow::Error) -> String {
    format!("Error: {:#}", e)
}

fn join_ids(ids: &[NodeId]) -> String {
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
    }
}

pub fn format_generation_result_text(
    stats: &CompletionStats,
    report: &MergeReport,
    saved_to: Option<&Path>,
) -> String {
    let mut lines = vec![
        format!("Completion: {}", stats),
        format!("Applied:    {}", join_ids(&report.applied)),
        format!("Authored:   {}", join_ids(&report.authored)),
        format!("Unchanged:  {}", join_ids(&report.unchanged)),
    ];
    if !report.unselected.is_empty() || !report.missing.is_empty() {
        lines.push(format!(
            "Ignored:    {}",
            join_ids(&[report.unselected.as_slice(), report.missing.as_slice()].concat())
        ));
    }
    match saved_to {
        Some(path) => lines.push(format!("Saved dialogue to {}", path.display())),
        None => lines.push("No changes to save".to_string()),
    }
    lines.join("\n")
}

pub fn format_generation_result_json(
    stats: &CompletionStats,
    report: &MergeReport,
    saved_to: Option<&Path>,
) -> String {
    let value = json!({
        "stats": stats,
        "report": report,
        "saved_to": saved_to.map(|p| p.display().to_string()),
    });
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}

pub fn format_models_text(settings: &GenerationSettings) -> String {
    let selected = settings.resolved_model();
    settings
        .model_options()
        .into_iter()
        .map(|model| {
            let marker = if model == selected { "*" } else { " " };
            format!("{} {}", marker, model)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Effective configuration as TOML with the API key masked
pub fn format_config_toml(config: &DialogueGenConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if !shown.generation.api_key.is_empty() {
        shown.generation.api_key = "********".to_string();
    }
    toml::to_string_pretty(&shown)
}
