//! Request Builder
//!
//! Assembles the chat-completion request: a system message carrying the configured
//! system instruction and a user message made of the task instruction, the NPC
//! context and the compact line list, joined by newlines.

use crate::config::GenerationSettings;
use crate::error::GenerationError;
use crate::graph::{DialogueGraph, DEFAULT_DISPOSITION};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Outbound chat-completion body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

/// NPC context attached to a dialogue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogueContext {
    pub npc_disposition: Option<String>,
    pub npc_description: String,
}

impl DialogueContext {
    pub fn from_graph(graph: &DialogueGraph) -> Self {
        let disposition = &graph.npc_disposition;
        Self {
            npc_disposition: (!disposition.trim().is_empty()).then(|| disposition.clone()),
            npc_description: graph.description.clone(),
        }
    }

    /// Disposition worth telling the model about, if any
    fn effective_disposition(&self) -> Option<&str> {
        self.npc_disposition
            .as_deref()
            .filter(|d| {
                let trimmed = d.trim();
                !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case(DEFAULT_DISPOSITION)
            })
    }
}

/// Build the user message text
pub fn build_user_content(
    context: &DialogueContext,
    selected_lines_json: &str,
    settings: &GenerationSettings,
) -> String {
    let mut parts = vec![settings.dialogue_instructions.clone()];

    if let Some(disposition) = context.effective_disposition() {
        if !settings.is_known_disposition(disposition) {
            warn!(disposition, "NPC disposition is not one of the configured choices");
        }
        parts.push(format!("NPC's disposition towards the player: {}", disposition));
    }

    if !context.npc_description.is_empty() {
        parts.push(format!("NPC's description: {}", context.npc_description));
    }

    parts.push(selected_lines_json.to_string());
    parts.join("\n")
}

pub fn build_chat_request(
    context: &DialogueContext,
    selected_lines_json: &str,
    settings: &GenerationSettings,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: settings.resolved_model(),
        messages: vec![
            ChatMessage::system(settings.system_instruction.clone()),
            ChatMessage::user(build_user_content(context, selected_lines_json, settings)),
        ],
        temperature: settings.temperature,
    }
}

/// Serialize the full request body
pub fn build_request(
    context: &DialogueContext,
    selected_lines_json: &str,
    settings: &GenerationSettings,
) -> Result<String, GenerationError> {
    let request = build_chat_request(context, selected_lines_json, settings);
    Ok(serde_json::to_string(&request)?)
}
