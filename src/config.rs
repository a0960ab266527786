//! Configuration System
//!
//! Layered configuration for the generation pipeline: built-in defaults, a user-level
//! file, workspace files and `DIALOGUE_GEN__*` environment overrides, merged with the
//! `config` crate and validated before a completion client is built from it.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Client implementation used when none is configured
pub const DEFAULT_CLIENT: &str = "chat-completions";

/// Chat-completion endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Models offered before any custom ones
pub const BUILTIN_MODELS: [&str; 2] = ["gpt-4", "gpt-3.5-turbo"];

/// Upper bound (exclusive) for the request timeout
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogueGenConfig {
    /// Completion service and prompt settings
    #[serde(default)]
    pub generation: GenerationSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings that drive request building and client resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Master switch; no client resolves while disabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bearer token sent in the `Authorization` header
    #[serde(default)]
    pub api_key: String,

    /// Model identifier; empty selects the first model option
    #[serde(default = "default_model")]
    pub model: String,

    /// Extra models appended to the built-in options
    #[serde(default)]
    pub custom_models: Vec<String>,

    /// Name of the completion client implementation
    #[serde(default = "default_client")]
    pub client: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// High-level instruction sent as the system message
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,

    /// Task instruction that opens the user message
    #[serde(default = "default_dialogue_instructions")]
    pub dialogue_instructions: String,

    /// Sampling temperature, 0.0 to 2.0
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Ceiling on the request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Disposition choices offered for an NPC
    #[serde(default = "default_dispositions")]
    pub dispositions: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    BUILTIN_MODELS[0].to_string()
}

fn default_client() -> String {
    DEFAULT_CLIENT.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_system_instruction() -> String {
    "You are an assistant that helps write dialogues for a computer video game.".to_string()
}

fn default_dialogue_instructions() -> String {
    "Below is a JSON with dialogue lines. Each line contains an ID, its parent id, text, and a \
     bool to say whether the line belongs to the player or to the NPC. For every line with \
     empty text, you are to fill it. If a line has text inside parentheses, you are to \
     understand it as intent of the line, and replace it by writing text representing its \
     intent. If a text already exists, you don't modify it. Respond only with a JSON of the \
     same format and with the same number of JSON elements as I'm sending you. Be engaging, \
     natural, authentic, descriptive, creative."
        .to_string()
}

fn default_temperature() -> f64 {
    1.0
}

fn default_request_timeout_secs() -> u64 {
    80
}

fn default_dispositions() -> Vec<String> {
    ["Undefined", "Hostile", "Neutral", "Friendly"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            api_key: String::new(),
            model: default_model(),
            custom_models: Vec::new(),
            client: default_client(),
            endpoint: default_endpoint(),
            system_instruction: default_system_instruction(),
            dialogue_instructions: default_dialogue_instructions(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
            dispositions: default_dispositions(),
        }
    }
}

impl GenerationSettings {
    /// Built-in models followed by custom ones
    pub fn model_options(&self) -> Vec<String> {
        BUILTIN_MODELS
            .iter()
            .map(|m| m.to_string())
            .chain(self.custom_models.iter().cloned())
            .collect()
    }

    /// Configured model, or the first option when unset
    pub fn resolved_model(&self) -> String {
        if self.model.trim().is_empty() {
            default_model()
        } else {
            self.model.clone()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_known_disposition(&self, disposition: &str) -> bool {
        self.dispositions
            .iter()
            .any(|d| d.eq_ignore_ascii_case(disposition))
    }

    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !(0.0..=2.0).contains(&self.temperature) {
            errors.push(ValidationError::Generation(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }

        if self.request_timeout_secs == 0 || self.request_timeout_secs >= MAX_REQUEST_TIMEOUT_SECS
        {
            errors.push(ValidationError::Generation(format!(
                "request_timeout_secs must be between 1 and {}, got {}",
                MAX_REQUEST_TIMEOUT_SECS - 1,
                self.request_timeout_secs
            )));
        }

        if reqwest::Url::parse(&self.endpoint).is_err() {
            errors.push(ValidationError::Generation(format!(
                "endpoint is not a valid URL: {}",
                self.endpoint
            )));
        }

        if self.enabled && self.api_key.trim().is_empty() {
            errors.push(ValidationError::Generation(
                "api_key is required while generation is enabled".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl DialogueGenConfig {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = match self.generation.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        if !["json", "text"].contains(&self.logging.format.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "format must be 'json' or 'text', got '{}'",
                self.logging.format
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Generation(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Join validation errors into one message
pub fn describe_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
