//! Error types for the dialogue generation pipeline.

use crate::types::NodeId;
use std::fmt;
use thiserror::Error;

/// Graph-related errors
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("Dialogue document could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Dialogue document I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Why a transport call did not produce a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailureKind {
    Connection,
    TimedOut,
    Unknown,
}

impl fmt::Display for TransportFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFailureKind::Connection => write!(f, "connection error"),
            TransportFailureKind::TimedOut => write!(f, "timed out"),
            TransportFailureKind::Unknown => write!(f, "reason unknown"),
        }
    }
}

/// Transport-level failure reported by an `HttpTransport`
#[derive(Debug, Clone, Error)]
#[error("Connection failed: {kind}: {message}")]
pub struct TransportError {
    pub kind: TransportFailureKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(TransportFailureKind::TimedOut, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(TransportFailureKind::Connection, message)
    }
}

/// Generation errors, covering launch, transport, envelope and content failures
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("A generation job is already running for this dialogue")]
    AlreadyGenerating,

    #[error("No nodes selected for generation")]
    EmptySelection,

    #[error("No async runtime available to run the generation job: {0}")]
    Runtime(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response body was empty")]
    EmptyResponse,

    #[error("Unexpected message in response, did you exceed your quota? {0}")]
    UnparseableEnvelope(String),

    #[error("Unexpected JSON in response (missing `{field}`), did you exceed your quota?")]
    EnvelopeMissingField { field: &'static str },

    #[error("Malformed generated content: {0}")]
    MalformedContent(String),

    #[error("Dialogue is no longer valid")]
    StaleReference,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GenerationError {
    /// The service answered with something that is not a completion envelope.
    pub fn is_envelope_error(&self) -> bool {
        matches!(
            self,
            GenerationError::UnparseableEnvelope(_) | GenerationError::EnvelopeMissingField { .. }
        )
    }

    /// The envelope was fine but the model produced garbage.
    pub fn is_content_error(&self) -> bool {
        matches!(self, GenerationError::MalformedContent(_))
    }

    /// The request never produced a usable response.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            GenerationError::Transport(_) | GenerationError::Status { .. } | GenerationError::EmptyResponse
        )
    }
}

impl From<config::ConfigError> for GenerationError {
    fn from(err: config::ConfigError) -> Self {
        GenerationError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        GenerationError::Serialization(err.to_string())
    }
}
