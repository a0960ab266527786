//! Completion Provider Abstraction
//!
//! The HTTP transport seam, the completion-client capability that runs a generation
//! job against a service, and the registry that resolves the configured client.

use crate::config::{describe_validation_errors, GenerationSettings, DEFAULT_CLIENT};
use crate::error::{GenerationError, TransportError, TransportFailureKind};
use crate::generation::{GenerationJob, JobOutcome};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub mod chat;
pub mod envelope;

pub use chat::ChatCompletionClient;
pub use envelope::{parse_content, parse_envelope, CompletionEnvelope, CompletionStats};

/// Outbound HTTP request handed to a transport
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Response produced by a transport
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Any 2xx status
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Host-provided HTTP transport
///
/// Completes exactly once, with either a response (any status) or a failure.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Capability that runs a generation job against a completion service
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Drive the job to a terminal state. Consuming the job releases its hold on the graph.
    async fn run(&self, job: GenerationJob) -> JobOutcome;
}

// Helper function to map HTTP errors to TransportError
fn map_http_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::new(TransportFailureKind::TimedOut, error.to_string())
    } else if error.is_connect() {
        TransportError::new(TransportFailureKind::Connection, error.to_string())
    } else {
        TransportError::new(TransportFailureKind::Unknown, error.to_string())
    }
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn build_provider_http_client(request_timeout: Duration) -> Result<Client, GenerationError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| GenerationError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// `HttpTransport` backed by reqwest
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, GenerationError> {
        Ok(Self {
            client: build_provider_http_client(request_timeout)?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_http_error)?;
        Ok(HttpResponse { status, body })
    }
}

/// Builds a completion client from settings and a transport
pub type ClientFactory = Arc<
    dyn Fn(&GenerationSettings, Arc<dyn HttpTransport>) -> Result<Arc<dyn CompletionClient>, GenerationError>
        + Send
        + Sync,
>;

/// Registry of completion client implementations, selected by configured name
pub struct ClientRegistry {
    factories: HashMap<String, ClientFactory>,
}

impl ClientRegistry {
    /// Create a registry with no implementations
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with the built-in chat-completions client
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(
            DEFAULT_CLIENT,
            Arc::new(
                |settings: &GenerationSettings,
                 transport: Arc<dyn HttpTransport>|
                 -> Result<Arc<dyn CompletionClient>, GenerationError> {
                    Ok(Arc::new(ChatCompletionClient::new(settings.clone(), transport)))
                },
            ),
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: ClientFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve the client named in `settings`.
    ///
    /// Fails when generation is disabled, the settings are invalid, or the name is
    /// unknown. An empty name falls back to the default client.
    pub fn resolve(
        &self,
        settings: &GenerationSettings,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Arc<dyn CompletionClient>, GenerationError> {
        if !settings.enabled {
            return Err(GenerationError::Config(
                "dialogue generation is disabled".to_string(),
            ));
        }

        settings
            .validate()
            .map_err(|errors| GenerationError::Config(describe_validation_errors(&errors)))?;

        let name = settings.client.trim();
        let name = if name.is_empty() {
            warn!(
                fallback = DEFAULT_CLIENT,
                "No completion client configured, falling back to the default client"
            );
            DEFAULT_CLIENT
        } else {
            name
        };

        let factory = self.factories.get(name).ok_or_else(|| {
            GenerationError::Config(format!("Unknown completion client: {}", name))
        })?;
        factory(settings, transport)
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
