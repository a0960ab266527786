//! Shared test utilities for integration tests
//!
//! A scripted transport that answers requests from a queue, plus builders for
//! dialogues, settings and completion envelopes.

use async_trait::async_trait;
use dialogue_gen::config::GenerationSettings;
use dialogue_gen::error::TransportError;
use dialogue_gen::generation::GenerationService;
use dialogue_gen::graph::{DialogueGraph, DialogueNode, GraphAccessor, GraphHandle};
use dialogue_gen::provider::{HttpRequest, HttpResponse, HttpTransport};
use dialogue_gen::types::NodeId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// One scripted answer
pub enum Scripted {
    Respond(HttpResponse),
    Fail(TransportError),
    /// Never answers within any sane timeout
    Hang,
}

/// Transport that replays scripted answers in order and records every request
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    /// Hold every answer until `gate` is notified
    pub fn gated(script: impl IntoIterator<Item = Scripted>, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            gate: Some(gate),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportError::connection("hung transport woke up"))
            }
            None => Err(TransportError::connection("script exhausted")),
        }
    }
}

pub fn settings() -> GenerationSettings {
    GenerationSettings {
        api_key: "sk-integration".to_string(),
        ..GenerationSettings::default()
    }
}

pub fn service(transport: Arc<ScriptedTransport>) -> GenerationService {
    GenerationService::new(settings(), transport)
}

/// Successful completion envelope carrying `content`
pub fn envelope(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "gpt-4-0613",
        "usage": {"prompt_tokens": 321, "completion_tokens": 54, "total_tokens": 375},
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

pub fn ok(content: &str) -> Scripted {
    Scripted::Respond(HttpResponse::new(200, envelope(content)))
}

/// Start node 1 leading to a player intent and a further NPC reply
///
/// ```text
/// 1 (Start) -> 2 "(ask)" -> 3 ""
///           -> 4 "Hello"
/// ```
pub fn shop_dialogue() -> GraphHandle {
    GraphHandle::new(
        DialogueGraph::new(vec![
            DialogueNode::new(1, false, "").with_links([2, 4]),
            DialogueNode::new(2, true, "(ask)").with_links([3]).at(100.0),
            DialogueNode::new(3, false, "").at(200.0),
            DialogueNode::new(4, true, "Hello").at(100.0),
        ])
        .unwrap()
        .with_npc_context("Friendly", "Keeps a small general store."),
    )
}

pub fn text_of(graph: &GraphHandle, id: NodeId) -> String {
    graph.with_graph(|g| g.lookup_by_id(id).map(|found| found.node.text).unwrap_or_default())
}
