//! Dialogue Gen: LLM-assisted line generation for branching dialogues
//!
//! Sends a selected part of a dialogue graph to a chat-completion service as an ordered,
//! parent-annotated line list, and merges the generated text back into the graph without
//! overwriting lines an author already wrote.

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod graph;
pub mod linearize;
pub mod logging;
pub mod provider;
pub mod request;
pub mod types;
