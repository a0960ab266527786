//! CLI parse: clap types for dialogue-gen. No behavior; definitions only.

use crate::types::NodeId;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Dialogue Gen CLI - fill dialogue lines with a chat-completion model
#[derive(Parser)]
#[command(name = "dialogue-gen")]
#[command(about = "Generate branching dialogue lines with a chat-completion model")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging
    #[arg(long, default_value = "false", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Dialogue document and the nodes to work on
#[derive(Args, Clone, Debug)]
pub struct SelectionArgs {
    /// Dialogue document (JSON), relative to the workspace
    #[arg(long)]
    pub dialogue: PathBuf,

    /// Node ids to send, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub nodes: Vec<NodeId>,

    /// Select every node in the dialogue
    #[arg(long, conflicts_with = "nodes")]
    pub all: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the request body that would be sent, without sending it
    Preview {
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Generate lines for the selection and save the merged dialogue
    Generate {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Where to write the merged dialogue (default: overwrite the input)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List the model options
    Models,
    /// Show the effective configuration (API key masked)
    Config,
}
