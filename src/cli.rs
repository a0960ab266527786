//! CLI domain: parse, route and output only.
//! No domain orchestration; the route table dispatches to the generation service.

mod output;
mod parse;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, SelectionArgs};
pub use route::RunContext;
