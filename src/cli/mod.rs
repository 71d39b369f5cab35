//! Command-line interface for fsts
//!
//! ## Module Structure
//!
//! - `args`: CLI argument definitions (clap)
//! - `run`: entry point, configuration discovery and dispatch
//! - `commands`: command implementations

pub mod args;
mod commands;
mod run;

pub use args::{Cli, Commands, GraphFormat, build_cli};
pub use commands::RunOptions;
pub use run::run;
