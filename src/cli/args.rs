//! CLI argument definitions and parsing structures
//!
//! This module defines the command-line interface structure using clap,
//! including the main `Cli` struct and the subcommand enum.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use fsts_config::Provider;
use fsts_utils::ReworkRoutes;

/// fsts - functional/technical specifications from ABAP sources
#[derive(Parser, Debug)]
#[command(name = "fsts")]
#[command(about = "Turns ABAP sources into functional/technical specification documents")]
#[command(long_about = r#"
fsts runs an ABAP report through a fixed pipeline of LLM stages (code analysis,
dependency extraction, functional and technical drafting), then loops a manager
and a reviewer until the consolidated document is accepted or the review bound
is reached.

EXAMPLES:
  # Generate a specification from a report and a template
  fsts run --code zreport.abap --template template.md

  # Read the source from stdin and print the document
  cat zreport.abap | fsts run --code - --template template.md --stdout

  # Exercise the whole graph without network calls
  fsts run --code zreport.abap --template template.md --dry-run

  # Require two reviews before the manager may finish
  fsts run --code zreport.abap --template template.md --min-output-reviews 2 --max-output-reviews 3

  # Show the pipeline graph as Mermaid text
  fsts graph --format mermaid

  # Check every prompt definition
  fsts prompts --prompts-dir prompts

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  Config file is discovered by searching upward from CWD for .fsts/config.toml,
  falling back to $FSTS_HOME/config.toml
  Use --config to specify an explicit config file path

STAGES:
  abap_code_analyst → foreign_dependency_agent → functional_spec_drafter →
  technical_spec_writer → manager_agent ⇄ output_reviewer → final_output
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Completion provider (openai-compatible, anthropic, scripted)
    #[arg(long, global = true, value_parser = Provider::parse)]
    pub provider: Option<Provider>,

    /// Model to request from the provider
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Endpoint URL for the provider
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Directory of <stage>.yaml prompt definitions (built-in catalog when unset)
    #[arg(long, global = true)]
    pub prompts_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline on an ABAP source
    Run {
        /// ABAP source file, or '-' for stdin
        #[arg(long)]
        code: PathBuf,

        /// Specification template file
        #[arg(long)]
        template: PathBuf,

        /// Where to write the document
        #[arg(short, long, default_value = "final_specifications.md")]
        output: PathBuf,

        /// Print the document instead of writing it
        #[arg(long, conflicts_with = "output")]
        stdout: bool,

        /// Keep the manager's answer as-is (no preamble or route line removal)
        #[arg(long)]
        raw: bool,

        /// Use canned responses instead of a provider
        #[arg(long)]
        dry_run: bool,

        /// Print the usage summary as JSON
        #[arg(long)]
        usage_json: bool,

        /// Reviews required before the manager may finish
        #[arg(long)]
        min_output_reviews: Option<u32>,

        /// Reviews after which the run is forced to finish
        #[arg(long)]
        max_output_reviews: Option<u32>,

        /// How manager rework routes are handled
        #[arg(long, value_parser = parse_rework_routes)]
        rework_routes: Option<ReworkRoutes>,

        /// Maximum number of stage executions per run
        #[arg(long)]
        recursion_limit: Option<usize>,

        /// Wall-clock budget for the whole run, in seconds
        #[arg(long = "run-timeout")]
        run_timeout_secs: Option<u64>,
    },

    /// Print the pipeline graph
    Graph {
        #[arg(long, value_enum, default_value_t = GraphFormat::Mermaid)]
        format: GraphFormat,

        /// Route manager rework tokens back to their stages
        #[arg(long, value_parser = parse_rework_routes)]
        rework_routes: Option<ReworkRoutes>,
    },

    /// Resolve every prompt definition and list its parameters
    Prompts,

    /// Show the effective configuration and where each value came from
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Mermaid,
    Edges,
}

fn parse_rework_routes(s: &str) -> Result<ReworkRoutes, String> {
    ReworkRoutes::parse(s).ok_or_else(|| format!("unknown rework mode '{s}' (expected collapse or loop_back)"))
}

/// Build the clap command (used by tests and completions).
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
