//! Command implementations.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use fsts_config::Config;
use fsts_orchestrator::{OrchestratorHandle, PipelineGraph};
use fsts_prompt_template::{PromptCatalog, PromptStore};
use fsts_stages::RoutePolicy;
use fsts_usage::UsageSummary;
use fsts_utils::StageId;
use fsts_utils::error::FstsError;

use super::args::GraphFormat;
use crate::deliverable::clean_markdown;

/// Options of `fsts run` that do not belong to the configuration layer.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// `-` reads stdin.
    pub code: PathBuf,
    pub template: PathBuf,
    /// `None` prints the document to stdout.
    pub output: Option<PathBuf>,
    pub raw: bool,
    pub usage_json: bool,
}

fn read_input(path: &Path) -> Result<String, FstsError> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).map_err(|e| {
        FstsError::Io(io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })
}

fn prompt_store(config: &Config) -> Result<Arc<dyn PromptStore>, FstsError> {
    Ok(match &config.prompts.dir {
        Some(dir) => Arc::new(PromptCatalog::load_dir(dir)?),
        None => Arc::new(PromptCatalog::builtin()?),
    })
}

/// Execute `fsts run`.
pub async fn execute_run(config: Config, options: &RunOptions) -> Result<(), FstsError> {
    let code = read_input(&options.code)?;
    let template = read_input(&options.template)?;

    let handle = OrchestratorHandle::from_config(config)?;
    let input = handle.input(code, template);
    let outcome = handle.run(input).await?;

    let document = if options.raw {
        outcome.deliverable.clone()
    } else {
        let cleaned = clean_markdown(&outcome.deliverable);
        if cleaned.text.is_empty() {
            warn!(run_id = %outcome.run_id, "Manager output was empty after cleanup");
        }
        cleaned.text
    };

    match &options.output {
        Some(path) => {
            std::fs::write(path, format!("{document}\n"))?;
            info!(run_id = %outcome.run_id, path = %path.display(), "Wrote specification");
            println!(
                "✓ Specification written to {} ({} reviews, {:.1}s)",
                path.display(),
                outcome.state.review_count(),
                outcome.duration.as_secs_f64()
            );
            print_usage(&outcome.usage, options.usage_json, false)?;
        }
        None => {
            println!("{document}");
            print_usage(&outcome.usage, options.usage_json, true)?;
        }
    }
    Ok(())
}

/// Usage goes to stderr when stdout carries the document.
fn print_usage(usage: &UsageSummary, json: bool, to_stderr: bool) -> Result<(), FstsError> {
    let text = if json {
        serde_json::to_string_pretty(usage).map_err(|e| FstsError::Io(io::Error::other(e)))?
    } else {
        format_usage(usage)
    };
    if to_stderr {
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
    Ok(())
}

pub(crate) fn format_usage(usage: &UsageSummary) -> String {
    if usage.is_empty() {
        return "Usage: no counters reported".to_string();
    }
    let width = usage.keys().map(String::len).max().unwrap_or(0);
    let mut out = String::from("Usage:");
    for (key, tally) in usage {
        out.push_str(&format!("\n  {key:<width$}  {tally}"));
    }
    out
}

/// Execute `fsts graph`.
pub fn execute_graph(config: &Config, format: GraphFormat) -> Result<(), FstsError> {
    let policy = RoutePolicy::new(
        config.pipeline.rework_routes,
        config.pipeline.max_rework_passes,
    );
    let graph = PipelineGraph::standard(policy)?;
    let text = match format {
        GraphFormat::Mermaid => graph.to_mermaid(),
        GraphFormat::Edges => graph.to_edge_list(),
    };
    print!("{text}");
    if !text.ends_with('\n') {
        println!();
    }
    Ok(())
}

/// Execute `fsts prompts`: resolve every model stage and list its parameters.
pub fn execute_prompts(config: &Config) -> Result<(), FstsError> {
    let store = prompt_store(config)?;
    let source = config
        .prompts
        .dir
        .as_ref()
        .map_or_else(|| "built-in".to_string(), |d| d.display().to_string());
    println!("Prompt catalog: {source}");

    let mut first_error = None;
    for stage in StageId::all().filter(StageId::invokes_model) {
        match store.resolve(stage) {
            Ok(resolved) => {
                println!("  ✓ {stage} [{}]", short_fingerprint(&resolved.fingerprint));
                println!("      parameters: {}", resolved.parameter_names.join(", "));
                if !resolved.briefs.is_empty() {
                    let names: Vec<&str> = resolved.briefs.keys().map(String::as_str).collect();
                    println!("      briefs: {}", names.join(", "));
                }
            }
            Err(e) => {
                println!("  ✗ {stage}: {e}");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn short_fingerprint(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

/// Execute `fsts config`.
pub fn execute_config(config: &Config) {
    println!("Effective configuration:");
    if let Some(path) = &config.config_path {
        println!("  (file: {})", path.display());
    }
    let effective = config.effective_config();
    let width = effective.keys().map(String::len).max().unwrap_or(0);
    for (key, (value, source)) in effective {
        println!("  {key:<width$} = {value}  [{source}]");
    }
}
