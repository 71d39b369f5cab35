//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, discovers configuration, installs logging,
//! creates the tokio runtime and dispatches to the command handlers. It owns
//! all error output; `main` only maps the exit code.

use clap::Parser;

use fsts_config::{CliArgs, Config};
use fsts_utils::error::{ConfigError, UserFriendlyError};
use fsts_utils::logging::{LogOptions, init_tracing};
use fsts_utils::redaction::redact;
use fsts_utils::ExitCode;

use super::args::{Cli, Commands};
use super::commands;

/// Main CLI execution function.
///
/// On error the report has already been printed to stderr; the returned
/// [`ExitCode`] is the only thing the caller needs.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    let cli_args = cli_args_from(&cli);

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", config_report(&err));
            return Err(ExitCode::CLI_ARGS);
        }
    };

    let log_options = LogOptions {
        verbose: config.logging.verbose,
        json: config.logging.json,
    };
    if let Err(e) = init_tracing(log_options) {
        eprintln!("✗ Failed to initialize logging: {e}");
        return Err(ExitCode::INTERNAL);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Run {
                code,
                template,
                output,
                stdout,
                raw,
                usage_json,
                ..
            } => {
                let options = commands::RunOptions {
                    code,
                    template,
                    output: (!stdout).then_some(output),
                    raw,
                    usage_json,
                };
                commands::execute_run(config, &options).await
            }
            Commands::Graph { format, .. } => commands::execute_graph(&config, format),
            Commands::Prompts => commands::execute_prompts(&config),
            Commands::Config => {
                commands::execute_config(&config);
                Ok(())
            }
        }
    });

    result.map_err(|err| {
        eprintln!("{}", err.display_for_user());
        err.to_exit_code()
    })
}

/// Map parsed flags onto the configuration layer's CLI overrides.
fn cli_args_from(cli: &Cli) -> CliArgs {
    let mut args = CliArgs {
        config_path: cli.config.clone(),
        provider: cli.provider,
        model: cli.model.clone(),
        base_url: cli.base_url.clone(),
        prompts_dir: cli.prompts_dir.clone(),
        verbose: cli.verbose.then_some(true),
        log_json: cli.log_json.then_some(true),
        ..CliArgs::default()
    };

    match &cli.command {
        Commands::Run {
            dry_run,
            min_output_reviews,
            max_output_reviews,
            rework_routes,
            recursion_limit,
            run_timeout_secs,
            ..
        } => {
            args.min_output_reviews = *min_output_reviews;
            args.max_output_reviews = *max_output_reviews;
            args.rework_routes = *rework_routes;
            args.recursion_limit = *recursion_limit;
            args.run_timeout_secs = *run_timeout_secs;
            if *dry_run {
                args.provider = Some(fsts_config::Provider::Scripted);
            }
        }
        Commands::Graph { rework_routes, .. } => {
            args.rework_routes = *rework_routes;
        }
        Commands::Prompts | Commands::Config => {}
    }

    args
}

/// Render a configuration discovery failure for the terminal.
fn config_report(err: &anyhow::Error) -> String {
    if let Some(config_err) = err.downcast_ref::<ConfigError>() {
        let mut out = format!("Error: {}\n", config_err.user_message());
        if let Some(ctx) = config_err.context() {
            out.push_str(&format!("\nContext: {ctx}\n"));
        }
        let suggestions = config_err.suggestions();
        if !suggestions.is_empty() {
            out.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                out.push_str(&format!("  • {suggestion}\n"));
            }
        }
        return redact(&out);
    }
    redact(&format!("Error: {err:#}\n"))
}
