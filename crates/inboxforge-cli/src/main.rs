mod logging;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use inboxforge_eval::{EvalError, StoreVerifier, VerificationReport, VerifyOptions, render_report};
use inboxforge_generate::{GenerationConfig, GenerationEngine, GenerationError};
use logging::init_logging;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
enum CliError {
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("verification error: {0}")]
    Eval(#[from] EvalError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(String),
}

#[derive(Parser, Debug)]
#[command(name = "inboxforge", version, about = "Synthetic mail archive generator")]
struct Cli {
    /// Append JSON log lines to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a fresh archive store.
    Generate(GenerateArgs),
    /// Check the consistency of an existing store.
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// TOML file overriding the built-in configuration.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    /// Number of randomly generated messages.
    #[arg(long)]
    messages: Option<u32>,
    /// Output store path.
    #[arg(long)]
    out: Option<PathBuf>,
    /// External schema file(s), tried in order before the embedded fallback.
    #[arg(long, value_name = "SCHEMA_SQL")]
    schema: Vec<PathBuf>,
    /// Skip the curated thread.
    #[arg(long, default_value_t = false)]
    no_curated: bool,
    /// Verify the store once it is written.
    #[arg(long, default_value_t = false)]
    verify: bool,
    /// Print the run report as JSON instead of a summary.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Store to verify.
    #[arg(default_value = "demo-data/msgvault.db")]
    store: PathBuf,
    /// Violations listed per check.
    #[arg(long, default_value_t = 20)]
    max_examples: usize,
    /// Report a missing curated thread as a violation.
    #[arg(long, default_value_t = false)]
    require_curated: bool,
    /// Exit successfully even when violations are found.
    #[arg(long, default_value_t = false)]
    no_strict: bool,
    /// Write the markdown report to this path.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Print the report as JSON instead of markdown.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Verify(args) => run_verify(args),
    }
}

fn run_generate(args: GenerateArgs) -> Result<(), CliError> {
    let mut config = match &args.config {
        Some(path) => GenerationConfig::from_toml_path(path)?,
        None => GenerationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(messages) = args.messages {
        config.target_messages = messages;
    }
    if let Some(out) = args.out {
        config.output = out;
    }
    if !args.schema.is_empty() {
        config.schema.paths = args.schema;
    }
    if args.no_curated {
        config.curated_thread = false;
    }

    let require_curated = config.curated_thread;
    let result = GenerationEngine::new(config)?.run()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.report)?);
    } else {
        println!("{}", result.report);
        println!("store: {}", result.store_path.display());
        println!("report: {}", result.report_path.display());
    }

    if args.verify {
        let verifier = StoreVerifier::new(VerifyOptions {
            require_curated,
            ..VerifyOptions::default()
        });
        let report = verifier.verify_path(&result.store_path)?;
        print_verification(&report, false, None)?;
        verifier.enforce(&report)?;
    }
    Ok(())
}

fn run_verify(args: VerifyArgs) -> Result<(), CliError> {
    let verifier = StoreVerifier::new(VerifyOptions {
        strict: !args.no_strict,
        max_examples: args.max_examples,
        require_curated: args.require_curated,
    });
    info!(store = %args.store.display(), "verifying store");
    let report = verifier.verify_path(&args.store)?;
    print_verification(&report, args.json, args.report.as_deref())?;
    verifier.enforce(&report)?;
    Ok(())
}

fn print_verification(
    report: &VerificationReport,
    json: bool,
    report_path: Option<&Path>,
) -> Result<(), CliError> {
    let markdown = render_report(report);
    if json {
        println!("{}", report.to_json_pretty()?);
    } else {
        println!("{markdown}");
    }
    if let Some(path) = report_path {
        std::fs::write(path, format!("{markdown}\n"))?;
    }
    Ok(())
}
