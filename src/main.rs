//! llmcommit - CLI entry point.

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dialoguer::Confirm;
use git2::Repository;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use llmcommit::commit::{DiffScope, collect_diff_for_paths, create_commit_for_paths, generate_commit_message, prepare_prompt};
use llmcommit::config::{ConfigLayer, EffectiveConfig};
use llmcommit::error::{CommitError, ConfigError, GenerateError, PipelineError};
use llmcommit::pipeline::ProviderPipeline;
use llmcommit::provider::ProviderKind;

/// Exit code when the repository or configuration is unusable.
const EXIT_CONTEXT: u8 = 2;
/// Exit code when no provider produced a message.
const EXIT_GENERATION: u8 = 3;
/// Exit code after Ctrl-C (128 + SIGINT).
const EXIT_CANCELLED: u8 = 130;

/// Generate a git commit message from your changes with a local or cloud LLM.
#[derive(Parser, Debug)]
#[command(name = "llmcommit")]
#[command(about = "Generate git commit messages with local or cloud LLMs")]
#[command(version)]
struct Cli {
    /// Message language code (en, fi, sv, et, de, fr, es, or any other code)
    #[arg(long)]
    lang: Option<String>,

    /// Comma-separated provider order, e.g. "openai,ollama"
    #[arg(long)]
    providers: Option<String>,

    /// Model override for one provider (repeatable)
    #[arg(long = "model", value_name = "PROVIDER=MODEL", value_parser = parse_model_override)]
    models: Vec<(ProviderKind, String)>,

    /// Request timeout in seconds, applied to every provider
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Describe all tracked changes, not only staged ones (like `git commit -a`)
    #[arg(short = 'a', long)]
    all: bool,

    /// Print the redacted prompt and provider order without contacting any provider
    #[arg(long)]
    dry_run: bool,

    /// Create the commit with the generated message
    #[arg(long)]
    commit: bool,

    /// Skip the confirmation prompt when committing
    #[arg(short = 'y', long, requires = "commit")]
    yes: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Limit the description (and the commit) to these paths
    #[arg(last = true, value_name = "PATHS")]
    paths: Vec<String>,
}

impl Cli {
    /// Flags as the highest-precedence configuration layer.
    fn config_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::new();
        if let Some(providers) = &self.providers {
            layer.set("providers", providers.as_str());
        }
        if let Some(lang) = &self.lang {
            layer.set("language", lang.as_str());
        }
        if let Some(timeout) = self.timeout {
            for kind in ProviderKind::ALL {
                layer.set(format!("{kind}.timeout"), timeout.to_string());
            }
        }
        for (kind, model) in &self.models {
            layer.set(format!("{kind}.model"), model.as_str());
        }
        layer
    }
}

fn parse_model_override(value: &str) -> Result<(ProviderKind, String), String> {
    let (name, model) = value
        .split_once('=')
        .ok_or_else(|| format!("expected PROVIDER=MODEL, got '{value}'"))?;
    let kind = ProviderKind::from_name(name.trim())
        .ok_or_else(|| format!("unknown provider '{}' (known: ollama, openai, gemini)", name.trim()))?;
    let model = model.trim();
    if model.is_empty() {
        return Err(format!("empty model name for {kind}"));
    }
    Ok((kind, model.to_string()))
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = match verbose {
            0 => "llmcommit=info",
            1 => "llmcommit=debug",
            _ => "llmcommit=trace",
        };
        EnvFilter::new(directive)
    });

    tracing_subscriber::fmt()
        .without_time()
        .with_env_filter(filter)
        .with_target(verbose != 0)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(hint) = hint(&err) {
                eprintln!("Hint: {hint}");
            }
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Step 1: Open git repository
    let repo = Repository::discover(".")
        .context("Not a git repository. Run llmcommit from within a git repository.")?;
    let Some(root) = repo.workdir().map(|p| p.to_path_buf()) else {
        bail!("Bare repositories have no working tree to describe");
    };

    // Step 2: Resolve configuration
    let config = EffectiveConfig::load(&cli.config_layer(), &root).context("Invalid configuration")?;
    let pipeline = ProviderPipeline::from_config(&config)?;
    let order = pipeline
        .order()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(" -> ");

    // Step 3: Collect changes
    let scope = if cli.all { DiffScope::All } else { DiffScope::Staged };
    let summary = collect_diff_for_paths(&repo, scope, &cli.paths).context("Failed to collect changes")?;
    eprintln!(
        "Describing {} file(s), +{} -{}",
        summary.changed_files.len(),
        summary.additions,
        summary.deletions
    );

    if cli.dry_run {
        let prepared = prepare_prompt(&config, &summary.context());
        println!("Provider order: {order}");
        println!("Redacted secrets: {}", prepared.redacted.len());
        println!("Truncated: {}", prepared.truncated);
        println!("\n--- Prompt ---\n{}", prepared.prompt);
        return Ok(());
    }

    // Step 4: Generate, stopping on Ctrl-C
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    eprintln!(
        "Generating commit message ({order}, up to {} attempt(s) each)...",
        pipeline.policy().max_attempts()
    );
    let generated = generate_commit_message(&pipeline, &config, &summary.context(), &cancel).await?;

    eprintln!(
        "✓ {} after {} attempt(s)",
        generated.completion.provider,
        generated.completion.attempts_on_winner()
    );
    println!("{}", generated.message);

    // Step 5: Optionally commit
    if !cli.commit {
        return Ok(());
    }

    if !cli.yes {
        let confirmed = Confirm::new()
            .with_prompt("Commit with this message?")
            .default(true)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            eprintln!("Commit aborted.");
            return Ok(());
        }
    }

    let oid = create_commit_for_paths(&repo, &generated.message, scope, &cli.paths)
        .context("Failed to create commit")?;
    eprintln!("✓ Created commit {:.7}", oid.to_string());
    Ok(())
}

/// Advice for a run where every provider was skipped before any request.
fn hint(err: &anyhow::Error) -> Option<&'static str> {
    let report = err.chain().find_map(|cause| match cause.downcast_ref::<GenerateError>() {
        Some(GenerateError::Pipeline(PipelineError::AllProvidersExhausted(report))) => Some(report),
        _ => None,
    })?;
    if report.attempted().next().is_some() {
        return None;
    }
    Some("no provider was contacted; set OPENAI_API_KEY or GEMINI_API_KEY, or enable ollama in LLMCOMMIT_PROVIDERS")
}

/// Map a failure to the process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<GenerateError>() {
            return match err {
                GenerateError::Config(_) => EXIT_CONTEXT,
                GenerateError::Pipeline(PipelineError::Cancelled(_)) => EXIT_CANCELLED,
                GenerateError::Pipeline(PipelineError::AllProvidersExhausted(_)) | GenerateError::EmptyMessage(_) => {
                    EXIT_GENERATION
                }
            };
        }
        if cause.is::<ConfigError>() || cause.is::<CommitError>() || cause.is::<git2::Error>() {
            return EXIT_CONTEXT;
        }
    }
    1
}
