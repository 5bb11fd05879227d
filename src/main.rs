// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! stocktag: stock media metadata generator
//!
//! Batch-describes media with a Gemini vision model, renames the files and
//! writes an upload-ready CSV.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use stocktag::config::{AppConfig, GEMINI_MODELS};
use stocktag::dispatcher::{cancellation, discover_media, BatchSummary, Dispatcher};
use stocktag::gemini::GeminiClient;
use stocktag::ledger::LEDGER_FILE;
use stocktag::media::NormalizerRegistry;
use stocktag::pipeline::{Pipeline, TaskOutcome, TaskSettings};
use stocktag::{Result, StocktagError};

/// stocktag CLI - stock media metadata generator
#[derive(Parser, Debug)]
#[command(name = "stocktag")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.0.0")]
#[command(about = "Describe, rename and catalogue stock media with Gemini", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process every supported file in the input folder
    Run(RunArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Check that the API key and model answer
    Status,

    /// List known Gemini model identifiers
    Models,

    /// Initialize a new stocktag project
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Input folder (overrides config)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output folder (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Gemini API key (overrides config)
    #[arg(long)]
    api_key: Option<String>,

    /// Gemini model identifier (overrides config)
    #[arg(short, long)]
    model: Option<String>,

    /// Number of parallel workers (1-10)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Pause after each file, in seconds (0-60)
    #[arg(long)]
    delay: Option<u64>,

    /// Maximum title length in characters
    #[arg(long)]
    max_title_length: Option<usize>,

    /// Maximum keywords per file
    #[arg(long)]
    max_keywords: Option<usize>,

    /// Keywords added to every file, comma separated
    #[arg(long)]
    custom_keywords: Option<String>,

    /// Skip the Gemini connectivity check on startup
    #[arg(long)]
    skip_health_check: bool,

    /// Write the effective settings back to the config file
    #[arg(long)]
    save_config: bool,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !cli.quiet {
        info!("stocktag v1.0.0 - stock media metadata generator");
    }

    // Load configuration
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Some(Commands::Run(args)) => run_batch(config, args, &cli.config, &cli.format, cli.quiet).await,
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Status) => run_status(config).await,
        Some(Commands::Models) => run_models(&config),
        Some(Commands::Init { dir, force }) => run_init(dir, force),
        None => run_batch(config, RunArgs::default(), &cli.config, &cli.format, cli.quiet).await,
    }
}

/// Fold command-line overrides into the loaded config
fn apply_overrides(config: &mut AppConfig, args: &RunArgs) {
    if let Some(ref input) = args.input {
        config.input_path = input.to_string_lossy().to_string();
    }
    if let Some(ref output) = args.output {
        config.output_path = output.to_string_lossy().to_string();
    }
    if let Some(ref key) = args.api_key {
        config.api_key = key.clone();
    }
    if let Some(ref model) = args.model {
        config.model = model.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(delay) = args.delay {
        config.delay = delay;
    }
    if let Some(length) = args.max_title_length {
        config.max_title_length = length;
    }
    if let Some(count) = args.max_keywords {
        config.max_keywords = count;
    }
    if let Some(ref keywords) = args.custom_keywords {
        config.custom_keywords = keywords.clone();
    }
}

/// Check the settings a batch cannot start without
fn check_runnable(config: &AppConfig) -> Result<()> {
    config.validate()?;

    if config.api_key.trim().is_empty() {
        return Err(StocktagError::Config(
            "No API key configured. Set api_key in the config file or pass --api-key".to_string(),
        ));
    }
    if config.input_path.trim().is_empty() || !config.input_dir().is_dir() {
        return Err(StocktagError::Config(format!(
            "Input folder does not exist: {:?}",
            config.input_path
        )));
    }
    if config.output_path.trim().is_empty() {
        return Err(StocktagError::Config(
            "No output folder configured. Set output_path or pass --output".to_string(),
        ));
    }
    Ok(())
}

/// Run one batch over the input folder
async fn run_batch(
    mut config: AppConfig,
    args: RunArgs,
    config_path: &Path,
    format: &str,
    quiet: bool,
) -> Result<()> {
    apply_overrides(&mut config, &args);
    check_runnable(&config)?;

    let input = config.input_dir();
    let output = config.output_dir();
    std::fs::create_dir_all(&output)?;

    let client = GeminiClient::new(&config)?;

    if !args.skip_health_check {
        info!("Checking Gemini availability (model {})...", client.model());
        client.health_check().await?;
        info!("Gemini is reachable");
    } else {
        warn!("Skipping Gemini health check");
    }

    if args.save_config {
        config.save(config_path)?;
        info!("Saved settings to {:?}", config_path);
    }

    let registry = Arc::new(NormalizerRegistry::new(&config.tools));
    info!("Loaded {} normalizers: {:?}", registry.names().len(), registry.names());

    let files = discover_media(&input, Some(&output), &registry)?;
    if files.is_empty() {
        warn!("No supported media files found in {:?}", input);
        return Ok(());
    }
    info!("Found {} files in {:?}", files.len(), input);

    // Cancel pending tasks on Ctrl+C or SIGTERM; running ones finish.
    let (cancel_handle, cancel) = cancellation();
    let shutdown = shutdown_signal();
    tokio::spawn(async move {
        shutdown.await;
        warn!("Finishing running files and skipping the rest...");
        cancel_handle.cancel();
    });

    let pipeline = Pipeline::new(registry, Arc::new(client));
    let dispatcher = Dispatcher::new(pipeline, config.workers, TaskSettings::from_config(&config));

    let show_progress = format == "text" && !quiet;
    let summary = dispatcher
        .run(files, &output, cancel, |progress| {
            if show_progress && progress.outcome.progress_units() > 0 {
                println!("Processing: {}/{}", progress.completed, progress.total);
            }
        })
        .await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_summary(&summary, &output),
    }

    Ok(())
}

/// Resolves on the first Ctrl+C or SIGTERM. The SIGTERM handler is
/// installed before this returns.
fn shutdown_signal() -> impl std::future::Future<Output = ()> {
    #[cfg(unix)]
    let sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| warn!("Failed to install SIGTERM handler: {}", e))
        .ok();

    async move {
        let ctrl_c = async {
            if signal::ctrl_c().await.is_err() {
                warn!("Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match sigterm {
                Some(mut sigterm) => {
                    sigterm.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }
    }
}

fn print_summary(summary: &BatchSummary, output: &Path) {
    println!(
        "\nDone: {} succeeded, {} failed, {} skipped of {} files in {:.1}s",
        summary.succeeded, summary.failed, summary.skipped, summary.total, summary.elapsed_secs
    );

    if summary.failed > 0 {
        println!("\nFailed files:");
        for (source, kind, reason) in summary.failures() {
            println!("  {} [{}] {}", source.display(), kind, reason);
        }
    }

    if summary.skipped > 0 {
        println!("\nNot processed (cancelled):");
        for outcome in &summary.outcomes {
            if let TaskOutcome::Skipped { source } = outcome {
                println!("  {}", source.display());
            }
        }
    }

    if summary.ledger_rows > 0 {
        println!("\nLedger: {}", output.join(LEDGER_FILE).display());
    }
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let mut shown = config;
            if !shown.api_key.is_empty() {
                shown.api_key = "********".to_string();
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Model: {}", config.model);
            println!("  Input: {:?}", config.input_path);
            println!("  Output: {:?}", config.output_path);
            println!("  Workers: {}, delay: {}s", config.workers, config.delay);
            if config.api_key.trim().is_empty() {
                println!("  Warning: no API key set");
            }
        }
    }

    Ok(())
}

/// Run the connectivity preflight
async fn run_status(config: AppConfig) -> Result<()> {
    println!("stocktag v1.0.0 Status");
    println!("======================");

    if config.api_key.trim().is_empty() {
        println!("Gemini: no API key configured");
    } else {
        let client = GeminiClient::new(&config)?;
        match client.health_check().await {
            Ok(()) => println!("Gemini: Reachable ({})", client.model()),
            Err(e) => println!("Gemini: Error - {}", e),
        }
    }

    let registry = NormalizerRegistry::new(&config.tools);
    println!("\nNormalizers: {}", registry.names().join(", "));
    println!("  ffmpeg: {}", config.tools.ffmpeg);
    println!("  ffprobe: {}", config.tools.ffprobe);
    println!("  ghostscript: {}", config.tools.ghostscript);

    println!("\nConfiguration:");
    println!("  Model: {}", config.model);
    println!("  Input: {:?}", config.input_path);
    println!("  Output: {:?}", config.output_path);
    println!("  Workers: {}", config.workers);

    Ok(())
}

fn run_models(config: &AppConfig) -> Result<()> {
    println!("Known Gemini models:");
    for model in GEMINI_MODELS {
        let marker = if *model == config.model { "→" } else { " " };
        println!("  {} {}", marker, model);
    }
    if !GEMINI_MODELS.contains(&config.model.as_str()) {
        println!("  → {} (custom)", config.model);
    }
    Ok(())
}

/// Initialize a new stocktag project
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(StocktagError::Config(
            "config.json already exists. Use --force to overwrite".to_string(),
        ));
    }

    let input_dir = target.join("input");
    let output_dir = target.join("output");
    std::fs::create_dir_all(&input_dir)?;
    std::fs::create_dir_all(&output_dir)?;

    let config = AppConfig {
        input_path: input_dir.to_string_lossy().to_string(),
        output_path: output_dir.to_string_lossy().to_string(),
        ..AppConfig::default()
    };
    config.save(&config_path)?;

    println!("stocktag initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - input/");
    println!("  - output/");
    println!("\nNext steps:");
    println!("  1. Add your Gemini API key to config.json");
    println!("  2. Drop media into input/ and run: stocktag run");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["stocktag"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.command.is_none());
        assert_eq!(cli.format, "text");
    }

    #[test]
    fn test_cli_run_command() {
        let cli = Cli::try_parse_from([
            "stocktag", "run", "--input", "/tmp/in", "--workers", "4", "--skip-health-check",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.input, Some(PathBuf::from("/tmp/in")));
                assert_eq!(args.workers, Some(4));
                assert!(args.skip_health_check);
                assert!(!args.save_config);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["stocktag", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = AppConfig::default();
        let args = RunArgs {
            output: Some(PathBuf::from("/tmp/out")),
            model: Some("gemini-1.5-pro".to_string()),
            delay: Some(0),
            custom_keywords: Some("stock".to_string()),
            ..RunArgs::default()
        };
        apply_overrides(&mut config, &args);

        assert_eq!(config.output_path, "/tmp/out");
        assert_eq!(config.model, "gemini-1.5-pro");
        assert_eq!(config.delay, 0);
        assert_eq!(config.custom_keywords(), Some("stock"));
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            input_path: dir.path().to_string_lossy().to_string(),
            output_path: dir.path().join("out").to_string_lossy().to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(check_runnable(&config), Err(StocktagError::Config(_))));

        let config = AppConfig { api_key: "k".to_string(), ..config };
        assert!(check_runnable(&config).is_ok());
    }

    #[test]
    fn test_missing_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            api_key: "k".to_string(),
            input_path: dir.path().join("nope").to_string_lossy().to_string(),
            output_path: dir.path().join("out").to_string_lossy().to_string(),
            ..AppConfig::default()
        };
        assert!(check_runnable(&config).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_triggers_shutdown() {
        let waiter = tokio::spawn(shutdown_signal());
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
        tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_init_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        run_init(Some(dir.path().to_path_buf()), false).unwrap();

        assert!(dir.path().join("input").is_dir());
        assert!(dir.path().join("output").is_dir());
        let config = AppConfig::load(&dir.path().join("config.json")).unwrap();
        assert!(config.input_path.ends_with("input"));

        assert!(run_init(Some(dir.path().to_path_buf()), false).is_err());
        assert!(run_init(Some(dir.path().to_path_buf()), true).is_ok());
    }
}
