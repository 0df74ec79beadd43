//! Stemsplit - serverless audio stem separation worker.
//!
//! A job names an audio URL; the worker downloads it, separates it into
//! stems with a Demucs-family ONNX model, encodes each stem and uploads it
//! to S3-compatible storage, answering with a stem to URL map.

#![warn(missing_docs)]

pub mod audio;
pub mod cli;
pub mod config;
pub mod constants;
pub mod encode;
pub mod error;
pub mod fetch;
pub mod job;
pub mod pipeline;
pub mod publish;
pub mod separation;

use clap::Parser;
use cli::{Cli, Command, ConfigAction, JobOverrides, ModelsAction, RunArgs, WorkerArgs};
use config::{
    Config, StorageSettings, config_file_path, find_model, load_config, model_names, model_path,
    save_config, validate_config, validate_model_config,
};
use error::JobError;
use fetch::HttpFetcher;
use job::{HandlerResponse, JobPayload};
use pipeline::JobRunner;
use publish::S3ObjectStore;
use separation::{ModelCache, OnnxModelLoader, SeparationEngine};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

pub use error::{Error, Result};

/// Main entry point for the stemsplit CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    // Remove job workspaces when interrupted mid-job
    if let Err(e) = ctrlc::set_handler(|| {
        job::cleanup_all_workspaces();
        std::process::exit(130); // 128 + SIGINT(2)
    }) {
        warn!("Failed to install Ctrl+C handler: {e}");
    }

    let config = load_config(cli.config.as_deref())?;

    handle_command(cli.command, config, cli.config.as_deref())
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(verbose, quiet)));

    // stdout carries job responses only
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Default filter directive for the `-q`/`-v` flags.
fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    // ORT logging is suppressed by default because CUDA fallback is expected in auto mode.
    if quiet {
        return "warn,ort=off";
    }
    match verbose {
        0 => "info,ort=off",
        1 => "debug,ort=warn",
        2 => "trace,ort=info",
        _ => "trace,ort=debug",
    }
}

fn handle_command(command: Command, config: Config, config_path: Option<&Path>) -> Result<()> {
    match command {
        Command::Run(args) => run_job(&args, config),
        Command::Worker(args) => run_worker(&args, config),
        Command::Models { action } => handle_models_command(action, &config),
        Command::Config { action } => handle_config_command(action, &config, config_path),
    }
}

/// Production runner: HTTP fetcher, S3 store, ONNX models.
type Runner = JobRunner<HttpFetcher, S3ObjectStore>;

fn build_runner(mut config: Config, overrides: &JobOverrides) -> Result<Runner> {
    overrides.apply(&mut config);
    validate_config(&config)?;

    let settings = StorageSettings::from_env()?;
    let fallback_bucket = settings.default_bucket.clone();
    let store = S3ObjectStore::new(settings, &config.storage)?;
    let fetcher = HttpFetcher::new(&config.fetch)?;

    let models_dir = config::models_dir(config.inference.models_dir.as_ref())?;
    info!(
        "Models directory: {} (device: {})",
        models_dir.display(),
        config.inference.device
    );
    let loader = OnnxModelLoader::new(models_dir, &config.inference);
    let engine = SeparationEngine::new(Arc::new(ModelCache::new()), Arc::new(loader));

    Ok(JobRunner::new(config, engine, fetcher, store).with_fallback_bucket(fallback_bucket))
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| Error::Internal {
        message: format!("Failed to create async runtime: {e}"),
    })
}

fn read_payload(path: &Path) -> Result<String> {
    let read_error = |e| Error::PayloadRead {
        path: path.to_path_buf(),
        source: e,
    };

    if path == Path::new("-") {
        let mut payload = String::new();
        std::io::stdin()
            .read_to_string(&mut payload)
            .map_err(read_error)?;
        Ok(payload)
    } else {
        std::fs::read_to_string(path).map_err(read_error)
    }
}

fn render_response(response: &HandlerResponse) -> Result<String> {
    serde_json::to_string(response).map_err(|e| Error::ResponseSerialize { source: e })
}

/// Handle the `run` command.
fn run_job(args: &RunArgs, config: Config) -> Result<()> {
    let runner = build_runner(config, &args.overrides)?;
    let payload = read_payload(&args.payload)?;
    let runtime = build_runtime()?;

    let outcome = runtime.block_on(async {
        let payload = JobPayload::parse(&payload)?;
        runner.handle_payload(&payload).await
    });

    match outcome {
        Ok(result) => {
            println!("{}", render_response(&HandlerResponse::Success(result))?);
            Ok(())
        }
        Err(e) => {
            let response = HandlerResponse::Failure { error: e.report() };
            println!("{}", render_response(&response)?);
            Err(Error::Job(e))
        }
    }
}

/// Handle the `worker` command.
fn run_worker(args: &WorkerArgs, config: Config) -> Result<()> {
    let runner = build_runner(config, &args.overrides)?;

    if args.preload {
        let name = runner.config().defaults.model.clone();
        let model = config::get_model(runner.config(), &name)?;
        info!("Preloading model: {name}");
        if let Err(e) = runner.preload(&name, &model) {
            warn!("Failed to preload model '{name}': {e}");
        }
    }

    let runtime = build_runtime()?;
    runtime.block_on(async {
        let mut reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut line = Vec::new();
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        info!("Worker ready, reading payloads from stdin");
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }

            // A bad line gets its own error response; later lines still run
            let response = match std::str::from_utf8(&line) {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => runner.handle(text).await,
                Err(e) => {
                    let err = JobError::validation(format!("payload is not valid UTF-8: {e}"));
                    warn!("Skipping payload line: {err}");
                    HandlerResponse::Failure {
                        error: err.report(),
                    }
                }
            };
            if response.is_success() {
                succeeded += 1;
            } else {
                failed += 1;
            }

            let mut rendered = render_response(&response)?;
            rendered.push('\n');
            stdout.write_all(rendered.as_bytes()).await?;
            stdout.flush().await?;
        }

        info!("Worker finished: {succeeded} succeeded, {failed} failed");
        Ok::<(), Error>(())
    })
}

/// Handle the `config` command.
fn handle_config_command(
    action: ConfigAction,
    config: &Config,
    explicit: Option<&Path>,
) -> Result<()> {
    let path = explicit.map_or_else(config_file_path, |p| Ok(p.to_path_buf()))?;

    match action {
        ConfigAction::Init => {
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
            } else {
                save_config(&Config::default(), &path)?;
                println!("Created configuration file: {}", path.display());
                println!("\nNext steps:");
                println!("  export AWS_ACCESS_KEY_ID=... AWS_SECRET_ACCESS_KEY=...");
                println!("  stemsplit models list");
            }
            Ok(())
        }
        ConfigAction::Show => {
            let rendered = toml::to_string_pretty(config)
                .map_err(|e| Error::ConfigSerialize { source: e })?;
            println!("{rendered}");
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// Handle the `models` command.
fn handle_models_command(action: ModelsAction, config: &Config) -> Result<()> {
    let mut missing = Vec::new();

    match action {
        ModelsAction::List => println!("Known models:"),
        ModelsAction::Check => {}
    }

    for name in model_names(config) {
        let model = find_model(config, &name).ok_or_else(|| Error::ModelNotFound {
            name: name.clone(),
        })?;
        let path: PathBuf = model_path(config, &name, &model)?;
        let present = path.is_file();

        match action {
            ModelsAction::List => {
                let default_marker = if config.defaults.model == name {
                    " [default]"
                } else {
                    ""
                };
                println!(
                    "  {name}{default_marker}: [{}] {} Hz, {} ch",
                    model.sources.join(", "),
                    model.sample_rate,
                    model.channels
                );
                println!(
                    "    {} ({})",
                    path.display(),
                    if present { "present" } else { "missing" }
                );
            }
            ModelsAction::Check => {
                validate_model_config(&name, &model)?;
                if present {
                    println!("  {name}: OK");
                } else {
                    println!("  {name}: missing {}", path.display());
                    missing.push(name);
                }
            }
        }
    }

    if matches!(action, ModelsAction::Check) && missing.contains(&config.defaults.model) {
        return Err(Error::ConfigValidation {
            message: format!(
                "file for default model '{}' not found; place <model>.onnx in the models directory",
                config.defaults.model
            ),
        });
    }

    Ok(())
}
