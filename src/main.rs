//! `bersihin-inference` server - classify submission photos over HTTP.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bersihin_inference::config::{self, DEFAULT_CONFIG_PATH, DEFAULT_ENV_FILE};
use bersihin_inference::server::{self, AppState};
use bersihin_inference::{OnnxModel, Settings};

/// Serve an ONNX image classifier over HTTP.
#[derive(Parser, Debug)]
#[command(name = "bersihin-inference")]
#[command(version, about, long_about = None)]
struct Args {
    /// Settings file (TOML). Missing files are skipped.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, value_name = "PATH")]
    config: PathBuf,

    /// Environment file exported before settings are read. Missing files are skipped.
    #[arg(long, default_value = DEFAULT_ENV_FILE, value_name = "PATH")]
    env_file: PathBuf,

    /// ONNX model to serve, overriding `model.path`.
    #[arg(short, long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Address to bind, overriding `server.host`.
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port to bind, overriding `server.port`.
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[actix_web::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Before logging, so RUST_LOG can come from the file too
    let env_file = config::load_env_file(&args.env_file);

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("bersihin_inference={log_level},actix_web={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match env_file {
        Ok(true) => tracing::info!(path = %args.env_file.display(), "Loaded environment file"),
        Ok(false) => {}
        Err(err) => {
            tracing::error!("{err}");
            return ExitCode::FAILURE;
        }
    }

    if let Err(err) = run(args).await {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn run(args: Args) -> Result<()> {
    let mut settings = Settings::load_from_path(&args.config).with_context(|| {
        format!("Failed to load settings from {}", args.config.display())
    })?;

    if let Some(model) = args.model {
        settings.model.path = model;
    }
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    settings.validate().context("Invalid settings")?;

    if !settings.model.path.exists() {
        anyhow::bail!("Model file does not exist: {}", settings.model.path.display());
    }

    let model = OnnxModel::load(&settings.model.path, &settings.model)
        .context("Failed to load model")?;

    let state = AppState::new(&settings, Arc::new(model)).context("Failed to initialize server")?;

    server::run(&settings, state)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
