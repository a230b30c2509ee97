use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gcpact::config::{ConfigFormat, Settings, SettingsOverride};
use gcpact::dispatch::{self, Dispatcher, Group};
use gcpact::outcome::ActionResponse;
use gcpact::gcp::GcpClient;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Run a certificate, VM power or service-account key action on GCP
#[derive(Parser, Debug)]
#[command(name = "gcpact", version, about, long_about = None)]
struct Args {
    /// Adapter group the request is addressed to
    #[arg(value_enum)]
    group: Group,

    /// Request JSON, e.g. '{"action": "stop", ...}'. Read from stdin when
    /// neither this nor --request-file is given
    #[arg(short, long, conflicts_with = "request_file")]
    request: Option<String>,

    /// Read the request from a JSON or YAML file
    #[arg(short = 'f', long)]
    request_file: Option<PathBuf>,

    /// Config file (defaults to <config dir>/gcpact/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Named profile from the config file
    #[arg(short, long)]
    profile: Option<String>,

    /// Seconds to wait for a VM to stop during restart
    #[arg(long)]
    restart_timeout: Option<u64>,

    /// Seconds between VM status checks during restart
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval: Option<u64>,

    /// Print `{"status": <code>, "body": <response>}` instead of the bare response
    #[arg(long)]
    http_status: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Log to stderr instead of the log file
    #[arg(long)]
    log_stderr: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> Option<&'static str> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some("error"),
            LogLevel::Warn => Some("warn"),
            LogLevel::Info => Some("info"),
            LogLevel::Debug => Some("debug"),
            LogLevel::Trace => Some("trace"),
        }
    }
}

/// `RUST_LOG` wins over `--log-level`; with neither, logging stays off
fn setup_logging(
    level: LogLevel,
    to_stderr: bool,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = match (EnvFilter::try_from_default_env().ok(), level.directive()) {
        (Some(filter), _) => filter,
        (None, Some(directive)) => EnvFilter::new(directive),
        (None, None) => return Ok(None),
    };

    if to_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
        return Ok(None);
    }

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gcpact started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gcpact").join("gcpact.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gcpact").join("gcpact.log");
    }
    PathBuf::from("gcpact.log")
}

fn parse_request(content: &str, format: ConfigFormat) -> Result<Value> {
    let request: Value = match format {
        ConfigFormat::Json => serde_json::from_str(content).context("Request is not valid JSON")?,
        ConfigFormat::Yaml => serde_yaml::from_str(content).context("Request is not valid YAML")?,
    };
    Ok(request)
}

fn read_request(inline: Option<&str>, file: Option<&Path>) -> Result<Value> {
    if let Some(inline) = inline {
        return parse_request(inline, ConfigFormat::Json);
    }

    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file {}", path.display()))?;
        return parse_request(&content, ConfigFormat::from_path(path));
    }

    let mut content = String::new();
    std::io::stdin()
        .read_to_string(&mut content)
        .context("Failed to read request from stdin")?;
    parse_request(&content, ConfigFormat::Json)
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref(), args.profile.as_deref())?;

    SettingsOverride {
        restart_timeout_secs: args.restart_timeout,
        restart_poll_interval_secs: args.poll_interval,
        ..Default::default()
    }
    .apply(&mut settings);

    Ok(settings)
}

/// Printed form of a response, optionally wrapped with its status code
fn render(response: &ActionResponse, with_status: bool) -> Value {
    if with_status {
        serde_json::json!({"status": response.http_status(), "body": response.to_json()})
    } else {
        response.to_json()
    }
}

fn emit(response: &ActionResponse, with_status: bool) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(&render(response, with_status))?);

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_stderr)?;

    let request = read_request(args.request.as_deref(), args.request_file.as_deref())?;

    // Rejections are answered before credentials are looked up
    let action = match dispatch::validate(args.group, &request) {
        Ok(action) => action,
        Err(rejection) => return emit(&rejection, args.http_status),
    };

    let settings = load_settings(&args)?;
    tracing::debug!(?settings, "Effective settings");

    let client = GcpClient::new(&settings).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            tracing::warn!("Interrupted, cancelling in-flight waits");
            on_interrupt.cancel();
        }
    });

    let dispatcher = Dispatcher::new(client, &settings).with_cancellation(cancel);
    let response = dispatcher.handle_action(action).await;

    emit(&response, args.http_status)
}
