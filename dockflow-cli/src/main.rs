//! Dockflow CLI
//!
//! Loads a pipeline descriptor, runs it with the container CLI and git,
//! prints the report and exits with the pipeline's status code.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dockflow::prelude::*;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "dockflow", version)]
#[command(about = "Run a pipeline of container stages", long_about = None)]
struct Cli {
    /// Path for the pipeline descriptor file
    #[arg(long = "in", value_name = "FILE")]
    input: PathBuf,

    /// Also save the report to this file
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
    format: ReportFormat,

    /// Log output format
    #[arg(long, value_enum, env = "DOCKFLOW_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Container CLI binary (overrides DOCKFLOW_CONTAINER_BIN)
    #[arg(long, value_name = "BIN")]
    container_bin: Option<String>,

    /// Directory for fetched stage sources (overrides DOCKFLOW_WORKSPACE)
    #[arg(long, value_name = "DIR")]
    workspace: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> Result<ExecutorConfig> {
        let mut config = ExecutorConfig::from_env().context("Invalid DOCKFLOW_* environment")?;
        if let Some(bin) = &self.container_bin {
            config = config.with_container_bin(bin.clone());
        }
        if let Some(dir) = &self.workspace {
            config = config.with_workspace_root(dir.clone());
        }
        Ok(config)
    }

    fn serializer(&self) -> Arc<dyn ReportSerializer> {
        match self.format {
            ReportFormat::Json => Arc::new(JsonReportSerializer::pretty()),
            ReportFormat::Text => Arc::new(TextReportSerializer),
        }
    }
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dockflow=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

/// Reads piped standard input. A terminal means no input.
fn read_piped_stdin() -> Result<Option<String>> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut input = String::new();
    stdin
        .lock()
        .read_to_string(&mut input)
        .context("Error reading standard input")?;
    Ok(Some(input))
}

async fn save_report(path: &Path, report: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Error creating {}", parent.display()))?;
    }
    tokio::fs::write(path, report)
        .await
        .with_context(|| format!("Error saving report to {}", path.display()))?;
    info!(path = %path.display(), "Report saved");
    Ok(())
}

async fn run(cli: Cli) -> Result<StatusCode> {
    let pipeline = Pipeline::from_file(&cli.input)
        .with_context(|| format!("Error loading pipeline from {}", cli.input.display()))?;
    let config = cli.config()?;
    let serializer = cli.serializer();
    let input = read_piped_stdin()?;

    info!(pipeline = %pipeline.name, container_bin = %config.container_bin, "Executing pipeline");
    let executor = PipelineExecutor::docker(&config)
        .with_serializer(serializer.clone())
        .with_event_sink(Arc::new(LoggingEventSink::debug()));
    let result = executor.run(&pipeline, input).await;

    let report = serializer
        .serialize(&result)
        .context("Error serializing the pipeline report")?;
    if let Some(path) = &cli.out {
        save_report(path, &report).await?;
    }
    println!("{report}");

    if result.is_success() {
        info!(pipeline = %result.name, "Pipeline executed successfully");
    } else {
        error!(pipeline = %result.name, status = %result.status, "Pipeline failed");
    }
    Ok(result.status)
}

fn exit_code(status: StatusCode) -> ExitCode {
    u8::try_from(status.code()).map_or(ExitCode::FAILURE, ExitCode::from)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match run(cli).await {
        Ok(status) => exit_code(status),
        Err(e) => {
            error!("{e:#}");
            exit_code(StatusCode::InvalidParameters)
        }
    }
}
