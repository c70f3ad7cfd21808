//! Tributary CLI - run streaming transformer workflows over NDJSON

mod builtins;
mod config;
mod errors;

use anyhow::{Context, Result, anyhow, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use rhi_tributary_core::{
    CancellationToken, Registry, Sink, Source, Transformer, Value, Workflow, WorkflowError, all,
    channel,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Output verbosity level.
#[derive(Clone, Copy)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    fn info(self, msg: &str) {
        if !matches!(self, Verbosity::Quiet) {
            println!("{msg}");
        }
    }

    fn debug(self, msg: &str) {
        if matches!(self, Verbosity::Verbose) {
            println!("[debug] {msg}");
        }
    }

    /// Log filter used when `RUST_LOG` is unset.
    fn log_filter(self, configured: Option<&str>) -> EnvFilter {
        match self {
            Verbosity::Quiet => EnvFilter::new("error"),
            Verbosity::Verbose => EnvFilter::new("debug"),
            Verbosity::Normal => configured
                .and_then(|level| EnvFilter::try_new(level).ok())
                .unwrap_or_else(|| EnvFilter::new("warn")),
        }
    }
}

#[derive(Parser)]
#[command(name = "tributary")]
#[command(about = "Composable streaming transformers", long_about = None)]
struct Cli {
    /// Verbose output (show debug info)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to config file (default: ~/.config/tributary/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available transformers
    List,

    /// Parse and build a workflow without running it
    Check {
        /// Workflow file (JSON, YAML, or TOML) or configured alias
        workflow: String,
    },

    /// Run a workflow over NDJSON values
    Run {
        /// Workflow file (JSON, YAML, or TOML) or configured alias
        workflow: String,

        /// Read values from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Cancel the run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config file
    let config = if let Some(ref path) = cli.config {
        Config::load_from_path(Some(path.clone()))
    } else {
        Config::load()
    };

    // Apply config defaults, CLI flags override
    let verbose = cli.verbose || config.defaults.verbose;
    let quiet = cli.quiet || config.defaults.quiet;
    let verbosity = Verbosity::from_flags(verbose, quiet);
    init_tracing(verbosity, config.defaults.log_level.as_deref());

    let registry = builtins::registry().context("Failed to register built-in transformers")?;

    match cli.command {
        Commands::List => cmd_list(&registry, verbosity),
        Commands::Check { workflow } => cmd_check(&registry, &config, &workflow, verbosity),
        Commands::Run {
            workflow,
            input,
            timeout,
        } => {
            let timeout = timeout
                .or(config.defaults.timeout_secs)
                .map(Duration::from_secs);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;

            let result = runtime.block_on(cmd_run(
                &registry, &config, &workflow, input, timeout, verbosity,
            ));
            // A stdin read still in flight must not hold up exit.
            runtime.shutdown_background();
            result
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "tributary", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over flags and config.
fn init_tracing(verbosity: Verbosity, configured: Option<&str>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| verbosity.log_filter(configured));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn cmd_list(registry: &Registry, v: Verbosity) -> Result<()> {
    v.info("Available transformers:\n");

    for (name, entry) in registry.entries() {
        v.info(&format!("  {}", name));
        if !entry.description.is_empty() {
            v.info(&format!("    {}", entry.description));
        }
        v.info(&format!(
            "    {} -> {}",
            entry.transformer.input_type(),
            entry.transformer.output_type()
        ));
        v.info("");
    }

    v.info(&format!("Total: {} transformers", registry.len()));
    Ok(())
}

fn cmd_check(registry: &Registry, config: &Config, workflow: &str, v: Verbosity) -> Result<()> {
    let path = config.resolve_workflow(workflow);
    let workflow = load_workflow(&path)?;
    let transformer = build_workflow(&workflow, registry)?;

    let label = match &workflow.name {
        Some(name) => name.clone(),
        None => path.display().to_string(),
    };
    v.info(&format!("Workflow: {}", label));
    if !workflow.description.is_empty() {
        v.info(&format!("  {}", workflow.description));
    }
    v.info(&format!("  input:  {}", transformer.input_type()));
    v.info(&format!("  output: {}", transformer.output_type()));
    v.debug(&format!("steps: {}", workflow.pipeline.step_names().join(", ")));
    Ok(())
}

async fn cmd_run(
    registry: &Registry,
    config: &Config,
    workflow: &str,
    input: Option<PathBuf>,
    timeout: Option<Duration>,
    v: Verbosity,
) -> Result<()> {
    let path = config.resolve_workflow(workflow);
    let workflow = load_workflow(&path)?;
    let transformer = build_workflow(&workflow, registry)?;

    let reader: Box<dyn AsyncRead + Unpin + Send> = match &input {
        Some(input) => Box::new(
            tokio::fs::File::open(input)
                .await
                .map_err(|e| anyhow!(errors::file_read_error(&input.to_string_lossy(), &e)))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    let token = CancellationToken::new();
    cancel_on_interrupt(token.clone());
    if let Some(limit) = timeout {
        cancel_after(token.clone(), limit);
    }

    tracing::info!(workflow = %path.display(), "running workflow");

    let (input_sink, mut input_source) = channel();
    let (output_sink, output_source) = channel();
    let reader_token = token.child_token();
    let reader = tokio::spawn(read_values(reader, input_sink, reader_token.clone()));
    let progress = spinner(v);
    let writer = tokio::spawn(write_values(output_source, token.clone(), progress.clone()));

    let result = all(&token, transformer.as_ref(), &mut input_source, &output_sink).await;
    reader_token.cancel();
    drop(input_source);
    drop(output_sink);

    let read = reader.await.context("Input reader panicked")?;
    let written = writer.await.context("Output writer panicked")?;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    match result {
        Err(err) if err.is_cancelled() => bail!("Run cancelled before all input was processed"),
        Err(err) => return Err(anyhow::Error::new(err).context("Workflow failed")),
        Ok(()) => {}
    }
    let read = read?;
    let written = written?;

    tracing::info!(read, written, "workflow finished");
    Ok(())
}

fn load_workflow(path: &Path) -> Result<Workflow> {
    let path_str = path.to_string_lossy();
    let data = std::fs::read(path).map_err(|e| anyhow!(errors::file_read_error(&path_str, &e)))?;
    Workflow::from_bytes(&data, Some(path_str.as_ref()))
        .with_context(|| format!("Failed to load workflow '{}'", path.display()))
}

fn build_workflow(workflow: &Workflow, registry: &Registry) -> Result<Arc<dyn Transformer>> {
    workflow.build(registry).map_err(|err| match err {
        WorkflowError::UnknownTransformer(name) => {
            anyhow!(errors::unknown_transformer_error(&name, registry))
        }
        other => anyhow::Error::new(other).context("Failed to build workflow"),
    })
}

fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    tracing::warn!("interrupted, cancelling run");
                    token.cancel();
                }
            }
        }
    });
}

fn cancel_after(token: CancellationToken, limit: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(limit) => {
                tracing::warn!(secs = limit.as_secs(), "timed out, cancelling run");
                token.cancel();
            }
        }
    });
}

fn spinner(v: Verbosity) -> Option<ProgressBar> {
    if matches!(v, Verbosity::Quiet) {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    let template = "{spinner:.green} {pos} values written";
    if let Ok(style) = ProgressStyle::default_spinner().template(template) {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Parse one JSON value per line into `sink`. Blank lines are skipped.
async fn read_values(
    reader: Box<dyn AsyncRead + Unpin + Send>,
    sink: Sink,
    token: CancellationToken,
) -> Result<u64> {
    let mut lines = BufReader::new(reader).lines();
    let mut line_number = 0;
    let mut read = 0;

    loop {
        let line = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read input")?,
        };
        let Some(line) = line else {
            break;
        };
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(&line)
            .with_context(|| format!("Invalid JSON on input line {}", line_number))?;
        // The pipeline stopped taking input.
        if sink.send(&token, value).is_err() {
            break;
        }
        read += 1;
    }

    Ok(read)
}

/// Write each output value to stdout as one line of JSON.
async fn write_values(
    mut source: Source,
    token: CancellationToken,
    progress: Option<ProgressBar>,
) -> Result<u64> {
    let mut stdout = tokio::io::stdout();
    let mut written = 0;

    while let Ok(Some(value)) = source.recv(&token).await {
        let mut line = serde_json::to_vec(&value).context("Failed to encode output")?;
        line.push(b'\n');
        stdout
            .write_all(&line)
            .await
            .context("Failed to write output")?;
        written += 1;
        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    stdout.flush().await.context("Failed to write output")?;
    Ok(written)
}
