//! Pulse Loopback - Manage PulseAudio loopback links through `pactl`.
//!
//! Lists sources and sinks, shows the loopback modules connecting them, and
//! creates or removes links on request. `watch` keeps the view up to date.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pulse_loopback_core::arguments::from_pairs;
use pulse_loopback_pactl::{AudioServer, PactlClient};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use pulse_loopback_cli::config::{self, ENV_COMMAND_WRAPPER};
use pulse_loopback_cli::{Patchbay, signals};

/// Crates whose logs are shown at the configured level.
const LOG_TARGETS: &[&str] = &["pulse_loopback_cli", "pulse_loopback_pactl", "pulse_loopback_core"];

#[derive(Parser)]
#[command(name = "pulse-loopback", version)]
#[command(about = "Manage PulseAudio loopback links through pactl", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Control utility to run instead of `pactl`
    #[arg(long, global = true, value_name = "PROGRAM")]
    pactl: Option<String>,

    /// Run every pactl invocation through this command, e.g. "bash -c"
    #[arg(long, global = true, value_name = "COMMAND")]
    command_wrapper: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show sources, sinks and links
    List,
    /// List sources
    Sources,
    /// List sinks
    Sinks,
    /// List loaded modules
    Modules,
    /// Create a loopback from a source to a sink
    Link {
        source: u32,
        sink: u32,
        /// Loopback latency in milliseconds
        #[arg(long)]
        latency_msec: Option<u32>,
    },
    /// Remove the loopback from a source to a sink, or every loopback from a source
    Unlink { source: u32, sink: Option<u32> },
    /// Load a module with `key=value` arguments
    LoadModule {
        name: String,
        /// One `key=value` per argument; values are passed literally
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        arguments: Vec<String>,
    },
    /// Unload a module by index
    UnloadModule { index: u32 },
    /// Keep showing the patchbay, refreshing periodically
    Watch {
        /// Refresh interval in milliseconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The log level lives in the config file, so logging starts after it is read.
    let config = config::load_config(cli.config.as_deref())?;
    init_logging(if cli.verbose { "debug" } else { &config.general.log_level })?;
    match &config.path {
        Some(path) => info!(config_path = ?path, "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }
    debug!(?config, "Configuration");

    let env_wrapper = std::env::var(ENV_COMMAND_WRAPPER).ok();
    let wrapper = config.command_wrapper(cli.command_wrapper.as_deref(), env_wrapper.as_deref());
    let runner = config.runner(cli.pactl.as_deref(), wrapper);
    info!(program = runner.program(), wrapper = ?runner.wrapper(), "Using control utility");

    let client = PactlClient::new(runner);

    match cli.command.unwrap_or(Commands::List) {
        Commands::List => {
            let mut patchbay = Patchbay::new(client, config.links.latency_msec);
            patchbay.refresh()?;
            print!("{}", patchbay.render());
        }
        Commands::Sources => {
            for source in client.list_sources().context("Failed to list sources")? {
                println!("{}\t{}", source.index, source.description);
            }
        }
        Commands::Sinks => {
            for sink in client.list_sinks().context("Failed to list sinks")? {
                println!("{}\t{}", sink.index, sink.description);
            }
        }
        Commands::Modules => {
            for module in client.list_modules().context("Failed to list modules")? {
                println!("{module}");
            }
        }
        Commands::Link { source, sink, latency_msec } => {
            let latency = latency_msec.unwrap_or(config.links.latency_msec);
            let mut patchbay = Patchbay::new(client, latency);
            let index = patchbay
                .link(source, sink)
                .with_context(|| format!("Failed to link source {source} to sink {sink}"))?;
            println!("{index}");
        }
        Commands::Unlink { source, sink } => {
            let mut patchbay = Patchbay::new(client, config.links.latency_msec);
            patchbay.refresh()?;
            unlink(&mut patchbay, source, sink)?;
        }
        Commands::LoadModule { name, arguments } => {
            let arguments = from_pairs(&arguments).context("Invalid module arguments")?;
            let index = client
                .load_module(&name, &arguments)
                .with_context(|| format!("Failed to load {name}"))?;
            println!("{index}");
        }
        Commands::UnloadModule { index } => {
            client
                .unload_module(index)
                .with_context(|| format!("Failed to unload module {index}"))?;
        }
        Commands::Watch { interval_ms } => {
            let interval =
                Duration::from_millis(interval_ms.unwrap_or(config.watch.refresh_interval_ms));
            let mut patchbay = Patchbay::new(client, config.links.latency_msec);
            watch(&mut patchbay, interval).await?;
        }
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives: Vec<String> =
                LOG_TARGETS.iter().map(|target| format!("{target}={level}")).collect();
            EnvFilter::try_new(directives.join(","))
                .with_context(|| format!("Invalid log level: {level}"))?
        }
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    Ok(())
}

fn unlink<S: AudioServer>(
    patchbay: &mut Patchbay<S>,
    source: u32,
    sink: Option<u32>,
) -> Result<()> {
    if let Some(sink) = sink {
        let removed = patchbay
            .unlink(source, sink)
            .with_context(|| format!("Failed to unlink source {source} from sink {sink}"))?;
        if !removed {
            bail!("No link from source {source} to sink {sink}");
        }
        return Ok(());
    }

    let report = patchbay.unlink_source(source)?;
    if report.unlinked.is_empty() && report.failed.is_empty() {
        bail!("Source {source} has no links");
    }
    if !report.failed.is_empty() {
        let failed: Vec<String> = report
            .failed
            .iter()
            .map(|(sink, _)| {
                patchbay.sink_description(*sink).map_or_else(|| format!("#{sink}"), str::to_string)
            })
            .collect();
        bail!("Failed to unlink the following sinks: {}", failed.join(", "));
    }
    Ok(())
}

/// Refresh the patchbay on a timer and print it whenever it changes.
async fn watch(patchbay: &mut Patchbay<PactlClient>, interval: Duration) -> Result<()> {
    let shutdown = signals::shutdown_signal();
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::task::block_in_place(|| patchbay.refresh())?;
    println!("{}", patchbay.render());
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if tokio::task::block_in_place(|| patchbay.refresh())? {
                    println!("{}", patchbay.render());
                }
            }
            result = &mut shutdown => {
                result?;
                info!("Stopping watch");
                break;
            }
        }
    }

    Ok(())
}
