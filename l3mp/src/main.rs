//! l3mp daemon: sets up label multiplexing and holds it until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use l3mp::ebpf_loader::DEFAULT_PROGRAM_PATH;
use l3mp::{Config, ConfigError, EbpfDatapath, Multiplexer, NetlinkLinks, config, rlimit};
use std::path::{Path, PathBuf};
use std::process::exit;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "l3mp", version)]
#[command(about = "Multiplex labelled point-to-point interfaces over one external interface")]
#[command(after_help = "Example:\n  l3mp -ext eth0 -if mp1@1 -if mp2@2\n\n\
Notes:\n  - Label must be a number from 0 to 16\n  - Maximum 16 interface-label pairs allowed")]
struct Cli {
    /// External interface name
    #[arg(long = "ext", value_name = "IFACE")]
    ext: Option<String>,

    /// Interface-label pair in format 'interface@label' (can be repeated up to 16 times)
    #[arg(long = "if", value_name = "NAME@LABEL")]
    interfaces: Vec<String>,

    /// Compiled classifier object
    #[arg(long, value_name = "PATH", default_value = DEFAULT_PROGRAM_PATH)]
    program: PathBuf,

    /// Legacy form: external interface name
    #[arg(value_name = "EXTERNAL", requires = "config_file", conflicts_with_all = ["ext", "interfaces"])]
    external: Option<String>,

    /// Legacy form: file with one 'interface@label' per line
    #[arg(value_name = "CONFIG_FILE")]
    config_file: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> std::result::Result<Config, ConfigError> {
        match (&self.external, &self.config_file) {
            (Some(external), Some(file)) => Config::from_file(external, file),
            _ => Config::from_flags(self.ext.as_deref(), &self.interfaces),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse_from(config::normalize_flags(std::env::args()));

    info!(version = env!("CARGO_PKG_VERSION"), "l3mp starting...");

    let config = match cli.config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}\n\nRun with --help for usage.");
            exit(2);
        }
    };

    if let Err(e) = run(&cli.program, config).await {
        error!("l3mp failed: {e:#}");
        exit(1);
    }

    info!("l3mp stopped");
}

async fn run(program: &Path, config: Config) -> Result<()> {
    if let Err(e) = rlimit::raise_memlock_limit() {
        match rlimit::memlock_limit() {
            Ok((soft, hard)) => warn!(error = %e, soft, hard, "Failed to increase RLIMIT_MEMLOCK"),
            Err(_) => warn!(error = %e, "Failed to increase RLIMIT_MEMLOCK"),
        }
    }

    info!(external = %config.external_interface, "External interface");
    for spec in &config.managed {
        info!(if_name = %spec.name, label = %spec.label, "Interface label");
    }

    let datapath = EbpfDatapath::load_from_path(program).context("failed to load classifier")?;
    let links = NetlinkLinks::new().context("failed to open netlink connection")?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut sigint = signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => { info!("Received SIGINT"); }
            _ = sigterm.recv() => { info!("Received SIGTERM"); }
        }
        let _ = shutdown_tx.send(true);
    });

    Multiplexer::new(datapath, links)
        .run(&config, shutdown_rx)
        .await
        .context("setup failed")?;
    Ok(())
}
