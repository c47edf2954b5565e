use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use pifon::bot::Agent;
use pifon::logging::{init_logging, log_file_path};
use pifon::modules::stock_registry;
use pifon::transport::Transport;

/// Hosts intercom modules on a line transport over stdin/stdout
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enables debug mode, twice for trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Also log to `<config>-<nick>.log` in the data directory
    #[arg(long)]
    log_file: bool,

    /// Directory for the log file, implies --log-file
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Module to host, may be repeated
    #[arg(short, long = "module", default_values_t = ["echo".to_string(), "pinger".to_string()])]
    modules: Vec<String>,

    /// List the available modules and exit
    #[arg(long)]
    list: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let registry = stock_registry();
    if cli.list {
        for name in registry.available() {
            println!("{}", name);
        }
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let mut transport = Transport::stdio();
        let identity = transport
            .handshake()
            .await
            .context("Failed to read the handshake")?;

        // the log file is named after the identity
        let log_file = if cli.log_file || cli.log_dir.is_some() {
            Some(log_file_path(cli.log_dir.as_deref(), &identity)?)
        } else {
            None
        };
        let _guard = init_logging(cli.debug, log_file.as_deref())?;
        info!("Starting {} as {}", identity.program, identity.nick);
        for name in cli.modules.iter().filter(|m| !registry.contains(m)) {
            warn!("Unknown module {}, available: {:?}", name, registry.available());
        }

        let mut builder = Agent::builder(identity, transport);
        for module in registry.create(&cli.modules) {
            builder = builder.boxed_module(module);
        }
        let mut agent = builder.build()?;
        let summary = agent.run().await?;
        info!(
            "Exit ({:?}) after {} iterations, {} lines, {} ticks",
            summary.exit, summary.iterations, summary.lines, summary.ticks
        );
        Ok::<(), anyhow::Error>(())
    })
}
