//! cbus-sim: a simulated CBUS network served over GridConnect TCP

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use cbus_server::{ServerConfig, SimulatorServer};
use cbus_sim::ModuleTypeDatabase;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "cbus-sim", version, about = "Simulated CBUS network for testing configuration tools")]
struct Args {
    /// TCP port to listen on [default: 5550]
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind [default: 127.0.0.1]
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// JSON layout file (built-in layout if omitted)
    #[arg(short, long)]
    layout: Option<PathBuf>,

    /// Server configuration file; command line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the supported module types and exit
    #[arg(long)]
    list_module_types: bool,
}

fn list_module_types() {
    println!("{:<12} {:>4} {:>6} {:>4} {:>4}", "TYPE", "ID", "EVENTS", "EVS", "NVS");
    for t in ModuleTypeDatabase::all() {
        println!(
            "{:<12} {:>4} {:>6} {:>4} {:>4}",
            t.name, t.module_id, t.max_events, t.event_variables, t.node_variables
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cbus_protocol=info,cbus_sim=info,cbus_server=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.list_module_types {
        list_module_types();
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.layout.is_some() {
        config.layout_path = args.layout;
    }

    let registry = config
        .layout()
        .and_then(|layout| Ok(layout.build_registry()?))
        .context("building layout")?;

    tracing::info!("Starting CBUS simulator with {} modules", registry.len());
    for module in registry.all() {
        tracing::info!(
            "  node {:>5}: {} ({} events)",
            module.node_number(),
            module.module_type().name,
            module.event_count()
        );
    }

    let handle = SimulatorServer::start(config, registry).await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    tracing::info!("Shutting down");
    handle.stop().await;

    Ok(())
}
