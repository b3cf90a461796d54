//! MES dispatch server entry point.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use mes_server::config;
use mes_server::{DispatchEngine, MesServer, ProcessManager, Product, StationGraph};

#[derive(Parser)]
#[command(name = "mes-server")]
#[command(about = "Manufacturing execution server: dispatches trays across a station network")]
#[command(version)]
struct Cli {
    /// Server configuration file
    #[arg(default_value = "mes_server_cfg.json")]
    config: PathBuf,

    /// Graphviz rendering of the loaded station network
    #[arg(long, default_value = "system_graph.dot")]
    dot_file: PathBuf,

    /// Orders created at startup
    #[arg(long, default_value_t = 100)]
    initial_orders: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let cfg = config::load_server_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let graph_cfg = config::load_graph_config(&cfg.production_system.graph_file)?;
    let caps_cfg = config::load_capabilities_config(&cfg.production_system.capabilities_file)?;
    let products_cfg = config::load_products_config(&cfg.product_info.products_file)?;

    let graph = StationGraph::from_config(&graph_cfg)?;
    graph.write_dot(&cli.dot_file)?;
    info!("station network rendered to {}", cli.dot_file.display());

    let product = Product::from_config(&products_cfg, cfg.product_info.product_type)?;
    let process = ProcessManager::from_config(&caps_cfg, product)?;
    let mut engine = DispatchEngine::new(graph, process);
    engine.create_order_batch(cli.initial_orders);

    let server = MesServer::bind(engine, cfg.mes_service.bind_port).await?;
    info!("MES server started at port {}", cfg.mes_service.bind_port);

    tokio::select! {
        result = server.serve() => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupt received, shutting down"),
    }
    Ok(())
}
