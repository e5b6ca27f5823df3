use anyhow::Result;
use ecogrid::{config, controller, repo, telemetry};
use config::Config;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing()?;

    let cfg = Config::load()?;
    let store = repo::open_store(&cfg).await?;
    let grid = Arc::new(controller::GridController::new(cfg.clone(), store)?);

    #[cfg(feature = "sim")]
    {
        let (nodes, edges) = grid.load_sample_network(cfg.simulation.consumers, cfg.simulation.seed)?;
        info!(nodes, edges, "sample network loaded");
    }

    let tasks = controller::spawn_controller_tasks(grid.clone(), &cfg);
    info!(
        tasks = tasks.len(),
        overload_threshold = cfg.balancer.overload_threshold,
        "EcoGrid running"
    );

    let signal = telemetry::shutdown_signal().await;
    info!(%signal, "shutdown signal received");
    for task in tasks {
        task.abort();
    }

    let stats = grid.system_stats();
    info!(
        nodes = stats.index.size,
        balancing_passes = stats.balancing.total_passes,
        events_dropped = stats.events.queue.dropped,
        "final state"
    );
    info!("shutdown complete");
    Ok(())
}
