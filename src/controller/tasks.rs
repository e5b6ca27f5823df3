use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::GridController;
use crate::config::Config;
use crate::error::GridError;

/// Start the periodic balancing loop and, with the `sim` feature, the load
/// simulator. Loops run until the runtime shuts down.
pub fn spawn_controller_tasks(controller: Arc<GridController>, cfg: &Config) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if cfg.balancer.interval_seconds > 0 {
        let c = controller.clone();
        let every = Duration::from_secs(cfg.balancer.interval_seconds);
        handles.push(tokio::spawn(async move { balancing_loop(c, every).await }));
    }

    #[cfg(feature = "sim")]
    {
        if cfg.simulation.enabled {
            match simulation::build(&controller, cfg) {
                Ok(sim) => {
                    let c = controller.clone();
                    let every = Duration::from_secs(cfg.simulation.tick_seconds.max(1));
                    handles.push(tokio::spawn(async move { simulation::run(c, sim, every).await }));
                }
                Err(e) => warn!(error = %e, "load simulator not started"),
            }
        }
    }

    handles
}

async fn balancing_loop(controller: Arc<GridController>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match controller.balance_network() {
            Ok(summary) if summary.overloaded_nodes > 0 => {
                info!(
                    overloaded = summary.overloaded_nodes,
                    balanced = summary.balanced,
                    "periodic balancing"
                );
            }
            Ok(_) => {}
            Err(GridError::BalancingInProgress) => debug!("balancing tick skipped; pass in progress"),
            Err(e) => warn!(error = %e, "balancing tick failed"),
        }
    }
}

#[cfg(feature = "sim")]
mod simulation {
    use super::*;
    use chrono::Utc;

    use crate::domain::NodeType;
    use crate::simulation::{LoadSimulator, LoadSimulatorConfig, SensorStatus};

    /// One sensor per consumer, based at its current load
    pub(super) fn build(controller: &GridController, cfg: &Config) -> anyhow::Result<LoadSimulator> {
        let mut sim = LoadSimulator::new(LoadSimulatorConfig {
            nominal_voltage: cfg.routing.nominal_voltage,
            random_seed: cfg.simulation.seed,
            ..Default::default()
        })?;
        for node in controller.list_nodes() {
            if node.attrs.node_type == NodeType::Consumer {
                sim.add_sensor(node.node_id, node.attrs.current_load.max(1.0));
            }
        }
        info!(sensors = sim.len(), "load simulator ready");
        Ok(sim)
    }

    pub(super) async fn run(controller: Arc<GridController>, mut sim: LoadSimulator, every: Duration) {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let readings = sim.batch(Utc::now());
            let mut applied = 0;
            for reading in readings {
                if reading.status == SensorStatus::Failed {
                    debug!(node_id = %reading.node_id, "sensor fault; reading skipped");
                    continue;
                }
                match controller.update_load(&reading.node_id, reading.load) {
                    Ok(_) => applied += 1,
                    Err(GridError::NotFound { .. }) => {
                        sim.remove_sensor(&reading.node_id);
                    }
                    Err(e) => warn!(node_id = %reading.node_id, error = %e, "simulated update failed"),
                }
            }
            debug!(applied, "simulation tick");
        }
    }
}
