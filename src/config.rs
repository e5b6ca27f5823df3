use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub balancer: BalancerConfig,
    pub events: EventsConfig,
    pub routing: RoutingConfig,
    pub simulation: SimulationConfig,
    pub db: DbConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Utilization above which a node is overloaded
    pub overload_threshold: f64,
    /// Utilization transfers aim for on both sides
    pub target_threshold: f64,
    /// Period of the background balancing loop; 0 disables it
    pub interval_seconds: u64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            overload_threshold: 0.9,
            target_threshold: 0.8,
            interval_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub queue_capacity: usize,
    /// Bound on the priority view; the least urgent, newest event is dropped when full
    pub heap_capacity: usize,
    /// Events at this priority or more urgent are persisted and reported as critical
    pub critical_threshold: u8,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            heap_capacity: 10_000,
            critical_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub cache_capacity: usize,
    pub resistance_factor: f64,
    pub reliability_decay: f64,
    /// Volts; used when a route's source node has no usable voltage
    pub nominal_voltage: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 256,
            resistance_factor: 1.0,
            reliability_decay: 0.01,
            nominal_voltage: 220.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub tick_seconds: u64,
    pub consumers: usize,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_seconds: 5,
            consumers: 50,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub url: Option<String>,
    /// Rows per table kept by the in-memory store when no database is configured
    pub memory_rows: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            memory_rows: crate::repo::DEFAULT_RETAINED_ROWS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    /// Defaults, then `path` if it exists, then `ECOGRID__` env vars
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ECOGRID__").split("__"));
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let b = &self.balancer;
        for (name, value) in [
            ("balancer.overload_threshold", b.overload_threshold),
            ("balancer.target_threshold", b.target_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                bail!("{name} must be within (0, 1], got {value}");
            }
        }
        if b.target_threshold > b.overload_threshold {
            bail!(
                "balancer.target_threshold ({}) must not exceed overload_threshold ({})",
                b.target_threshold,
                b.overload_threshold
            );
        }
        if self.events.queue_capacity == 0 || self.events.heap_capacity == 0 {
            bail!("events.queue_capacity and events.heap_capacity must be >= 1");
        }
        if !(1..=5).contains(&self.events.critical_threshold) {
            bail!(
                "events.critical_threshold must be within 1..=5, got {}",
                self.events.critical_threshold
            );
        }
        let r = &self.routing;
        if r.cache_capacity == 0 {
            bail!("routing.cache_capacity must be >= 1");
        }
        if !(r.resistance_factor >= 0.0 && r.reliability_decay > 0.0 && r.nominal_voltage > 0.0) {
            bail!("routing factors must be non-negative and nominal_voltage positive");
        }
        if self.simulation.enabled && self.simulation.tick_seconds == 0 {
            bail!("simulation.tick_seconds must be >= 1 when the simulator is enabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.events.queue_capacity, 10_000);
        assert_eq!(cfg.routing.cache_capacity, 256);
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let mut cfg = Config::default();
        cfg.balancer.overload_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.balancer.target_threshold = 0.95;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.events.critical_threshold = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "grid.toml",
                r#"
                [balancer]
                overload_threshold = 0.85

                [routing]
                cache_capacity = 16
                "#,
            )?;
            jail.set_env("ECOGRID__EVENTS__QUEUE_CAPACITY", "42");

            let cfg = Config::load_from("grid.toml").expect("config loads");
            assert_eq!(cfg.balancer.overload_threshold, 0.85);
            assert_eq!(cfg.balancer.target_threshold, 0.8);
            assert_eq!(cfg.routing.cache_capacity, 16);
            assert_eq!(cfg.events.queue_capacity, 42);
            Ok(())
        });
    }
}
