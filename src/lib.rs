//! EcoGrid core: an ordered node index, a weighted network graph with
//! shortest and redundant path search, a capacity-aware load balancer,
//! prioritized event queues and a route cache, wired together behind
//! [`controller::GridController`].

pub mod balancer;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod events;
pub mod graph;
pub mod index;
pub mod repo;
pub mod routing;
#[cfg(feature = "sim")]
pub mod simulation;
pub mod telemetry;

pub use controller::GridController;
pub use error::{GridError, GridResult};
