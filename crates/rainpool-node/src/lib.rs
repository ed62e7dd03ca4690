//! # Rainpool Node
//!
//! Runs the rain product as a service:
//!
//! - [`engine`]: single-owner actor serving product commands over a channel
//! - [`relay`]: answers queued oracle requests from an observation source
//! - [`config`]: `.env` and environment configuration
//! - [`wiring`]: in-memory collaborator ports

pub mod config;
pub mod engine;
pub mod relay;
pub mod wiring;

#[cfg(test)]
pub(crate) mod testing;

pub use config::NodeConfig;
pub use engine::{spawn, Command, EngineHandle};
pub use relay::{ObservationSource, Observation, OracleRelay, StaticObservationSource};
pub use wiring::InMemoryNode;
