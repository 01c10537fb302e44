//! Portal Ball networking library
//!
//! Coordination layer for a two-team arena ball game: one authoritative
//! peer per room, tagged invocations and a per-entity state stream over a
//! reliable-ordered messaging substrate.
//!
//! # Features
//!
//! - `metrics_server` - HTTP endpoint serving Prometheus/JSON metrics (enabled by default)

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod lobby;
pub mod settings;
pub mod metrics;
